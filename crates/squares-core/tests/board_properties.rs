use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use squares_core::model::board::{Board, Cell, NUMBER_OF_CELLS};
use squares_core::model::card::Card;
use squares_core::model::deck_tracker::DeckTracker;
use squares_core::model::hand::PokerHand;
use squares_core::model::points::PointSystem;

fn random_fill(board: &mut Board, deck: &mut DeckTracker, rng: &mut StdRng, count: usize) {
    let cards = deck.shuffled(rng);
    let mut cells = board.empty_cells();
    cells.shuffle(rng);
    for (card, cell) in cards.into_iter().zip(cells).take(count) {
        deck.deal(card).expect("deal");
        board.put_card(card, cell.row, cell.col).expect("put");
        assert_eq!(deck.len() + board.number_of_cards(), Card::COUNT);
    }
}

fn retract(board: &mut Board, deck: &mut DeckTracker, count: usize) {
    for _ in 0..count {
        let play = board.retract_last_play().expect("retract");
        deck.put_back(play.card).expect("put back");
        assert_eq!(deck.len() + board.number_of_cards(), Card::COUNT);
    }
}

#[test]
fn nested_fill_and_retract_round_trips() {
    let mut rng = StdRng::seed_from_u64(20_251_016);
    let mut board = Board::new();
    let mut deck = DeckTracker::new();
    for _ in 0..200 {
        let first = rng.gen_range(0..=NUMBER_OF_CELLS);
        random_fill(&mut board, &mut deck, &mut rng, first);
        let board_mark = board.clone();
        let deck_mark = deck;

        let second = rng.gen_range(0..=board.number_of_empty_cells());
        random_fill(&mut board, &mut deck, &mut rng, second);
        retract(&mut board, &mut deck, second);
        assert_eq!(board, board_mark);
        assert_eq!(deck, deck_mark);

        retract(&mut board, &mut deck, first);
        assert_eq!(board, Board::new());
        assert_eq!(deck, DeckTracker::new());
    }
}

#[test]
fn aggregate_hands_match_reference_classifier() {
    let mut rng = StdRng::seed_from_u64(7);
    let points = PointSystem::american();
    let mut board = Board::new();
    for _ in 0..300 {
        board.clear();
        let mut deck = DeckTracker::new();
        random_fill(&mut board, &mut deck, &mut rng, NUMBER_OF_CELLS);
        let hands = board.line_hands().expect("full board");
        let lines = board.rows().iter().chain(board.cols().iter());
        let mut expected = 0;
        for (hand, line) in hands.iter().zip(lines) {
            let cards = line.full_hand().expect("full line");
            assert_eq!(*hand, PokerHand::classify(&cards), "{board}");
            expected += points.score(*hand);
        }
        assert_eq!(board.poker_hand_score(&points), Ok(expected));
    }
}

#[test]
fn fixed_layouts_cover_wheel_and_royal() {
    let layout = [
        ["AH", "2H", "3H", "4H", "5H"],
        ["TS", "JS", "QS", "KS", "AS"],
        ["AC", "2D", "3C", "4D", "5S"],
        ["9C", "9D", "9S", "KC", "KD"],
        ["6C", "7C", "8C", "JC", "QC"],
    ];
    let mut board = Board::new();
    for (row, texts) in layout.iter().enumerate() {
        for (col, text) in texts.iter().enumerate() {
            let card: Card = text.parse().expect("card");
            board.put_card(card, row, col).expect("put");
        }
    }
    let hands = board.line_hands().expect("full");
    assert_eq!(
        &hands[..5],
        &[
            PokerHand::StraightFlush,
            PokerHand::RoyalFlush,
            PokerHand::Straight,
            PokerHand::FullHouse,
            PokerHand::Flush,
        ]
    );
    assert!(board.find_first_empty_cell().is_none());
    assert_eq!(board.plays().last().map(|play| play.cell()), Some(Cell::new(4, 4)));
}
