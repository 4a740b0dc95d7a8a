//! Incremental aggregate for one line (row or column) of the grid.

use crate::model::board::BoardError;
use crate::model::card::Card;
use crate::model::deck_tracker::DeckTracker;
use crate::model::hand::{HAND_SIZE, PokerHand};
use crate::model::points::PointSystem;
use crate::model::rank::Rank;
use crate::model::suit::Suit;

const SIZE: usize = HAND_SIZE;
/// Lowest non-ace rank index that can still join a broadway straight.
const BROADWAY_LOW: usize = Rank::COUNT - SIZE + 1;
const EMPTY_RANGE: [u8; 2] = [Rank::COUNT as u8, 0];

/// Distance between two ranks as used for straight building, with the ace
/// counted from whichever end is closer.
pub fn rank_distance(a: Rank, b: Rank) -> usize {
    let (a, b) = (a.index(), b.index());
    let from_ace = |other: usize| {
        if other > Rank::COUNT - SIZE {
            Rank::COUNT - other
        } else {
            other
        }
    };
    if a == 0 {
        return from_ace(b);
    }
    if b == 0 {
        return from_ace(a);
    }
    a.abs_diff(b)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowCol {
    index: usize,
    positions: [Option<Card>; SIZE],
    number_of_cards: u8,
    rank_count: u8,
    suit_count: u8,
    ranks: [u8; Rank::COUNT],
    suits: [u8; Suit::COUNT],
    /// Lowest and highest non-ace rank present; `[13, 0]` when none.
    rank_range: [u8; 2],
    any_card_position: Option<u8>,
    expected_score: f64,
}

impl RowCol {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            positions: [None; SIZE],
            number_of_cards: 0,
            rank_count: 0,
            suit_count: 0,
            ranks: [0; Rank::COUNT],
            suits: [0; Suit::COUNT],
            rank_range: EMPTY_RANGE,
            any_card_position: None,
            expected_score: 0.0,
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::new(self.index);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn card(&self, pos: usize) -> Option<Card> {
        self.positions[pos]
    }

    pub fn cards(&self) -> Vec<Card> {
        self.positions.iter().flatten().copied().collect()
    }

    /// The five cards of a full line.
    pub fn full_hand(&self) -> Option<[Card; SIZE]> {
        let mut hand = [self.positions[0]?; SIZE];
        for (slot, card) in hand.iter_mut().zip(self.positions.iter()) {
            *slot = (*card)?;
        }
        Some(hand)
    }

    pub fn number_of_cards(&self) -> usize {
        self.number_of_cards as usize
    }

    pub fn rank_count(&self) -> usize {
        self.rank_count as usize
    }

    pub fn suit_count(&self) -> usize {
        self.suit_count as usize
    }

    pub fn count_rank(&self, rank: Rank) -> usize {
        self.ranks[rank.index()] as usize
    }

    pub fn count_suit(&self, suit: Suit) -> usize {
        self.suits[suit.index()] as usize
    }

    pub fn has_rank(&self, rank: Rank) -> bool {
        self.ranks[rank.index()] > 0
    }

    pub fn has_suit(&self, suit: Suit) -> bool {
        self.suits[suit.index()] > 0
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_cards == 0
    }

    pub fn is_full(&self) -> bool {
        self.number_of_cards as usize >= SIZE
    }

    pub fn is_empty_at(&self, pos: usize) -> bool {
        self.positions[pos].is_none()
    }

    pub fn first_empty_position(&self) -> Option<usize> {
        self.positions.iter().position(Option::is_none)
    }

    pub fn any_card(&self) -> Option<Card> {
        self.any_card_position
            .and_then(|pos| self.positions[pos as usize])
    }

    pub fn expected_score(&self) -> f64 {
        self.expected_score
    }

    /// A present rank other than `rank`, preferring the ace and then the low
    /// end of the range. Meant for lines holding at most two ranks.
    pub fn another_rank(&self, rank: Rank) -> Option<Rank> {
        if self.is_empty() {
            return None;
        }
        let [low, high] = self.rank_range;
        if self.ranks[Rank::Ace.index()] > 0 {
            if !rank.is_ace() {
                return Some(Rank::Ace);
            }
            return if self.rank_count == 1 {
                None
            } else {
                Rank::from_index(low as usize)
            };
        }
        let idx = rank.index() as u8;
        if idx == low {
            if idx == high {
                None
            } else {
                Rank::from_index(high as usize)
            }
        } else {
            Rank::from_index(low as usize)
        }
    }

    fn ranks_form_straight_window(&self) -> bool {
        let [low, high] = self.rank_range;
        if self.ranks[Rank::Ace.index()] > 0 {
            (high as usize) < SIZE || low as usize >= BROADWAY_LOW
        } else {
            ((high - low) as usize) < SIZE
        }
    }

    pub fn has_straight_potential(&self) -> bool {
        if self.number_of_cards <= 1 {
            return true;
        }
        if self.number_of_cards != self.rank_count {
            return false;
        }
        self.ranks_form_straight_window()
    }

    pub fn has_straight_potential_with(&self, card: Card) -> bool {
        if self.is_empty() {
            return true;
        }
        let rank = card.rank.index();
        if self.ranks[rank] > 0 || self.is_full() || !self.has_straight_potential() {
            return false;
        }
        if self.rank_count == 1 {
            return self
                .any_card()
                .is_some_and(|other| rank_distance(card.rank, other.rank) < SIZE);
        }
        let [low, high] = self.rank_range;
        let (low, high) = (low as usize, high as usize);
        if card.rank.is_ace() {
            return high < SIZE || low >= BROADWAY_LOW;
        }
        if self.ranks[Rank::Ace.index()] > 0 {
            return (high < SIZE && rank < SIZE) || (low >= BROADWAY_LOW && rank >= BROADWAY_LOW);
        }
        high.max(rank) - low.min(rank) < SIZE
    }

    pub fn has_flush_potential(&self) -> bool {
        self.suit_count <= 1
    }

    pub fn has_flush_potential_with(&self, card: Card) -> bool {
        if self.is_empty() {
            return true;
        }
        !self.is_full()
            && self.suit_count <= 1
            && self.any_card().is_some_and(|other| other.suit == card.suit)
    }

    pub(crate) fn apply(&mut self, card: Card, pos: usize) {
        debug_assert!(self.positions[pos].is_none(), "line position occupied");
        let rank = card.rank.index();
        let suit = card.suit.index();
        self.number_of_cards += 1;
        if self.ranks[rank] == 0 {
            self.rank_count += 1;
            if !card.rank.is_ace() {
                self.rank_range[0] = self.rank_range[0].min(rank as u8);
                self.rank_range[1] = self.rank_range[1].max(rank as u8);
            }
        }
        if self.suits[suit] == 0 {
            self.suit_count += 1;
        }
        self.positions[pos] = Some(card);
        self.ranks[rank] += 1;
        self.suits[suit] += 1;
        if self.number_of_cards == 1 {
            self.any_card_position = Some(pos as u8);
        }
    }

    pub(crate) fn undo(&mut self, pos: usize) -> Option<Card> {
        let card = self.positions[pos].take()?;
        let rank = card.rank.index();
        let suit = card.suit.index();
        self.suits[suit] -= 1;
        self.ranks[rank] -= 1;
        if self.suits[suit] == 0 {
            self.suit_count -= 1;
        }
        if self.ranks[rank] == 0 {
            self.rank_count -= 1;
            if !card.rank.is_ace() {
                let [low, high] = self.rank_range;
                if low >= high {
                    self.rank_range = EMPTY_RANGE;
                } else if rank as u8 == low {
                    let mut next = low + 1;
                    while self.ranks[next as usize] == 0 {
                        next += 1;
                    }
                    self.rank_range[0] = next;
                } else if rank as u8 == high {
                    let mut next = high - 1;
                    while self.ranks[next as usize] == 0 {
                        next -= 1;
                    }
                    self.rank_range[1] = next;
                }
            }
        }
        self.number_of_cards -= 1;
        if self.number_of_cards == 0 {
            self.any_card_position = None;
        } else if self.any_card_position == Some(pos as u8) {
            self.any_card_position = self
                .positions
                .iter()
                .position(Option::is_some)
                .map(|p| p as u8);
        }
        Some(card)
    }

    /// Category of a full line, derived from the aggregates only.
    pub fn poker_hand(&self) -> Option<PokerHand> {
        if !self.is_full() {
            return None;
        }
        let any_rank = self.any_card()?.rank;
        let hand = match self.rank_count {
            4 => PokerHand::OnePair,
            3 => match self.count_rank(any_rank) {
                3 => PokerHand::ThreeOfAKind,
                2 => PokerHand::TwoPair,
                _ => match self.another_rank(any_rank).map(|r| self.count_rank(r)) {
                    Some(2) => PokerHand::TwoPair,
                    _ => PokerHand::ThreeOfAKind,
                },
            },
            2 => match self.count_rank(any_rank) {
                2 | 3 => PokerHand::FullHouse,
                _ => PokerHand::FourOfAKind,
            },
            _ => {
                let is_flush = self.suit_count == 1;
                let is_straight = self.ranks_form_straight_window();
                let broadway = self.ranks[Rank::Ace.index()] > 0
                    && self.rank_range[0] as usize >= BROADWAY_LOW;
                match (is_straight, is_flush) {
                    (true, true) if broadway => PokerHand::RoyalFlush,
                    (true, true) => PokerHand::StraightFlush,
                    (true, false) => PokerHand::Straight,
                    (false, true) => PokerHand::Flush,
                    (false, false) => PokerHand::HighCard,
                }
            }
        };
        Some(hand)
    }

    pub fn update_expected_score(
        &mut self,
        progress: f64,
        deck: &DeckTracker,
        points: &PointSystem,
    ) -> f64 {
        self.expected_score = self.compute_expected_score(progress, deck, points);
        self.expected_score
    }

    /// Expected-value delta of placing `card` at `pos`, measured against the
    /// cached expected score. Leaves the line untouched.
    pub fn score_card(
        &mut self,
        card: Card,
        pos: usize,
        progress: f64,
        deck: &DeckTracker,
        points: &PointSystem,
    ) -> Result<f64, BoardError> {
        if !self.is_empty_at(pos) {
            return Err(BoardError::LineOccupied {
                line: self.index,
                pos,
            });
        }
        let remaining = deck.without(card);
        self.apply(card, pos);
        let after = self.compute_expected_score(progress, &remaining, points);
        self.undo(pos);
        Ok(after - self.expected_score)
    }

    /// Piecewise heuristic value of the line as currently filled. Full lines
    /// score their realized hand; partial lines blend hand-tuned potentials
    /// with the remaining-card counts in `deck`.
    pub fn compute_expected_score(
        &self,
        progress: f64,
        deck: &DeckTracker,
        points: &PointSystem,
    ) -> f64 {
        let n = self.number_of_cards as usize;
        if let Some(hand) = self.poker_hand() {
            return points.score(hand) as f64;
        }
        match n {
            0 => return 1.45,
            1 => return 1.9,
            _ => {}
        }
        let Some(any) = self.any_card() else {
            return 0.0;
        };
        if self.rank_count == 1 {
            return match n {
                2 => 4.4,
                3 if deck.has_rank(any.rank) => 14.0,
                3 => 11.9,
                _ => 51.0,
            };
        }
        match n - self.rank_count as usize {
            1 => return if n == 3 { 4.35 } else { 2.99 },
            2 => {
                // four cards: two pair, or three of a kind plus a kicker
                if self.count_rank(any.rank) == 2 {
                    return 9.1;
                }
                let other = self.another_rank(any.rank).unwrap_or(any.rank);
                let (trips, kicker) = if self.count_rank(any.rank) == 1 {
                    (other, any.rank)
                } else {
                    (any.rank, other)
                };
                let base = if deck.has_rank(trips) { 13.9 } else { 11.9 };
                return base + deck.count_rank(kicker) as f64;
            }
            0 => {}
            _ => return 0.0,
        }

        let is_flush = self.suit_count == 1;
        let is_straight = self.ranks_form_straight_window();
        match n {
            2 if is_flush => return (1.0 - progress) * 4.0 + 4.5,
            2 if is_straight => return 2.5 - 0.3 * progress,
            2 => return 2.2,
            3 if is_flush => return (1.0 - progress) * 4.0 + 5.9,
            3 if is_straight => return 2.7 - 0.6 * progress,
            3 => return 2.1,
            _ => {}
        }

        // four distinct ranks
        if !is_straight {
            return if is_flush { 14.0 - 2.0 * progress } else { 1.1 };
        }
        if is_flush {
            return self.four_card_straight_flush_value(progress, deck, any.suit);
        }
        self.four_card_straight_value(deck)
    }

    fn four_card_straight_flush_value(&self, progress: f64, deck: &DeckTracker, suit: Suit) -> f64 {
        if (self.rank_range[0] as usize) < BROADWAY_LOW {
            return 14.9;
        }
        let has = |rank: Rank| deck.has_card(Card::new(rank, suit));
        if self.ranks[Rank::Ace.index()] > 0 {
            let missing = (BROADWAY_LOW..Rank::COUNT)
                .find(|&idx| self.ranks[idx] == 0)
                .and_then(Rank::from_index);
            return match missing {
                Some(rank) if has(rank) => 14.9 - 2.9 * progress,
                _ => 14.0 - 2.0 * progress,
            };
        }
        if has(Rank::Ace) {
            14.9 - 2.9 * progress
        } else if has(Rank::Nine) {
            14.8 - 2.8 * progress
        } else {
            14.0 - 2.0 * progress
        }
    }

    fn four_card_straight_value(&self, deck: &DeckTracker) -> f64 {
        let held = self.rank_mask();
        let outs: usize = Rank::ORDERED
            .iter()
            .filter(|rank| {
                self.ranks[rank.index()] == 0 && completes_straight(held | (1 << rank.index()))
            })
            .map(|rank| deck.count_rank(*rank))
            .sum();
        outs as f64 * 0.9 + 1.1
    }

    fn rank_mask(&self) -> u16 {
        self.ranks
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .fold(0, |mask, (idx, _)| mask | (1 << idx))
    }
}

/// True when the ranks in `mask` (bit per rank index) cover five in a row,
/// with the ace counting both low and high.
fn completes_straight(mask: u16) -> bool {
    let window = (1u16 << SIZE) - 1;
    let wide = mask | ((mask & 1) << Rank::COUNT);
    (0..=Rank::COUNT + 1 - SIZE).any(|start| (wide >> start) & window == window)
}

#[cfg(test)]
mod tests {
    use super::{RowCol, completes_straight, rank_distance};
    use crate::model::card::Card;
    use crate::model::deck_tracker::DeckTracker;
    use crate::model::hand::PokerHand;
    use crate::model::points::PointSystem;
    use crate::model::rank::Rank;

    fn card(text: &str) -> Card {
        text.parse().expect("card")
    }

    fn line(cards: &[&str]) -> RowCol {
        let mut rc = RowCol::new(0);
        for (pos, text) in cards.iter().enumerate() {
            rc.apply(card(text), pos);
        }
        rc
    }

    #[test]
    fn aggregates_follow_apply_and_undo() {
        let mut rc = RowCol::new(2);
        let empty = rc.clone();
        rc.apply(card("5C"), 0);
        rc.apply(card("5D"), 3);
        rc.apply(card("9C"), 1);
        assert_eq!(rc.number_of_cards(), 3);
        assert_eq!(rc.rank_count(), 2);
        assert_eq!(rc.suit_count(), 2);
        assert_eq!(rc.count_rank(Rank::Five), 2);
        assert_eq!(rc.first_empty_position(), Some(2));
        assert_eq!(rc.any_card(), Some(card("5C")));

        rc.undo(0);
        assert_eq!(rc.any_card(), Some(card("9C")));
        rc.undo(1);
        rc.undo(3);
        assert_eq!(rc, empty);
    }

    #[test]
    fn rank_range_rescans_on_extreme_removal() {
        let mut rc = line(&["3C", "7D", "AH", "5S"]);
        let snapshot = rc.clone();
        assert!(!rc.has_straight_potential());
        rc.undo(1);
        assert!(rc.has_straight_potential());
        rc.apply(card("7D"), 1);
        assert_eq!(rc, snapshot);
        rc.undo(3);
        assert_eq!(rc.another_rank(Rank::Ace), Some(Rank::Three));
        rc.apply(card("5S"), 3);
        assert_eq!(rc, snapshot);
    }

    #[test]
    fn straight_potential_handles_the_ace() {
        assert!(line(&["AC", "3D", "4H"]).has_straight_potential());
        assert!(line(&["AC", "QD", "TH"]).has_straight_potential());
        assert!(!line(&["AC", "7D"]).has_straight_potential());
        assert!(!line(&["5C", "5D"]).has_straight_potential());

        let wheel = line(&["AC", "2D", "4H"]);
        assert!(wheel.has_straight_potential_with(card("5S")));
        assert!(!wheel.has_straight_potential_with(card("6S")));

        let broadway = line(&["JC", "QD", "KH"]);
        assert!(broadway.has_straight_potential_with(card("AS")));
        assert!(broadway.has_straight_potential_with(card("9S")));
        assert!(!broadway.has_straight_potential_with(card("8S")));
    }

    fn straight_draw_value(cards: &[&str]) -> f64 {
        let rc = line(cards);
        let mut deck = DeckTracker::new();
        for text in cards {
            deck.deal(card(text)).expect("deal");
        }
        rc.compute_expected_score(0.5, &deck, &PointSystem::american())
    }

    #[test]
    fn straight_outs_respect_the_ace() {
        // one rank completes: four outs left in the deck
        let single = 4.0 * 0.9 + 1.1;
        let double = 8.0 * 0.9 + 1.1;
        assert!((straight_draw_value(&["AC", "2D", "3H", "5S"]) - single).abs() < 1e-9);
        assert!((straight_draw_value(&["TC", "JD", "QH", "AS"]) - single).abs() < 1e-9);
        assert!((straight_draw_value(&["TC", "JD", "QH", "KS"]) - double).abs() < 1e-9);
        assert!((straight_draw_value(&["5C", "6D", "7H", "8S"]) - double).abs() < 1e-9);
        assert!((straight_draw_value(&["5C", "6D", "7H", "9S"]) - single).abs() < 1e-9);
        assert!((straight_draw_value(&["AC", "2D", "3H", "4S"]) - single).abs() < 1e-9);
        assert!(completes_straight(0b1_1110_0000_0000 | 1));
        assert!(!completes_straight(0b1_1100_0000_0011));
    }

    #[test]
    fn rank_distance_wraps_the_ace() {
        assert_eq!(rank_distance(Rank::Ace, Rank::King), 1);
        assert_eq!(rank_distance(Rank::Three, Rank::Ace), 2);
        assert_eq!(rank_distance(Rank::Four, Rank::Nine), 5);
    }

    #[test]
    fn flush_potential_requires_single_suit() {
        let rc = line(&["2H", "9H"]);
        assert!(rc.has_flush_potential());
        assert!(rc.has_flush_potential_with(card("KH")));
        assert!(!rc.has_flush_potential_with(card("KS")));
        assert!(!line(&["2H", "9S"]).has_flush_potential());
    }

    #[test]
    fn aggregate_classification_matches_reference() {
        let cases = [
            ["2C", "2D", "9H", "JS", "KC"],
            ["2C", "9D", "9H", "2S", "KC"],
            ["2C", "KD", "KH", "KS", "3C"],
            ["AC", "2D", "3H", "4S", "5C"],
            ["TD", "JD", "QD", "KD", "AD"],
            ["AH", "2H", "3H", "4H", "5H"],
            ["2C", "2D", "2H", "9S", "9C"],
            ["9C", "9D", "9H", "9S", "AC"],
            ["3S", "8S", "QS", "4S", "6S"],
        ];
        for texts in cases {
            let rc = line(&texts);
            let hand = rc.full_hand().expect("full");
            assert_eq!(rc.poker_hand(), Some(PokerHand::classify(&hand)), "{texts:?}");
        }
    }

    #[test]
    fn score_card_is_side_effect_free() {
        let points = PointSystem::american();
        let deck = DeckTracker::new();
        let mut rc = line(&["4C", "5C", "7C"]);
        rc.update_expected_score(0.3, &deck, &points);
        let before = rc.clone();
        let delta = rc.score_card(card("6C"), 3, 0.3, &deck, &points).expect("free");
        assert!(delta > 0.0);
        assert_eq!(rc, before);
        assert!(rc.score_card(card("6C"), 0, 0.3, &deck, &points).is_err());
    }

    #[test]
    fn completing_quads_scores_the_realized_hand() {
        let points = PointSystem::american();
        let mut deck = DeckTracker::new();
        let mut rc = line(&["5C", "5D", "5H", "9S"]);
        for text in ["5C", "5D", "5H", "9S"] {
            deck.deal(card(text)).expect("deal");
        }
        rc.update_expected_score(0.5, &deck, &points);
        let delta = rc.score_card(card("5S"), 4, 0.5, &deck, &points).expect("free");
        assert!((rc.expected_score() + delta - 50.0).abs() < 1e-9);
    }
}
