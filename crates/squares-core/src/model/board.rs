use crate::model::card::Card;
use crate::model::deck_tracker::DeckTracker;
use crate::model::hand::PokerHand;
use crate::model::points::PointSystem;
use crate::model::rank::Rank;
use crate::model::row_col::RowCol;
use core::fmt;
use serde::{Deserialize, Serialize};

pub const SIZE: usize = 5;
pub const NUMBER_OF_CELLS: usize = SIZE * SIZE;
pub const NUMBER_OF_LINES: usize = SIZE * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Row-major identifier in `0..25`.
    pub const fn id(self) -> usize {
        self.row * SIZE + self.col
    }

    pub const fn from_id(id: usize) -> Option<Self> {
        if id >= NUMBER_OF_CELLS {
            return None;
        }
        Some(Self::new(id / SIZE, id % SIZE))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play {
    pub row: usize,
    pub col: usize,
    pub card: Card,
}

impl Play {
    pub const fn cell(&self) -> Cell {
        Cell::new(self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    CellOccupied { row: usize, col: usize },
    LineOccupied { line: usize, pos: usize },
    OutOfBounds { row: usize, col: usize },
    NothingToRetract,
    NotFull { cards: usize },
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::CellOccupied { row, col } => {
                write!(f, "cell ({row}, {col}) is already occupied")
            }
            BoardError::LineOccupied { line, pos } => {
                write!(f, "position {pos} of line {line} is already occupied")
            }
            BoardError::OutOfBounds { row, col } => {
                write!(f, "cell ({row}, {col}) is outside the grid")
            }
            BoardError::NothingToRetract => write!(f, "no play to retract"),
            BoardError::NotFull { cards } => {
                write!(f, "board holds {cards} of {NUMBER_OF_CELLS} cards")
            }
        }
    }
}

impl std::error::Error for BoardError {}

/// The 5x5 grid as five row aggregates, five column aggregates and the stack
/// of plays that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    rows: [RowCol; SIZE],
    cols: [RowCol; SIZE],
    plays: Vec<Play>,
}

impl Board {
    pub fn new() -> Self {
        Self {
            rows: core::array::from_fn(RowCol::new),
            cols: core::array::from_fn(RowCol::new),
            plays: Vec::with_capacity(NUMBER_OF_CELLS),
        }
    }

    pub fn clear(&mut self) {
        for line in self.rows.iter_mut().chain(self.cols.iter_mut()) {
            line.clear();
        }
        self.plays.clear();
    }

    pub fn copy_from(&mut self, other: &Board) {
        self.clone_from(other);
    }

    pub fn put_card(&mut self, card: Card, row: usize, col: usize) -> Result<(), BoardError> {
        if row >= SIZE || col >= SIZE {
            return Err(BoardError::OutOfBounds { row, col });
        }
        if !self.rows[row].is_empty_at(col) {
            return Err(BoardError::CellOccupied { row, col });
        }
        self.rows[row].apply(card, col);
        self.cols[col].apply(card, row);
        self.plays.push(Play { row, col, card });
        Ok(())
    }

    pub fn retract_last_play(&mut self) -> Result<Play, BoardError> {
        let play = self.plays.pop().ok_or(BoardError::NothingToRetract)?;
        self.rows[play.row].undo(play.col);
        self.cols[play.col].undo(play.row);
        Ok(play)
    }

    pub fn row(&self, index: usize) -> &RowCol {
        &self.rows[index]
    }

    pub fn col(&self, index: usize) -> &RowCol {
        &self.cols[index]
    }

    pub fn rows(&self) -> &[RowCol; SIZE] {
        &self.rows
    }

    pub fn cols(&self) -> &[RowCol; SIZE] {
        &self.cols
    }

    pub fn card(&self, row: usize, col: usize) -> Option<Card> {
        self.rows[row].card(col)
    }

    pub fn is_cell_empty(&self, row: usize, col: usize) -> bool {
        self.rows[row].is_empty_at(col)
    }

    pub fn plays(&self) -> &[Play] {
        &self.plays
    }

    pub fn last_play(&self) -> Option<&Play> {
        self.plays.last()
    }

    pub fn number_of_cards(&self) -> usize {
        self.plays.len()
    }

    pub fn number_of_empty_cells(&self) -> usize {
        NUMBER_OF_CELLS - self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.plays.len() == NUMBER_OF_CELLS
    }

    /// Fraction of the grid already filled.
    pub fn progress(&self) -> f64 {
        self.plays.len() as f64 / NUMBER_OF_CELLS as f64
    }

    pub fn find_first_empty_cell(&self) -> Option<Cell> {
        self.rows.iter().find_map(|row| {
            row.first_empty_position()
                .map(|col| Cell::new(row.index(), col))
        })
    }

    pub fn empty_cells(&self) -> Vec<Cell> {
        let mut cells = Vec::with_capacity(self.number_of_empty_cells());
        for row in &self.rows {
            for col in 0..SIZE {
                if row.is_empty_at(col) {
                    cells.push(Cell::new(row.index(), col));
                }
            }
        }
        cells
    }

    pub fn find_rows<'a, P>(&'a self, pred: P) -> impl Iterator<Item = &'a RowCol> + 'a
    where
        P: Fn(&RowCol) -> bool + 'a,
    {
        self.rows.iter().filter(move |row| pred(row))
    }

    pub fn find_cols<'a, P>(&'a self, pred: P) -> impl Iterator<Item = &'a RowCol> + 'a
    where
        P: Fn(&RowCol) -> bool + 'a,
    {
        self.cols.iter().filter(move |col| pred(col))
    }

    pub fn find_first_row<P>(&self, pred: P) -> Option<&RowCol>
    where
        P: Fn(&RowCol) -> bool,
    {
        self.rows.iter().find(|row| pred(row))
    }

    pub fn find_first_empty_row(&self) -> Option<&RowCol> {
        self.find_first_row(RowCol::is_empty)
    }

    pub fn all_rows_match<P>(&self, pred: P) -> bool
    where
        P: Fn(&RowCol) -> bool,
    {
        self.rows.iter().all(pred)
    }

    pub fn has_rank(&self, rank: Rank) -> bool {
        self.rows.iter().any(|row| row.has_rank(rank))
    }

    pub fn count_rank(&self, rank: Rank) -> usize {
        self.rows.iter().map(|row| row.count_rank(rank)).sum()
    }

    /// Realized hands of the five rows followed by the five columns.
    pub fn line_hands(&self) -> Option<[PokerHand; NUMBER_OF_LINES]> {
        let mut hands = [PokerHand::HighCard; NUMBER_OF_LINES];
        for (slot, line) in hands
            .iter_mut()
            .zip(self.rows.iter().chain(self.cols.iter()))
        {
            *slot = line.poker_hand()?;
        }
        Some(hands)
    }

    pub fn poker_hand_score(&self, points: &PointSystem) -> Result<i32, BoardError> {
        let hands = self.line_hands().ok_or(BoardError::NotFull {
            cards: self.number_of_cards(),
        })?;
        Ok(hands.iter().map(|hand| points.score(*hand)).sum())
    }

    /// Refreshes every line's cached expected score and returns their sum.
    pub fn update_expected_score(&mut self, deck: &DeckTracker, points: &PointSystem) -> f64 {
        let progress = self.progress();
        self.rows
            .iter_mut()
            .chain(self.cols.iter_mut())
            .map(|line| line.update_expected_score(progress, deck, points))
            .sum()
    }

    /// Change in expected score of the crossing row and column if `card` went
    /// to `(row, col)`.
    pub fn score_cell(
        &mut self,
        card: Card,
        row: usize,
        col: usize,
        deck: &DeckTracker,
        points: &PointSystem,
    ) -> Result<f64, BoardError> {
        if row >= SIZE || col >= SIZE {
            return Err(BoardError::OutOfBounds { row, col });
        }
        if !self.is_cell_empty(row, col) {
            return Err(BoardError::CellOccupied { row, col });
        }
        let progress = self.progress();
        let row_delta = self.rows[row].score_card(card, col, progress, deck, points)?;
        let col_delta = self.cols[col].score_card(card, row, progress, deck, points)?;
        Ok(row_delta + col_delta)
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let cells: Vec<String> = (0..SIZE)
                .map(|col| match row.card(col) {
                    Some(card) => card.to_string(),
                    None => "--".to_string(),
                })
                .collect();
            writeln!(f, "{}", cells.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Board, BoardError, Cell, SIZE};
    use crate::model::card::Card;
    use crate::model::deck_tracker::DeckTracker;
    use crate::model::hand::PokerHand;
    use crate::model::points::PointSystem;

    fn card(text: &str) -> Card {
        text.parse().expect("card")
    }

    fn full_board() -> Board {
        let mut board = Board::new();
        for (idx, card) in Card::all().take(25).enumerate() {
            board.put_card(card, idx / SIZE, idx % SIZE).expect("put");
        }
        board
    }

    #[test]
    fn rows_and_columns_stay_in_sync() {
        let mut board = Board::new();
        board.put_card(card("QH"), 1, 3).expect("put");
        board.put_card(card("2C"), 4, 0).expect("put");
        assert_eq!(board.row(1).card(3), Some(card("QH")));
        assert_eq!(board.col(3).card(1), Some(card("QH")));
        assert_eq!(board.col(0).card(4), Some(card("2C")));
        assert_eq!(board.number_of_cards(), 2);
        assert_eq!(board.number_of_empty_cells(), 23);
        assert_eq!(board.find_first_empty_cell(), Some(Cell::new(0, 0)));
    }

    #[test]
    fn occupied_cell_is_rejected() {
        let mut board = Board::new();
        board.put_card(card("QH"), 1, 3).expect("put");
        assert_eq!(
            board.put_card(card("2C"), 1, 3),
            Err(BoardError::CellOccupied { row: 1, col: 3 })
        );
        assert_eq!(
            board.put_card(card("2C"), 5, 0),
            Err(BoardError::OutOfBounds { row: 5, col: 0 })
        );
        assert_eq!(board.number_of_cards(), 1);
    }

    #[test]
    fn retract_restores_previous_state() {
        let mut board = Board::new();
        board.put_card(card("9S"), 2, 2).expect("put");
        let snapshot = board.clone();
        board.put_card(card("TS"), 2, 3).expect("put");
        board.put_card(card("9D"), 0, 2).expect("put");
        assert_eq!(board.retract_last_play().map(|p| p.card), Ok(card("9D")));
        assert_eq!(board.retract_last_play().map(|p| p.card), Ok(card("TS")));
        assert_eq!(board, snapshot);
        board.retract_last_play().expect("retract");
        assert_eq!(board, Board::new());
        assert_eq!(board.retract_last_play(), Err(BoardError::NothingToRetract));
    }

    #[test]
    fn partial_board_cannot_be_scored() {
        let mut board = full_board();
        board.retract_last_play().expect("retract");
        assert_eq!(
            board.poker_hand_score(&PointSystem::american()),
            Err(BoardError::NotFull { cards: 24 })
        );
        assert!(board.line_hands().is_none());
    }

    #[test]
    fn full_board_score_sums_line_hands() {
        // rows: A-5 clubs, 6-T clubs, J-K clubs + A-2 diamonds, 3-7 diamonds, 8-Q diamonds
        let board = full_board();
        let points = PointSystem::american();
        let hands = board.line_hands().expect("full");
        assert_eq!(hands[0], PokerHand::StraightFlush);
        assert_eq!(hands[1], PokerHand::StraightFlush);
        let expected: i32 = hands.iter().map(|hand| points.score(*hand)).sum();
        assert_eq!(board.poker_hand_score(&points), Ok(expected));
    }

    #[test]
    fn score_cell_leaves_board_unchanged() {
        let mut board = Board::new();
        let mut deck = DeckTracker::new();
        let points = PointSystem::american();
        for (text, row, col) in [("7H", 0, 0), ("7S", 0, 1), ("2H", 1, 0)] {
            let c = card(text);
            deck.deal(c).expect("deal");
            board.put_card(c, row, col).expect("put");
        }
        board.update_expected_score(&deck, &points);
        let snapshot = board.clone();
        let deck_snapshot = deck;
        let pair = board.score_cell(card("7D"), 0, 2, &deck, &points).expect("score");
        let miss = board.score_cell(card("7D"), 3, 4, &deck, &points).expect("score");
        assert!(pair > miss);
        assert_eq!(board, snapshot);
        assert_eq!(deck, deck_snapshot);
        assert!(board.score_cell(card("7D"), 0, 0, &deck, &points).is_err());
    }

    #[test]
    fn cell_ids_are_row_major() {
        assert_eq!(Cell::new(2, 3).id(), 13);
        assert_eq!(Cell::from_id(24), Some(Cell::new(4, 4)));
        assert_eq!(Cell::from_id(25), None);
    }
}
