use super::EngineError;
use super::candidate::{CellCandidate, accumulate_probabilities};
use super::params::EngineParams;
use squares_core::model::board::{Board, Cell, SIZE};
use squares_core::model::card::Card;
use squares_core::model::deck_tracker::DeckTracker;
use squares_core::model::points::PointSystem;
use squares_core::model::rank::Rank;
use squares_core::model::row_col::RowCol;

/// Outcome of asking the rules where a card should go.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The card has been dealt and placed at this cell.
    Resolved(Cell),
    /// Ranked shortlist, best first; nothing has been placed.
    Undecided(Vec<CellCandidate>),
}

/// Rule-based shortlister. Holds no game state between calls.
#[derive(Debug, Clone)]
pub struct Strategy {
    params: EngineParams,
    scratch: Vec<Cell>,
}

impl Strategy {
    pub fn new(params: EngineParams) -> Self {
        Self {
            params,
            scratch: Vec::with_capacity(SIZE * SIZE),
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn play(
        &mut self,
        card: Card,
        board: &mut Board,
        deck: &mut DeckTracker,
        points: &PointSystem,
    ) -> Result<Decision, EngineError> {
        if board.is_empty() {
            return commit(card, Cell::new(0, card.suit.index()), board, deck);
        }
        if board.number_of_empty_cells() == 1 {
            let cell = board.find_first_empty_cell().ok_or(EngineError::NoCandidates)?;
            return commit(card, cell, board, deck);
        }
        if board.row(SIZE - 1).is_empty() {
            let cell = opening_cell(card, board).ok_or(EngineError::NoCandidates)?;
            return commit(card, cell, board, deck);
        }
        if let Some(cell) = lone_rank_row_cell(card, board) {
            return commit(card, cell, board, deck);
        }

        self.scratch.clear();
        if unique_rank_layout(card, board) {
            collect_layout_cells(card, board, &mut self.scratch);
        }
        if self.scratch.is_empty() {
            collect_enumerated_cells(board, &mut self.scratch);
        }
        match self.scratch.as_slice() {
            [] => return Err(EngineError::NoCandidates),
            [cell] => return commit(card, *cell, board, deck),
            _ => {}
        }

        let cells = std::mem::take(&mut self.scratch);
        let scored = self.score_candidates(card, board, deck, points, &cells);
        self.scratch = cells;
        let mut candidates = scored?;

        candidates.sort_by(|a, b| b.quality.total_cmp(&a.quality));
        let best = candidates[0].quality;
        candidates.retain(|c| best - c.quality <= self.params.max_quality_difference);
        candidates.truncate(self.params.candidates_limit.max(1));
        if candidates.len() == 1 {
            return commit(card, candidates[0].cell(), board, deck);
        }

        self.rescale(&mut candidates);
        accumulate_probabilities(&mut candidates);
        Ok(Decision::Undecided(candidates))
    }

    /// Raw expected-score deltas for placing `card` in each of `cells`, in
    /// the given order.
    pub fn score_candidates(
        &self,
        card: Card,
        board: &mut Board,
        deck: &DeckTracker,
        points: &PointSystem,
        cells: &[Cell],
    ) -> Result<Vec<CellCandidate>, EngineError> {
        board.update_expected_score(deck, points);
        cells
            .iter()
            .map(|cell| {
                let quality = board.score_cell(card, cell.row, cell.col, deck, points)?;
                Ok(CellCandidate::new(*cell, quality))
            })
            .collect()
    }

    fn rescale(&self, candidates: &mut [CellCandidate]) {
        let low = self.params.quality_low;
        let high = self.params.quality_high;
        let max = candidates.iter().map(|c| c.quality).fold(f64::MIN, f64::max);
        let min = candidates.iter().map(|c| c.quality).fold(f64::MAX, f64::min);
        let spread = max - min;
        for candidate in candidates.iter_mut() {
            let scaled = if spread < 1e-9 {
                (low + high) / 2.0
            } else {
                low + (candidate.quality - min) / spread * (high - low)
            };
            candidate.quality = scaled / high;
        }
    }
}

fn commit(
    card: Card,
    cell: Cell,
    board: &mut Board,
    deck: &mut DeckTracker,
) -> Result<Decision, EngineError> {
    board.put_card(card, cell.row, cell.col)?;
    if let Err(err) = deck.deal(card) {
        board.retract_last_play()?;
        return Err(err.into());
    }
    Ok(Decision::Resolved(cell))
}

/// Placement while the bottom row is still untouched: stack ranks on the row
/// that already holds them, otherwise open a new row with the suit's column.
fn opening_cell(card: Card, board: &Board) -> Option<Cell> {
    let suit_col = card.suit.index();
    if let Some(row) = board.find_first_row(|row| row.has_rank(card.rank) && !row.is_full()) {
        if row.is_empty_at(suit_col) {
            return Some(Cell::new(row.index(), suit_col));
        }
        return row
            .first_empty_position()
            .map(|col| Cell::new(row.index(), col));
    }
    let row = board.find_first_empty_row()?;
    let column = board.col(suit_col);
    if column.number_of_cards() < 3
        || !column.has_straight_potential()
        || column.has_straight_potential_with(card)
    {
        Some(Cell::new(row.index(), suit_col))
    } else {
        Some(Cell::new(row.index(), SIZE - 1))
    }
}

/// The only row holding the rank, crossed with the single fullest column
/// that can still make a flush with the card.
fn lone_rank_row_cell(card: Card, board: &Board) -> Option<Cell> {
    let mut rows = board.find_rows(|row| row.has_rank(card.rank));
    let row = rows.next()?;
    if rows.next().is_some() || row.is_full() {
        return None;
    }
    let flush_cols: Vec<&RowCol> = board
        .find_cols(|col| !col.is_full() && col.has_flush_potential_with(card))
        .collect();
    let most = flush_cols.iter().map(|col| col.number_of_cards()).max()?;
    let mut leaders = flush_cols.iter().filter(|col| col.number_of_cards() == most);
    let col = leaders.next()?;
    if leaders.next().is_some() || !row.is_empty_at(col.index()) {
        return None;
    }
    Some(Cell::new(row.index(), col.index()))
}

/// True when the rank is new to the board, every row holds at most two
/// ranks, and no rank is spread over more than one row.
fn unique_rank_layout(card: Card, board: &Board) -> bool {
    if board.has_rank(card.rank) || !board.all_rows_match(|row| row.rank_count() <= 2) {
        return false;
    }
    board.all_rows_match(|row| {
        Rank::ORDERED
            .iter()
            .filter(|rank| row.has_rank(**rank))
            .all(|rank| board.count_rank(*rank) == row.count_rank(*rank))
    })
}

fn push_unique(cells: &mut Vec<Cell>, cell: Cell) {
    if !cells.contains(&cell) {
        cells.push(cell);
    }
}

fn collect_layout_cells(card: Card, board: &Board, cells: &mut Vec<Cell>) {
    let mut potential_cols: Vec<&RowCol> = board
        .find_cols(|col| {
            !col.is_full()
                && (col.has_flush_potential_with(card)
                    || (col.number_of_cards() >= 2 && col.has_straight_potential_with(card)))
        })
        .collect();

    // Single-rank rows, fewest cards first. Each column takes the first tier
    // with an empty cell in it and is then settled.
    let mut rows: Vec<&RowCol> = board.find_rows(|row| row.rank_count() == 1).collect();
    rows.sort_by_key(|row| row.number_of_cards());
    potential_cols.retain(|col| {
        let mut tier = None;
        for row in &rows {
            let count = row.number_of_cards();
            if tier.is_some_and(|settled| count > settled) {
                break;
            }
            if col.is_empty_at(row.index()) {
                push_unique(cells, Cell::new(row.index(), col.index()));
                tier = Some(count);
            }
        }
        tier.is_none()
    });

    for col in &potential_cols {
        for row in 0..SIZE {
            if col.is_empty_at(row) {
                push_unique(cells, Cell::new(row, col.index()));
            }
        }
    }

    for row in board.find_rows(|row| {
        !row.is_full()
            && (row.has_flush_potential_with(card)
                || (row.number_of_cards() >= 2 && row.has_straight_potential_with(card)))
    }) {
        for col in 0..SIZE {
            if row.is_empty_at(col) {
                push_unique(cells, Cell::new(row.index(), col));
            }
        }
    }
}

/// Every empty cell, except that only the first wholly empty column is
/// considered since the others are interchangeable with it.
fn collect_enumerated_cells(board: &Board, cells: &mut Vec<Cell>) {
    let first_empty_col = board.cols().iter().position(RowCol::is_empty);
    for cell in board.empty_cells() {
        let col_empty = board.col(cell.col).is_empty();
        if col_empty && Some(cell.col) != first_empty_col {
            continue;
        }
        cells.push(cell);
    }
}
