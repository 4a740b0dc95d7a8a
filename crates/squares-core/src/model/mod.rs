pub mod board;
pub mod card;
pub mod deck_tracker;
pub mod hand;
pub mod points;
pub mod rank;
pub mod row_col;
pub mod suit;
