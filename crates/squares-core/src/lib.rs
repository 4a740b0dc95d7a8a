#![deny(warnings)]

//! Card, line and board model for Poker Squares.

pub mod model;
