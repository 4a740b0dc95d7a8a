use crate::model::hand::PokerHand;
use serde::{Deserialize, Serialize};

/// Score table mapping each hand category to points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointSystem {
    pub high_card: i32,
    pub one_pair: i32,
    pub two_pair: i32,
    pub three_of_a_kind: i32,
    pub straight: i32,
    pub flush: i32,
    pub full_house: i32,
    pub four_of_a_kind: i32,
    pub straight_flush: i32,
    pub royal_flush: i32,
}

impl PointSystem {
    pub const fn american() -> Self {
        Self {
            high_card: 0,
            one_pair: 2,
            two_pair: 5,
            three_of_a_kind: 10,
            straight: 15,
            flush: 20,
            full_house: 25,
            four_of_a_kind: 50,
            straight_flush: 75,
            royal_flush: 100,
        }
    }

    pub const fn british() -> Self {
        Self {
            high_card: 0,
            one_pair: 1,
            two_pair: 3,
            three_of_a_kind: 6,
            straight: 12,
            flush: 5,
            full_house: 10,
            four_of_a_kind: 16,
            straight_flush: 30,
            royal_flush: 30,
        }
    }

    pub const fn score(&self, hand: PokerHand) -> i32 {
        match hand {
            PokerHand::HighCard => self.high_card,
            PokerHand::OnePair => self.one_pair,
            PokerHand::TwoPair => self.two_pair,
            PokerHand::ThreeOfAKind => self.three_of_a_kind,
            PokerHand::Straight => self.straight,
            PokerHand::Flush => self.flush,
            PokerHand::FullHouse => self.full_house,
            PokerHand::FourOfAKind => self.four_of_a_kind,
            PokerHand::StraightFlush => self.straight_flush,
            PokerHand::RoyalFlush => self.royal_flush,
        }
    }

    pub fn max_hand_score(&self) -> i32 {
        PokerHand::ALL
            .iter()
            .map(|hand| self.score(*hand))
            .max()
            .unwrap_or(0)
    }
}

impl Default for PointSystem {
    fn default() -> Self {
        Self::american()
    }
}
