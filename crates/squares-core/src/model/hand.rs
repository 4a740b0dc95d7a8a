use crate::model::card::Card;
use crate::model::rank::Rank;
use core::fmt;
use serde::{Deserialize, Serialize};

pub const HAND_SIZE: usize = 5;

/// Poker hand categories in ascending order of strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PokerHand {
    HighCard = 0,
    OnePair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
    RoyalFlush = 9,
}

impl PokerHand {
    pub const COUNT: usize = 10;

    pub const ALL: [PokerHand; 10] = [
        PokerHand::HighCard,
        PokerHand::OnePair,
        PokerHand::TwoPair,
        PokerHand::ThreeOfAKind,
        PokerHand::Straight,
        PokerHand::Flush,
        PokerHand::FullHouse,
        PokerHand::FourOfAKind,
        PokerHand::StraightFlush,
        PokerHand::RoyalFlush,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            PokerHand::HighCard => "high card",
            PokerHand::OnePair => "one pair",
            PokerHand::TwoPair => "two pair",
            PokerHand::ThreeOfAKind => "three of a kind",
            PokerHand::Straight => "straight",
            PokerHand::Flush => "flush",
            PokerHand::FullHouse => "full house",
            PokerHand::FourOfAKind => "four of a kind",
            PokerHand::StraightFlush => "straight flush",
            PokerHand::RoyalFlush => "royal flush",
        }
    }

    /// Classifies a complete five-card line.
    pub fn classify(cards: &[Card; HAND_SIZE]) -> PokerHand {
        let mut rank_counts = [0u8; Rank::COUNT];
        for card in cards {
            rank_counts[card.rank.index()] += 1;
        }

        let is_flush = cards.iter().all(|card| card.suit == cards[0].suit);

        let mut groups: Vec<u8> = rank_counts.iter().copied().filter(|&n| n > 0).collect();
        groups.sort_unstable_by(|a, b| b.cmp(a));

        match groups.as_slice() {
            [4, 1] => return PokerHand::FourOfAKind,
            [3, 2] => return PokerHand::FullHouse,
            [3, 1, 1] => return PokerHand::ThreeOfAKind,
            [2, 2, 1] => return PokerHand::TwoPair,
            [2, 1, 1, 1] => return PokerHand::OnePair,
            _ => {}
        }

        let is_broadway = rank_counts[Rank::Ace.index()] == 1
            && (Rank::Ten.index()..=Rank::King.index()).all(|idx| rank_counts[idx] == 1);
        let is_straight = is_broadway || {
            let low = rank_counts.iter().position(|&n| n > 0).unwrap_or(0);
            (low..low + HAND_SIZE).all(|idx| idx < Rank::COUNT && rank_counts[idx] == 1)
        };

        match (is_straight, is_flush) {
            (true, true) if is_broadway => PokerHand::RoyalFlush,
            (true, true) => PokerHand::StraightFlush,
            (false, true) => PokerHand::Flush,
            (true, false) => PokerHand::Straight,
            (false, false) => PokerHand::HighCard,
        }
    }
}

impl fmt::Display for PokerHand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::PokerHand;
    use crate::model::card::Card;

    fn hand(text: &str) -> [Card; 5] {
        let cards: Vec<Card> = text
            .split_whitespace()
            .map(|raw| raw.parse().expect("card"))
            .collect();
        cards.try_into().expect("five cards")
    }

    #[test]
    fn classifies_every_category() {
        let cases = [
            ("2C 5D 9H JS KC", PokerHand::HighCard),
            ("2C 2D 9H JS KC", PokerHand::OnePair),
            ("2C 2D 9H 9S KC", PokerHand::TwoPair),
            ("2C 2D 2H 9S KC", PokerHand::ThreeOfAKind),
            ("5C 6D 7H 8S 9C", PokerHand::Straight),
            ("2H 5H 9H JH KH", PokerHand::Flush),
            ("2C 2D 2H 9S 9C", PokerHand::FullHouse),
            ("2C 2D 2H 2S 9C", PokerHand::FourOfAKind),
            ("5S 6S 7S 8S 9S", PokerHand::StraightFlush),
            ("TD JD QD KD AD", PokerHand::RoyalFlush),
        ];
        for (text, expected) in cases {
            assert_eq!(PokerHand::classify(&hand(text)), expected, "{text}");
        }
    }

    #[test]
    fn ace_plays_low_and_high_in_straights() {
        assert_eq!(PokerHand::classify(&hand("AC 2D 3H 4S 5C")), PokerHand::Straight);
        assert_eq!(PokerHand::classify(&hand("TC JD QH KS AC")), PokerHand::Straight);
        assert_eq!(PokerHand::classify(&hand("AH 2H 3H 4H 5H")), PokerHand::StraightFlush);
        assert_eq!(PokerHand::classify(&hand("JC QD KH AS 2C")), PokerHand::HighCard);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&PokerHand::ThreeOfAKind).expect("serialize");
        assert_eq!(json, "\"three_of_a_kind\"");
    }
}
