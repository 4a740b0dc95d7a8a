use crate::model::rank::Rank;
use crate::model::suit::Suit;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const COUNT: usize = Rank::COUNT * Suit::COUNT;

    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Suit-major identifier: `suit * 13 + rank`.
    pub const fn id(self) -> usize {
        self.suit.index() * Rank::COUNT + self.rank.index()
    }

    pub const fn from_id(id: usize) -> Option<Self> {
        if id >= Self::COUNT {
            return None;
        }
        match (
            Rank::from_index(id % Rank::COUNT),
            Suit::from_index(id / Rank::COUNT),
        ) {
            (Some(rank), Some(suit)) => Some(Self::new(rank, suit)),
            _ => None,
        }
    }

    /// All 52 cards in id order.
    pub fn all() -> impl Iterator<Item = Card> {
        Suit::ALL.into_iter().flat_map(|suit| {
            Rank::ORDERED
                .into_iter()
                .map(move |rank| Card::new(rank, suit))
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCardError(pub String);

impl fmt::Display for ParseCardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid card '{}'", self.0)
    }
}

impl std::error::Error for ParseCardError {}

impl FromStr for Card {
    type Err = ParseCardError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text = raw.trim();
        let err = || ParseCardError(raw.to_string());
        let (rank_part, suit_part) = match text.char_indices().last() {
            Some((idx, _)) if idx > 0 => text.split_at(idx),
            _ => return Err(err()),
        };
        let rank = if rank_part == "10" {
            Rank::Ten
        } else {
            let mut chars = rank_part.chars();
            match (chars.next(), chars.next()) {
                (Some(symbol), None) => Rank::from_symbol(symbol).ok_or_else(err)?,
                _ => return Err(err()),
            }
        };
        let suit = suit_part
            .chars()
            .next()
            .and_then(Suit::from_symbol)
            .ok_or_else(err)?;
        Ok(Card::new(rank, suit))
    }
}

#[cfg(test)]
mod tests {
    use super::{Card, Rank, Suit};
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_invertible() {
        let ids: HashSet<usize> = Card::all().map(Card::id).collect();
        assert_eq!(ids.len(), 52);
        for card in Card::all() {
            assert_eq!(Card::from_id(card.id()), Some(card));
        }
        assert_eq!(Card::from_id(52), None);
    }

    #[test]
    fn ace_of_spades_has_rank_zero_suit_three() {
        let card: Card = "AS".parse().expect("parse");
        assert_eq!(card, Card::new(Rank::Ace, Suit::Spades));
        assert_eq!(card.rank.index(), 0);
        assert_eq!(card.suit.index(), 3);
        assert_eq!(card.id(), 39);
    }

    #[test]
    fn parses_ten_alias_and_lowercase() {
        assert_eq!("10h".parse::<Card>(), Ok(Card::new(Rank::Ten, Suit::Hearts)));
        assert_eq!("td".parse::<Card>(), Ok(Card::new(Rank::Ten, Suit::Diamonds)));
        assert!("1H".parse::<Card>().is_err());
        assert!("A".parse::<Card>().is_err());
        assert!("AX".parse::<Card>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for card in Card::all() {
            assert_eq!(card.to_string().parse::<Card>(), Ok(card));
        }
    }
}
