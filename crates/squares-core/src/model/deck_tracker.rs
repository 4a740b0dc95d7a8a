use crate::model::card::Card;
use crate::model::rank::Rank;
use crate::model::suit::Suit;
use core::fmt;
use rand::Rng;
use rand::seq::SliceRandom;

const FULL_DECK: u64 = (1u64 << Card::COUNT) - 1;
const SUIT_MASK: u64 = (1u64 << Rank::COUNT) - 1;

const fn rank_mask(rank: usize) -> u64 {
    let mut mask = 0u64;
    let mut suit = 0;
    while suit < Suit::COUNT {
        mask |= 1u64 << (suit * Rank::COUNT + rank);
        suit += 1;
    }
    mask
}

const RANK_MASKS: [u64; Rank::COUNT] = {
    let mut masks = [0u64; Rank::COUNT];
    let mut rank = 0;
    while rank < Rank::COUNT {
        masks[rank] = rank_mask(rank);
        rank += 1;
    }
    masks
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckError {
    AlreadyDealt(Card),
    NotDealt(Card),
}

impl fmt::Display for DeckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckError::AlreadyDealt(card) => write!(f, "card {card} has already been dealt"),
            DeckError::NotDealt(card) => write!(f, "card {card} has not been dealt"),
        }
    }
}

impl std::error::Error for DeckError {}

/// Undealt-card bookkeeping as a 52-bit presence set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckTracker {
    present: u64,
    len: u8,
}

impl DeckTracker {
    pub const fn new() -> Self {
        Self {
            present: FULL_DECK,
            len: Card::COUNT as u8,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn copy_from(&mut self, other: &DeckTracker) {
        *self = *other;
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn has_card(&self, card: Card) -> bool {
        self.present & (1u64 << card.id()) != 0
    }

    pub const fn has_rank(&self, rank: Rank) -> bool {
        self.present & RANK_MASKS[rank.index()] != 0
    }

    pub const fn count_rank(&self, rank: Rank) -> usize {
        (self.present & RANK_MASKS[rank.index()]).count_ones() as usize
    }

    pub const fn count_suit(&self, suit: Suit) -> usize {
        ((self.present >> (suit.index() * Rank::COUNT)) & SUIT_MASK).count_ones() as usize
    }

    /// Copy of the tracker with `card` removed, whether or not it was present.
    pub const fn without(mut self, card: Card) -> Self {
        if self.has_card(card) {
            self.present &= !(1u64 << card.id());
            self.len -= 1;
        }
        self
    }

    pub fn deal(&mut self, card: Card) -> Result<(), DeckError> {
        if !self.has_card(card) {
            return Err(DeckError::AlreadyDealt(card));
        }
        self.present &= !(1u64 << card.id());
        self.len -= 1;
        Ok(())
    }

    pub fn put_back(&mut self, card: Card) -> Result<(), DeckError> {
        if self.has_card(card) {
            return Err(DeckError::NotDealt(card));
        }
        self.present |= 1u64 << card.id();
        self.len += 1;
        Ok(())
    }

    /// Present cards in id order.
    pub fn cards(&self) -> Vec<Card> {
        let mut cards = Vec::with_capacity(self.len());
        let mut bits = self.present;
        while bits != 0 {
            let id = bits.trailing_zeros() as usize;
            if let Some(card) = Card::from_id(id) {
                cards.push(card);
            }
            bits &= bits - 1;
        }
        cards
    }

    /// Uniformly random ordering of every present card.
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Card> {
        let mut cards = self.cards();
        cards.shuffle(rng);
        cards
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Card> {
        if self.is_empty() {
            return None;
        }
        let mut skip = rng.gen_range(0..self.len());
        let mut bits = self.present;
        while bits != 0 {
            let id = bits.trailing_zeros() as usize;
            if skip == 0 {
                return Card::from_id(id);
            }
            skip -= 1;
            bits &= bits - 1;
        }
        None
    }
}

impl Default for DeckTracker {
    fn default() -> Self {
        Self::new()
    }
}
