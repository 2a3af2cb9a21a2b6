//! Static game data for the Monopoly arena.
//!
//! Everything in this crate is immutable: the 40-space board, color
//! groups, rent tables, tax amounts, house costs, and the two card
//! decks. Mutable per-run state (owners, mortgages, buildings, deck
//! order) lives in the engine.
mod cards;
mod spaces;

pub use cards::*;
pub use spaces::*;
