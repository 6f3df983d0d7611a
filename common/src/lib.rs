//! Spot-rate Common Types
//!
//! Shared types used across the spot-rate workspace: interned currency codes,
//! currency pairs, rate-type tags and time helpers.

pub mod currency;
pub mod time;

pub use currency::*;
pub use time::*;
