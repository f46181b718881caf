//! The turn state machine for sqlsentry.
//!
//! One turn drives THINK → ACT → OBSERVE → RESPOND → GUARD → DONE over a
//! conversation. The guard evaluates the exact text about to be emitted;
//! nothing reaches the caller except through it.

pub mod runner;

pub use runner::{Phase, SAFETY_FALLBACK, TurnRunner, TurnState};
