//! HTTP handlers for the generation relay.

pub mod generate;
pub mod health;
