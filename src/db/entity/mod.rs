//! SeaORM entities for the match ledger tables.

pub mod dart_throws;
pub mod leg_players;
pub mod legs;
pub mod match_players;
pub mod matches;
pub mod players;
pub mod turns;
pub mod webhook_calls;
