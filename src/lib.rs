pub mod config;
pub mod db;
pub mod ledger;

pub use config::EngineConfig;
