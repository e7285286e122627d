pub mod config;
pub mod decision;
pub mod error;
pub mod filters;
pub mod intake;
pub mod ledger;
pub mod models;
pub mod store;
pub mod telemetry;
