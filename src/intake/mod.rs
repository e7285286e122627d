pub mod processor;
pub mod server;

pub use processor::{IntakeStage, ProcessError, ProcessOutcome, SignalProcessor};
pub use server::{build_router, serve, AppState, IntakeResponse};
