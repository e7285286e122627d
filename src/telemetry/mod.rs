pub mod latency;
pub mod logging;
pub mod stats;
