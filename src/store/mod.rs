pub mod config_store;
pub mod refresher;

pub use config_store::ConfigStore;
pub use refresher::ConfigRefresher;
