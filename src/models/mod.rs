pub mod decision;
pub mod gate;
pub mod ledger;
pub mod params;
pub mod signal;
