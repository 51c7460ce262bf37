//! HTTP handlers

pub mod analytics;
pub mod health;
pub mod ledger;
pub mod permissions;
pub mod products;
pub mod workflow;

pub use analytics::*;
pub use health::*;
pub use ledger::*;
pub use permissions::*;
pub use products::*;
pub use workflow::*;
