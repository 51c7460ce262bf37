//! Domain models for the ministry stock ledger

mod organization;
mod product;
mod role;
mod statistics;
mod user;
mod workflow;

pub use organization::*;
pub use product::*;
pub use role::*;
pub use statistics::*;
pub use user::*;
pub use workflow::*;
