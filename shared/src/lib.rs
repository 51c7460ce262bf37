//! Shared types and domain rules for the ministry stock ledger
//!
//! This crate holds everything that does not touch storage or the network:
//! roles and permission scopes, the approval stage chains, stock health math
//! and input validation. The backend builds its services on top of it.

pub mod chain;
pub mod models;
pub mod permissions;
pub mod stock;
pub mod types;
pub mod validation;

pub use chain::*;
pub use models::*;
pub use permissions::*;
pub use stock::*;
pub use types::*;
pub use validation::*;
