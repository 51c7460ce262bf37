//! Organizational directory references

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structure as seen through the organizational directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRef {
    pub id: Uuid,
    pub ministere_id: Uuid,
    pub name: String,
    pub abbreviation: Option<String>,
    pub ministere_abbreviation: Option<String>,
}
