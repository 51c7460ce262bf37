//! External service integrations

pub mod document_store;

pub use document_store::{DocumentStore, DocumentUpload, HttpDocumentStore, InMemoryDocumentStore};
