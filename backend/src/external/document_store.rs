//! Document store client
//!
//! Supporting documents (delivery notes, invoices, signed receipts) live in
//! an external store. Only the reference it hands back is persisted here.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::DocumentStoreConfig;
use crate::error::{AppError, AppResult};

/// File to hand over to the document store
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub request_id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store the file and return its opaque reference
    async fn store(&self, upload: &DocumentUpload) -> AppResult<String>;
}

/// HTTP document store client
#[derive(Clone)]
pub struct HttpDocumentStore {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct StoreDocumentRequest<'a> {
    owner_id: Uuid,
    document_type: &'a str,
    file_name: &'a str,
    content_base64: String,
}

#[derive(Debug, Deserialize)]
struct StoreDocumentResponse {
    reference: String,
}

impl HttpDocumentStore {
    pub fn new(config: &DocumentStoreConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Document store client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn store(&self, upload: &DocumentUpload) -> AppResult<String> {
        let url = format!("{}/documents", self.base_url);
        let body = StoreDocumentRequest {
            owner_id: upload.request_id,
            document_type: &upload.document_type,
            file_name: &upload.file_name,
            content_base64: STANDARD.encode(&upload.content),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Document store request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Document store error: {} - {}",
                status, body
            )));
        }

        let data: StoreDocumentResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse document store response: {}", e))
        })?;

        Ok(data.reference)
    }
}

/// Document store keeping files in memory
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn content(&self, reference: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(reference).cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn store(&self, upload: &DocumentUpload) -> AppResult<String> {
        let reference = format!("mem://{}/{}", upload.request_id, Uuid::new_v4());
        self.files
            .lock()
            .await
            .insert(reference.clone(), upload.content.clone());
        Ok(reference)
    }
}
