use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::dom::DroppedFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upload request failed: {0}")]
    Request(String),
    #[error("failed to read upload response: {0}")]
    Body(String),
}

/// Sends one multipart POST carrying every file under the same field name.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn post_multipart(
        &self,
        path: &str,
        field: &str,
        files: &[DroppedFile],
    ) -> Result<RawResponse, TransportError>;
}

/// Posts to a server over HTTP. No timeout is configured: an unresponsive
/// server leaves the request pending.
#[derive(Debug, Clone)]
pub struct HttpUploadTransport {
    client: Client,
    base_url: String,
}

impl HttpUploadTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn post_multipart(
        &self,
        path: &str,
        field: &str,
        files: &[DroppedFile],
    ) -> Result<RawResponse, TransportError> {
        let form = files.iter().fold(Form::new(), |form, file| {
            let part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
            form.part(field.to_string(), part)
        });

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, files = files.len(), "posting multipart upload");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}
