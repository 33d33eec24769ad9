//! Attachment store collaborator contract
//!
//! Receipts and invoice documents are stored in an external document-storage
//! service. This module defines the upload contract and an HTTP multipart
//! gateway for it, following the same configured-or-disabled shape as the
//! ledger gateway.

use async_trait::async_trait;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::ledger::routing::DestinationRoute;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_id: String,
    pub public_link: String,
}

/// Upload contract consumed by the receipt handler.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Uploads `bytes` into the destination folder carried by `route`.
    /// An unrouted destination uploads without a parent folder.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        route: &DestinationRoute,
        mime_type: &str,
        file_name: &str,
    ) -> AppResult<UploadedFile>;

    fn is_available(&self) -> bool;
}

/// HTTP multipart gateway to the document-storage service.
pub struct DriveGateway {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl DriveGateway {
    /// Builds the gateway from DRIVE_API_URL; disabled when unset.
    pub fn from_env() -> Self {
        let base_url = config::DRIVE_API_URL.clone();
        match base_url.as_deref() {
            Some(url) => log::info!("Attachment gateway configured: {}", url),
            None => log::warn!("Attachment gateway disabled (DRIVE_API_URL unset)"),
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl AttachmentStore for DriveGateway {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        route: &DestinationRoute,
        mime_type: &str,
        file_name: &str,
    ) -> AppResult<UploadedFile> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| AppError::Upload("attachment gateway is not configured".to_string()))?;

        if !route.is_routed() {
            log::warn!(
                "No destination folder for category '{}'; uploading '{}' without a parent",
                route.category,
                file_name
            );
        }

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| AppError::Upload(format!("invalid mime type {}: {}", mime_type, e)))?;

        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(folder_id) = route.folder_id.as_deref() {
            form = form.text("folder_id", folder_id.to_string());
        }

        let url = format!("{}/files", base);
        let response = self.client.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Upload(format!(
                "upload to {} failed: HTTP {}",
                url,
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let file_id = body
            .get("file_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let public_link = body
            .get("public_link")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        log::info!("Uploaded '{}' as {} ({})", file_name, file_id, route.category);
        Ok(UploadedFile { file_id, public_link })
    }

    fn is_available(&self) -> bool {
        self.base_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_gateway_errors_without_network() {
        let gateway = DriveGateway::with_base_url(None);
        assert!(!gateway.is_available());

        let route = DestinationRoute {
            folder_id: Some("f-1".to_string()),
            category: "purchasing".to_string(),
        };
        let result = gateway.upload(vec![1, 2, 3], &route, "image/jpeg", "receipt.jpg").await;
        assert!(matches!(result, Err(AppError::Upload(_))));
    }
}
