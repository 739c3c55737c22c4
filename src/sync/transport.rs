//! Upload transport - posts batches to the backend REST API

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Delivers one batch of wire-shaped records.
///
/// `Ok` means the whole batch was accepted; any error fails the whole batch.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, endpoint: &str, device_id: &str, batch: Vec<Value>) -> Result<()>;
}

/// Transport for the Django backend
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

/// The bulk endpoints resolve the device per element, so the id rides along on each one
pub fn attach_device_id(batch: Vec<Value>, device_id: &str) -> Vec<Value> {
    batch
        .into_iter()
        .map(|mut item| {
            if let Value::Object(ref mut map) = item {
                map.insert("device_id".to_string(), Value::from(device_id));
            }
            item
        })
        .collect()
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn upload(&self, endpoint: &str, device_id: &str, batch: Vec<Value>) -> Result<()> {
        let url = self.url_for(endpoint);
        let count = batch.len();
        let body = attach_device_id(batch, device_id);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(url = %url, count, status = status.as_u16(), "Batch accepted");
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(Error::Upload {
                status: status.as_u16(),
                body,
            })
        }
    }
}
