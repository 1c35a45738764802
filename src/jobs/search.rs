//! Minimal Elasticsearch-compatible index client.

use crate::core::error::TaskError;
use reqwest::{StatusCode, Url};
use serde::Serialize;

#[derive(Clone)]
pub struct SearchIndex {
    http: reqwest::Client,
    base_url: Url,
}

impl SearchIndex {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, TaskError> {
        let base_url = Url::parse(base_url).map_err(|err| {
            TaskError::new(format!("invalid search url '{}': {}", base_url, err))
                .with_code("SEARCH-001")
        })?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TaskError> {
        self.base_url.join(path).map_err(|err| {
            TaskError::new(format!("invalid search path {}: {}", path, err)).with_code("SEARCH-001")
        })
    }

    /// Cluster banner; fails when the cluster is unreachable.
    pub async fn ping(&self) -> Result<serde_json::Value, TaskError> {
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Drop an index. A missing index is not an error; returns whether one existed.
    pub async fn delete_index(&self, index: &str) -> Result<bool, TaskError> {
        let response = self.http.delete(self.endpoint(index)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(index, "index did not exist");
            return Ok(false);
        }
        response.error_for_status()?;
        tracing::info!(index, "index deleted");
        Ok(true)
    }

    pub async fn index_document<T: Serialize + ?Sized>(
        &self,
        index: &str,
        document: &T,
    ) -> Result<(), TaskError> {
        self.http
            .post(self.endpoint(&format!("{}/_doc", index))?)
            .json(document)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
