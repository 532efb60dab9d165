//! Server state management.

use std::sync::Arc;

use quill_core::{QuillConfig, QuillResult, Site};

use crate::error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub site: Site,
    pub config: Arc<QuillConfig>,
}

impl AppState {
    /// Open the site described by `config`.
    pub fn open(config: QuillConfig) -> QuillResult<Self> {
        let site = Site::open(&config)?;
        Ok(Self::new(site, config))
    }

    pub fn new(site: Site, config: QuillConfig) -> Self {
        Self {
            site,
            config: Arc::new(config),
        }
    }

    /// Whether `token` matches the configured API key.
    pub fn accepts_token(&self, token: &str) -> bool {
        matches!(self.config.api_key.as_deref(), Some(key) if key == token)
    }

    /// Run a blocking database operation off the async runtime.
    pub async fn run<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Site) -> QuillResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let site = self.site.clone();
        tokio::task::spawn_blocking(move || f(&site))
            .await
            .map_err(|e| ApiError::internal(format!("Database task failed: {}", e)))?
            .map_err(ApiError::from)
    }
}
