//! Retrieval of the beach webcam page.
//!
//! The [`Fetcher`] trait is the seam between the poll scheduler and the
//! network. A fetch is one navigation: issue the request, wait until the
//! content has loaded, then hand back the materialized text.
//!
//! [`HttpFetcher`] returns the document as the server sent it. With the
//! `render` feature, `RenderingFetcher` loads the page in headless Chromium
//! so script-populated content is present too.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;

/// The live webcam page for Praia de Matosinhos.
pub const SOURCE_URL: &str = "https://beachcam.meo.pt/livecams/praia-de-matosinhos/";

/// Default request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A source of page text.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve the fully loaded page text.
    async fn fetch(&self) -> Result<String, FetchError>;

    /// The URL this fetcher navigates to.
    fn url(&self) -> &str;
}

/// Options shared by the page fetchers.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Page URL.
    pub url: String,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Custom User-Agent, if any.
    pub user_agent: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            url: SOURCE_URL.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: None,
        }
    }
}

/// Default User-Agent sent with page requests.
pub(crate) fn default_user_agent() -> String {
    format!("matoswim/{}", env!("CARGO_PKG_VERSION"))
}

/// Fetcher backed by a [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    /// Build a fetcher from options.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be constructed.
    pub fn new(options: &FetchOptions) -> Result<Self, FetchError> {
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(default_user_agent);

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            url: options.url.clone(),
        })
    }

    /// Build a fetcher with a caller-supplied client.
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        debug!("Navigating to {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| FetchError::Navigation {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        // The body future resolves once the whole document has arrived.
        let text = response.text().await.map_err(FetchError::Body)?;
        debug!("Loaded {} bytes from {}", text.len(), self.url);

        Ok(text)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
