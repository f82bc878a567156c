//! Page retrieval through a headless Chromium.
//!
//! The webcam page fills in its weather list from script after the initial
//! document arrives, so the plain HTTP body may not contain the sea
//! temperature at all. [`RenderingFetcher`] loads the page in a real browser
//! engine, waits for the list item carrying the label to exist, and returns
//! the rendered `document.body.innerHTML`.
//!
//! A browser is launched for each fetch and closed afterwards. Polls are
//! minutes apart, so nothing is kept running between them.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::extract::SEA_TEMPERATURE_LABEL;
use crate::fetch::{FetchOptions, Fetcher, default_user_agent};

/// How often the page is checked for the sea temperature item.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Fetcher that renders the page in headless Chromium.
#[derive(Debug, Clone)]
pub struct RenderingFetcher {
    url: String,
    timeout: Duration,
    user_agent: String,
    browser_path: Option<PathBuf>,
}

impl RenderingFetcher {
    /// Build a fetcher from options.
    ///
    /// The timeout bounds each browser request and, separately, the whole
    /// page load including the wait for the temperature item.
    pub fn new(options: &FetchOptions) -> Self {
        Self {
            url: options.url.clone(),
            timeout: options.timeout,
            user_agent: options
                .user_agent
                .clone()
                .unwrap_or_else(default_user_agent),
            browser_path: None,
        }
    }

    /// Use a specific Chrome or Chromium executable instead of searching the
    /// usual install locations.
    pub fn with_browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_path = Some(path.into());
        self
    }

    fn browser_config(&self) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.timeout)
            .arg(format!("--user-agent={}", self.user_agent));
        if let Some(path) = &self.browser_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(FetchError::Render)
    }

    async fn render(&self) -> Result<String, FetchError> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(render_error)?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = match tokio::time::timeout(self.timeout, self.load(&browser)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Render(format!(
                "{} did not render within {:?}",
                self.url, self.timeout
            ))),
        };

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = browser.wait().await {
            debug!("Browser did not exit cleanly: {}", e);
        }
        events.abort();

        result
    }

    async fn load(&self, browser: &Browser) -> Result<String, FetchError> {
        debug!("Rendering {}", self.url);

        let page = browser
            .new_page(self.url.as_str())
            .await
            .map_err(render_error)?;
        page.wait_for_navigation().await.map_err(render_error)?;

        wait_for_temperature_item(&page).await?;

        let html: String = page
            .evaluate_expression("document.body ? document.body.innerHTML : ''")
            .await
            .map_err(render_error)?
            .into_value()
            .map_err(render_error)?;
        debug!("Rendered {} bytes from {}", html.len(), self.url);

        Ok(html)
    }
}

#[async_trait]
impl Fetcher for RenderingFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        self.render().await
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Script that reports whether a list item holding the label exists yet.
fn temperature_item_script() -> String {
    let label = serde_json::Value::String(SEA_TEMPERATURE_LABEL.to_string());
    format!(
        "Array.from(document.querySelectorAll('li')).some(li => li.textContent.includes({}))",
        label
    )
}

/// Poll until the sea temperature item is in the DOM.
///
/// The caller's timeout bounds the wait.
async fn wait_for_temperature_item(page: &Page) -> Result<(), FetchError> {
    let script = temperature_item_script();
    loop {
        let ready: bool = page
            .evaluate_expression(script.as_str())
            .await
            .map_err(render_error)?
            .into_value()
            .map_err(render_error)?;
        if ready {
            return Ok(());
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

fn render_error(e: impl std::fmt::Display) -> FetchError {
    FetchError::Render(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_fetch_options() {
        let options = FetchOptions {
            url: "http://127.0.0.1:9/".to_string(),
            timeout: Duration::from_secs(5),
            user_agent: Some("CustomBot/1.0".to_string()),
        };
        let fetcher = RenderingFetcher::new(&options);
        assert_eq!(fetcher.url(), "http://127.0.0.1:9/");
        assert_eq!(fetcher.timeout, Duration::from_secs(5));
        assert_eq!(fetcher.user_agent, "CustomBot/1.0");
        assert!(fetcher.browser_path.is_none());
    }

    #[test]
    fn test_default_user_agent_applied() {
        let fetcher = RenderingFetcher::new(&FetchOptions::default());
        assert!(fetcher.user_agent.starts_with("matoswim/"));
    }

    #[test]
    fn test_temperature_item_script_quotes_label() {
        let script = temperature_item_script();
        assert!(script.contains("querySelectorAll('li')"));
        assert!(script.contains("includes(\"Temp. do mar\")"));
    }

    #[tokio::test]
    async fn test_missing_browser_is_render_error() {
        let options = FetchOptions {
            url: "http://127.0.0.1:9/".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: None,
        };
        let fetcher =
            RenderingFetcher::new(&options).with_browser_path("/nonexistent/chromium-browser");
        let result = fetcher.fetch().await;
        assert!(matches!(result, Err(FetchError::Render(_))));
    }
}
