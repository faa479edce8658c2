//! Builtin operations that download a URL into the sandbox.
//!
//! `fetch_data` stores the raw response body. `scrape_website` stores the
//! page markup, or a readable text rendering when configured with
//! `format = "text"`.

use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use tracing::{debug, info};

use super::write_output;
use crate::operations::{Operation, OperationContext};

/// Maximum response body size (5 MB).
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024;

/// HTTP read timeout in seconds.
const READ_TIMEOUT_SECS: u64 = 30;

/// HTTP connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Text wrapping width for html2text conversion.
const TEXT_WIDTH: usize = 100;

const USER_AGENT: &str = concat!("taskgate/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with the limits every download goes through.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

/// A downloaded response body with its declared content type.
pub struct Fetched {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }

    /// GETs `url` (http/https only) and returns the body, failing on non-2xx
    /// statuses and bodies over the size limit.
    pub async fn get(&self, url: &str) -> anyhow::Result<Fetched> {
        let parsed = url::Url::parse(url).map_err(|e| anyhow!("invalid URL {url}: {e}"))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => bail!("unsupported scheme '{scheme}' (only http/https)"),
        }

        debug!("Fetching URL: {url}");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status} from {url}");
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_RESPONSE_SIZE {
                bail!("response too large ({len} bytes, limit is {MAX_RESPONSE_SIZE} bytes)");
            }
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        let body = response.bytes().await?;
        if body.len() > MAX_RESPONSE_SIZE {
            bail!(
                "response too large ({} bytes, limit is {MAX_RESPONSE_SIZE} bytes)",
                body.len()
            );
        }

        Ok(Fetched {
            content_type,
            body: body.to_vec(),
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if the content type looks like HTML.
fn is_html(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

/// Readable text for an HTML body; other bodies are decoded as-is.
fn render_text(content_type: &str, body: &[u8]) -> String {
    if is_html(content_type) {
        html2text::from_read(body, TEXT_WIDTH)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())
    } else {
        String::from_utf8_lossy(body).into_owned()
    }
}

// ── fetch_data ───────────────────────────────────────────

pub struct FetchDataOperation {
    fetcher: HttpFetcher,
    url: String,
    output: String,
}

impl FetchDataOperation {
    pub fn new(fetcher: HttpFetcher, url: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            output: output.into(),
        }
    }
}

#[async_trait]
impl Operation for FetchDataOperation {
    fn name(&self) -> &str {
        "fetch_data"
    }

    fn keyword(&self) -> &str {
        "fetch data"
    }

    fn description(&self) -> &str {
        "Download data from the configured API and save the response body."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate(&self.output)?;

        let fetched = self.fetcher.get(&self.url).await?;
        write_output(&self.output, &fetched.body).await?;

        info!("Fetched {} bytes from {} into {}", fetched.body.len(), self.url, self.output);
        Ok("Data fetched and saved.".to_string())
    }
}

// ── scrape_website ───────────────────────────────────────

/// What `scrape_website` writes to disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrapeFormat {
    Html,
    Text,
}

impl ScrapeFormat {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "html" => Ok(ScrapeFormat::Html),
            "text" => Ok(ScrapeFormat::Text),
            other => bail!("unsupported scrape format '{other}' (expected 'html' or 'text')"),
        }
    }
}

pub struct ScrapeWebsiteOperation {
    fetcher: HttpFetcher,
    url: String,
    output: String,
    format: ScrapeFormat,
}

impl ScrapeWebsiteOperation {
    pub fn new(
        fetcher: HttpFetcher,
        url: impl Into<String>,
        output: impl Into<String>,
        format: ScrapeFormat,
    ) -> Self {
        Self {
            fetcher,
            url: url.into(),
            output: output.into(),
            format,
        }
    }
}

#[async_trait]
impl Operation for ScrapeWebsiteOperation {
    fn name(&self) -> &str {
        "scrape_website"
    }

    fn keyword(&self) -> &str {
        "scrape website"
    }

    fn description(&self) -> &str {
        "Download a web page and save its content."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate(&self.output)?;

        let fetched = self.fetcher.get(&self.url).await?;
        match self.format {
            ScrapeFormat::Html => write_output(&self.output, &fetched.body).await?,
            ScrapeFormat::Text => {
                let text = render_text(&fetched.content_type, &fetched.body);
                write_output(&self.output, text.trim().as_bytes()).await?
            }
        }

        info!("Scraped {} into {}", self.url, self.output);
        Ok("Website content scraped successfully.".to_string())
    }
}
