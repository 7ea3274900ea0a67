//! `reqwest` implementations of the collaborator traits.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{redirect, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{MirrorError, Result};
use crate::feed::{normalize_image_url, parse_feed, Article};
use crate::services::{BodyFetcher, FeedFetcher, FetchedBody, Translator};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        }
    }
}

pub fn build_client(config: &HttpConfig) -> Result<Client> {
    Ok(Client::builder()
        .redirect(redirect::Policy::limited(5))
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .build()?)
}

/// Sends the request built by `make`, retrying transport errors and 5xx
/// answers with a linearly growing pause.
async fn send_with_retry(
    policy: RetryPolicy,
    make: impl Fn() -> RequestBuilder,
) -> Result<Response> {
    let mut attempt: u8 = 0;
    loop {
        let outcome = make().send().await;
        let retryable = match &outcome {
            Ok(response) => response.status().is_server_error(),
            Err(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        };
        if !retryable || attempt >= policy.max_retries {
            return Ok(outcome?);
        }
        attempt += 1;
        match &outcome {
            Ok(response) => debug!(status = %response.status(), attempt, "retrying request"),
            Err(e) => debug!(error = %e, attempt, "retrying request"),
        }
        tokio::time::sleep(policy.backoff * u32::from(attempt)).await;
    }
}

pub struct HttpFeedFetcher {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpFeedFetcher {
    pub fn new(client: Client, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            url: url.into(),
            retry,
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_latest(&self) -> Result<Vec<Article>> {
        let response = send_with_retry(self.retry, || self.client.get(&self.url))
            .await?
            .error_for_status()?;
        let body: Bytes = response.bytes().await?;
        let articles = parse_feed(body)?;
        debug!(url = %self.url, count = articles.len(), "feed fetched");
        Ok(articles)
    }
}

/// Downloads an article page. The page is returned as is; the image comes from
/// its `og:image` meta tag when there is one.
pub struct HttpBodyFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpBodyFetcher {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl BodyFetcher for HttpBodyFetcher {
    async fn fetch_body(&self, url: &str) -> Result<FetchedBody> {
        let response = send_with_retry(self.retry, || self.client.get(url))
            .await?
            .error_for_status()?;
        let page_url = response.url().clone();
        let body = response.text().await?;
        let image_url = og_image(&body).and_then(|raw| normalize_image_url(raw, Some(&page_url)));
        Ok(FetchedBody { body, image_url })
    }
}

fn og_image(html: &str) -> Option<&str> {
    let at = html.find("property=\"og:image\"")?;
    let tag_start = html[..at].rfind('<')?;
    let tag_end = at + html[at..].find('>')?;
    let tag = &html[tag_start..tag_end];
    let content = tag.find("content=\"")? + "content=\"".len();
    let len = tag[content..].find('"')?;
    Some(&tag[content..content + len])
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for a LibreTranslate-compatible `/translate` endpoint.
pub struct HttpTranslator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpTranslator {
    pub fn new(
        client: Client,
        endpoint: &str,
        api_key: Option<String>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| MirrorError::Parse(format!("invalid translator endpoint: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            retry,
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        if text.is_empty() {
            return Ok(String::new());
        }
        let request = TranslateRequest {
            q: text,
            source: "auto",
            target: target_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        let response = send_with_retry(self.retry, || {
            self.client.post(self.endpoint.clone()).json(&request)
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, %target_lang, "translator rejected request");
            return Err(match status {
                StatusCode::BAD_REQUEST => {
                    MirrorError::Parse(format!("translator rejected input: {detail}"))
                }
                _ => MirrorError::TranslationService(format!("{status}: {detail}")),
            });
        }
        let parsed: TranslateResponse = response.json().await?;
        Ok(parsed.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_og_image_content() {
        let html = r#"<html><head><meta property="og:image" content="//cdn.e/x.jpg"/></head></html>"#;
        assert_eq!(og_image(html), Some("//cdn.e/x.jpg"));
        assert_eq!(og_image("<p>no image</p>"), None);
    }
}
