//! Shared HTTP client for the ruleset, market data and FX services.

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use collateral_common::AppError;
use collateral_common::config::AppConfig;

use crate::retry::RetryPolicy;

pub struct HttpGateway {
    client: Client,
    ruleset_base: Url,
    fx_base: Url,
    retry: RetryPolicy,
}

impl HttpGateway {
    pub fn new(
        ruleset_base: &str,
        fx_base: &str,
        timeout: std::time::Duration,
        retry: RetryPolicy,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            ruleset_base: parse_base(ruleset_base)?,
            fx_base: parse_base(fx_base)?,
            retry,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            &config.ruleset_api_url,
            &config.fx_api_url,
            config.http_timeout(),
            RetryPolicy::new(
                config.http_max_retries,
                std::time::Duration::from_millis(config.http_retry_base_ms),
            ),
        )
    }

    pub(crate) fn ruleset_url(&self, segments: &[&str]) -> Result<Url, AppError> {
        join(&self.ruleset_base, segments)
    }

    pub(crate) fn fx_url(&self, segments: &[&str]) -> Result<Url, AppError> {
        join(&self.fx_base, segments)
    }

    /// GET `url` and decode the JSON body, retrying transient failures.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: Url,
    ) -> Result<T, AppError> {
        self.retry
            .run(operation, || self.get_once(url.clone()))
            .await
    }

    async fn get_once<T: DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify(&url, e))?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await.map_err(|e| classify(&url, e))?;
            serde_json::from_slice(&body)
                .map_err(|e| AppError::Malformed(format!("{}: {e}", url.path())))
        } else if status == StatusCode::NOT_FOUND {
            Err(AppError::NotFound(format!("{} not found", url.path())))
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(AppError::Unavailable(format!("{} returned {status}", url.path())))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(AppError::Malformed(format!(
                "{} returned {status}: {message}",
                url.path()
            )))
        }
    }
}

fn parse_base(base: &str) -> Result<Url, AppError> {
    let url = Url::parse(base).map_err(|e| AppError::Config(format!("invalid URL {base}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(AppError::Config(format!("{base} cannot be a base URL")));
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`.
fn join(base: &Url, segments: &[&str]) -> Result<Url, AppError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AppError::Config(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn classify(url: &Url, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(format!("{}: {e}", url.path()))
    } else if e.is_connect() {
        AppError::Unavailable(format!("{}: {e}", url.path()))
    } else {
        AppError::Http(e)
    }
}
