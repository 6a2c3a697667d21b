use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response, Url};

use crate::error::{RecoveryError, RecoveryResult};

/// A thin wrapper on an HTTP client. Sets the timeout and user-agent, and
/// optionally applies retry middleware for transient failures.
pub struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    /// Initializes a new `Request` instance.
    pub(crate) fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3, // total attempts = 4
        }
    }

    /// Creates a GET request builder with defaults applied.
    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .request(Method::GET, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("recoverykit-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Sends the request exactly once.
    pub(crate) async fn send(&self, request_builder: RequestBuilder) -> RecoveryResult<Response> {
        execute_request_builder(request_builder)
            .await
            .map_err(Into::into)
    }

    /// Sends the request, retrying transient failures (429, 5xx, connect errors
    /// and timeouts) with exponential backoff.
    pub(crate) async fn send_with_retry(
        &self,
        request_builder: RequestBuilder,
    ) -> RecoveryResult<Response> {
        let Some(template) = request_builder.try_clone() else {
            return self.send(request_builder).await;
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                RequestHandleError::permanent(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                )
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(RequestHandleError::is_retryable)
        .notify(|err, delay| {
            log::warn!("retrying {} in {delay:?}: {}", err.url, err.error);
        })
        .await
        .map_err(Into::into)
    }
}

/// Checks that `base_url` is an absolute HTTPS URL. Plain HTTP is only
/// accepted for loopback hosts.
pub(crate) fn validate_base_url(base_url: &str) -> RecoveryResult<Url> {
    let url = Url::parse(base_url)
        .map_err(|e| RecoveryError::invalid_input("node_url", e.to_string()))?;
    let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    match url.scheme() {
        "https" => Ok(url),
        "http" if loopback => Ok(url),
        scheme => Err(RecoveryError::invalid_input(
            "node_url",
            format!("unsupported scheme `{scheme}`, the node must be reached over https"),
        )),
    }
}

#[derive(Debug)]
struct RequestHandleError {
    url: String,
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl RequestHandleError {
    const fn retryable(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: true,
        }
    }

    const fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<RequestHandleError> for RecoveryError {
    fn from(value: RequestHandleError) -> Self {
        Self::Network {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

async fn execute_request_builder(
    request_builder: RequestBuilder,
) -> Result<Response, RequestHandleError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        RequestHandleError::permanent(
            err.url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(RequestHandleError::retryable(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) => {
            if err.is_timeout() || err.is_connect() {
                return Err(RequestHandleError::retryable(
                    url,
                    None,
                    format!("request timeout/connect error: {err}"),
                ));
            }

            Err(RequestHandleError::permanent(
                url,
                None,
                format!("request failed: {err}"),
            ))
        }
    }
}
