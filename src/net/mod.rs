// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Rate-limited HTTP client.
//!
//! ```text
//! RateLimitedClient::new(api, policy, token, cancel)
//!        |
//!   perform(url, headers)
//!        |
//!        v
//!   GET --> quota check (may back off, may unwind on cancel)
//!       --> status check (HttpStatus keeps the body)
//!       --> Response
//!
//!   get_json::<T>(url) --> Page<T> { items, next }   (Link: rel="next")
//! ```
//!
//! Nothing here retries. Connection, timeout and redirect failures surface
//! as [`NetworkError`] and end the run.

pub mod rate_limit;


use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, LINK};
use reqwest::{Client, Response, Url, redirect};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::cancel::Cancellation;
use crate::config::ApiConfig;
use crate::error::{GbakResult, InvalidResponseError, NetworkError};

pub use rate_limit::RateLimitPolicy;

/// Media type for REST API calls.
pub const API_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Longest slice of an unparsable body quoted in errors.
const BODY_SNIPPET_LEN: usize = 512;

/// One page of a paginated listing.
#[derive(Debug)]
pub struct Page<T> {
    pub items: T,
    pub next: Option<Url>,
}

/// Authenticated GET client that backs off before exhausting the quota.
#[derive(Debug, Clone)]
pub struct RateLimitedClient {
    client: Client,
    token: Option<String>,
    policy: RateLimitPolicy,
    cancel: Cancellation,
}

impl RateLimitedClient {
    /// Build a client. User-Agent is `gbak/VERSION`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Connection` if the HTTP stack cannot be
    /// initialized.
    pub fn new(
        api: &ApiConfig,
        policy: RateLimitPolicy,
        token: Option<String>,
        cancel: Cancellation,
    ) -> GbakResult<Self> {
        let client = Client::builder()
            .user_agent(format!("gbak/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(api.connect_timeout())
            .redirect(redirect::Policy::limited(api.max_redirects))
            .build()
            .map_err(|e| NetworkError::Connection {
                url: api.base_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            token: token.filter(|t| !t.is_empty()),
            policy,
            cancel,
        })
    }

    /// Whether requests carry an `Authorization` header.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Issue a GET and return the successful response, body unread.
    ///
    /// The quota headers are inspected before the status so that a failing
    /// response still triggers the backoff.
    ///
    /// # Errors
    ///
    /// - `NetworkError::{Connection, Timeout, TooManyRedirects}` if the
    ///   request never produced a response.
    /// - `NetworkError::HttpStatus` for a non-success status.
    /// - `GbakError::Cancelled` if cancellation interrupts a backoff.
    pub async fn perform(&self, url: &Url, headers: HeaderMap) -> GbakResult<Response> {
        let mut request = self.client.get(url.clone()).headers(headers);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!(%url, "GET");
        let response = request
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(url.as_str(), &e))?;

        self.policy.check(response.headers(), &self.cancel).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(NetworkError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            }
            .into());
        }

        trace!(%url, status = status.as_u16(), "response ok");
        Ok(response)
    }

    /// GET a JSON API resource and decode it as `T`.
    ///
    /// # Errors
    ///
    /// Everything [`perform`](Self::perform) returns, plus
    /// `InvalidResponseError` when the body does not match `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> GbakResult<Page<T>> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(API_MEDIA_TYPE));

        let response = self.perform(url, headers).await?;
        let next = next_page(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::from_reqwest(url.as_str(), &e))?;

        let items = serde_json::from_slice(&body).map_err(|e| InvalidResponseError {
            url: url.to_string(),
            message: format!("{e}; body: {}", snippet(&body)),
        })?;

        Ok(Page { items, next })
    }
}

/// Target of the `rel="next"` entry of a `Link` header.
#[must_use]
pub fn next_page(headers: &HeaderMap) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| matches!(p.trim(), "rel=\"next\"" | "rel=next"));
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}
