// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Repository and branch enumeration.
//!
//! ```text
//! list_repositories(account)
//!   GET {api}/search/repositories?q=user:{account}&per_page=N
//!   follow Link rel="next" --> Vec<Repository>
//!
//! branches_for(account, repo, all_branches)
//!   false --> [default_branch]            (no request)
//!   true  --> list_branches()
//!             GET {api}/repos/{account}/{repo}/branches?per_page=N
//! ```
//!
//! # Key Types
//!
//! | Type             | Purpose                              |
//! |------------------|--------------------------------------|
//! | `Repository`     | name + default branch                |
//! | `Branch`         | branch name                          |
//! | `SearchResponse` | search envelope (`items`)            |

pub mod models;


use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::{GbakError, GbakResult, NetworkError};
use crate::net::RateLimitedClient;

pub use models::{Branch, Repository, SearchResponse};

/// Lists an account's repositories and their branches.
pub struct RepositoryEnumerator<'a> {
    client: &'a RateLimitedClient,
    api_base: Url,
    per_page: u8,
}

impl<'a> RepositoryEnumerator<'a> {
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidUrl` if `api.base_url` does not parse.
    pub fn new(client: &'a RateLimitedClient, api: &ApiConfig) -> GbakResult<Self> {
        Ok(Self {
            client,
            api_base: parse_base(&api.base_url)?,
            per_page: api.per_page,
        })
    }

    /// First page of the repository search for `account`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidUrl` if the base cannot carry a path.
    pub fn search_url(&self, account: &str) -> GbakResult<Url> {
        let mut url = with_segments(&self.api_base, ["search", "repositories"])?;
        url.query_pairs_mut()
            .append_pair("q", &format!("user:{account}"))
            .append_pair("per_page", &self.per_page.to_string());
        Ok(url)
    }

    /// First page of the branch listing of `repository`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidUrl` if the base cannot carry a path.
    pub fn branches_url(&self, account: &str, repository: &str) -> GbakResult<Url> {
        let mut url = with_segments(&self.api_base, ["repos", account, repository, "branches"])?;
        url.query_pairs_mut()
            .append_pair("per_page", &self.per_page.to_string());
        Ok(url)
    }

    /// Every repository of `account`, in listing order.
    ///
    /// # Errors
    ///
    /// - `InvalidResponseError` if a page lacks `items` or an item lacks
    ///   `name`/`default_branch`.
    /// - `NetworkError` for transport or status failures.
    /// - `GbakError::Cancelled` if cancellation interrupts a backoff or
    ///   arrives between pages.
    pub async fn list_repositories(&self, account: &str) -> GbakResult<Vec<Repository>> {
        let first = self.search_url(account)?;
        let repositories = self
            .collect_pages(first, |page: SearchResponse| {
                if page.incomplete_results {
                    warn!("Search results are incomplete, some repositories may be missing");
                }
                debug!(total = page.total_count, found = page.items.len(), "search page");
                page.items
            })
            .await?;
        debug!(account, count = repositories.len(), "listed repositories");
        Ok(repositories)
    }

    /// Every branch of `repository`, in listing order.
    ///
    /// # Errors
    ///
    /// Same as [`list_repositories`](Self::list_repositories).
    pub async fn list_branches(
        &self,
        account: &str,
        repository: &Repository,
    ) -> GbakResult<Vec<Branch>> {
        let first = self.branches_url(account, &repository.name)?;
        let branches = self.collect_pages(first, |page: Vec<Branch>| page).await?;
        debug!(repo = %repository.name, count = branches.len(), "listed branches");
        Ok(branches)
    }

    /// The branches to back up for `repository`.
    ///
    /// Only all-branches mode costs a request.
    ///
    /// # Errors
    ///
    /// Same as [`list_branches`](Self::list_branches).
    pub async fn branches_for(
        &self,
        account: &str,
        repository: &Repository,
        all_branches: bool,
    ) -> GbakResult<Vec<Branch>> {
        if all_branches {
            self.list_branches(account, repository).await
        } else {
            Ok(vec![Branch::new(repository.default_branch.clone())])
        }
    }

    async fn collect_pages<P, T, F>(&self, first: Url, mut extract: F) -> GbakResult<Vec<T>>
    where
        P: DeserializeOwned,
        F: FnMut(P) -> Vec<T>,
    {
        let mut collected = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if pages > 0 && self.client.cancellation().is_requested() {
                return Err(GbakError::Cancelled);
            }
            let page = self.client.get_json::<P>(&url).await?;
            collected.extend(extract(page.items));
            next = page.next;
            pages += 1;
        }

        Ok(collected)
    }
}

/// Parse a configured base URL.
///
/// # Errors
///
/// Returns `NetworkError::InvalidUrl` if `raw` does not parse.
pub fn parse_base(raw: &str) -> GbakResult<Url> {
    Url::parse(raw).map_err(|e| {
        NetworkError::InvalidUrl {
            url: raw.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// `base` with `segments` appended to its path, each percent-encoded.
///
/// # Errors
///
/// Returns `NetworkError::InvalidUrl` if `base` cannot be a base URL.
pub fn with_segments<'s, I>(base: &Url, segments: I) -> GbakResult<Url>
where
    I: IntoIterator<Item = &'s str>,
{
    let mut url = base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|()| NetworkError::InvalidUrl {
            url: base.to_string(),
            message: "cannot be a base URL".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
