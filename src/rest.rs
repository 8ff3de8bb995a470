//! HTTP implementation of [`LeagueStateSource`].
//!
//! Issues the same bearer-authenticated GETs the host uses for initial page
//! load:
//!
//! - `GET {base}/leagues/{id}` → [`LeagueStatus`]
//! - `GET {base}/leagues/{id}/members` → `[Member]`

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::{Result, SyncError};
use crate::identity::IdentityProvider;
use crate::poller::LeagueStateSource;
use crate::protocol::{LeagueStatus, Member};

/// REST client for league status and membership.
pub struct HttpLeagueSource {
    http: Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
}

impl HttpLeagueSource {
    /// Create a source rooted at `base_url` (for example
    /// `https://api.example.com/api`).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Http`](crate::SyncError::Http) if the TLS backend
    /// cannot be initialised.
    pub fn new(base_url: impl Into<String>, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self::with_client(http, base_url, identity))
    }

    /// Create a source that reuses an existing `reqwest` client.
    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            identity,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        match self
            .identity
            .authorization_header()
            .map(|value| HeaderValue::from_str(&value))
        {
            Some(Ok(value)) => {
                headers.insert(AUTHORIZATION, value);
            }
            Some(Err(e)) => debug!("authorization header rejected: {e}"),
            None => debug!("no authorization header available"),
        }
        headers
    }

    /// `{base}/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| SyncError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .headers(self.headers())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl LeagueStateSource for HttpLeagueSource {
    #[instrument(skip(self))]
    async fn league_status(&self, league_id: &str) -> Result<LeagueStatus> {
        let url = self.endpoint(&["leagues", league_id])?;
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    async fn league_members(&self, league_id: &str) -> Result<Vec<Member>> {
        let url = self.endpoint(&["leagues", league_id, "members"])?;
        self.get_json(url).await
    }
}

impl std::fmt::Debug for HttpLeagueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLeagueSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
