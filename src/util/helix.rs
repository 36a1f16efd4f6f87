use core::fmt;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tokio::time::Instant;
use tracing::instrument;

use crate::constants::API_HELIX_URL;
use crate::util::env::{EnvErr, Var};
use crate::var;

/// External follow/subscription checks consulted before paying platform-gated rewards.
#[async_trait]
pub trait LinkVerifier: Send + Sync + fmt::Debug {
    async fn is_following(&self, login: &str) -> HelixResult<bool>;
    async fn is_subscribed(&self, login: &str) -> HelixResult<bool>;
}

#[derive(Debug, Default)]
pub struct Helix;

impl Helix {
    #[instrument]
    /// Resolves a login to its (immutable) user id.
    pub async fn user_id(login: &str) -> HelixResult<String> {
        let uri = format!("{}/users?login={}", API_HELIX_URL, login.to_lowercase());
        let headers = &auth_headers().await?.app;

        Self::fetch::<HelixDataResponse<HelixUser>>(uri, headers)
            .await?
            .data
            .into_iter()
            .next()
            .map(|user| {
                tracing::trace!(login = %user.login, id = %user.id, "resolved helix user");
                user.id
            })
            .ok_or(HelixErr::EmptyDataField)
    }

    #[instrument(skip(headers))]
    /// Performs a GET request to `uri` and parses the response according to the specified `T`
    /// output type
    async fn fetch<T>(uri: String, headers: &HeaderMap) -> HelixResult<T>
    where
        T: DeserializeOwned + fmt::Debug,
    {
        let res = reqwest::Client::new()
            .get(uri)
            .headers(headers.clone())
            .send()
            .await?;

        if !res.status().is_success() {
            let status_code = res.status();
            tracing::error!(code = %status_code, "non-2xx response");

            return Err(match res.json::<Value>().await {
                Ok(body) => HelixErr::FetchErrWithBody { body },
                Err(_) => HelixErr::FetchErr(status_code.to_string()),
            });
        }

        if let Some(remaining) = res.headers().get("ratelimit-remaining")
            && let Some(total) = res.headers().get("ratelimit-limit")
        {
            tracing::debug!(ratelimit_available = ?remaining, ratelimit_total = ?total, "rate-limit bucket");
        }

        Ok(res.json::<T>().await?)
    }

    /// `true` when the broadcaster-scoped endpoint returns any row for `login`.
    async fn has_relation(endpoint: &str, login: &str) -> HelixResult<bool> {
        let user_id = Self::user_id(login).await?;
        let uri = format!(
            "{}/{}?broadcaster_id={}&user_id={}",
            API_HELIX_URL,
            endpoint,
            var!(Var::BroadcasterId).await?,
            user_id
        );
        let headers = &auth_headers().await?.user;

        let res = Self::fetch::<HelixDataResponse<Value>>(uri, headers).await?;
        Ok(!res.data.is_empty())
    }
}

#[async_trait]
impl LinkVerifier for Helix {
    #[instrument(skip(self))]
    async fn is_following(&self, login: &str) -> HelixResult<bool> {
        Self::has_relation(HELIX_URN_FOLLOWERS, login).await
    }

    #[instrument(skip(self))]
    async fn is_subscribed(&self, login: &str) -> HelixResult<bool> {
        Self::has_relation(HELIX_URN_SUBSCRIPTIONS, login).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Check {
    Follow,
    Subscription,
}

/// Remembers positive answers from `V` until the whole cache is dropped every `ttl`.
///
/// Negative answers always go back to `V`, so a viewer who follows mid-session is seen on their
/// next attempt.
#[derive(Debug)]
pub struct CachedVerifier<V> {
    inner: V,
    ttl: Duration,
    cache: RwLock<(Instant, HashSet<(Check, String)>)>,
}

impl<V: LinkVerifier> CachedVerifier<V> {
    pub fn new(inner: V, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new((Instant::now(), HashSet::new())),
        }
    }

    async fn check(&self, check: Check, login: &str) -> HelixResult<bool> {
        let key = (check, login.to_lowercase());
        {
            let mut cache = self.cache.write().await;
            if cache.0.elapsed() >= self.ttl {
                tracing::debug!(entries = cache.1.len(), "verifier cache invalidated");
                *cache = (Instant::now(), HashSet::new());
            } else if cache.1.contains(&key) {
                return Ok(true);
            }
        }

        let passed = match check {
            Check::Follow => self.inner.is_following(login).await?,
            Check::Subscription => self.inner.is_subscribed(login).await?,
        };
        if passed {
            self.cache.write().await.1.insert(key);
        }

        Ok(passed)
    }
}

#[async_trait]
impl<V: LinkVerifier> LinkVerifier for CachedVerifier<V> {
    async fn is_following(&self, login: &str) -> HelixResult<bool> {
        self.check(Check::Follow, login).await
    }

    async fn is_subscribed(&self, login: &str) -> HelixResult<bool> {
        self.check(Check::Subscription, login).await
    }
}

pub const HELIX_URN_FOLLOWERS: &str = "channels/followers";
pub const HELIX_URN_SUBSCRIPTIONS: &str = "subscriptions";

#[derive(Debug, Clone, Deserialize)]
pub struct HelixDataResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
}

pub struct AuthHeaders {
    app: HeaderMap,
    user: HeaderMap,
}

impl AuthHeaders {
    #[instrument]
    pub async fn new() -> HelixResult<Self> {
        let client_id = HeaderValue::from_str(var!(Var::ClientId).await?)?;
        let app_value = HeaderValue::from_str(&format!("Bearer {}", var!(Var::AppToken).await?))?;
        let user_value =
            HeaderValue::from_str(&format!("Bearer {}", var!(Var::UserToken).await?))?;

        let mut app = HeaderMap::new();
        app.insert(AUTHORIZATION, app_value);
        app.insert("Client-Id", client_id.clone());

        let mut user = HeaderMap::new();
        user.insert(AUTHORIZATION, user_value);
        user.insert("Client-Id", client_id);

        tracing::debug!("built AUTHORIZATION headers for app + user tokens");

        Ok(Self { app, user })
    }
}

static HEADERS: LazyLock<OnceCell<AuthHeaders>> = LazyLock::new(OnceCell::new);
pub async fn auth_headers() -> HelixResult<&'static AuthHeaders> {
    HEADERS.get_or_try_init(AuthHeaders::new).await
}

pub type HelixResult<T> = core::result::Result<T, HelixErr>;

#[derive(Debug, Error)]
pub enum HelixErr {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("while parsing environment vars: {0}")]
    EnvError(#[from] EnvErr),

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error("error during helix fetch: {0}")]
    FetchErr(String),

    #[error("error (with detail) during helix fetch: {:#?}", body)]
    FetchErrWithBody { body: Value },

    #[error("empty data field")]
    EmptyDataField,
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Answers from fixed sets and counts how often it was asked.
    #[derive(Debug, Default)]
    pub struct MockVerifier {
        pub followers: HashSet<String>,
        pub subscribers: HashSet<String>,
        pub calls: AtomicUsize,
    }

    impl MockVerifier {
        pub fn following(logins: &[&str]) -> Self {
            Self {
                followers: logins.iter().map(|l| l.to_string()).collect(),
                ..Default::default()
            }
        }

        pub fn subscribed(logins: &[&str]) -> Self {
            Self {
                subscribers: logins.iter().map(|l| l.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl LinkVerifier for MockVerifier {
        async fn is_following(&self, login: &str) -> HelixResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.followers.contains(login))
        }

        async fn is_subscribed(&self, login: &str) -> HelixResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.subscribers.contains(login))
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;

    use super::mock::MockVerifier;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cache_remembers_positive_answers_until_ttl() {
        let verifier = CachedVerifier::new(
            MockVerifier::following(&["plss"]),
            Duration::from_secs(600),
        );

        assert!(verifier.is_following("plss").await.unwrap());
        assert!(verifier.is_following("PLSS").await.unwrap());
        assert_eq!(verifier.inner.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(verifier.is_following("plss").await.unwrap());
        assert_eq!(verifier.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_never_stores_negative_answers() {
        let verifier = CachedVerifier::new(MockVerifier::default(), Duration::from_secs(600));

        assert!(!verifier.is_subscribed("nobody").await.unwrap());
        assert!(!verifier.is_subscribed("nobody").await.unwrap());
        assert_eq!(verifier.inner.calls.load(Ordering::SeqCst), 2);
    }
}
