use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::instrument;

use crate::db::prelude::*;
use crate::economy::config::EconomyConfig;
use crate::economy::error::EconomyResult;

/// Small point awards for community activity. Each returns the new balances, or `None` when
/// the activity was already credited (or doesn't qualify).
#[derive(Debug)]
pub struct Activity {
    store: Arc<dyn EconomyStore>,
    config: Arc<EconomyConfig>,
    chatters: Mutex<HashMap<String, Instant>>,
}

impl Activity {
    pub fn new(store: Arc<dyn EconomyStore>, config: Arc<EconomyConfig>) -> Self {
        Self {
            store,
            config,
            chatters: Mutex::default(),
        }
    }

    fn chatters(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.chatters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Once per account, channel and UTC day.
    #[instrument(skip(self))]
    pub async fn media_post(
        &self,
        account: &AccountId,
        channel: &str,
        posted_at: DateTime<Utc>,
    ) -> EconomyResult<Option<Balances>> {
        let key = format!("{account}:{channel}:{}", posted_at.format("%Y-%m-%d"));
        self.claim(ActivityKind::MediaPost, &key, account, self.config.media_post_points)
            .await
    }

    /// Credits `author` once per (message, reactor). Reacting to your own message earns nothing.
    #[instrument(skip(self))]
    pub async fn reaction(
        &self,
        author: &AccountId,
        reactor: &AccountId,
        message_id: &str,
    ) -> EconomyResult<Option<Balances>> {
        if author == reactor {
            return Ok(None);
        }

        let key = format!("{message_id}:{reactor}");
        self.claim(ActivityKind::Reaction, &key, author, self.config.reaction_points)
            .await
    }

    async fn claim(
        &self,
        kind: ActivityKind,
        key: &str,
        account: &AccountId,
        points: i64,
    ) -> EconomyResult<Option<Balances>> {
        let balances = self.store.claim_activity(kind, key, account, points).await?;
        if balances.is_some() {
            tracing::debug!(kind = kind.as_str(), key, points, "activity credited");
        }

        Ok(balances)
    }

    /// Chat line from a Twitch login. Only linked logins earn, at most once per cooldown.
    #[instrument(skip(self))]
    pub async fn chat_message(&self, login: &str) -> EconomyResult<Option<Balances>> {
        let login = login.to_lowercase();
        let now = Instant::now();
        let cooldown = self.config.chat_cooldown;

        {
            let mut chatters = self.chatters();
            if chatters
                .get(&login)
                .is_some_and(|last| now.duration_since(*last) < cooldown)
            {
                return Ok(None);
            }
            chatters.retain(|_, last| now.duration_since(*last) < cooldown);
            chatters.insert(login.clone(), now);
        }

        let Some(account) = self
            .store
            .account_for_identity(Platform::Twitch, &login)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(
            self.store
                .credit(&account, self.config.chat_message_points)
                .await?,
        ))
    }
}
