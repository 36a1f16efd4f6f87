use std::time::Duration;

use chrono::TimeDelta;

use crate::constants::*;

/// Tunables for one `Economy`. `Default` reads the production values from `constants`.
#[derive(Debug, Clone)]
pub struct EconomyConfig {
    pub booster_cooldown: TimeDelta,
    pub booster_size: usize,
    pub first_copy_bonus: i64,

    pub daily_base_points: i64,
    pub daily_streak_cap: i32,

    pub subscription_cooldown: TimeDelta,
    pub subscription_points: i64,
    pub link_bonus_points: i64,

    pub trade_ttl: Duration,
    pub wager_join_window: Duration,
    pub wager_max_players: usize,

    pub sale_limit: i64,
    pub sale_window: TimeDelta,

    pub media_post_points: i64,
    pub reaction_points: i64,
    pub chat_message_points: i64,
    pub chat_cooldown: Duration,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            booster_cooldown: TimeDelta::hours(BOOSTER_COOLDOWN_HOURS),
            booster_size: BOOSTER_SIZE,
            first_copy_bonus: FIRST_COPY_BONUS,
            daily_base_points: DAILY_BASE_POINTS,
            daily_streak_cap: DAILY_STREAK_CAP,
            subscription_cooldown: TimeDelta::days(SUBSCRIPTION_COOLDOWN_DAYS),
            subscription_points: SUBSCRIPTION_POINTS,
            link_bonus_points: LINK_BONUS_POINTS,
            trade_ttl: Duration::from_secs(TRADE_TTL_SECS),
            wager_join_window: Duration::from_secs(WAGER_JOIN_WINDOW_SECS),
            wager_max_players: WAGER_MAX_PLAYERS,
            sale_limit: SALE_LIMIT,
            sale_window: TimeDelta::minutes(SALE_WINDOW_MINUTES),
            media_post_points: MEDIA_POST_POINTS,
            reaction_points: REACTION_POINTS,
            chat_message_points: CHAT_MESSAGE_POINTS,
            chat_cooldown: Duration::from_secs(CHAT_COOLDOWN_SECS),
        }
    }
}
