pub const SERVER_PORT: u16 = 3000;

pub const API_HELIX_URL: &str = "https://api.twitch.tv/helix";
pub const TTV_IRC_URI: &str = "irc.chat.twitch.tv";
pub const TTV_IRC_PORT: u16 = 6697;
pub const TWITCH_PLATFORM: &str = "twitch";

// REWARD ISSUANCE
pub const BOOSTER_COOLDOWN_HOURS: i64 = 12;
pub const BOOSTER_SIZE: usize = 4;
pub const FIRST_COPY_BONUS: i64 = 5;

pub const DAILY_BASE_POINTS: i64 = 10;
pub const DAILY_STREAK_CAP: i32 = 7;

pub const SUBSCRIPTION_COOLDOWN_DAYS: i64 = 28;
pub const SUBSCRIPTION_POINTS: i64 = 250;
pub const LINK_BONUS_POINTS: i64 = 100;

// redis-backed issuing guard; only a backstop for crashed holders
pub const GUARD_TTL_MS: u64 = 30_000;

// CAPTURE POINTS PER RARITY
pub const COMMON_POINTS: i64 = 5;
pub const UNCOMMON_POINTS: i64 = 10;
pub const RARE_POINTS: i64 = 25;
pub const LEGENDARY_POINTS: i64 = 60;

// EXCHANGE
pub const TRADE_TTL_SECS: u64 = 60;
pub const WAGER_JOIN_WINDOW_SECS: u64 = 60;
pub const WAGER_MIN_PLAYERS: usize = 2;
pub const WAGER_MAX_PLAYERS: usize = 6;

pub const SALE_LIMIT: i64 = 10;
pub const SALE_WINDOW_MINUTES: i64 = 60;

// ACTIVITY
pub const MEDIA_POST_POINTS: i64 = 15;
pub const REACTION_POINTS: i64 = 2;
pub const CHAT_MESSAGE_POINTS: i64 = 1;
pub const CHAT_COOLDOWN_SECS: u64 = 60;

pub const VERIFIER_CACHE_TTL_SECS: u64 = 600;
pub const PERIOD_CHECK_SECS: u64 = 300;

/// Prestige tiers as `(threshold, name)`, ascending.
pub const TIER_THRESHOLDS: [(i64, &str); 4] = [
    (0, "Graine"),
    (10, "Bravo frérot"),
    (50, "Respect, t'es chaud"),
    (100, "Légende vivante"),
];
