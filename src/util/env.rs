//! Process configuration read from the environment (and `.env`, via [`dotenvy`]).
//!
//! The deserializer below maps `SCREAMING_SNAKE_CASE` variables onto a plain serde struct, so
//! `rename`-style attributes and `Option` fields behave as they would for any other format.
//!
//! [`dotenvy`]: https://github.com/allan2/dotenvy

use std::sync::LazyLock;

use serde::Deserialize;
use serde::de::value::MapDeserializer;
use serde::de::{self, IntoDeserializer};
use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

/// Loads (once) and returns the process configuration.
pub async fn env() -> EnvResult<&'static Env> {
    ENV_VARS.get_or_try_init(|| async { Env::new() }).await
}

pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = env().await?;
    Ok(match var {
        Var::DatabaseUrl => &vars.database_url,
        Var::InternalToken => &vars.internal_token,
        Var::ClientId => &vars.client_id,
        Var::AppToken => &vars.app_token,
        Var::BroadcasterId => &vars.broadcaster_id,
        Var::UserLogin => &vars.user_login,
        Var::UserToken => &vars.user_token,
        Var::TwitchChannel => &vars.twitch_channel,
        Var::ApiServiceName => &vars.api_service_name,
        Var::ApiTracerName => &vars.api_tracer_name,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub internal_token: String,
    #[serde(default = "default_port")]
    pub server_api_port: u16,
    pub client_id: String,
    pub app_token: String,
    pub broadcaster_id: String,
    pub user_login: String,
    pub user_token: String,
    pub twitch_channel: String,
    #[serde(default = "default_service_name")]
    pub api_service_name: String,
    #[serde(default = "default_tracer_name")]
    pub api_tracer_name: String,
    pub otel_exporter_otlp_endpoint: Option<String>,
}

#[inline]
const fn default_port() -> u16 {
    crate::constants::SERVER_PORT
}

#[inline]
fn default_service_name() -> String {
    String::from("kanae-economy")
}

#[inline]
fn default_tracer_name() -> String {
    String::from("kanae-economy-tracer")
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        Ok(from_iter(dotenvy::vars())?)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Var {
    DatabaseUrl,
    InternalToken,
    ClientId,
    AppToken,
    BroadcasterId,
    UserLogin,
    UserToken,
    TwitchChannel,
    ApiServiceName,
    ApiTracerName,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

// ---
//  Deserializer implementation
// ---

/// A single `(name, value)` pair; the name is kept around for error messages.
struct Val(String, String);

macro_rules! parse_val {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>,
            {
                let parsed = self.1.trim().parse::<$ty>().map_err(|e| {
                    EnvDeserializeError::Custom(format!("{} ({}='{}')", e, self.0, self.1))
                })?;
                parsed.into_deserializer().$method(visitor)
            }
        )*
    };
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for Val {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> de::Deserializer<'de> for Val {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_string(self.1)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        // an empty variable counts as unset
        if self.1.trim().is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    parse_val! {
        bool => deserialize_bool,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i64 => deserialize_i64,
    }

    serde::forward_to_deserialize_any! {
        i8 i16 i32 u8 f32 f64 char str string unit bytes byte_buf seq map
        unit_struct tuple_struct identifier tuple ignored_any struct enum
    }
}

pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    let pairs = iter
        .into_iter()
        .map(|(k, v)| (k.clone(), Val(k, v)));

    T::deserialize(MapDeserializer::new(pairs))
}

impl de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.to_uppercase())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable {0}")]
    MissingValue(String),
}
