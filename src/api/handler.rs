use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::api::server::{AppState, JsonResult, RouteError};
use crate::db::prelude::*;
use crate::economy::error::EconomyError;
use crate::economy::progression::TierReport;
use crate::economy::reward::IssuedReward;
use crate::economy::sale::SaleReceipt;
use crate::economy::trade::{TradeHandle, TradeReceipt};
use crate::economy::wager::{Joined, PoolStatus};

fn parse<T>(raw: &str) -> Result<T, RouteError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(RouteError::InvalidParam)
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub account_id: AccountId,
    pub balances: Balances,
    pub rank: Option<i64>,
}

#[instrument(skip(state))]
pub async fn account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AccountId>,
) -> JsonResult<AccountView> {
    let balances = state.economy.balances(&id).await?;
    let rank = state.economy.rank(&id).await?;

    Ok(Json(AccountView {
        account_id: id,
        balances,
        rank,
    }))
}

#[instrument(skip(state))]
pub async fn holdings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AccountId>,
) -> JsonResult<Vec<Holding>> {
    Ok(Json(state.economy.holdings(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct GrantBody {
    pub item_type: ItemTypeId,
}

#[instrument(skip(state))]
pub async fn grant_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AccountId>,
    Json(body): Json<GrantBody>,
) -> JsonResult<ItemCopy> {
    Ok(Json(state.economy.grant_item(&id, body.item_type).await?))
}

#[derive(Debug, Serialize)]
pub struct HoldingCount {
    pub item_type_id: ItemTypeId,
    pub count: i64,
}

#[instrument(skip(state))]
pub async fn holding_count(
    State(state): State<Arc<AppState>>,
    Path((id, item)): Path<(AccountId, i32)>,
) -> JsonResult<HoldingCount> {
    let item_type_id = ItemTypeId(item);
    Ok(Json(HoldingCount {
        item_type_id,
        count: state.economy.holding_count(&id, item_type_id).await?,
    }))
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub removed: bool,
}

#[instrument(skip(state))]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((id, item)): Path<(AccountId, i32)>,
) -> JsonResult<Removed> {
    Ok(Json(Removed {
        removed: state.economy.remove_item(&id, ItemTypeId(item)).await?,
    }))
}

#[instrument(skip(state))]
pub async fn tier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AccountId>,
) -> JsonResult<TierReport> {
    Ok(Json(state.economy.progression(&id).await?))
}

#[instrument(skip(state))]
pub async fn record_tier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AccountId>,
) -> JsonResult<TierReport> {
    Ok(Json(state.economy.record_tier(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreditBody {
    pub delta: i64,
}

#[instrument(skip(state))]
pub async fn credit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AccountId>,
    Json(body): Json<CreditBody>,
) -> JsonResult<Balances> {
    Ok(Json(state.economy.credit(&id, body.delta).await?))
}

#[derive(Debug, Deserialize)]
pub struct BalanceBody {
    pub counter: Counter,
    pub value: i64,
}

#[instrument(skip(state))]
pub async fn set_balance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AccountId>,
    Json(body): Json<BalanceBody>,
) -> JsonResult<Balances> {
    Ok(Json(
        state
            .economy
            .set_balance(&id, body.counter, body.value)
            .await?,
    ))
}

/// Issues and commits in one go; callers that need to show the draw first use the economy directly.
#[instrument(skip(state))]
pub async fn issue_reward(
    State(state): State<Arc<AppState>>,
    Path((id, kind)): Path<(AccountId, String)>,
) -> JsonResult<IssuedReward> {
    let kind: RewardKind = parse(&kind)?;
    let grant = state.economy.try_issue_reward(&id, kind).await?;

    Ok(Json(grant.commit().await?))
}

#[instrument(skip(state))]
pub async fn link_bonus(
    State(state): State<Arc<AppState>>,
    Path((id, platform)): Path<(AccountId, String)>,
) -> JsonResult<IssuedReward> {
    let platform: Platform = parse(&platform)?;
    Ok(Json(state.economy.claim_link_bonus(&id, platform).await?))
}

#[derive(Debug, Deserialize)]
pub struct ProposeBody {
    pub proposer: AccountId,
    pub offered: ItemTypeId,
    pub counterpart: AccountId,
    pub requested: ItemTypeId,
}

#[instrument(skip(state))]
pub async fn propose_trade(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProposeBody>,
) -> JsonResult<TradeHandle> {
    Ok(Json(
        state
            .economy
            .propose_trade(&body.proposer, body.offered, &body.counterpart, body.requested)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PartyBody {
    pub account: AccountId,
}

#[instrument(skip(state))]
pub async fn confirm_trade(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<Uuid>,
    Json(body): Json<PartyBody>,
) -> JsonResult<TradeReceipt> {
    Ok(Json(state.economy.confirm_trade(handle, &body.account).await?))
}

#[derive(Debug, Serialize)]
pub struct Cancelled {
    pub id: Uuid,
    pub cancelled: bool,
}

#[instrument(skip(state))]
pub async fn cancel_trade(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<Uuid>,
    Json(body): Json<PartyBody>,
) -> JsonResult<Cancelled> {
    state.economy.cancel_trade(handle, &body.account)?;
    Ok(Json(Cancelled {
        id: handle,
        cancelled: true,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OpenWagerBody {
    pub initiator: AccountId,
    pub stake: i64,
}

#[derive(Debug, Serialize)]
pub struct WagerOpened {
    pub id: Uuid,
    pub status: PoolStatus,
}

#[instrument(skip(state))]
pub async fn open_wager(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenWagerBody>,
) -> JsonResult<WagerOpened> {
    let handle = state
        .economy
        .open_wager_pool(&body.initiator, body.stake)
        .await?;
    let status = state.economy.wager_status(handle.id)?;

    Ok(Json(WagerOpened {
        id: handle.id,
        status,
    }))
}

#[instrument(skip(state))]
pub async fn join_wager(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<Uuid>,
    Json(body): Json<PartyBody>,
) -> JsonResult<Joined> {
    Ok(Json(state.economy.join_wager_pool(handle, &body.account).await?))
}

#[instrument(skip(state))]
pub async fn wager_status(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<Uuid>,
) -> JsonResult<PoolStatus> {
    Ok(Json(state.economy.wager_status(handle)?))
}

#[derive(Debug, Deserialize)]
pub struct SellBody {
    pub account: AccountId,
    pub item_type: ItemTypeId,
}

#[instrument(skip(state))]
pub async fn sell(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SellBody>,
) -> JsonResult<SaleReceipt> {
    Ok(Json(
        state
            .economy
            .sell_one_copy(&body.account, body.item_type)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct LinkBody {
    pub account: AccountId,
    pub platform: Platform,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct Linked {
    pub linked: bool,
}

#[instrument(skip(state))]
pub async fn link_identity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LinkBody>,
) -> JsonResult<Linked> {
    if !state
        .economy
        .link_identity(&body.account, body.platform, &body.username)
        .await?
    {
        return Err(EconomyError::NotEligible(format!(
            "{} is already linked to another account",
            body.username
        ))
        .into());
    }

    Ok(Json(Linked { linked: true }))
}

#[derive(Debug, Serialize)]
pub struct Unlinked {
    pub unlinked: bool,
}

#[instrument(skip(state))]
pub async fn unlink_identity(
    State(state): State<Arc<AppState>>,
    Path((id, platform)): Path<(AccountId, String)>,
) -> JsonResult<Unlinked> {
    let platform: Platform = parse(&platform)?;
    Ok(Json(Unlinked {
        unlinked: state.economy.unlink_identity(&id, platform).await?,
    }))
}

#[derive(Debug, Serialize)]
pub struct ActivityCredit {
    pub credited: bool,
    pub balances: Option<Balances>,
}

impl From<Option<Balances>> for ActivityCredit {
    fn from(balances: Option<Balances>) -> Self {
        Self {
            credited: balances.is_some(),
            balances,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaBody {
    pub account: AccountId,
    pub channel: String,
    pub posted_at: Option<DateTime<Utc>>,
}

#[instrument(skip(state))]
pub async fn media_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MediaBody>,
) -> JsonResult<ActivityCredit> {
    let posted_at = body.posted_at.unwrap_or_else(Utc::now);
    Ok(Json(
        state
            .economy
            .media_post(&body.account, &body.channel, posted_at)
            .await?
            .into(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ReactionBody {
    pub author: AccountId,
    pub reactor: AccountId,
    pub message_id: String,
}

#[instrument(skip(state))]
pub async fn reaction(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReactionBody>,
) -> JsonResult<ActivityCredit> {
    Ok(Json(
        state
            .economy
            .reaction(&body.author, &body.reactor, &body.message_id)
            .await?
            .into(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[inline]
const fn default_limit() -> i64 {
    10
}

#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(param): Query<LeaderboardQuery>,
) -> JsonResult<Vec<LeaderboardEntry>> {
    Ok(Json(state.economy.leaderboard(param.limit).await?))
}

pub async fn catalog(State(state): State<Arc<AppState>>) -> JsonResult<Vec<ItemType>> {
    Ok(Json(state.economy.catalog().items().cloned().collect()))
}
