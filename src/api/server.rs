use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::verify_internal_ident;
use crate::economy::Economy;
use crate::economy::error::EconomyError;
use crate::util::env::{self, EnvErr, Var};
use crate::var;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Debug)]
pub struct AppState {
    pub economy: Arc<Economy>,
    pub internal_token: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        //
        // balances, holdings and tiers
        .route("/account/{id}", get(account))
        .route("/account/{id}/holdings", get(holdings))
        .route("/account/{id}/items", post(grant_item))
        .route(
            "/account/{id}/items/{item_type}",
            get(holding_count).delete(remove_item),
        )
        .route("/account/{id}/tier", get(tier).post(record_tier))
        .route("/account/{id}/credit", post(credit))
        .route("/account/{id}/balance", post(set_balance))
        //
        // rewards
        .route("/reward/{id}/{kind}", post(issue_reward))
        .route("/reward/{id}/link/{platform}", post(link_bonus))
        //
        // exchange
        .route("/trade", post(propose_trade))
        .route("/trade/{handle}/confirm", post(confirm_trade))
        .route("/trade/{handle}/cancel", post(cancel_trade))
        .route("/wager", post(open_wager))
        .route("/wager/{handle}", get(wager_status))
        .route("/wager/{handle}/join", post(join_wager))
        .route("/sell", post(sell))
        //
        // social links and activity
        .route("/link", post(link_identity))
        .route("/link/{id}/{platform}", delete(unlink_identity))
        .route("/activity/media", post(media_post))
        .route("/activity/reaction", post(reaction))
        //
        // general
        .route("/leaderboard", get(leaderboard))
        .route("/catalog", get(catalog))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            verify_internal_ident,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .with_state(state)
}

/// Logs the `RouteError` a handler attached to its response.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        if res.status().is_server_error() {
            tracing::error!(error = ?err, "error occurred inside route handler");
        } else {
            tracing::debug!(error = %err, status = %res.status(), "request denied");
        }
    }

    res
}

#[instrument(skip(economy))]
pub async fn start_server(economy: Arc<Economy>) -> Result<Vec<JoinHandle<()>>, RouteError> {
    let internal_token = var!(Var::InternalToken).await?.to_string();
    let port = env::env().await?.server_api_port;

    let state = Arc::new(AppState {
        economy,
        internal_token,
    });
    let app = router(state);

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", socket_addr.port()),
        "server ready"
    );
    let server_handle = tokio::task::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = ?e, "api server stopped");
        }
    });

    Ok(vec![server_handle])
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Economy(#[from] EconomyError),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RouteError {
    fn status(&self) -> StatusCode {
        match self {
            RouteError::Economy(err) => match err {
                EconomyError::Busy | EconomyError::TooSoon(_) => StatusCode::TOO_MANY_REQUESTS,
                EconomyError::Insufficient(_)
                | EconomyError::Expired
                | EconomyError::NotEligible(_) => StatusCode::CONFLICT,
                EconomyError::NotFound(_) => StatusCode::NOT_FOUND,
                EconomyError::Invalid(_) => StatusCode::BAD_REQUEST,
                EconomyError::Store(_) | EconomyError::Verifier(_) | EconomyError::Guard(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
            RouteError::InvalidParam(_) => StatusCode::BAD_REQUEST,
            RouteError::EnvError(_) | RouteError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RouteError::Economy(err) => err.kind(),
            RouteError::InvalidParam(_) => "invalid",
            RouteError::EnvError(_) | RouteError::Io(_) => "internal",
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            message: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            retry_after_secs: Option<u64>,
        }

        let status = self.status();
        let retry_after_secs = match &self {
            RouteError::Economy(EconomyError::TooSoon(remaining)) => Some(remaining.as_secs()),
            _ => None,
        };
        // storage failures stay in the logs
        let message = if status.is_server_error() {
            String::from("service temporarily unavailable")
        } else {
            self.to_string()
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.kind(),
                message,
                retry_after_secs,
            }),
        )
            .into_response();
        response.extensions_mut().insert(Arc::new(self));

        response
    }
}
