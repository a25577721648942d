use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::handlers::SharedState;
use crate::key_generator::{action_for, remote_address};

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = remote_address(request.headers(), peer_addr(&request));
    let span = tracing::info_span!("request", request_id = %Uuid::new_v4());

    async move {
        info!(
            target: "throttler::middleware",
            method = %method,
            uri = %uri,
            client_ip = %client_ip,
            "Incoming request"
        );

        let response = next.run(request).await;

        info!(
            target: "throttler::middleware",
            method = %method,
            uri = %uri,
            status = %response.status(),
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}

/// Reject requests whose caller has used up the quota of the matched route.
///
/// Must be installed with `route_layer` so the matched path is known.
pub async fn enforce_quota(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(route) = request.extensions().get::<MatchedPath>() else {
        return next.run(request).await;
    };
    let action = action_for(request.method(), route.as_str());
    let caller = remote_address(request.headers(), peer_addr(&request));

    match state.throttler.check(&caller, &action) {
        Ok(_) => next.run(request).await,
        Err(err) => {
            warn!(
                target: "throttler::middleware",
                caller = %caller,
                action = %action,
                "Request throttled"
            );
            err.into_response()
        }
    }
}
