use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::query::build_operation;
use crate::admin::response::render_peers;
use crate::admin::AdminState;
use crate::upstream::op::{OpError, OpReply, OpStatus, Operation};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub upstreams: usize,
    pub reclaim_pending: usize,
}

#[derive(Serialize)]
pub struct UpstreamSummary {
    pub name: String,
    pub protocol: String,
    pub primary: usize,
    pub backup: usize,
    pub hash: u64,
    pub zone_used: usize,
    pub zone_capacity: usize,
    pub dns_update_secs: Option<u64>,
    pub state_file: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        upstreams: state.registry.len(),
        reclaim_pending: state.registry.reclaimer().pending(),
    })
}

pub async fn get_upstreams(State(state): State<AdminState>) -> Json<Vec<UpstreamSummary>> {
    let summaries = state
        .registry
        .all()
        .iter()
        .map(|upstream| {
            let pool = upstream.pool();
            let groups = pool.read();
            UpstreamSummary {
                name: upstream.name().to_string(),
                protocol: upstream.protocol().to_string(),
                primary: groups.primary().len(),
                backup: groups.backup().map_or(0, |b| b.len()),
                hash: groups.hash(),
                zone_used: pool.zone().used(),
                zone_capacity: pool.zone().capacity(),
                dns_update_secs: upstream.settings().dns_update.map(|d| d.as_secs()),
                state_file: upstream
                    .settings()
                    .state_file
                    .as_ref()
                    .map(|p| p.display().to_string()),
            }
        })
        .collect();

    Json(summaries)
}

/// The `/dynamic` query interface.
pub async fn dynamic(
    State(state): State<AdminState>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if method != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "only GET allowed".to_string());
    }

    let op = match build_operation(&params) {
        Ok(op) => op,
        Err(e) => return error_response(None, e),
    };

    let Some(upstream) = state.registry.get(op.protocol, &op.upstream) else {
        return error_response(Some(&op), OpError::UpstreamNotFound);
    };

    let op = upstream.prepare(op);
    match state.engine.execute(upstream.pool(), &op) {
        Ok(OpReply { status: OpStatus::NotModified, .. }) => {
            StatusCode::NOT_MODIFIED.into_response()
        }
        Ok(reply) => {
            let body = render_peers(&upstream.pool().read(), op.verbose);
            text(status_code(reply.status.status_code()), body)
        }
        Err(e) => error_response(Some(&op), e),
    }
}

fn error_response(op: Option<&Operation>, e: OpError) -> Response {
    if e.is_internal() {
        tracing::error!(
            upstream = %op.map_or("-", |op| op.upstream.as_str()),
            error = %e,
            "Dynamic upstream operation failed"
        );
    }
    text(status_code(e.status_code()), e.to_string())
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn text(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}
