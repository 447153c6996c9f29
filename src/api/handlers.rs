use super::protocol::*;
use crate::error::InvocationError;
use crate::invocation::envelope::Outcome;
use crate::invocation::poll::QueryResult;
use crate::invocation::service::{InvocationService, ServiceStats};

use axum::{Extension, Json, http::StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;

fn by_name(results: QueryResult) -> BTreeMap<String, Outcome> {
    results
        .into_iter()
        .map(|(member, outcome)| (member.to_string(), outcome))
        .collect()
}

fn error_status(err: &InvocationError) -> StatusCode {
    match err {
        InvocationError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        InvocationError::RequestTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        InvocationError::ServiceStopped => StatusCode::SERVICE_UNAVAILABLE,
        InvocationError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn handle_query(
    Extension(service): Extension<Arc<InvocationService>>,
    Json(req): Json<InvokeRequest>,
) -> (StatusCode, Json<QueryResponse>) {
    let handler = req.task.handler.clone();

    match service.query(req.task, req.members).await {
        Ok(results) => {
            tracing::debug!("Query '{}' answered by {} member(s)", handler, results.len());
            (
                StatusCode::OK,
                Json(QueryResponse {
                    results: by_name(results),
                    error: None,
                }),
            )
        }
        Err(e) => {
            tracing::warn!("Query '{}' failed: {}", handler, e);
            let status = error_status(&e);
            let message = e.to_string();
            let results = match e {
                InvocationError::RequestTimeout { partial, .. } => by_name(partial),
                _ => Default::default(),
            };
            (
                status,
                Json(QueryResponse {
                    results,
                    error: Some(message),
                }),
            )
        }
    }
}

pub async fn handle_execute(
    Extension(service): Extension<Arc<InvocationService>>,
    Json(req): Json<InvokeRequest>,
) -> (StatusCode, Json<ExecuteResponse>) {
    match service.fire_and_forget(req.task, req.members).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(ExecuteResponse {
                accepted: true,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!("Execute failed: {}", e);
            (
                error_status(&e),
                Json(ExecuteResponse {
                    accepted: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_members(
    Extension(service): Extension<Arc<InvocationService>>,
) -> (StatusCode, Json<MembersResponse>) {
    let membership = service.membership();
    (
        StatusCode::OK,
        Json(MembersResponse {
            local: membership.local_id().clone(),
            members: membership.service_members(),
        }),
    )
}

pub async fn handle_stats(
    Extension(service): Extension<Arc<InvocationService>>,
) -> (StatusCode, Json<ServiceStats>) {
    (StatusCode::OK, Json(service.stats()))
}
