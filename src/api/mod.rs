//! HTTP API Module
//!
//! Lets external callers drive the local invocation service over HTTP.
//!
//! ## Endpoints
//! - `POST /invoke/query`: run a task and wait for every member's outcome.
//! - `POST /invoke/execute`: fire-and-forget, answers 202 once sent.
//! - `GET /members`: current service members.
//! - `GET /stats`: service and worker pool counters.

pub mod handlers;
pub mod protocol;

use crate::invocation::service::InvocationService;
use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use handlers::*;
use protocol::*;
use std::sync::Arc;

pub fn router(service: Arc<InvocationService>) -> Router {
    Router::new()
        .route(ENDPOINT_QUERY, post(handle_query))
        .route(ENDPOINT_EXECUTE, post(handle_execute))
        .route(ENDPOINT_MEMBERS, get(handle_members))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(service))
}

#[cfg(test)]
mod tests;
