//! NATS message handlers

pub mod agent;
pub mod auth;
pub mod call_statistic;
pub mod import;
pub mod ping;

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::queries::agent::PgAgentStore;
use crate::db::queries::call_statistic::PgCallStatisticStore;
use crate::services::rate_limiter::LoginThrottle;
use crate::types::{AgentRecord, CallStatisticRecord, ErrorResponse, SuccessResponse};

pub(crate) async fn publish_success<T: Serialize>(
    client: &Client,
    reply: Subject,
    request_id: Uuid,
    payload: T,
) -> Result<()> {
    let response = SuccessResponse::new(request_id, payload);
    publish_reply(client, reply, request_id, serde_json::to_vec(&response)?).await
}

pub(crate) async fn publish_error(
    client: &Client,
    reply: Subject,
    request_id: Uuid,
    code: &str,
    message: impl Into<String>,
) -> Result<()> {
    let error = ErrorResponse::new(request_id, code, message);
    publish_reply(client, reply, request_id, serde_json::to_vec(&error)?).await
}

/// Replies above the server's max_payload go out as PAYLOAD_TOO_LARGE instead
async fn publish_reply(client: &Client, reply: Subject, request_id: Uuid, body: Vec<u8>) -> Result<()> {
    let max_payload = client.server_info().max_payload;
    let body = match oversized_reply(request_id, body.len(), max_payload) {
        Some(error) => {
            warn!("Reply of {} bytes exceeds max_payload {}", body.len(), max_payload);
            serde_json::to_vec(&error)?
        }
        None => body,
    };

    let size = body.len();
    if let Err(e) = client.publish(reply, body.into()).await {
        warn!("Failed to publish reply ({} bytes): {}", size, e);
    }
    Ok(())
}

/// `max_payload` of 0 means the server has not announced a limit
fn oversized_reply(request_id: Uuid, size: usize, max_payload: usize) -> Option<ErrorResponse> {
    if max_payload == 0 || size <= max_payload {
        return None;
    }
    Some(ErrorResponse::new(
        request_id,
        "PAYLOAD_TOO_LARGE",
        format!(
            "Antwort zu groß ({} Bytes, erlaubt sind {}). Bitte Filter einschränken.",
            size, max_payload
        ),
    ))
}

/// Map a query error to a reply code. Unique violations are caller errors.
pub(crate) fn database_error(e: &anyhow::Error) -> (&'static str, String) {
    match e.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            ("INVALID_REQUEST", "Eintrag existiert bereits".to_string())
        }
        _ => ("DATABASE_ERROR", e.to_string()),
    }
}

/// Start all message handlers
pub async fn start_handlers(client: Client, pool: PgPool, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    let jwt_secret = Arc::new(config.jwt_secret.clone());
    let throttle = Arc::new(LoginThrottle::new(config.login_throttle));

    // Subscribe to all subjects
    let ping_sub = client.subscribe("callcenter.ping").await?;
    let login_sub = client.subscribe("callcenter.auth.login").await?;
    let user_create_sub = client.subscribe("callcenter.user.create").await?;
    let user_list_sub = client.subscribe("callcenter.user.list").await?;
    let user_set_active_sub = client.subscribe("callcenter.user.set_active").await?;

    let agent_list_sub = client.subscribe("callcenter.agent.list").await?;
    let agent_create_sub = client.subscribe("callcenter.agent.create").await?;
    let agent_update_sub = client.subscribe("callcenter.agent.update").await?;
    let agent_delete_sub = client.subscribe("callcenter.agent.delete").await?;
    let agent_import_sub = client.subscribe("callcenter.agent.import").await?;
    let agent_delete_all_sub = client.subscribe("callcenter.agent.delete_all").await?;

    let stats_list_sub = client.subscribe("callcenter.stats.list").await?;
    let stats_import_sub = client.subscribe("callcenter.stats.import").await?;
    let stats_export_sub = client.subscribe("callcenter.stats.export").await?;
    let stats_delete_all_sub = client.subscribe("callcenter.stats.delete_all").await?;
    let stats_overview_sub = client.subscribe("callcenter.stats.overview").await?;
    let stats_overview_export_sub = client.subscribe("callcenter.stats.overview_export").await?;

    info!("Subscribed to NATS subjects");

    let ping_handle = tokio::spawn(ping::handle_ping(client.clone(), ping_sub));

    let login_handle = tokio::spawn(auth::handle_login(
        client.clone(),
        login_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
        Arc::clone(&throttle),
    ));
    let user_create_handle = tokio::spawn(auth::handle_user_create(
        client.clone(),
        user_create_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));

    let user_list_handle = tokio::spawn(auth::handle_user_list(
        client.clone(),
        user_list_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));
    let user_set_active_handle = tokio::spawn(auth::handle_user_set_active(
        client.clone(),
        user_set_active_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));

    let agent_list_handle = tokio::spawn(agent::handle_list(
        client.clone(),
        agent_list_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));
    let agent_create_handle = tokio::spawn(agent::handle_create(
        client.clone(),
        agent_create_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));
    let agent_update_handle = tokio::spawn(agent::handle_update(
        client.clone(),
        agent_update_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));
    let agent_delete_handle = tokio::spawn(agent::handle_delete(
        client.clone(),
        agent_delete_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));
    let agent_import_handle = tokio::spawn(import::handle_import::<AgentRecord, _>(
        client.clone(),
        agent_import_sub,
        PgAgentStore::new(pool.clone()),
        Arc::clone(&jwt_secret),
    ));
    let agent_delete_all_handle = tokio::spawn(import::handle_delete_all::<AgentRecord, _>(
        client.clone(),
        agent_delete_all_sub,
        PgAgentStore::new(pool.clone()),
        Arc::clone(&jwt_secret),
        "Agenten",
    ));

    let stats_list_handle = tokio::spawn(call_statistic::handle_list(
        client.clone(),
        stats_list_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));
    let stats_import_handle = tokio::spawn(import::handle_import::<CallStatisticRecord, _>(
        client.clone(),
        stats_import_sub,
        PgCallStatisticStore::new(pool.clone()),
        Arc::clone(&jwt_secret),
    ));
    let stats_export_handle = tokio::spawn(call_statistic::handle_export(
        client.clone(),
        stats_export_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));
    let stats_delete_all_handle = tokio::spawn(import::handle_delete_all::<CallStatisticRecord, _>(
        client.clone(),
        stats_delete_all_sub,
        PgCallStatisticStore::new(pool.clone()),
        Arc::clone(&jwt_secret),
        "Anrufstatistiken",
    ));

    let stats_overview_handle = tokio::spawn(call_statistic::handle_overview(
        client.clone(),
        stats_overview_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));
    let stats_overview_export_handle = tokio::spawn(call_statistic::handle_overview_export(
        client.clone(),
        stats_overview_export_sub,
        pool.clone(),
        Arc::clone(&jwt_secret),
    ));

    // Periodically drop expired login throttle buckets
    let throttle_cleanup = Arc::clone(&throttle);
    let cleanup_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            throttle_cleanup.cleanup();
        }
    });

    info!("All handlers started, waiting for messages...");

    // Wait for any handler to finish (which would indicate an error)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = login_handle => {
            error!("Login handler finished: {:?}", result);
        }
        result = user_create_handle => {
            error!("User create handler finished: {:?}", result);
        }
        result = user_list_handle => {
            error!("User list handler finished: {:?}", result);
        }
        result = user_set_active_handle => {
            error!("User set_active handler finished: {:?}", result);
        }
        result = agent_list_handle => {
            error!("Agent list handler finished: {:?}", result);
        }
        result = agent_create_handle => {
            error!("Agent create handler finished: {:?}", result);
        }
        result = agent_update_handle => {
            error!("Agent update handler finished: {:?}", result);
        }
        result = agent_delete_handle => {
            error!("Agent delete handler finished: {:?}", result);
        }
        result = agent_import_handle => {
            error!("Agent import handler finished: {:?}", result);
        }
        result = agent_delete_all_handle => {
            error!("Agent delete-all handler finished: {:?}", result);
        }
        result = stats_list_handle => {
            error!("Statistics list handler finished: {:?}", result);
        }
        result = stats_import_handle => {
            error!("Statistics import handler finished: {:?}", result);
        }
        result = stats_export_handle => {
            error!("Statistics export handler finished: {:?}", result);
        }
        result = stats_delete_all_handle => {
            error!("Statistics delete-all handler finished: {:?}", result);
        }
        result = stats_overview_handle => {
            error!("Statistics overview handler finished: {:?}", result);
        }
        result = stats_overview_export_handle => {
            error!("Statistics overview export handler finished: {:?}", result);
        }
        result = cleanup_handle => {
            error!("Throttle cleanup task finished: {:?}", result);
        }
    }

    Ok(())
}
