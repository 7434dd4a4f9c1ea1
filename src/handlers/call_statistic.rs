//! Call statistics list, export and agent overview handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Local;
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{publish_error, publish_success};
use crate::auth;
use crate::db::queries;
use crate::services::export::{self, ExportFile};
use crate::services::overview;
use crate::types::{
    AgentOverviewRequest, AgentOverviewResponse, CallStatistic, CallStatisticFilter, ExportStatisticsRequest,
    ExportStatisticsResponse, ListResponse, Request,
};

/// Handle callcenter.stats.list messages
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received stats.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CallStatisticFilter> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        if auth::extract_auth(&request, &jwt_secret).is_err() {
            publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
            continue;
        }

        let filter = &request.payload;
        match queries::call_statistic::list_call_statistics(&pool, filter).await {
            Ok((items, total)) => {
                let response = page_response(items, total, filter);
                publish_success(&client, reply, request.id, response).await?;
            }
            Err(e) => {
                error!("Failed to list call statistics: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// Handle callcenter.stats.export messages. The workbook travels back base64
/// encoded in the reply.
pub async fn handle_export(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received stats.export message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ExportStatisticsRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        if auth::extract_auth(&request, &jwt_secret).is_err() {
            publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
            continue;
        }

        let stats = match queries::call_statistic::list_all_matching(&pool, &request.payload.filter).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Failed to load call statistics for export: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
                continue;
            }
        };

        match export::export_statistics(&stats, &request.payload.columns, &Local::now()) {
            Ok(file) => {
                info!("Exported {} call statistics as {}", file.row_count, file.filename);
                publish_success(&client, reply, request.id, export_response(file)).await?;
            }
            Err(e) => {
                warn!("Export failed: {}", e);
                publish_error(&client, reply, request.id, e.code(), e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// Handle callcenter.stats.overview messages: per-team, per-agent sums
pub async fn handle_overview(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received stats.overview message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<AgentOverviewRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        if auth::extract_auth(&request, &jwt_secret).is_err() {
            publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
            continue;
        }

        match queries::call_statistic::list_all_matching(&pool, &request.payload.filter).await {
            Ok(stats) => {
                let teams = overview::aggregate(&stats, request.payload.search.as_deref());
                let agent_count: usize = teams.iter().map(|t| t.agents.len()).sum();
                debug!("Overview of {} agents in {} teams", agent_count, teams.len());
                publish_success(&client, reply, request.id, AgentOverviewResponse { teams, agent_count }).await?;
            }
            Err(e) => {
                error!("Failed to load call statistics for overview: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// Handle callcenter.stats.overview_export messages: the overview as an
/// "Agentenstatistiken" workbook
pub async fn handle_overview_export(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received stats.overview_export message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<AgentOverviewRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        if auth::extract_auth(&request, &jwt_secret).is_err() {
            publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
            continue;
        }

        let stats = match queries::call_statistic::list_all_matching(&pool, &request.payload.filter).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Failed to load call statistics for overview export: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
                continue;
            }
        };

        let teams = overview::aggregate(&stats, request.payload.search.as_deref());
        match overview::export_overview(&teams, &Local::now()) {
            Ok(file) => {
                info!("Exported overview of {} agents as {}", file.row_count, file.filename);
                publish_success(&client, reply, request.id, export_response(file)).await?;
            }
            Err(e) => {
                warn!("Overview export failed: {}", e);
                publish_error(&client, reply, request.id, e.code(), e.to_string()).await?;
            }
        }
    }

    Ok(())
}

fn page_response(items: Vec<CallStatistic>, total: i64, filter: &CallStatisticFilter) -> ListResponse<CallStatistic> {
    let (limit, offset) = filter.page();
    ListResponse {
        items,
        total,
        limit,
        offset,
    }
}

fn export_response(file: ExportFile) -> ExportStatisticsResponse {
    ExportStatisticsResponse {
        filename: file.filename,
        content_base64: STANDARD.encode(&file.bytes),
        row_count: file.row_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_response_reports_clamped_page() {
        let filter = CallStatisticFilter {
            limit: 0,
            offset: -5,
            ..Default::default()
        };
        let response = page_response(Vec::new(), 42, &filter);
        assert_eq!(response.total, 42);
        assert_eq!(response.limit, 1);
        assert_eq!(response.offset, 0);
    }

    #[test]
    fn test_export_response_is_base64() {
        let response = export_response(ExportFile {
            filename: "Gefilterte_Anrufstatistiken.xlsx".into(),
            bytes: b"PK\x03\x04".to_vec(),
            row_count: 7,
        });
        assert_eq!(STANDARD.decode(&response.content_base64).unwrap(), b"PK\x03\x04");
        assert_eq!(response.row_count, 7);
    }
}
