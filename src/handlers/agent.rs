//! Agent roster message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{database_error, publish_error, publish_success};
use crate::auth;
use crate::db::queries;
use crate::types::{
    AgentFilter, AgentListResponse, CreateAgentRequest, DeleteRequest, DeleteResponse, Request, UpdateAgentRequest,
};

/// Handle callcenter.agent.list messages
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received agent.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<AgentFilter> = match serde_json::from_slice(&msg.payload) {
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

        match queries::agent::list_agents(&pool).await {
            Ok(agents) => {
                let response = AgentListResponse::build(agents, &request.payload);
                debug!("Listing {} of {} agents", response.items.len(), response.total);
                publish_success(&client, reply, request.id, response).await?;
            }
            Err(e) => {
                error!("Failed to list agents: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// Handle callcenter.agent.create messages
pub async fn handle_create(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received agent.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateAgentRequest> = match serde_json::from_slice(&msg.payload) {
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

        let record = match request.payload.to_record() {
            Ok(record) => record,
            Err(e) => {
                publish_error(&client, reply, request.id, "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        match queries::agent::create_agent(&pool, &record).await {
            Ok(agent) => {
                info!("Created agent {} ({})", agent.name, agent.id);
                publish_success(&client, reply, request.id, agent).await?;
            }
            Err(e) => {
                error!("Failed to create agent: {}", e);
                let (code, message) = database_error(&e);
                publish_error(&client, reply, request.id, code, message).await?;
            }
        }
    }

    Ok(())
}

/// Handle callcenter.agent.update messages
pub async fn handle_update(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received agent.update message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<UpdateAgentRequest> = match serde_json::from_slice(&msg.payload) {
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

        if has_blank_name(&request.payload) {
            publish_error(&client, reply, request.id, "INVALID_REQUEST", "Name darf nicht leer sein").await?;
            continue;
        }

        match queries::agent::update_agent(&pool, &request.payload).await {
            Ok(Some(agent)) => {
                info!("Updated agent {} ({})", agent.name, agent.id);
                publish_success(&client, reply, request.id, agent).await?;
            }
            Ok(None) => {
                publish_error(&client, reply, request.id, "NOT_FOUND", "Agent not found").await?;
            }
            Err(e) => {
                error!("Failed to update agent: {}", e);
                let (code, message) = database_error(&e);
                publish_error(&client, reply, request.id, code, message).await?;
            }
        }
    }

    Ok(())
}

/// Handle callcenter.agent.delete messages
pub async fn handle_delete(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received agent.delete message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<DeleteRequest> = match serde_json::from_slice(&msg.payload) {
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

        match queries::agent::delete_agent(&pool, request.payload.id).await {
            Ok(true) => {
                info!("Deleted agent {}", request.payload.id);
                publish_success(&client, reply, request.id, DeleteResponse { deleted: true }).await?;
            }
            Ok(false) => {
                publish_error(&client, reply, request.id, "NOT_FOUND", "Agent not found").await?;
            }
            Err(e) => {
                error!("Failed to delete agent: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// A rename to an empty name would break the natural key
fn has_blank_name(request: &UpdateAgentRequest) -> bool {
    matches!(request.name.as_deref(), Some(name) if name.trim().is_empty())
}
