//! File import and bulk delete handlers, shared by agents and call statistics

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Local;
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{publish_error, publish_success};
use crate::auth;
use crate::services::import::{self, Importable, RecordStore};
use crate::types::{DeleteAllResponse, EmptyPayload, ImportFileRequest, ImportResponse, Request};

/// Decode an uploaded file. A leading data URL prefix is tolerated.
fn decode_upload(content_base64: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = match content_base64.split_once(";base64,") {
        Some((_, data)) => data,
        None => content_base64,
    };
    STANDARD.decode(encoded.trim())
}

/// Handle `<kind>.import` messages: decode the upload, reconcile every row
/// against the store and reply with the counts and issues.
pub async fn handle_import<R, S>(
    client: Client,
    mut subscriber: Subscriber,
    store: S,
    jwt_secret: Arc<String>,
) -> Result<()>
where
    R: Importable,
    S: RecordStore<R> + 'static,
{
    let kind = R::SCHEMA.kind;

    while let Some(msg) = subscriber.next().await {
        debug!("Received {} import message", kind);

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ImportFileRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse {} import request: {}", kind, e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        let caller = match auth::extract_auth(&request, &jwt_secret) {
            Ok(info) => info,
            Err(_) => {
                publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
                continue;
            }
        };

        let content = match decode_upload(&request.payload.content_base64) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Invalid base64 in {} upload: {}", kind, e);
                publish_error(&client, reply, request.id, "INVALID_REQUEST", "Dateiinhalt ist nicht gültig kodiert").await?;
                continue;
            }
        };

        info!(
            "{} import of {} ({} bytes) by {}",
            kind,
            request.payload.filename,
            content.len(),
            caller.email
        );

        let today = Local::now().date_naive();
        match import::run_import::<R, S>(&store, &request.payload.filename, &content, today).await {
            Ok(outcome) => {
                publish_success(&client, reply, request.id, ImportResponse::from(outcome)).await?;
            }
            Err(e) => {
                warn!("{} import of {} rejected: {}", kind, request.payload.filename, e);
                publish_error(&client, reply, request.id, e.code(), e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// Handle `<kind>.delete_all` messages. `label` names the records in the reply.
pub async fn handle_delete_all<R, S>(
    client: Client,
    mut subscriber: Subscriber,
    store: S,
    jwt_secret: Arc<String>,
    label: &'static str,
) -> Result<()>
where
    R: Importable,
    S: RecordStore<R> + 'static,
{
    while let Some(msg) = subscriber.next().await {
        debug!("Received {} delete_all message", R::SCHEMA.kind);

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<EmptyPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse delete_all request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        let caller = match auth::extract_auth(&request, &jwt_secret) {
            Ok(info) => info,
            Err(_) => {
                publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
                continue;
            }
        };

        match import::delete_all::<R, S>(&store).await {
            Ok(deleted) => {
                info!("{} deleted all {} ({})", caller.email, label, deleted);
                publish_success(&client, reply, request.id, DeleteAllResponse::new(deleted, label)).await?;
            }
            Err(e) => {
                error!("Failed to delete all {}: {}", label, e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
            }
        }
    }

    Ok(())
}
