//! Authentication handlers: login and admin-only user management

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{database_error, publish_error, publish_success};
use crate::admin::{validate_email, validate_password};
use crate::auth::{self, AdminCheck, AuthInfo, ROLE_USER};
use crate::db::queries;
use crate::services::rate_limiter::{LoginThrottle, ThrottleDecision};
use crate::types::{
    AuthResponse, CreateUserRequest, EmptyPayload, LoginRequest, Request, SetUserActiveRequest, User,
    UserListResponse, UserPublic,
};

const INVALID_CREDENTIALS: &str = "Ungültige E-Mail oder ungültiges Passwort";

/// Why a login was refused after the user lookup
#[derive(Debug, PartialEq, Eq)]
enum LoginRefusal {
    InvalidCredentials,
    Inactive,
}

/// Decide a login for an already looked-up user. Unknown users and wrong
/// passwords are indistinguishable to the caller.
fn check_credentials(user: Option<User>, password: &str) -> Result<User, LoginRefusal> {
    let user = user.ok_or(LoginRefusal::InvalidCredentials)?;

    match auth::verify_password(password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return Err(LoginRefusal::InvalidCredentials),
        Err(e) => {
            warn!("Unusable password hash for {}: {}", user.email, e);
            return Err(LoginRefusal::InvalidCredentials);
        }
    }

    if !user.is_active {
        return Err(LoginRefusal::Inactive);
    }
    Ok(user)
}

/// Handle callcenter.auth.login messages
pub async fn handle_login(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
    throttle: Arc<LoginThrottle>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received auth.login message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<LoginRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse login request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        let payload = &request.payload;

        if let ThrottleDecision::Blocked { retry_after } = throttle.check_and_record(&payload.email) {
            warn!("Rate limited login attempt for: {}", payload.email);
            let message = format!(
                "Zu viele Anmeldeversuche. Bitte in {} Sekunden erneut versuchen.",
                retry_after.as_secs().max(1)
            );
            publish_error(&client, reply, request.id, "RATE_LIMITED", message).await?;
            continue;
        }

        let user = match queries::user::get_user_by_email(&pool, &payload.email).await {
            Ok(user) => user,
            Err(e) => {
                error!("Database error during login: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
                continue;
            }
        };

        let user = match check_credentials(user, &payload.password) {
            Ok(user) => user,
            Err(LoginRefusal::InvalidCredentials) => {
                publish_error(&client, reply, request.id, "UNAUTHORIZED", INVALID_CREDENTIALS).await?;
                continue;
            }
            Err(LoginRefusal::Inactive) => {
                info!("Login refused for deactivated user {}", payload.email);
                publish_error(&client, reply, request.id, "FORBIDDEN", "Benutzerkonto ist deaktiviert").await?;
                continue;
            }
        };

        let token = match auth::generate_token(user.id, &user.email, &user.role, &jwt_secret) {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to generate token: {}", e);
                publish_error(&client, reply, request.id, "INTERNAL_ERROR", "Failed to generate token").await?;
                continue;
            }
        };

        throttle.reset(&payload.email);
        debug!("User logged in: {}", user.email);

        let response = AuthResponse {
            token,
            user: UserPublic::from(user),
        };
        publish_success(&client, reply, request.id, response).await?;
    }

    Ok(())
}

/// Handle callcenter.user.create messages (admin only)
pub async fn handle_user_create(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received user.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateUserRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse user.create request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        let admin = match auth::require_admin(&request, &jwt_secret) {
            Ok(info) => info,
            Err(AdminCheck::Unauthorized(_)) => {
                publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
                continue;
            }
            Err(AdminCheck::Forbidden) => {
                publish_error(&client, reply, request.id, "FORBIDDEN", "Admin role required").await?;
                continue;
            }
        };

        let payload = &request.payload;
        if let Err(e) = validate_email(&payload.email).and_then(|_| validate_password(&payload.password)) {
            publish_error(&client, reply, request.id, "INVALID_REQUEST", e.to_string()).await?;
            continue;
        }

        let hash = match auth::hash_password(&payload.password) {
            Ok(h) => h,
            Err(e) => {
                error!("Failed to hash password: {}", e);
                publish_error(&client, reply, request.id, "INTERNAL_ERROR", "Failed to hash password").await?;
                continue;
            }
        };

        let result = queries::user::create_user(
            &pool,
            &payload.email,
            &hash,
            &payload.first_name,
            &payload.last_name,
            ROLE_USER,
        )
        .await;

        match result {
            Ok(user) => {
                info!("User {} created by {}", user.email, admin.email);
                publish_success(&client, reply, request.id, UserPublic::from(user)).await?;
            }
            Err(e) => {
                error!("Failed to create user: {}", e);
                let (code, message) = database_error(&e);
                publish_error(&client, reply, request.id, code, message).await?;
            }
        }
    }

    Ok(())
}

/// Admins cannot lock themselves out
fn check_status_change(caller: &AuthInfo, request: &SetUserActiveRequest) -> Result<(), &'static str> {
    if caller.user_id == request.id && !request.is_active {
        return Err("Sie können Ihren eigenen Admin-Account nicht deaktivieren.");
    }
    Ok(())
}

/// Handle callcenter.user.list messages (admin only)
pub async fn handle_user_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received user.list message");

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
                error!("Failed to parse user.list request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        match auth::require_admin(&request, &jwt_secret) {
            Ok(_) => {}
            Err(AdminCheck::Unauthorized(_)) => {
                publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
                continue;
            }
            Err(AdminCheck::Forbidden) => {
                publish_error(&client, reply, request.id, "FORBIDDEN", "Admin role required").await?;
                continue;
            }
        }

        match queries::user::list_users(&pool).await {
            Ok(users) => {
                publish_success(&client, reply, request.id, UserListResponse::from(users)).await?;
            }
            Err(e) => {
                error!("Failed to list users: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// Handle callcenter.user.set_active messages (admin only)
pub async fn handle_user_set_active(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received user.set_active message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<SetUserActiveRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse user.set_active request: {}", e);
                publish_error(&client, reply, Uuid::nil(), "INVALID_REQUEST", e.to_string()).await?;
                continue;
            }
        };

        let admin = match auth::require_admin(&request, &jwt_secret) {
            Ok(info) => info,
            Err(AdminCheck::Unauthorized(_)) => {
                publish_error(&client, reply, request.id, "UNAUTHORIZED", "Authentication required").await?;
                continue;
            }
            Err(AdminCheck::Forbidden) => {
                publish_error(&client, reply, request.id, "FORBIDDEN", "Admin role required").await?;
                continue;
            }
        };

        if let Err(message) = check_status_change(&admin, &request.payload) {
            warn!("{} tried to deactivate their own account", admin.email);
            publish_error(&client, reply, request.id, "FORBIDDEN", message).await?;
            continue;
        }

        match queries::user::set_user_active(&pool, request.payload.id, request.payload.is_active).await {
            Ok(Some(user)) => {
                info!(
                    "User {} {} by {}",
                    user.email,
                    if user.is_active { "activated" } else { "deactivated" },
                    admin.email
                );
                publish_success(&client, reply, request.id, UserPublic::from(user)).await?;
            }
            Ok(None) => {
                publish_error(&client, reply, request.id, "NOT_FOUND", "User not found").await?;
            }
            Err(e) => {
                error!("Failed to change user status: {}", e);
                publish_error(&client, reply, request.id, "DATABASE_ERROR", e.to_string()).await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(password: &str, is_active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "lead@callcenter.de".into(),
            password_hash: auth::hash_password(password).unwrap(),
            first_name: "Lea".into(),
            last_name: "Lind".into(),
            role: ROLE_USER.into(),
            is_active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_credentials_accepted() {
        let result = check_credentials(Some(user("Geheim2024!x", true)), "Geheim2024!x");
        assert!(result.is_ok());
    }

    #[test]
    fn test_unknown_user_and_wrong_password_look_the_same() {
        assert_eq!(
            check_credentials(None, "whatever").unwrap_err(),
            LoginRefusal::InvalidCredentials
        );
        assert_eq!(
            check_credentials(Some(user("Geheim2024!x", true)), "falsch").unwrap_err(),
            LoginRefusal::InvalidCredentials
        );
    }

    #[test]
    fn test_inactive_user_refused_only_with_correct_password() {
        assert_eq!(
            check_credentials(Some(user("Geheim2024!x", false)), "Geheim2024!x").unwrap_err(),
            LoginRefusal::Inactive
        );
        assert_eq!(
            check_credentials(Some(user("Geheim2024!x", false)), "falsch").unwrap_err(),
            LoginRefusal::InvalidCredentials
        );
    }

    #[test]
    fn test_broken_hash_is_invalid_credentials() {
        let mut broken = user("x", true);
        broken.password_hash = "not-set".into();
        assert_eq!(
            check_credentials(Some(broken), "x").unwrap_err(),
            LoginRefusal::InvalidCredentials
        );
    }

    fn admin() -> AuthInfo {
        AuthInfo {
            user_id: Uuid::new_v4(),
            email: "admin@callcenter.de".into(),
            role: auth::ROLE_ADMIN.into(),
        }
    }

    #[test]
    fn test_admin_cannot_deactivate_self() {
        let caller = admin();
        let request = SetUserActiveRequest {
            id: caller.user_id,
            is_active: false,
        };
        assert!(check_status_change(&caller, &request).is_err());
    }

    #[test]
    fn test_admin_may_reactivate_self_and_toggle_others() {
        let caller = admin();
        let own = SetUserActiveRequest {
            id: caller.user_id,
            is_active: true,
        };
        let other = SetUserActiveRequest {
            id: Uuid::new_v4(),
            is_active: false,
        };
        assert!(check_status_change(&caller, &own).is_ok());
        assert!(check_status_change(&caller, &other).is_ok());
    }
}
