//! User database queries

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::user::User;

/// Get user by email (for login), case-insensitive
pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, first_name, last_name, role, is_active, created_at
        FROM users
        WHERE LOWER(email) = LOWER($1)
        "#
    )
    .bind(email.trim())
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Create a user with an already hashed password
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    first_name: &str,
    last_name: &str,
    role: &str,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name, role, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW())
        RETURNING id, email, password_hash, first_name, last_name, role, is_active, created_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(email.trim().to_lowercase())
    .bind(password_hash)
    .bind(first_name.trim())
    .bind(last_name.trim())
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// Create or promote an admin. An existing account with the same email gets
/// the new password, the admin role and is reactivated.
pub async fn upsert_admin(pool: &PgPool, email: &str, password_hash: &str) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, role, is_active, created_at)
        VALUES ($1, $2, $3, 'admin', TRUE, NOW())
        ON CONFLICT (email) DO UPDATE SET
            password_hash = EXCLUDED.password_hash,
            role = 'admin',
            is_active = TRUE
        RETURNING id, email, password_hash, first_name, last_name, role, is_active, created_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(email.trim().to_lowercase())
    .bind(password_hash)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// All users, active first, then by last and first name
pub async fn list_users(pool: &PgPool) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, first_name, last_name, role, is_active, created_at
        FROM users
        ORDER BY is_active DESC, last_name ASC, first_name ASC
        "#
    )
    .fetch_all(pool)
    .await?;

    Ok(users)
}

/// Activate or deactivate a user; `None` if the id is unknown
pub async fn set_user_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET is_active = $2
        WHERE id = $1
        RETURNING id, email, password_hash, first_name, last_name, role, is_active, created_at
        "#
    )
    .bind(id)
    .bind(is_active)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}
