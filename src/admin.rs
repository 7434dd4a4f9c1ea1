//! Admin account management: interactive `create-admin` and the
//! `ADMIN_EMAIL` / `ADMIN_PASSWORD_HASH` startup path.

use anyhow::{bail, Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::queries::user;

const MIN_PASSWORD_LENGTH: usize = 12;

/// Prompt for a password (hidden input), confirm, hash and upsert the admin
pub async fn create_admin_interactive(pool: &PgPool, email: &str) -> Result<()> {
    validate_email(email)?;

    let password = prompt_password()?;
    validate_password(&password)?;

    let hash = crate::auth::hash_password(&password)?;
    let admin = user::upsert_admin(pool, email, &hash)
        .await
        .context("Failed to upsert admin user")?;

    info!("Admin account {} ready ({})", admin.email, admin.id);
    println!("Admin account ready: {}", admin.email);
    Ok(())
}

/// On `serve`: apply a pre-computed Argon2 hash when the admin row is missing
/// or has no usable hash. Never fails startup.
pub async fn ensure_admin_from_env(pool: &PgPool) {
    let hash = match std::env::var("ADMIN_PASSWORD_HASH") {
        Ok(h) if h.starts_with("$argon2") => h,
        Ok(_) => {
            warn!("ADMIN_PASSWORD_HASH is set but is not an Argon2 hash, ignoring");
            return;
        }
        Err(_) => return,
    };
    let email = match std::env::var("ADMIN_EMAIL") {
        Ok(e) if validate_email(&e).is_ok() => e,
        _ => {
            warn!("ADMIN_PASSWORD_HASH is set without a valid ADMIN_EMAIL, ignoring");
            return;
        }
    };

    let existing = match user::get_user_by_email(pool, &email).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!("Could not look up admin {}: {}", email, e);
            return;
        }
    };

    let up_to_date = existing
        .as_ref()
        .is_some_and(|u| u.role == crate::auth::ROLE_ADMIN && u.password_hash.starts_with("$argon2"));
    if up_to_date {
        return;
    }

    match user::upsert_admin(pool, &email, &hash).await {
        Ok(_) => info!("Admin account {} set via ADMIN_PASSWORD_HASH", email),
        Err(e) => warn!("Failed to apply ADMIN_PASSWORD_HASH: {}", e),
    }
}

fn prompt_password() -> Result<String> {
    let pass = rpassword::prompt_password("Enter admin password: ").context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Confirm admin password: ")
        .context("Failed to read password confirmation")?;

    if pass != confirm {
        bail!("Passwords do not match");
    }
    Ok(pass)
}

pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => Ok(()),
        _ => bail!("Invalid email address: {email}"),
    }
}

/// Also applied to users created over NATS
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        bail!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters (got {})",
            password.chars().count()
        );
    }
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_upper && has_lower && has_digit) {
        bail!("Password must contain uppercase, lowercase, and a digit");
    }
    Ok(())
}
