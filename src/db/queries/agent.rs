//! Agent database queries

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::import::{KeyLookup, RecordStore, StoreError, Stored};
use crate::types::agent::{Agent, AgentRecord, UpdateAgentRequest, DEFAULT_GROUP};

const DELETE_ALL: &str = "DELETE FROM agents WHERE id IS NOT NULL";

/// List the whole roster ordered by name
pub async fn list_agents(pool: &PgPool) -> Result<Vec<Agent>> {
    let agents = sqlx::query_as::<_, Agent>(
        r#"
        SELECT id, name, gruppe, status, created_at, updated_at
        FROM agents
        ORDER BY name ASC
        "#
    )
    .fetch_all(pool)
    .await?;

    Ok(agents)
}

/// Create a new agent
pub async fn create_agent(pool: &PgPool, record: &AgentRecord) -> Result<Agent> {
    let agent = sqlx::query_as::<_, Agent>(
        r#"
        INSERT INTO agents (id, name, gruppe, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, NOW(), NOW())
        RETURNING id, name, gruppe, status, created_at, updated_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(record.name())
    .bind(record.gruppe())
    .bind(record.status())
    .fetch_one(pool)
    .await?;

    Ok(agent)
}

/// Partial update; `None` fields keep their value. Returns `None` if the
/// agent does not exist.
pub async fn update_agent(pool: &PgPool, request: &UpdateAgentRequest) -> Result<Option<Agent>> {
    let name = request.name.as_deref().map(str::trim);
    let gruppe = request.gruppe.as_deref().map(|g| match g.trim() {
        "" => DEFAULT_GROUP,
        g => g,
    });

    let agent = sqlx::query_as::<_, Agent>(
        r#"
        UPDATE agents SET
            name = COALESCE($2, name),
            gruppe = COALESCE($3, gruppe),
            status = COALESCE($4, status),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, gruppe, status, created_at, updated_at
        "#
    )
    .bind(request.id)
    .bind(name)
    .bind(gruppe)
    .bind(request.status)
    .fetch_optional(pool)
    .await?;

    Ok(agent)
}

/// Delete agent; returns whether a row was removed
pub async fn delete_agent(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM agents WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Current roster as import store rows (dry-run seed)
pub async fn load_agent_snapshot(pool: &PgPool) -> Result<Vec<Stored<AgentRecord>>> {
    let agents = list_agents(pool).await?;
    Ok(agents.iter().map(stored).collect())
}

fn stored(agent: &Agent) -> Stored<AgentRecord> {
    Stored {
        id: agent.id,
        record: AgentRecord::from(agent),
        updated_at: agent.updated_at,
    }
}

/// PostgreSQL-backed agent store, keyed by exact name
#[derive(Clone)]
pub struct PgAgentStore {
    pool: PgPool,
}

impl PgAgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore<AgentRecord> for PgAgentStore {
    async fn find_by_key(&self, name: &String) -> KeyLookup<AgentRecord> {
        let result = sqlx::query_as::<_, Agent>(
            r#"
            SELECT id, name, gruppe, status, created_at, updated_at
            FROM agents
            WHERE name = $1
            "#
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(agent)) => KeyLookup::Found(stored(&agent)),
            Ok(None) => KeyLookup::NotFound,
            Err(e) => KeyLookup::Failed(e.into()),
        }
    }

    async fn insert(&self, record: &AgentRecord) -> Result<Uuid, StoreError> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO agents (id, name, gruppe, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING id
            "#
        )
        .bind(Uuid::new_v4())
        .bind(record.name())
        .bind(record.gruppe())
        .bind(record.status())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update(&self, id: Uuid, record: &AgentRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE agents SET gruppe = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(record.gruppe())
        .bind(record.status())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Rejected(format!("agent {} no longer exists", id)));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(DELETE_ALL).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
