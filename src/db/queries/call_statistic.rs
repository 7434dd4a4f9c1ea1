//! Call statistics database queries

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::services::import::{KeyLookup, RecordStore, StoreError, Stored};
use crate::types::call_statistic::{
    CallMetrics, CallStatistic, CallStatisticFilter, CallStatisticKey, CallStatisticRecord,
};

const COLUMNS: &str = r#"
    id, team_name, last_name, first_name, date_column,
    not_ready_reason, not_ready_time, total_ready_time,
    total_ringing_time_in, total_ringing_time_out, total_login_time,
    total_acw_time_in, total_acw_time_out, total_hold_time_in, total_hold_time_out,
    total_talk_time_in, total_talk_time_out,
    num_calls_answered, num_calls_answered_ot, num_calls_out, num_calls_rejected,
    service_name, time_group_column30, created_at, updated_at
"#;

const DELETE_ALL: &str = "DELETE FROM call_statistics WHERE id IS NOT NULL";

/// Blank filter fields match everything
const FILTER: &str = r#"
    WHERE ($1::text IS NULL OR team_name = $1)
      AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2)
      AND ($3::text IS NULL OR service_name = $3)
      AND ($4::date IS NULL OR date_column >= $4)
      AND ($5::date IS NULL OR date_column <= $5)
"#;

const ORDER: &str = "ORDER BY date_column DESC, team_name, last_name, first_name";

fn filtered<'q, O>(
    sql: &'q str,
    filter: &'q CallStatisticFilter,
    agent_pattern: &'q Option<String>,
) -> QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, PgRow>,
{
    sqlx::query_as::<_, O>(sql)
        .bind(filter.team_name())
        .bind(agent_pattern.as_deref())
        .bind(filter.service_name())
        .bind(filter.date_from)
        .bind(filter.date_to)
}

/// One page of matching rows and the total number of matches
pub async fn list_call_statistics(
    pool: &PgPool,
    filter: &CallStatisticFilter,
) -> Result<(Vec<CallStatistic>, i64)> {
    let pattern = filter.agent_pattern();
    let (limit, offset) = filter.page();

    let count_sql = format!("SELECT COUNT(*) FROM call_statistics {}", FILTER);
    let (total,): (i64,) = filtered(&count_sql, filter, &pattern).fetch_one(pool).await?;

    let page_sql = format!(
        "SELECT {} FROM call_statistics {} {} LIMIT $6 OFFSET $7",
        COLUMNS, FILTER, ORDER
    );
    let items = filtered::<CallStatistic>(&page_sql, filter, &pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((items, total))
}

/// Every matching row, unpaged (export)
pub async fn list_all_matching(pool: &PgPool, filter: &CallStatisticFilter) -> Result<Vec<CallStatistic>> {
    let pattern = filter.agent_pattern();
    let sql = format!("SELECT {} FROM call_statistics {} {}", COLUMNS, FILTER, ORDER);

    let items = filtered::<CallStatistic>(&sql, filter, &pattern)
        .fetch_all(pool)
        .await?;

    Ok(items)
}

/// All rows as import store rows (dry-run seed)
pub async fn load_call_statistic_snapshot(pool: &PgPool) -> Result<Vec<Stored<CallStatisticRecord>>> {
    let sql = format!("SELECT {} FROM call_statistics", COLUMNS);
    let rows = sqlx::query_as::<_, CallStatistic>(&sql).fetch_all(pool).await?;

    Ok(rows.iter().map(stored).collect())
}

fn stored(row: &CallStatistic) -> Stored<CallStatisticRecord> {
    Stored {
        id: row.id,
        record: CallStatisticRecord::from(row),
        updated_at: row.updated_at,
    }
}

/// PostgreSQL-backed statistics store, keyed by team, last name, first name
/// and date
#[derive(Clone)]
pub struct PgCallStatisticStore {
    pool: PgPool,
}

impl PgCallStatisticStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore<CallStatisticRecord> for PgCallStatisticStore {
    async fn find_by_key(&self, key: &CallStatisticKey) -> KeyLookup<CallStatisticRecord> {
        let sql = format!(
            r#"
            SELECT {} FROM call_statistics
            WHERE team_name = $1 AND last_name = $2 AND first_name = $3 AND date_column = $4
            "#,
            COLUMNS
        );
        let result = sqlx::query_as::<_, CallStatistic>(&sql)
            .bind(&key.team_name)
            .bind(&key.last_name)
            .bind(&key.first_name)
            .bind(key.date)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(Some(row)) => KeyLookup::Found(stored(&row)),
            Ok(None) => KeyLookup::NotFound,
            Err(e) => KeyLookup::Failed(e.into()),
        }
    }

    async fn insert(&self, record: &CallStatisticRecord) -> Result<Uuid, StoreError> {
        let key = record.key();
        let m = record.metrics();

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO call_statistics (
                id, team_name, last_name, first_name, date_column,
                not_ready_reason, not_ready_time, total_ready_time,
                total_ringing_time_in, total_ringing_time_out, total_login_time,
                total_acw_time_in, total_acw_time_out, total_hold_time_in, total_hold_time_out,
                total_talk_time_in, total_talk_time_out,
                num_calls_answered, num_calls_answered_ot, num_calls_out, num_calls_rejected,
                service_name, time_group_column30, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, NOW(), NOW()
            )
            RETURNING id
            "#
        )
        .bind(Uuid::new_v4())
        .bind(&key.team_name)
        .bind(&key.last_name)
        .bind(&key.first_name)
        .bind(key.date)
        .bind(&m.not_ready_reason)
        .bind(m.not_ready_time)
        .bind(m.total_ready_time)
        .bind(m.total_ringing_time_in)
        .bind(m.total_ringing_time_out)
        .bind(m.total_login_time)
        .bind(m.total_acw_time_in)
        .bind(m.total_acw_time_out)
        .bind(m.total_hold_time_in)
        .bind(m.total_hold_time_out)
        .bind(m.total_talk_time_in)
        .bind(m.total_talk_time_out)
        .bind(m.num_calls_answered)
        .bind(m.num_calls_answered_ot)
        .bind(m.num_calls_out)
        .bind(m.num_calls_rejected)
        .bind(&m.service_name)
        .bind(&m.time_group_column30)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update(&self, id: Uuid, record: &CallStatisticRecord) -> Result<(), StoreError> {
        let m: &CallMetrics = record.metrics();

        let result = sqlx::query(
            r#"
            UPDATE call_statistics SET
                not_ready_reason = $2, not_ready_time = $3, total_ready_time = $4,
                total_ringing_time_in = $5, total_ringing_time_out = $6, total_login_time = $7,
                total_acw_time_in = $8, total_acw_time_out = $9,
                total_hold_time_in = $10, total_hold_time_out = $11,
                total_talk_time_in = $12, total_talk_time_out = $13,
                num_calls_answered = $14, num_calls_answered_ot = $15,
                num_calls_out = $16, num_calls_rejected = $17,
                service_name = $18, time_group_column30 = $19,
                updated_at = NOW()
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(&m.not_ready_reason)
        .bind(m.not_ready_time)
        .bind(m.total_ready_time)
        .bind(m.total_ringing_time_in)
        .bind(m.total_ringing_time_out)
        .bind(m.total_login_time)
        .bind(m.total_acw_time_in)
        .bind(m.total_acw_time_out)
        .bind(m.total_hold_time_in)
        .bind(m.total_hold_time_out)
        .bind(m.total_talk_time_in)
        .bind(m.total_talk_time_out)
        .bind(m.num_calls_answered)
        .bind(m.num_calls_answered_ot)
        .bind(m.num_calls_out)
        .bind(m.num_calls_rejected)
        .bind(&m.service_name)
        .bind(&m.time_group_column30)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Rejected(format!("call statistic {} no longer exists", id)));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(DELETE_ALL)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_all_targets_every_row() {
        assert_eq!(DELETE_ALL, "DELETE FROM call_statistics WHERE id IS NOT NULL");
    }
}
