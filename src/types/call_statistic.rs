//! Call statistics types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::import::RecordError;

/// Natural key of a statistics row: one agent in one team on one day
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CallStatisticKey {
    pub team_name: String,
    pub last_name: String,
    pub first_name: String,
    #[sqlx(rename = "date_column")]
    pub date: NaiveDate,
}

/// Non-key columns. Times are seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CallMetrics {
    pub not_ready_reason: String,
    pub not_ready_time: i64,
    pub total_ready_time: i64,
    pub total_ringing_time_in: i64,
    pub total_ringing_time_out: i64,
    pub total_login_time: i64,
    pub total_acw_time_in: i64,
    pub total_acw_time_out: i64,
    pub total_hold_time_in: i64,
    pub total_hold_time_out: i64,
    pub total_talk_time_in: i64,
    pub total_talk_time_out: i64,
    pub num_calls_answered: i64,
    pub num_calls_answered_ot: i64,
    pub num_calls_out: i64,
    pub num_calls_rejected: i64,
    pub service_name: String,
    /// Half-hour slot, seconds of day when imported from a spreadsheet time cell
    pub time_group_column30: String,
}

/// Persisted statistics row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CallStatistic {
    pub id: Uuid,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub key: CallStatisticKey,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub metrics: CallMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated statistics content ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatisticRecord {
    key: CallStatisticKey,
    metrics: CallMetrics,
}

impl CallStatisticRecord {
    /// Team, last name and first name must be non-empty
    pub fn new(mut key: CallStatisticKey, metrics: CallMetrics) -> Result<Self, RecordError> {
        key.team_name = key.team_name.trim().to_string();
        key.last_name = key.last_name.trim().to_string();
        key.first_name = key.first_name.trim().to_string();
        if key.team_name.is_empty() {
            return Err(RecordError::MissingField("team_name"));
        }
        if key.last_name.is_empty() {
            return Err(RecordError::MissingField("last_name"));
        }
        if key.first_name.is_empty() {
            return Err(RecordError::MissingField("first_name"));
        }
        Ok(Self { key, metrics })
    }

    pub fn key(&self) -> &CallStatisticKey {
        &self.key
    }

    pub fn metrics(&self) -> &CallMetrics {
        &self.metrics
    }
}

impl From<&CallStatistic> for CallStatisticRecord {
    fn from(row: &CallStatistic) -> Self {
        Self {
            key: row.key.clone(),
            metrics: row.metrics.clone(),
        }
    }
}

fn default_limit() -> i64 {
    500
}

/// Statistics filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatisticFilter {
    pub team_name: Option<String>,
    /// Case-insensitive substring of first or last name
    pub agent: Option<String>,
    pub service_name: Option<String>,
    /// Inclusive
    pub date_from: Option<NaiveDate>,
    /// Inclusive
    pub date_to: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for CallStatisticFilter {
    fn default() -> Self {
        Self {
            team_name: None,
            agent: None,
            service_name: None,
            date_from: None,
            date_to: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl CallStatisticFilter {
    /// Upper bound for a single page
    pub const MAX_LIMIT: i64 = 5000;

    pub fn team_name(&self) -> Option<&str> {
        non_blank(&self.team_name)
    }

    pub fn service_name(&self) -> Option<&str> {
        non_blank(&self.service_name)
    }

    /// `ILIKE` pattern for the agent name search, special characters escaped
    pub fn agent_pattern(&self) -> Option<String> {
        non_blank(&self.agent).map(|agent| {
            let escaped = agent
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
    }

    /// Limit clamped to `1..=MAX_LIMIT`, offset to `>= 0`
    pub fn page(&self) -> (i64, i64) {
        (self.limit.clamp(1, Self::MAX_LIMIT), self.offset.max(0))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Request to export the filtered statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatisticsRequest {
    #[serde(default)]
    pub filter: CallStatisticFilter,
    /// Selected columns in display order; empty selects all
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatisticsResponse {
    pub filename: String,
    pub content_base64: String,
    pub row_count: u32,
}

/// Request for the per-agent overview
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOverviewRequest {
    /// Narrows the statistics before aggregation; paging is ignored
    #[serde(default)]
    pub filter: CallStatisticFilter,
    /// Case-insensitive substring of the agent's full name or the team name
    #[serde(default)]
    pub search: Option<String>,
}

/// Summed times (seconds) and calls for one direction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDirectionTotals {
    pub calls: i64,
    pub talk_time: i64,
    pub hold_time: i64,
    pub acw_time: i64,
    pub total_time: i64,
    /// Average handling time, `total_time / calls`, 0 without calls
    pub aht: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCallSummary {
    /// "First Last"
    pub agent_name: String,
    pub first_name: String,
    pub last_name: String,
    pub inbound: CallDirectionTotals,
    pub outbound: CallDirectionTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamOverview {
    pub team_name: String,
    pub agents: Vec<AgentCallSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOverviewResponse {
    pub teams: Vec<TeamOverview>,
    pub agent_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_record_rejects_missing_first_name() {
        let key = CallStatisticKey {
            team_name: "Support".into(),
            last_name: "Meier".into(),
            first_name: " ".into(),
            date: day(1),
        };
        assert_eq!(
            CallStatisticRecord::new(key, CallMetrics::default()),
            Err(RecordError::MissingField("first_name"))
        );
    }

    #[test]
    fn test_agent_pattern_escapes_wildcards() {
        let filter = CallStatisticFilter {
            agent: Some(" 50%_mei ".into()),
            ..Default::default()
        };
        assert_eq!(filter.agent_pattern().as_deref(), Some(r"%50\%\_mei%"));
    }

    #[test]
    fn test_blank_filters_are_ignored() {
        let filter = CallStatisticFilter {
            team_name: Some("  ".into()),
            agent: Some(String::new()),
            ..Default::default()
        };
        assert!(filter.team_name().is_none());
        assert!(filter.agent_pattern().is_none());
    }

    #[test]
    fn test_page_is_clamped() {
        let filter = CallStatisticFilter {
            limit: 1_000_000,
            offset: -3,
            ..Default::default()
        };
        assert_eq!(filter.page(), (CallStatisticFilter::MAX_LIMIT, 0));
    }

    #[test]
    fn test_filter_deserializes_with_defaults() {
        let filter: CallStatisticFilter = serde_json::from_str(r#"{"teamName":"Sales"}"#).unwrap();
        assert_eq!(filter.limit, 500);
        assert_eq!(filter.offset, 0);
    }
}
