//! Agent roster types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::import::RecordError;

/// Group assigned when none is given
pub const DEFAULT_GROUP: &str = "DE";

/// Agent status as stored in the `agent_status` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Type)]
#[sqlx(type_name = "agent_status")]
pub enum AgentStatus {
    #[default]
    #[sqlx(rename = "aktiv")]
    #[serde(rename = "aktiv")]
    Active,
    #[sqlx(rename = "off")]
    #[serde(rename = "off")]
    Inactive,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "aktiv",
            AgentStatus::Inactive => "off",
        }
    }

    pub fn from_active(active: bool) -> Self {
        if active {
            AgentStatus::Active
        } else {
            AgentStatus::Inactive
        }
    }
}

/// Agent entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub gruppe: String,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated agent content ready to be written.
///
/// `name` is the natural key; it is trimmed and must not be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    name: String,
    gruppe: String,
    status: AgentStatus,
}

impl AgentRecord {
    pub fn new(name: &str, gruppe: &str, status: AgentStatus) -> Result<Self, RecordError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RecordError::MissingField("name"));
        }
        let gruppe = match gruppe.trim() {
            "" => DEFAULT_GROUP,
            g => g,
        };
        Ok(Self {
            name: name.to_string(),
            gruppe: gruppe.to_string(),
            status,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gruppe(&self) -> &str {
        &self.gruppe
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }
}

impl From<&Agent> for AgentRecord {
    fn from(agent: &Agent) -> Self {
        Self {
            name: agent.name.clone(),
            gruppe: agent.gruppe.clone(),
            status: agent.status,
        }
    }
}

/// Request to create an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub name: String,
    pub gruppe: Option<String>,
    pub status: Option<AgentStatus>,
}

impl CreateAgentRequest {
    pub fn to_record(&self) -> Result<AgentRecord, RecordError> {
        AgentRecord::new(
            &self.name,
            self.gruppe.as_deref().unwrap_or(DEFAULT_GROUP),
            self.status.unwrap_or_default(),
        )
    }
}

/// Request to update an agent (partial)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentRequest {
    pub id: Uuid,
    pub name: Option<String>,
    pub gruppe: Option<String>,
    pub status: Option<AgentStatus>,
}

/// Roster filter, applied after loading the ordered list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFilter {
    /// Case-insensitive substring of the agent name
    pub search: Option<String>,
    pub gruppe: Option<String>,
    pub status: Option<AgentStatus>,
}

impl AgentFilter {
    pub fn matches(&self, agent: &Agent) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if !agent.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        if let Some(gruppe) = self.gruppe.as_deref().filter(|g| !g.is_empty()) {
            if agent.gruppe != gruppe {
                return false;
            }
        }
        match self.status {
            Some(status) => agent.status == status,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentListResponse {
    pub items: Vec<Agent>,
    /// Size of the whole roster before filtering
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
}

impl AgentListResponse {
    pub fn build(agents: Vec<Agent>, filter: &AgentFilter) -> Self {
        let total = agents.len() as i64;
        let active = agents.iter().filter(|a| a.status == AgentStatus::Active).count() as i64;
        let items: Vec<Agent> = agents.into_iter().filter(|a| filter.matches(a)).collect();
        Self {
            items,
            total,
            active,
            inactive: total - active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, gruppe: &str, status: AgentStatus) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: name.into(),
            gruppe: gruppe.into(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_requires_name() {
        assert_eq!(
            AgentRecord::new("   ", "DE", AgentStatus::Active),
            Err(RecordError::MissingField("name"))
        );
    }

    #[test]
    fn test_record_defaults_blank_group() {
        let record = AgentRecord::new(" Alice ", "", AgentStatus::Active).unwrap();
        assert_eq!(record.name(), "Alice");
        assert_eq!(record.gruppe(), "DE");
    }

    #[test]
    fn test_status_serde_uses_stored_literals() {
        assert_eq!(serde_json::to_string(&AgentStatus::Active).unwrap(), "\"aktiv\"");
        assert_eq!(serde_json::from_str::<AgentStatus>("\"off\"").unwrap(), AgentStatus::Inactive);
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let filter = AgentFilter {
            search: Some("ALI".into()),
            ..Default::default()
        };
        assert!(filter.matches(&agent("Alice", "DE", AgentStatus::Active)));
        assert!(!filter.matches(&agent("Bob", "DE", AgentStatus::Active)));
    }

    #[test]
    fn test_list_response_counts_whole_roster() {
        let agents = vec![
            agent("Alice", "DE", AgentStatus::Active),
            agent("Bob", "EN", AgentStatus::Inactive),
            agent("Carla", "EN", AgentStatus::Active),
        ];
        let filter = AgentFilter {
            gruppe: Some("EN".into()),
            status: Some(AgentStatus::Active),
            ..Default::default()
        };
        let response = AgentListResponse::build(agents, &filter);
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].name, "Carla");
        assert_eq!(response.total, 3);
        assert_eq!(response.active, 2);
        assert_eq!(response.inactive, 1);
    }
}
