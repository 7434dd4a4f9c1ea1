//! Per-agent call aggregation and its Excel sheet

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone};

use crate::services::export::{write_sheet, ExportCell, ExportError, ExportFile};
use crate::types::{AgentCallSummary, CallDirectionTotals, CallStatistic, TeamOverview};

pub const SHEET_NAME: &str = "Agentenstatistiken";

const COLUMNS: &[&str] = &[
    "Datum",
    "Team",
    "Agent Name",
    "Inbound Anrufe",
    "Inbound Gesprächszeit (s)",
    "Inbound Haltezeit (s)",
    "Inbound ACW Zeit (s)",
    "Inbound Gesamtzeit (s)",
    "Inbound AHT (s)",
    "Outbound Anrufe",
    "Outbound Gesprächszeit (s)",
    "Outbound Haltezeit (s)",
    "Outbound ACW Zeit (s)",
    "Outbound Gesamtzeit (s)",
    "Outbound AHT (s)",
];

#[derive(Default)]
struct Sums {
    calls: i64,
    talk: i64,
    hold: i64,
    acw: i64,
}

impl Sums {
    fn add(&mut self, calls: i64, talk: i64, hold: i64, acw: i64) {
        self.calls += calls;
        self.talk += talk;
        self.hold += hold;
        self.acw += acw;
    }

    fn totals(&self) -> CallDirectionTotals {
        let total_time = self.talk + self.hold + self.acw;
        CallDirectionTotals {
            calls: self.calls,
            talk_time: self.talk,
            hold_time: self.hold,
            acw_time: self.acw,
            total_time,
            aht: average_handling_time(total_time, self.calls),
        }
    }
}

/// Handling time per call, 0 when there were no calls
pub fn average_handling_time(total_time: i64, calls: i64) -> f64 {
    if calls > 0 {
        total_time as f64 / calls as f64
    } else {
        0.0
    }
}

/// Group statistics by team and agent and sum inbound and outbound figures.
///
/// An agent appearing in two teams is summarized once per team. `search`
/// keeps agents whose full name or team contains it (case-insensitive).
/// Teams and agents are sorted by name.
pub fn aggregate(stats: &[CallStatistic], search: Option<&str>) -> Vec<TeamOverview> {
    let needle = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut teams: BTreeMap<&str, BTreeMap<(&str, &str), (Sums, Sums)>> = BTreeMap::new();
    for stat in stats {
        let key = &stat.key;
        let m = &stat.metrics;
        let (inbound, outbound) = teams
            .entry(key.team_name.as_str())
            .or_default()
            .entry((key.first_name.as_str(), key.last_name.as_str()))
            .or_default();
        inbound.add(m.num_calls_answered, m.total_talk_time_in, m.total_hold_time_in, m.total_acw_time_in);
        outbound.add(m.num_calls_out, m.total_talk_time_out, m.total_hold_time_out, m.total_acw_time_out);
    }

    teams
        .into_iter()
        .filter_map(|(team, agents)| {
            let team_matches = needle
                .as_deref()
                .is_some_and(|n| team.to_lowercase().contains(n));

            let agents: Vec<AgentCallSummary> = agents
                .into_iter()
                .map(|((first, last), (inbound, outbound))| AgentCallSummary {
                    agent_name: format!("{} {}", first, last),
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    inbound: inbound.totals(),
                    outbound: outbound.totals(),
                })
                .filter(|agent| match needle.as_deref() {
                    None => true,
                    Some(n) => team_matches || agent.agent_name.to_lowercase().contains(n),
                })
                .collect();

            (!agents.is_empty()).then(|| TeamOverview {
                team_name: team.to_string(),
                agents,
            })
        })
        .collect()
}

/// `agentenstatistiken_19-10-2026.xlsx`
pub fn overview_filename<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("agentenstatistiken_{}.xlsx", now.format("%d-%m-%Y"))
}

/// One row per agent, stamped with the export date
pub fn export_overview<Tz: TimeZone>(teams: &[TeamOverview], now: &DateTime<Tz>) -> Result<ExportFile, ExportError>
where
    Tz::Offset: std::fmt::Display,
{
    let date = now.format("%d.%m.%Y").to_string();

    let rows: Vec<Vec<ExportCell>> = teams
        .iter()
        .flat_map(|team| {
            let date = &date;
            team.agents.iter().map(move |agent| {
                let mut row = vec![
                    ExportCell::Text(date.clone()),
                    ExportCell::Text(team.team_name.clone()),
                    ExportCell::Text(agent.agent_name.clone()),
                ];
                row.extend(direction_cells(&agent.inbound));
                row.extend(direction_cells(&agent.outbound));
                row
            })
        })
        .collect();

    let bytes = write_sheet(SHEET_NAME, COLUMNS, &rows)?;
    Ok(ExportFile {
        filename: overview_filename(now),
        bytes,
        row_count: rows.len() as u32,
    })
}

fn direction_cells(totals: &CallDirectionTotals) -> [ExportCell; 6] {
    [
        ExportCell::Number(totals.calls),
        ExportCell::Number(totals.talk_time),
        ExportCell::Number(totals.hold_time),
        ExportCell::Number(totals.acw_time),
        ExportCell::Number(totals.total_time),
        ExportCell::Decimal(totals.aht),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::import::decode::decode_file;
    use crate::types::{CallMetrics, CallStatisticKey, CellValue};
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn stat(team: &str, first: &str, last: &str, day: u32, metrics: CallMetrics) -> CallStatistic {
        CallStatistic {
            id: Uuid::new_v4(),
            key: CallStatisticKey {
                team_name: team.into(),
                last_name: last.into(),
                first_name: first.into(),
                date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            },
            metrics,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn inbound(calls: i64, talk: i64, hold: i64, acw: i64) -> CallMetrics {
        CallMetrics {
            num_calls_answered: calls,
            total_talk_time_in: talk,
            total_hold_time_in: hold,
            total_acw_time_in: acw,
            ..Default::default()
        }
    }

    #[test]
    fn test_aht_without_calls_is_zero() {
        assert_eq!(average_handling_time(0, 0), 0.0);
        assert_eq!(average_handling_time(120, 0), 0.0);
        assert_eq!(average_handling_time(300, 4), 75.0);
    }

    #[test]
    fn test_days_are_summed_per_agent() {
        let stats = vec![
            stat("Hotline", "Anna", "Meier", 2, inbound(4, 200, 40, 60)),
            stat("Hotline", "Anna", "Meier", 3, inbound(2, 100, 0, 0)),
        ];

        let teams = aggregate(&stats, None);

        assert_eq!(teams.len(), 1);
        let anna = &teams[0].agents[0];
        assert_eq!(anna.agent_name, "Anna Meier");
        assert_eq!(anna.inbound.calls, 6);
        assert_eq!(anna.inbound.total_time, 400);
        assert!((anna.inbound.aht - 400.0 / 6.0).abs() < 1e-9);
        assert_eq!(anna.outbound.calls, 0);
        assert_eq!(anna.outbound.aht, 0.0);
    }

    #[test]
    fn test_same_agent_in_two_teams_is_kept_apart() {
        let stats = vec![
            stat("Hotline", "Anna", "Meier", 2, inbound(4, 200, 0, 0)),
            stat("Vertrieb", "Anna", "Meier", 2, inbound(1, 50, 0, 0)),
        ];

        let teams = aggregate(&stats, None);

        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0].team_name, "Hotline");
        assert_eq!(teams[0].agents[0].inbound.calls, 4);
        assert_eq!(teams[1].agents[0].inbound.calls, 1);
    }

    #[test]
    fn test_search_matches_agent_or_team() {
        let stats = vec![
            stat("Hotline", "Anna", "Meier", 2, CallMetrics::default()),
            stat("Hotline", "Bernd", "Schulz", 2, CallMetrics::default()),
            stat("Vertrieb", "Carla", "Wolf", 2, CallMetrics::default()),
        ];

        let by_agent = aggregate(&stats, Some("SCHULZ"));
        assert_eq!(by_agent.len(), 1);
        assert_eq!(by_agent[0].agents.len(), 1);
        assert_eq!(by_agent[0].agents[0].agent_name, "Bernd Schulz");

        let by_team = aggregate(&stats, Some("vertr"));
        assert_eq!(by_team.len(), 1);
        assert_eq!(by_team[0].team_name, "Vertrieb");

        assert!(aggregate(&stats, Some("niemand")).is_empty());
        assert_eq!(aggregate(&stats, Some("  ")).len(), 2);
    }

    #[test]
    fn test_overview_export_sheet() {
        let stats = vec![stat("Hotline", "Anna", "Meier", 2, inbound(3, 100, 0, 0))];
        let teams = aggregate(&stats, None);
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();

        let file = export_overview(&teams, &now).unwrap();

        assert_eq!(file.filename, "agentenstatistiken_19-10-2026.xlsx");
        assert_eq!(file.row_count, 1);
        let rows = decode_file(&file.filename, &file.bytes).unwrap();
        assert_eq!(rows[0].get("Datum"), Some(&CellValue::Text("19.10.2026".into())));
        assert_eq!(rows[0].get("Agent Name"), Some(&CellValue::Text("Anna Meier".into())));
        assert_eq!(rows[0].get("Inbound Anrufe"), Some(&CellValue::Number(3.0)));
        let aht = match rows[0].get("Inbound AHT (s)") {
            Some(CellValue::Number(n)) => *n,
            other => panic!("unexpected AHT cell {:?}", other),
        };
        assert!((aht - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_overview_is_no_data() {
        let now = Utc::now();
        assert!(matches!(export_overview(&[], &now), Err(ExportError::NoData)));
    }
}
