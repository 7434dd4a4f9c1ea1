//! Command-line import, export and bulk delete

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use sqlx::PgPool;
use tracing::info;

use crate::cli::DataKind;
use crate::db::queries::{agent, call_statistic};
use crate::services::export;
use crate::services::import::{self, MemoryStore};
use crate::types::{
    AgentRecord, CallStatisticFilter, CallStatisticRecord, DeleteAllResponse, ImportIssueLevel, ImportOutcome,
};

impl DataKind {
    /// German plural used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            DataKind::Agents => "Agenten",
            DataKind::Stats => "Anrufstatistiken",
        }
    }
}

/// Import a file from disk. With `dry_run` the reconciliation runs against an
/// in-memory copy of the table and nothing is written.
pub async fn import_file(pool: &PgPool, kind: DataKind, path: &Path, dry_run: bool) -> Result<ImportOutcome> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name: {}", path.display()))?;
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let today = Local::now().date_naive();

    let outcome = match (kind, dry_run) {
        (DataKind::Agents, false) => {
            let store = agent::PgAgentStore::new(pool.clone());
            import::run_import::<AgentRecord, _>(&store, filename, &content, today).await?
        }
        (DataKind::Agents, true) => {
            let store = MemoryStore::from_rows(agent::load_agent_snapshot(pool).await?);
            import::run_import::<AgentRecord, _>(&store, filename, &content, today).await?
        }
        (DataKind::Stats, false) => {
            let store = call_statistic::PgCallStatisticStore::new(pool.clone());
            import::run_import::<CallStatisticRecord, _>(&store, filename, &content, today).await?
        }
        (DataKind::Stats, true) => {
            let store = MemoryStore::from_rows(call_statistic::load_call_statistic_snapshot(pool).await?);
            import::run_import::<CallStatisticRecord, _>(&store, filename, &content, today).await?
        }
    };

    print_outcome(&outcome, dry_run);
    Ok(outcome)
}

fn print_outcome(outcome: &ImportOutcome, dry_run: bool) {
    if dry_run {
        println!("Probelauf, es wurde nichts gespeichert.");
    }
    println!("{}", outcome.summary());

    for issue in &outcome.issues {
        let level = match issue.level {
            ImportIssueLevel::Info => "info",
            ImportIssueLevel::Warning => "warnung",
            ImportIssueLevel::Error => "fehler",
        };
        match &issue.original_value {
            Some(value) => println!(
                "  Zeile {} [{}] {}: {} ({:?})",
                issue.row_number, level, issue.field, issue.message, value
            ),
            None => println!("  Zeile {} [{}] {}: {}", issue.row_number, level, issue.field, issue.message),
        }
    }
}

/// Write the filtered statistics to `<out_dir>/<generated name>.xlsx`
pub async fn export_statistics(
    pool: &PgPool,
    filter: &CallStatisticFilter,
    columns: &[String],
    out_dir: &Path,
) -> Result<PathBuf> {
    let stats = call_statistic::list_all_matching(pool, filter).await?;
    let file = export::export_statistics(&stats, columns, &Local::now())?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let path = out_dir.join(&file.filename);
    tokio::fs::write(&path, &file.bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Exported {} call statistics to {}", file.row_count, path.display());
    println!("{} Zeilen exportiert: {}", file.row_count, path.display());
    Ok(path)
}

/// Delete every row of `kind`, asking on stdin unless `yes`
pub async fn delete_all(pool: &PgPool, kind: DataKind, yes: bool) -> Result<DeleteAllResponse> {
    if !yes && !confirm(&format!("Wirklich alle {} löschen? [j/N] ", kind.label()))? {
        bail!("Aborted");
    }

    let deleted = match kind {
        DataKind::Agents => {
            import::delete_all::<AgentRecord, _>(&agent::PgAgentStore::new(pool.clone())).await?
        }
        DataKind::Stats => {
            import::delete_all::<CallStatisticRecord, _>(&call_statistic::PgCallStatisticStore::new(pool.clone()))
                .await?
        }
    };

    let response = DeleteAllResponse::new(deleted, kind.label());
    println!("{}", response.message);
    Ok(response)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{}", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "j" | "ja" | "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_answers() {
        assert!(is_yes("j\n"));
        assert!(is_yes(" Ja "));
        assert!(is_yes("yes"));
        assert!(!is_yes(""));
        assert!(!is_yes("nein"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(DataKind::Agents.label(), "Agenten");
        assert_eq!(DeleteAllResponse::new(3, DataKind::Stats.label()).deleted, 3);
    }
}
