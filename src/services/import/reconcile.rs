//! Natural-key reconciliation loop

use tracing::{debug, warn};

use crate::types::{ImportIssue, ImportOutcome};

use super::store::{ImportRecord, KeyLookup, RecordStore};

/// A valid record together with its source line
#[derive(Debug, Clone)]
pub struct PendingRecord<R> {
    pub line: usize,
    pub record: R,
}

/// What happened to a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Inserted,
    Updated,
    Unchanged,
    Errored,
}

/// Decide and execute insert / update / no-op for each record, in order.
///
/// One lookup and at most one write per record. A store failure only
/// affects the record it happened on.
pub async fn reconcile<R, S>(store: &S, records: Vec<PendingRecord<R>>, outcome: &mut ImportOutcome)
where
    R: ImportRecord,
    S: RecordStore<R> + ?Sized,
{
    for pending in records {
        let action = reconcile_one(store, &pending, outcome).await;
        match action {
            RowAction::Inserted => outcome.inserted += 1,
            RowAction::Updated => outcome.updated += 1,
            RowAction::Unchanged => outcome.unchanged += 1,
            RowAction::Errored => outcome.errored += 1,
        }
    }
}

async fn reconcile_one<R, S>(store: &S, pending: &PendingRecord<R>, outcome: &mut ImportOutcome) -> RowAction
where
    R: ImportRecord,
    S: RecordStore<R> + ?Sized,
{
    let key = pending.record.natural_key();

    match store.find_by_key(&key).await {
        KeyLookup::NotFound => match store.insert(&pending.record).await {
            Ok(id) => {
                debug!("Row {}: inserted {:?} as {}", pending.line, key, id);
                RowAction::Inserted
            }
            Err(e) => {
                warn!("Row {}: insert of {:?} failed: {}", pending.line, key, e);
                outcome.issues.push(ImportIssue::error(pending.line, "", format!("insert failed: {}", e)));
                RowAction::Errored
            }
        },
        KeyLookup::Found(existing) => {
            if existing.record.same_content(&pending.record) {
                debug!("Row {}: {:?} unchanged", pending.line, key);
                return RowAction::Unchanged;
            }
            match store.update(existing.id, &pending.record).await {
                Ok(()) => {
                    debug!("Row {}: updated {:?} ({})", pending.line, key, existing.id);
                    RowAction::Updated
                }
                Err(e) => {
                    warn!("Row {}: update of {:?} failed: {}", pending.line, key, e);
                    outcome.issues.push(ImportIssue::error(pending.line, "", format!("update failed: {}", e)));
                    RowAction::Errored
                }
            }
        }
        KeyLookup::Failed(e) => {
            warn!("Row {}: lookup of {:?} failed: {}", pending.line, key, e);
            outcome.issues.push(ImportIssue::error(pending.line, "", format!("lookup failed: {}", e)));
            RowAction::Errored
        }
    }
}
