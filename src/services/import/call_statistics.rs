//! Call statistics import mapping

use crate::types::{CallMetrics, CallStatisticKey, CallStatisticRecord, RecordError};

use super::normalize::{FieldMap, FieldSpec, Schema};
use super::store::ImportRecord;
use super::Importable;

const CALL_STATISTIC_FIELDS: &[FieldSpec] = &[
    FieldSpec::key_text("team_name", &["team_name"]),
    FieldSpec::key_text("last_name", &["last_name"]),
    FieldSpec::key_text("first_name", &["first_name"]),
    FieldSpec::date("date", &["DateColumn", "datecolumn", "date_column"]),
    FieldSpec::text("not_ready_reason", &["not_ready_reason"], ""),
    FieldSpec::integer("not_ready_time", &["not_ready_time"]),
    FieldSpec::integer("total_ready_time", &["total_ready_time"]),
    FieldSpec::integer("total_ringing_time_in", &["total_ringing_time_in"]),
    FieldSpec::integer("total_ringing_time_out", &["total_ringing_time_out"]),
    FieldSpec::integer("total_login_time", &["total_login_time"]),
    FieldSpec::integer("total_acw_time_in", &["total_acw_time_in"]),
    FieldSpec::integer("total_acw_time_out", &["total_acw_time_out"]),
    FieldSpec::integer("total_hold_time_in", &["total_hold_time_in"]),
    FieldSpec::integer("total_hold_time_out", &["total_hold_time_out"]),
    FieldSpec::integer("total_talk_time_in", &["total_talk_time_in"]),
    FieldSpec::integer("total_talk_time_out", &["total_talk_time_out"]),
    FieldSpec::integer("num_calls_answered", &["num_calls_answered"]),
    FieldSpec::integer("num_calls_answered_ot", &["num_calls_answered_ot"]),
    FieldSpec::integer("num_calls_out", &["num_calls_out"]),
    FieldSpec::integer("num_calls_rejected", &["num_calls_rejected"]),
    FieldSpec::text("service_name", &["service_name"], ""),
    FieldSpec::time_group(
        "time_group_column30",
        &["TimeGroupColumn30", "timegroupcolumn30", "time_group_column30"],
    ),
];

pub const CALL_STATISTIC_SCHEMA: Schema = Schema {
    kind: "call_statistics",
    fields: CALL_STATISTIC_FIELDS,
};

impl ImportRecord for CallStatisticRecord {
    type Key = CallStatisticKey;

    fn natural_key(&self) -> CallStatisticKey {
        self.key().clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self.metrics() == other.metrics()
    }
}

impl Importable for CallStatisticRecord {
    const SCHEMA: &'static Schema = &CALL_STATISTIC_SCHEMA;

    fn from_fields(f: &FieldMap) -> Result<Self, RecordError> {
        let key = CallStatisticKey {
            team_name: f.text("team_name")?.to_string(),
            last_name: f.text("last_name")?.to_string(),
            first_name: f.text("first_name")?.to_string(),
            date: f.date("date")?,
        };
        let metrics = CallMetrics {
            not_ready_reason: f.text("not_ready_reason")?.to_string(),
            not_ready_time: f.integer("not_ready_time")?,
            total_ready_time: f.integer("total_ready_time")?,
            total_ringing_time_in: f.integer("total_ringing_time_in")?,
            total_ringing_time_out: f.integer("total_ringing_time_out")?,
            total_login_time: f.integer("total_login_time")?,
            total_acw_time_in: f.integer("total_acw_time_in")?,
            total_acw_time_out: f.integer("total_acw_time_out")?,
            total_hold_time_in: f.integer("total_hold_time_in")?,
            total_hold_time_out: f.integer("total_hold_time_out")?,
            total_talk_time_in: f.integer("total_talk_time_in")?,
            total_talk_time_out: f.integer("total_talk_time_out")?,
            num_calls_answered: f.integer("num_calls_answered")?,
            num_calls_answered_ot: f.integer("num_calls_answered_ot")?,
            num_calls_out: f.integer("num_calls_out")?,
            num_calls_rejected: f.integer("num_calls_rejected")?,
            service_name: f.text("service_name")?.to_string(),
            time_group_column30: f.text("time_group_column30")?.to_string(),
        };
        CallStatisticRecord::new(key, metrics)
    }
}
