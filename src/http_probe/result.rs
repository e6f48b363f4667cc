use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use super::error::ProbeError;
use super::report;

/// Timing breakdown of one completed request.
///
/// Every offset is in seconds from `timestamp`. Offsets are `None` (`null` on
/// the wire) when the matching event never fired, e.g. DNS for an IP literal or
/// TLS for plain http.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingRecord {
    #[serde(serialize_with = "serialize_rfc3339_nanos")]
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub get_conn: Option<f64>,
    pub got_conn: Option<f64>,
    pub ttfb: Option<f64>,
    pub dns_start: Option<f64>,
    pub dns_done: Option<f64>,
    pub connect_start: Option<f64>,
    pub connect_done: Option<f64>,
    pub tls_handshake_start: Option<f64>,
    pub tls_handshake_done: Option<f64>,
    pub wrote_request: Option<f64>,
    pub total: f64,
}

impl TimingRecord {
    /// Offsets in causal order, `total` last.
    pub fn causal_offsets(&self) -> [Option<f64>; 11] {
        [
            self.get_conn,
            self.dns_start,
            self.dns_done,
            self.connect_start,
            self.connect_done,
            self.tls_handshake_start,
            self.tls_handshake_done,
            self.got_conn,
            self.wrote_request,
            self.ttfb,
            Some(self.total),
        ]
    }

    /// True when every fired offset is non-negative and none precedes an
    /// earlier milestone.
    pub fn is_ordered(&self) -> bool {
        let mut last = 0.0;
        for offset in self.causal_offsets().into_iter().flatten() {
            if offset < last {
                return false;
            }
            last = offset;
        }
        true
    }
}

fn serialize_rfc3339_nanos<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

/// What a single poll produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Timing(TimingRecord),
    Failed { detail: String },
}

impl PollOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PollOutcome::Failed { .. })
    }
}

impl From<Result<TimingRecord, ProbeError>> for PollOutcome {
    fn from(result: Result<TimingRecord, ProbeError>) -> Self {
        match result {
            Ok(record) => PollOutcome::Timing(record),
            Err(e) => PollOutcome::Failed { detail: report(&e) },
        }
    }
}
