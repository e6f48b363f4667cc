use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::result::TimingRecord;

/// A protocol milestone of one HTTP round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    GetConn,
    DnsStart,
    DnsDone,
    ConnectStart,
    ConnectDone,
    TlsHandshakeStart,
    TlsHandshakeDone,
    GotConn,
    WroteRequest,
    GotFirstResponseByte,
}

/// Collects lifecycle offsets for a single in-flight request.
///
/// The builder has exactly one writer: the capture that created it. Events
/// observed elsewhere (inside the connection driver) are shipped back as
/// `(LifecycleEvent, Instant)` pairs and applied here through `record`, so
/// the fields never need synchronisation.
#[derive(Debug)]
pub struct TimingBuilder {
    url: String,
    timestamp: DateTime<Utc>,
    started: Instant,
    get_conn: Option<Duration>,
    got_conn: Option<Duration>,
    dns_start: Option<Duration>,
    dns_done: Option<Duration>,
    connect_start: Option<Duration>,
    connect_done: Option<Duration>,
    tls_handshake_start: Option<Duration>,
    tls_handshake_done: Option<Duration>,
    wrote_request: Option<Duration>,
    first_response_byte: Option<Duration>,
}

impl TimingBuilder {
    /// Starts the clock for a request to `url`.
    pub fn start(url: &str) -> Self {
        Self::started_at(url, Utc::now(), Instant::now())
    }

    pub fn started_at(url: &str, timestamp: DateTime<Utc>, started: Instant) -> Self {
        TimingBuilder {
            url: url.to_string(),
            timestamp,
            started,
            get_conn: None,
            got_conn: None,
            dns_start: None,
            dns_done: None,
            connect_start: None,
            connect_done: None,
            tls_handshake_start: None,
            tls_handshake_done: None,
            wrote_request: None,
            first_response_byte: None,
        }
    }

    /// Stores the offset of `event`. A repeated event overwrites the earlier value.
    pub fn record(&mut self, event: LifecycleEvent, at: Instant) {
        let offset = Some(at.saturating_duration_since(self.started));
        let slot = match event {
            LifecycleEvent::GetConn => &mut self.get_conn,
            LifecycleEvent::DnsStart => &mut self.dns_start,
            LifecycleEvent::DnsDone => &mut self.dns_done,
            LifecycleEvent::ConnectStart => &mut self.connect_start,
            LifecycleEvent::ConnectDone => &mut self.connect_done,
            LifecycleEvent::TlsHandshakeStart => &mut self.tls_handshake_start,
            LifecycleEvent::TlsHandshakeDone => &mut self.tls_handshake_done,
            LifecycleEvent::GotConn => &mut self.got_conn,
            LifecycleEvent::WroteRequest => &mut self.wrote_request,
            LifecycleEvent::GotFirstResponseByte => &mut self.first_response_byte,
        };
        *slot = offset;
    }

    pub fn record_now(&mut self, event: LifecycleEvent) {
        self.record(event, Instant::now());
    }

    /// Freezes the builder into a record; `completed` marks the end of the round trip.
    pub fn finish(self, completed: Instant) -> TimingRecord {
        let secs = |d: Option<Duration>| d.map(|d| d.as_secs_f64());
        TimingRecord {
            timestamp: self.timestamp,
            url: self.url,
            get_conn: secs(self.get_conn),
            got_conn: secs(self.got_conn),
            ttfb: secs(self.first_response_byte),
            dns_start: secs(self.dns_start),
            dns_done: secs(self.dns_done),
            connect_start: secs(self.connect_start),
            connect_done: secs(self.connect_done),
            tls_handshake_start: secs(self.tls_handshake_start),
            tls_handshake_done: secs(self.tls_handshake_done),
            wrote_request: secs(self.wrote_request),
            total: completed.saturating_duration_since(self.started).as_secs_f64(),
        }
    }
}
