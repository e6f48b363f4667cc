//! Continuous HTTP request tracing.
//!
//! A [`scheduler::Scheduler`] polls one url on a fixed interval. Every poll is a
//! traced GET ([`http_probe::probe::TraceClient::capture`]) whose lifecycle
//! offsets are written as one JSON line by the [`emitter::Emitter`].

pub mod config;
pub mod debug;
pub mod emitter;
pub mod http_probe;
pub mod scheduler;
