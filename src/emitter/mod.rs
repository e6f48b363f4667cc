use std::io::{self, Stdout, Write};

use serde::Serialize;

use crate::http_probe::prelude::*;
use crate::http_probe::report;

/// One output line: either `{"data": ...}` or `{"errors": [...]}`, never both.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Envelope<'a> {
    Data { data: &'a TimingRecord },
    Errors { errors: [ErrorDetail<'a>; 1] },
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail<'a> {
    pub detail: &'a str,
}

impl<'a> From<&'a PollOutcome> for Envelope<'a> {
    fn from(outcome: &'a PollOutcome) -> Self {
        match outcome {
            PollOutcome::Timing(record) => Envelope::Data { data: record },
            PollOutcome::Failed { detail } => Envelope::Errors {
                errors: [ErrorDetail { detail }],
            },
        }
    }
}

/// Writes poll outcomes as JSON lines.
pub struct Emitter<W> {
    out: W,
}

impl Emitter<Stdout> {
    pub fn stdout() -> Self {
        Emitter::new(io::stdout())
    }
}

impl<W: Write> Emitter<W> {
    pub fn new(out: W) -> Self {
        Emitter { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Writes and flushes one line for `outcome`.
    ///
    /// Failures are logged rather than returned; the result only tells the
    /// caller whether the line made it out.
    pub fn emit(&mut self, outcome: &PollOutcome) -> bool {
        match self.write_line(outcome) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to write poll result: {}", report(&e));
                false
            }
        }
    }

    fn write_line(&mut self, outcome: &PollOutcome) -> io::Result<()> {
        let mut line = serde_json::to_vec(&Envelope::from(outcome))?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.out.flush()
    }
}
