pub mod error;
pub mod probe;
pub mod result;
pub mod stream;
pub mod trace;

pub mod prelude {
    pub use super::error::ProbeError;
    pub use super::probe::{TraceClient, TraceClientBuilder};
    pub use super::result::{PollOutcome, TimingRecord};
    pub use super::trace::{LifecycleEvent, TimingBuilder};
}

use std::fmt::Write;

/// Renders an error and every error in its `source()` chain on a single line,
/// separated by `": "`.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": {}", src);
        err = src;
    }
    s
}
