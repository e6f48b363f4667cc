use std::net::SocketAddr;

use clap::Parser;
use url::Url;

use crate::scheduler::Termination;

const ABOUT: &str = "oxytrace makes a GET request to a URL and reports on the timings.";

const LONG_ABOUT: &str = "oxytrace makes a GET request to a URL and reports on the timings.

Every poll writes one JSON line to stdout: {\"data\": {...}} with offsets in seconds from the
start of the request, or {\"errors\": [{\"detail\": \"...\"}]} when the request failed.
Diagnostics go to stderr.";

/// The URL argument as typed, alongside its parsed form.
///
/// Records report `raw`; the parsed form is only used for validation and logs.
#[derive(Debug, Clone)]
pub struct TargetArg {
    pub raw: String,
    pub url: Url,
}

/// Command line of the `oxytrace` binary.
#[derive(Debug, Parser)]
#[command(name = "oxytrace", version, about = ABOUT, long_about = LONG_ABOUT)]
pub struct Cli {
    /// URL to poll (http or https).
    #[arg(value_name = "URL", value_parser = parse_target)]
    pub url: TargetArg,

    /// Positive number of seconds to wait between making requests.
    #[arg(
        short,
        long,
        env = "OXYTRACE_INTERVAL",
        default_value_t = 2,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Positive number of requests to make. Negative or absent polls forever.
    #[arg(
        short,
        long,
        env = "OXYTRACE_COUNT",
        allow_negative_numbers = true,
        value_parser = parse_count
    )]
    pub count: Option<i64>,

    /// How a request count ends the run: after that many polls, or once
    /// (count - 1) * interval seconds have elapsed.
    #[arg(long, value_enum, default_value_t = Termination::Ticks)]
    pub termination: Termination,

    /// Serve scheduler counters at http://<debug-addr>/debug/vars.
    #[arg(long)]
    pub debug: bool,

    /// Listen address of the debug endpoint.
    #[arg(long, default_value = "127.0.0.1:6060")]
    pub debug_addr: SocketAddr,

    /// Accept invalid TLS certificates.
    #[arg(long)]
    pub insecure: bool,

    /// Comma separated name server IPs. Uses the system resolver configuration when empty.
    #[arg(long, env = "DNS_HOSTS", value_delimiter = ',')]
    pub dns_hosts: Vec<String>,

    /// Log level for stderr diagnostics (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

fn parse_target(raw: &str) -> Result<TargetArg, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid url: {e}"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {other:?}, expected http or https")),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("url has no host".to_string());
    }
    Ok(TargetArg {
        raw: raw.to_string(),
        url,
    })
}

fn parse_count(raw: &str) -> Result<i64, String> {
    let count: i64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("not a number: {e}"))?;
    if count == 0 {
        return Err("count must be positive (or negative to poll forever)".to_string());
    }
    Ok(count)
}
