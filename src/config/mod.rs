pub mod app_config;
pub mod cli;

use std::net::SocketAddr;

/// Failures while turning the command line into a runnable setup.
///
/// These are the only fatal errors: they stop the process before the first poll.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid DNS host {host:?}")]
    InvalidDnsHost {
        host: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to build TLS connector")]
    Tls(#[from] native_tls::Error),

    #[error("failed to bind debug endpoint on {addr}")]
    DebugBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
