use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use trust_dns_resolver::error::ResolveError;

/// Everything that can make a single traced request fail.
///
/// None of these are fatal to the poll loop; each one becomes the `detail`
/// of an `errors` record.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid url {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),

    #[error("url {0} has no host")]
    MissingHost(String),

    #[error("lookup {host}")]
    Dns {
        host: String,
        #[source]
        source: ResolveError,
    },

    #[error("lookup {0}: no addresses found")]
    NoAddresses(String),

    #[error("dial tcp {addr}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("tls handshake with {host}")]
    Tls {
        host: String,
        #[source]
        source: native_tls::Error,
    },

    #[error("build request")]
    Request(#[from] http::Error),

    #[error("http exchange")]
    Http(#[from] hyper::Error),

    #[error("failed to parse Location header {location:?}")]
    BadLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}
