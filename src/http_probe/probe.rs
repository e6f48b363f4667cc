use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{ACCEPT, CONNECTION, HOST, LOCATION, USER_AGENT};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant as Deadline;
use tokio_native_tls::TlsConnector as TokioTlsConnector;
use trust_dns_resolver::TokioAsyncResolver;
use url::{Position, Url};

use super::prelude::*;
use super::stream::{MaybeTlsStream, TracedStream};
use crate::config::ConfigError;
use crate::config::app_config::{setup_resolver, setup_tls_connector};

/// Total budget for one traced request, from lookup to response head.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Most requests one capture makes while following redirects.
pub const MAX_REDIRECTS: usize = 10;

/// Smallest share of the remaining budget one address gets before the next is tried.
const MIN_DIAL_ATTEMPT: Duration = Duration::from_secs(2);

pub const DEFAULT_USER_AGENT: &str = concat!("oxytrace/", env!("CARGO_PKG_VERSION"));

/// Issues traced GET requests.
///
/// Configuration is fixed at construction. Connections are never reused: each
/// capture resolves, dials and handshakes its own connection and asks the
/// server to close it, so DNS and connect timings are present on every poll.
#[derive(Clone)]
pub struct TraceClient {
    tls: TokioTlsConnector,
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

pub struct TraceClientBuilder {
    tls: Option<TokioTlsConnector>,
    resolver: Option<TokioAsyncResolver>,
    timeout: Duration,
}

impl TraceClientBuilder {
    pub fn tls_connector(mut self, tls: TokioTlsConnector) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn resolver(mut self, resolver: TokioAsyncResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fills unset parts with a verifying TLS connector and the system resolver.
    pub fn build(self) -> Result<TraceClient, ConfigError> {
        let tls = match self.tls {
            Some(tls) => tls,
            None => setup_tls_connector(false)?,
        };
        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => setup_resolver(&[])?,
        };
        Ok(TraceClient {
            tls,
            resolver,
            timeout: self.timeout,
        })
    }
}

/// Parsed pieces of the target url needed to dial and address it.
struct Target {
    host: String,
    ip: Option<IpAddr>,
    port: u16,
    tls: bool,
    authority: String,
    path_and_query: String,
}

impl Target {
    #[cfg(test)]
    fn parse(raw: &str) -> Result<Self, ProbeError> {
        Self::from_url(&parse_url(raw)?)
    }

    fn from_url(url: &Url) -> Result<Self, ProbeError> {
        let raw = url.as_str();
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(ProbeError::UnsupportedScheme(other.to_string())),
        };

        let (host, ip) = match url.host() {
            Some(url::Host::Domain(domain)) => (domain.to_string(), None),
            Some(url::Host::Ipv4(ip)) => (ip.to_string(), Some(IpAddr::V4(ip))),
            Some(url::Host::Ipv6(ip)) => (ip.to_string(), Some(IpAddr::V6(ip))),
            None => return Err(ProbeError::MissingHost(raw.to_string())),
        };

        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::MissingHost(raw.to_string()))?;

        // `host_str` keeps the brackets around IPv6 literals, as the Host header needs.
        let host_header = url.host_str().unwrap_or(&host);
        let authority = match url.port() {
            Some(port) => format!("{host_header}:{port}"),
            None => host_header.to_string(),
        };

        Ok(Target {
            host,
            ip,
            port,
            tls,
            authority,
            path_and_query: url[Position::BeforePath..Position::AfterQuery].to_string(),
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ProbeError> {
    Url::parse(raw).map_err(|source| ProbeError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

/// Where a response sends the client next, if anywhere.
///
/// Only 301, 302, 303, 307 and 308 with a `Location` header redirect; the
/// location is resolved against the url that produced the response.
fn redirect_target(
    current: &Url,
    response: &Response<Incoming>,
) -> Result<Option<Url>, ProbeError> {
    match response.status() {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => {}
        _ => return Ok(None),
    }
    let Some(location) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = String::from_utf8_lossy(location.as_bytes());
    current
        .join(&location)
        .map(Some)
        .map_err(|source| ProbeError::BadLocation {
            location: location.into_owned(),
            source,
        })
}

/// Time one dial attempt may take when `remaining` is shared by `addrs_left` addresses.
///
/// Each address gets an equal share, but never less than `MIN_DIAL_ATTEMPT`
/// unless the whole remaining budget is smaller than that.
fn attempt_budget(remaining: Duration, addrs_left: usize) -> Duration {
    let share = remaining / u32::try_from(addrs_left.max(1)).unwrap_or(u32::MAX);
    if share >= MIN_DIAL_ATTEMPT {
        share
    } else {
        remaining.min(MIN_DIAL_ATTEMPT)
    }
}

/// Aborts the connection driver when the capture is done with it.
struct ConnectionDriver(JoinHandle<()>);

impl Drop for ConnectionDriver {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl TraceClient {
    pub fn builder() -> TraceClientBuilder {
        TraceClientBuilder {
            tls: None,
            resolver: None,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Performs one GET against `url` and returns its timing breakdown.
    ///
    /// Redirects are followed, each hop over a fresh connection, up to
    /// `MAX_REDIRECTS`. Every hop records into the same builder so the offsets
    /// describe the latest hop, and `total` is taken once the final response
    /// head has arrived. Bodies are discarded unread and connections closed.
    pub async fn capture(&self, url: &str) -> Result<TimingRecord, ProbeError> {
        let parsed = parse_url(url)?;
        let mut timing = TimingBuilder::start(url);
        let deadline = Deadline::now() + self.timeout;

        let followed =
            tokio::time::timeout_at(deadline, self.follow(parsed, &mut timing, deadline)).await;
        let completed = Instant::now();

        match followed {
            Ok(Ok(response)) => {
                log::debug!("{url} answered {}", response.status());
                drop(response);
                Ok(timing.finish(completed))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }

    async fn follow(
        &self,
        mut url: Url,
        timing: &mut TimingBuilder,
        deadline: Deadline,
    ) -> Result<Response<Incoming>, ProbeError> {
        let mut requests = 0;
        loop {
            let target = Target::from_url(&url)?;
            let response = self.exchange(&target, timing, deadline).await?;
            requests += 1;

            let Some(next) = redirect_target(&url, &response)? else {
                return Ok(response);
            };
            if requests >= MAX_REDIRECTS {
                return Err(ProbeError::TooManyRedirects(MAX_REDIRECTS));
            }
            log::debug!("{url} redirected ({}) to {next}", response.status());
            drop(response);
            url = next;
        }
    }

    async fn exchange(
        &self,
        target: &Target,
        timing: &mut TimingBuilder,
        deadline: Deadline,
    ) -> Result<Response<Incoming>, ProbeError> {
        timing.record_now(LifecycleEvent::GetConn);

        let addrs = self.resolve(target, timing).await?;
        let tcp = self.dial(&addrs, timing, deadline).await?;

        let stream = if target.tls {
            timing.record_now(LifecycleEvent::TlsHandshakeStart);
            let tls = self
                .tls
                .connect(&target.host, tcp)
                .await
                .map_err(|source| ProbeError::Tls {
                    host: target.host.clone(),
                    source,
                })?;
            timing.record_now(LifecycleEvent::TlsHandshakeDone);
            MaybeTlsStream::Tls(Box::new(tls))
        } else {
            MaybeTlsStream::Plain(tcp)
        };
        timing.record_now(LifecycleEvent::GotConn);

        let (events, mut observed) = mpsc::unbounded_channel();
        let io = TokioIo::new(TracedStream::new(stream, events));
        let (mut sender, connection) = http1::handshake::<_, Empty<Bytes>>(io).await?;
        let _driver = ConnectionDriver(tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::debug!("connection closed with error: {e}");
            }
        }));

        let request = Request::builder()
            .method(Method::GET)
            .uri(target.path_and_query.as_str())
            .header(HOST, target.authority.as_str())
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .header(ACCEPT, "*/*")
            .header(CONNECTION, "close")
            .body(Empty::<Bytes>::new())?;

        let response = sender.send_request(request).await;

        // Events from the connection driver are already queued by the time the
        // response head is handed over.
        while let Ok((event, at)) = observed.try_recv() {
            timing.record(event, at);
        }

        Ok(response?)
    }

    async fn resolve(
        &self,
        target: &Target,
        timing: &mut TimingBuilder,
    ) -> Result<Vec<SocketAddr>, ProbeError> {
        if let Some(ip) = target.ip {
            return Ok(vec![SocketAddr::new(ip, target.port)]);
        }

        timing.record_now(LifecycleEvent::DnsStart);
        let lookup = self.resolver.lookup_ip(target.host.as_str()).await;
        timing.record_now(LifecycleEvent::DnsDone);

        let addrs: Vec<SocketAddr> = lookup
            .map_err(|source| ProbeError::Dns {
                host: target.host.clone(),
                source,
            })?
            .iter()
            .map(|ip| SocketAddr::new(ip, target.port))
            .collect();

        if addrs.is_empty() {
            return Err(ProbeError::NoAddresses(target.host.clone()));
        }
        Ok(addrs)
    }

    /// Tries each address in order and keeps the first that accepts.
    ///
    /// An address that neither accepts nor refuses is abandoned once its
    /// share of the time left before `deadline` runs out.
    async fn dial(
        &self,
        addrs: &[SocketAddr],
        timing: &mut TimingBuilder,
        deadline: Deadline,
    ) -> Result<TcpStream, ProbeError> {
        timing.record_now(LifecycleEvent::ConnectStart);

        let mut failure = None;
        for (i, addr) in addrs.iter().enumerate() {
            let budget = attempt_budget(
                deadline.saturating_duration_since(Deadline::now()),
                addrs.len() - i,
            );
            let attempt = match tokio::time::timeout(budget, TcpStream::connect(*addr)).await {
                Ok(attempt) => attempt,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {budget:?}"),
                )),
            };
            match attempt {
                Ok(stream) => {
                    timing.record_now(LifecycleEvent::ConnectDone);
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(source) => {
                    log::debug!("dial {addr} failed: {source}");
                    failure = Some(ProbeError::Connect {
                        addr: *addr,
                        source,
                    });
                }
            }
        }

        Err(failure.unwrap_or_else(|| ProbeError::NoAddresses(String::new())))
    }
}
