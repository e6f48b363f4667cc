use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio_native_tls::TlsConnector as TokioTlsConnector;
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts},
    system_conf::read_system_conf,
};
use url::Url;

use super::ConfigError;
use super::cli::Cli;
use crate::http_probe::prelude::*;
use crate::scheduler::ScheduleConfig;

pub struct AppConfig {
    /// The URL exactly as given on the command line; records echo it unchanged.
    pub raw_target: String,
    pub target: Url,
    pub schedule: ScheduleConfig,
    pub dns_hosts: Vec<String>,
    pub accept_invalid_certs: bool,
    pub debug_addr: Option<SocketAddr>,
}

/// Turns the parsed command line into the runtime configuration.
///
/// A negative count means "poll forever", like an absent one. Blank entries in
/// the DNS host list are dropped, so `DNS_HOSTS=""` selects the system resolver.
pub fn load_config(cli: Cli) -> AppConfig {
    let max_count = cli.count.and_then(|count| u64::try_from(count).ok());

    let dns_hosts: Vec<String> = cli
        .dns_hosts
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if dns_hosts.is_empty() {
        log::info!("Using system DNS configuration");
    } else {
        log::info!("Using DNS hosts: {:?}", dns_hosts);
    }

    AppConfig {
        raw_target: cli.url.raw,
        target: cli.url.url,
        schedule: ScheduleConfig {
            interval: Duration::from_secs(cli.interval),
            max_count,
            termination: cli.termination,
        },
        dns_hosts,
        accept_invalid_certs: cli.insecure,
        debug_addr: cli.debug.then_some(cli.debug_addr),
    }
}

impl AppConfig {
    /// Builds the one client every poll of this run shares.
    pub fn build_client(&self) -> Result<TraceClient, ConfigError> {
        TraceClient::builder()
            .tls_connector(setup_tls_connector(self.accept_invalid_certs)?)
            .resolver(setup_resolver(&self.dns_hosts)?)
            .build()
    }
}

/// Setup a TLS connector, optionally accepting invalid certificates
pub fn setup_tls_connector(accept_invalid_certs: bool) -> Result<TokioTlsConnector, ConfigError> {
    let mut builder = native_tls::TlsConnector::builder();
    builder.danger_accept_invalid_certs(accept_invalid_certs);
    let connector = builder.build()?;
    Ok(TokioTlsConnector::from(connector))
}

/// Setup a DNS resolver using the provided DNS hosts.
///
/// With explicit hosts, queries go over TCP to those name servers. Without
/// them the system configuration is used, falling back to the resolver
/// defaults when it cannot be read. The cache is disabled so that every poll
/// performs a real lookup.
pub fn setup_resolver(dns_hosts: &[String]) -> Result<TokioAsyncResolver, ConfigError> {
    let (resolver_config, mut opts) = if dns_hosts.is_empty() {
        match read_system_conf() {
            Ok(system) => system,
            Err(e) => {
                log::warn!("Cannot read system DNS configuration, using defaults: {e}");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        }
    } else {
        let mut name_servers = NameServerConfigGroup::new();
        for host in dns_hosts {
            let ip: IpAddr = host.parse().map_err(|source| ConfigError::InvalidDnsHost {
                host: host.clone(),
                source,
            })?;
            name_servers.push(NameServerConfig {
                socket_addr: (ip, 53).into(),
                protocol: Protocol::Tcp,
                tls_dns_name: None,
                trust_negative_responses: false,
                bind_addr: None,
            });
        }
        let mut opts = ResolverOpts::default();
        opts.attempts = 2;
        opts.timeout = Duration::from_secs(2);
        (ResolverConfig::from_parts(None, vec![], name_servers), opts)
    };

    opts.cache_size = 0;
    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}
