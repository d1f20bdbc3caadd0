//! Reachability probes through a single ISP proxy

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client};
use tracing::{debug, warn};

use super::classifier::classify;
use crate::config::ProbeConfig;
use crate::models::{Classification, ProxyConnection};

/// Scheme used for one half of a probe pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Root URL of `domain` for this scheme
    pub fn url_for(&self, domain: &str) -> String {
        format!("{}://{}/", self.as_str(), domain.trim().trim_end_matches('/'))
    }
}

/// Why a probe did not get an HTTP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Dns,
    Timeout,
    Connect,
    Other,
}

/// Result of a single protocol probe. Probes never fail; transport errors
/// are folded into `Unreached`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOutcome {
    Reached {
        code: u16,
        /// The certificate could not be verified, the host answered anyway
        certificate_warning: bool,
    },
    Unreached {
        kind: FailureKind,
        message: String,
    },
}

impl ProtocolOutcome {
    pub fn reached(code: u16) -> Self {
        ProtocolOutcome::Reached {
            code,
            certificate_warning: false,
        }
    }

    pub fn unreached(kind: FailureKind) -> Self {
        let message = match kind {
            FailureKind::Dns => "DNS resolution failed",
            FailureKind::Timeout | FailureKind::Connect => "Connection failed or timeout",
            FailureKind::Other => "Request failed",
        };
        ProtocolOutcome::Unreached {
            kind,
            message: message.to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ProtocolOutcome::Unreached {
            kind: FailureKind::Other,
            message: message.into(),
        }
    }

    pub fn is_reached(&self) -> bool {
        matches!(self, ProtocolOutcome::Reached { .. })
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            ProtocolOutcome::Reached { code, .. } => Some(*code),
            ProtocolOutcome::Unreached { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ProtocolOutcome::Reached { .. } => None,
            ProtocolOutcome::Unreached { kind, .. } => Some(*kind),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ProtocolOutcome::Reached { .. } => None,
            ProtocolOutcome::Unreached { message, .. } => Some(message),
        }
    }
}

/// Issues reachability requests through a proxy
#[async_trait]
pub trait Prober: Send + Sync {
    /// One request to `protocol://domain/` through `proxy`. Exactly one attempt.
    async fn probe_protocol(
        &self,
        domain: &str,
        protocol: Protocol,
        proxy: &ProxyConnection,
    ) -> ProtocolOutcome;

    /// HTTP and HTTPS probes run concurrently, then classified together
    async fn probe(&self, domain: &str, proxy: &ProxyConnection) -> Classification {
        let (http, https) = tokio::join!(
            self.probe_protocol(domain, Protocol::Http, proxy),
            self.probe_protocol(domain, Protocol::Https, proxy),
        );

        debug!(
            domain = %domain,
            proxy = %proxy.redacted(),
            http = ?http,
            https = ?https,
            "Probe pair settled"
        );

        classify(&http, &https)
    }

    /// Same as [`Prober::probe`] for a raw proxy URL. A URL that cannot be
    /// parsed yields an `ERROR` classification without probing.
    async fn probe_url(&self, domain: &str, proxy_url: &str) -> Classification {
        match ProxyConnection::parse(proxy_url) {
            Ok(proxy) => self.probe(domain, &proxy).await,
            Err(e) => Classification::error(e.to_string()),
        }
    }
}

/// Prober backed by a `reqwest` client routed through the proxy
#[derive(Debug, Clone)]
pub struct HttpProber {
    timeout: Duration,
    max_redirects: usize,
    user_agent: String,
}

impl HttpProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_redirects: config.max_redirects,
            user_agent: config.user_agent.clone(),
        }
    }

    fn client_for(&self, proxy: &ProxyConnection) -> reqwest::Result<Client> {
        Client::builder()
            .proxy(reqwest::Proxy::all(proxy.client_url())?)
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .redirect(redirect::Policy::limited(self.max_redirects))
            .build()
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe_protocol(
        &self,
        domain: &str,
        protocol: Protocol,
        proxy: &ProxyConnection,
    ) -> ProtocolOutcome {
        let client = match self.client_for(proxy) {
            Ok(client) => client,
            Err(e) => return ProtocolOutcome::failed(format!("Proxy client error: {}", e)),
        };

        match client.get(protocol.url_for(domain)).send().await {
            Ok(response) => ProtocolOutcome::reached(response.status().as_u16()),
            Err(e) => outcome_from_error(domain, protocol, &e),
        }
    }
}

fn outcome_from_error(domain: &str, protocol: Protocol, err: &reqwest::Error) -> ProtocolOutcome {
    let failure = RequestFailure {
        chain: error_chain(err),
        timed_out: err.is_timeout(),
        connect_failed: err.is_connect(),
    };
    let outcome = failure.outcome(protocol, err.to_string());

    if let ProtocolOutcome::Reached {
        certificate_warning: true,
        ..
    } = outcome
    {
        warn!(
            domain = %domain,
            error = %err,
            "Certificate could not be verified, counting host as reachable"
        );
    }
    outcome
}

/// What a failed request reported, reduced to the parts the outcome depends on
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestFailure {
    /// Lowercased messages of the error and its sources
    chain: String,
    timed_out: bool,
    connect_failed: bool,
}

impl RequestFailure {
    /// Certificate errors only count as reached over HTTPS. DNS markers win
    /// over the timeout and connect flags.
    fn outcome(&self, protocol: Protocol, message: String) -> ProtocolOutcome {
        if protocol == Protocol::Https && self.chain.contains("certificate") {
            return ProtocolOutcome::Reached {
                code: 200,
                certificate_warning: true,
            };
        }

        if is_dns_failure(&self.chain) {
            ProtocolOutcome::unreached(FailureKind::Dns)
        } else if self.timed_out {
            ProtocolOutcome::unreached(FailureKind::Timeout)
        } else if self.connect_failed {
            ProtocolOutcome::unreached(FailureKind::Connect)
        } else {
            ProtocolOutcome::failed(message)
        }
    }
}

/// Lowercased messages of the error and all of its sources
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ").to_lowercase()
}

fn is_dns_failure(chain: &str) -> bool {
    const DNS_MARKERS: &[&str] = &[
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "no such host",
        "nodename nor servname",
    ];
    DNS_MARKERS.iter().any(|marker| chain.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockStatus;
    use crate::test_support::ScriptedProber;

    #[derive(Debug)]
    struct Wrapped {
        message: &'static str,
        source: Option<Box<Wrapped>>,
    }

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.source.as_deref().map(|s| s as &(dyn StdError + 'static))
        }
    }

    #[test]
    fn test_url_for() {
        assert_eq!(Protocol::Http.url_for("example.com"), "http://example.com/");
        assert_eq!(Protocol::Https.url_for(" example.com/ "), "https://example.com/");
    }

    #[test]
    fn test_error_chain_walks_sources() {
        let err = Wrapped {
            message: "error sending request",
            source: Some(Box::new(Wrapped {
                message: "DNS error: failed to lookup address information",
                source: None,
            })),
        };
        let chain = error_chain(&err);
        assert!(chain.starts_with("error sending request"));
        assert!(is_dns_failure(&chain));
        assert!(!is_dns_failure("connection refused"));
    }

    #[test]
    fn test_unreached_messages() {
        assert_eq!(
            ProtocolOutcome::unreached(FailureKind::Dns).message(),
            Some("DNS resolution failed")
        );
        assert_eq!(
            ProtocolOutcome::unreached(FailureKind::Connect).message(),
            Some("Connection failed or timeout")
        );
        assert_eq!(ProtocolOutcome::reached(301).code(), Some(301));
        assert!(ProtocolOutcome::reached(500).is_reached());
    }

    fn failure(chain: &str, timed_out: bool, connect_failed: bool) -> RequestFailure {
        RequestFailure {
            chain: chain.to_string(),
            timed_out,
            connect_failed,
        }
    }

    #[test]
    fn test_certificate_error_over_https_counts_as_reached() {
        let err = failure(
            "error sending request: invalid peer certificate: unknownissuer",
            false,
            true,
        );

        assert_eq!(
            err.outcome(Protocol::Https, "tls".to_string()),
            ProtocolOutcome::Reached {
                code: 200,
                certificate_warning: true,
            }
        );
    }

    #[test]
    fn test_certificate_text_over_http_is_not_reached() {
        let err = failure("connection closed: certificate required", false, true);

        let outcome = err.outcome(Protocol::Http, "closed".to_string());
        assert!(!outcome.is_reached());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Connect));
    }

    #[test]
    fn test_dns_failure_wins_over_connect_flag() {
        let err = failure(
            "error sending request: dns error: failed to lookup address information",
            false,
            true,
        );

        let outcome = err.outcome(Protocol::Http, "dns".to_string());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Dns));
        assert_eq!(outcome.message(), Some("DNS resolution failed"));
    }

    #[test]
    fn test_timeout_and_connect_flags() {
        assert_eq!(
            failure("operation timed out", true, false)
                .outcome(Protocol::Https, String::new())
                .failure_kind(),
            Some(FailureKind::Timeout)
        );
        assert_eq!(
            failure("connection refused", false, true)
                .outcome(Protocol::Https, String::new())
                .failure_kind(),
            Some(FailureKind::Connect)
        );
    }

    #[test]
    fn test_other_failure_keeps_message() {
        let outcome = failure("too many redirects", false, false)
            .outcome(Protocol::Http, "error following redirect".to_string());

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Other));
        assert_eq!(outcome.message(), Some("error following redirect"));
    }

    #[test]
    fn test_failures_feed_block_statuses() {
        let dns = failure("dns error: no such host", false, true);
        let classification = classify(
            &dns.outcome(Protocol::Http, String::new()),
            &dns.outcome(Protocol::Https, String::new()),
        );
        assert_eq!(classification.status, BlockStatus::BlockDns);

        let timeout = failure("operation timed out", true, false);
        let classification = classify(
            &timeout.outcome(Protocol::Http, String::new()),
            &timeout.outcome(Protocol::Https, String::new()),
        );
        assert_eq!(classification.status, BlockStatus::BlockUnknown);
        assert_eq!(
            classification.error_message.as_deref(),
            Some("Connection timeout")
        );

        let self_signed = failure("invalid peer certificate: unknownissuer", false, true);
        let classification = classify(
            &ProtocolOutcome::reached(200),
            &self_signed.outcome(Protocol::Https, String::new()),
        );
        assert_eq!(classification.status, BlockStatus::Ok);
        assert_eq!(classification.http_code, Some(200));
    }

    #[tokio::test]
    async fn test_probe_url_with_malformed_proxy_is_error() {
        let prober = ScriptedProber::new();
        let result = prober.probe_url("example.com", "::not a proxy::").await;
        assert_eq!(result.status, BlockStatus::Error);
        assert!(result.error_message.is_some());
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_probe_runs_both_protocols() {
        let prober = ScriptedProber::new()
            .on("fpt-proxy", Protocol::Http, ProtocolOutcome::reached(200))
            .on(
                "fpt-proxy",
                Protocol::Https,
                ProtocolOutcome::unreached(FailureKind::Connect),
            );
        let proxy = ProxyConnection::parse("http://fpt-proxy:8080").unwrap();

        let result = prober.probe("example.com", &proxy).await;
        assert_eq!(result.status, BlockStatus::BlockHttps);
        assert_eq!(result.http_code, Some(200));
        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test]
    async fn test_http_prober_unreachable_proxy_is_unreached() {
        let prober = HttpProber::new(&ProbeConfig {
            timeout_secs: 2,
            max_redirects: 5,
            user_agent: "sitewatch-test".to_string(),
        });
        // Port 9 on loopback refuses connections.
        let proxy = ProxyConnection::parse("http://127.0.0.1:9").unwrap();

        let outcome = prober
            .probe_protocol("example.com", Protocol::Http, &proxy)
            .await;
        assert!(!outcome.is_reached());
    }

    /// Serves a self-signed certificate for `localhost` and returns its port
    async fn spawn_self_signed_tls() -> u16 {
        use std::sync::Arc;
        use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
        use tokio_rustls::rustls::{crypto::ring, ServerConfig};
        use tokio_rustls::TlsAcceptor;

        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            cert.serialize_private_key_der(),
        ));

        let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der)
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    // The client aborts the handshake on the untrusted certificate.
                    let _ = acceptor.accept(stream).await;
                });
            }
        });
        port
    }

    /// Minimal CONNECT proxy tunnelling every request to `127.0.0.1:upstream_port`
    async fn spawn_connect_proxy(upstream_port: u16) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut client, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match client.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    if !head.starts_with(b"CONNECT ") {
                        let _ = client.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n").await;
                        return;
                    }

                    let Ok(mut upstream) =
                        tokio::net::TcpStream::connect(("127.0.0.1", upstream_port)).await
                    else {
                        let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
                        return;
                    };
                    if client
                        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                        .await
                        .is_err()
                    {
                        return;
                    }
                    let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
                });
            }
        });
        port
    }

    fn test_prober() -> HttpProber {
        HttpProber::new(&ProbeConfig {
            timeout_secs: 5,
            max_redirects: 5,
            user_agent: "sitewatch-test".to_string(),
        })
    }

    #[tokio::test]
    async fn test_self_signed_https_through_proxy_is_reached_with_warning() {
        let tls_port = spawn_self_signed_tls().await;
        let proxy_port = spawn_connect_proxy(tls_port).await;
        let proxy = ProxyConnection::parse(&format!("http://127.0.0.1:{}", proxy_port)).unwrap();

        let outcome = test_prober()
            .probe_protocol(&format!("localhost:{}", tls_port), Protocol::Https, &proxy)
            .await;

        assert_eq!(
            outcome,
            ProtocolOutcome::Reached {
                code: 200,
                certificate_warning: true,
            }
        );
    }

    #[tokio::test]
    async fn test_closed_upstream_through_proxy_is_unreached() {
        let closed_port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let proxy_port = spawn_connect_proxy(closed_port).await;
        let proxy = ProxyConnection::parse(&format!("http://127.0.0.1:{}", proxy_port)).unwrap();

        let outcome = test_prober()
            .probe_protocol(&format!("localhost:{}", closed_port), Protocol::Https, &proxy)
            .await;

        assert!(!outcome.is_reached());
    }
}
