//! Connection options and the dial-and-login factory

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    constants::{
        DEFAULT_AMI_PORT, DEFAULT_ERROR_QUEUE_SIZE, DEFAULT_INGEST_QUEUE_SIZE, DEFAULT_TIMEOUT_MS,
    },
    dictionary::Dictionary,
    error::{AmiError, AmiResult},
    retry::RetryPolicy,
    session::AmiSession,
    udp::UdpStream,
};

/// Socket type to dial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Stream socket (the AMI default).
    #[default]
    Tcp,
    /// Connected datagram socket; framing is unchanged.
    Udp,
}

impl std::str::FromStr for Network {
    type Err = AmiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "udp" | "udp4" | "udp6" => Ok(Network::Udp),
            other => Err(AmiError::config_error(format!(
                "unsupported network {:?}",
                other
            ))),
        }
    }
}

/// Everything needed to dial, log in, and run a session.
///
/// Deserializable from any serde format; missing fields take the defaults
/// below.
///
/// ```
/// use asterisk_ami_tokio::AmiConnectOptions;
///
/// let opts = AmiConnectOptions::new("pbx.example.net", "admin", "secret")
///     .with_events("system,call,all,user")
///     .with_timeout_ms(5000);
/// assert!(opts.validate().is_ok());
/// assert_eq!(opts.port, 5038);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmiConnectOptions {
    /// Host name or address; `http://` / `https://` and `host:port` forms
    /// are accepted.
    pub host: String,
    /// Port, overridden by a port embedded in `host`. Default: 5038.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login secret.
    pub secret: String,
    /// Dial and handshake deadline in milliseconds. Default: 2000.
    pub timeout_ms: u64,
    /// `Events` permission string sent with Login.
    pub events: Option<String>,
    /// Default: TCP.
    pub network: Network,
    /// Line queue capacity between socket and frame reader. Default: 1024.
    pub ingest_queue_size: usize,
    /// Error channel capacity. Default: 16.
    pub error_queue_size: usize,
    /// Retry policy for [`engine::single_with_retry`](crate::engine::single_with_retry).
    pub retry: RetryPolicy,
    /// Inbound header rename table.
    pub dictionary: Option<Dictionary>,
}

impl Default for AmiConnectOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_AMI_PORT,
            username: String::new(),
            secret: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            events: None,
            network: Network::Tcp,
            ingest_queue_size: DEFAULT_INGEST_QUEUE_SIZE,
            error_queue_size: DEFAULT_ERROR_QUEUE_SIZE,
            retry: RetryPolicy::default(),
            dictionary: None,
        }
    }
}

impl std::fmt::Debug for AmiConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("timeout_ms", &self.timeout_ms)
            .field("events", &self.events)
            .field("network", &self.network)
            .field("ingest_queue_size", &self.ingest_queue_size)
            .field("error_queue_size", &self.error_queue_size)
            .field("retry", &self.retry)
            .field(
                "dictionary",
                &self
                    .dictionary
                    .as_ref()
                    .map(|d| d.len()),
            )
            .finish()
    }
}

impl AmiConnectOptions {
    /// Options for `host` with credentials and default everything else.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the dial and handshake deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the dial and handshake deadline in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Send `Events: <perm>` with Login.
    pub fn with_events(mut self, events: impl Into<String>) -> Self {
        self.events = Some(events.into());
        self
    }

    /// Select TCP or UDP.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rename inbound headers through `dictionary`.
    pub fn with_dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Set the ingest line queue capacity.
    pub fn with_ingest_queue_size(mut self, size: usize) -> Self {
        self.ingest_queue_size = size;
        self
    }

    /// Set the error channel capacity.
    pub fn with_error_queue_size(mut self, size: usize) -> Self {
        self.error_queue_size = size;
        self
    }

    /// Handshake deadline as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject unusable settings with [`AmiError::Config`].
    pub fn validate(&self) -> AmiResult<()> {
        let (host, port) = parse_address(&self.host, self.port)?;
        if host.is_empty() {
            return Err(AmiError::config_error("empty host"));
        }
        if port == 0 {
            return Err(AmiError::config_error("port must be positive"));
        }
        if self
            .username
            .is_empty()
        {
            return Err(AmiError::config_error("missing username"));
        }
        if self
            .secret
            .is_empty()
        {
            return Err(AmiError::config_error("missing secret"));
        }
        if self.timeout_ms == 0 {
            return Err(AmiError::config_error("timeout must be positive"));
        }
        if self.ingest_queue_size == 0 || self.error_queue_size == 0 {
            return Err(AmiError::config_error("queue sizes must be positive"));
        }
        Ok(())
    }
}

/// Normalize a user-supplied host into `(host, port)`.
///
/// Strips an `http://` or `https://` scheme and trailing `/`, and takes the
/// port from `host:port` or `[v6]:port` when present. A bare IPv6 literal
/// keeps `default_port`.
pub fn parse_address(input: &str, default_port: u16) -> AmiResult<(String, u16)> {
    let mut rest = input.trim();
    for scheme in ["http://", "https://"] {
        if rest
            .get(..scheme.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(scheme))
        {
            rest = &rest[scheme.len()..];
            break;
        }
    }
    let rest = rest.trim_end_matches('/');

    let parse_port = |p: &str| {
        p.parse::<u16>()
            .map_err(|_| AmiError::config_error(format!("invalid port {:?}", p)))
    };

    if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, tail) = bracketed
            .split_once(']')
            .ok_or_else(|| AmiError::config_error(format!("unterminated IPv6 literal {:?}", input)))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None if tail.is_empty() => default_port,
            None => {
                return Err(AmiError::config_error(format!(
                    "invalid address {:?}",
                    input
                )))
            }
        };
        return Ok((host.to_string(), port));
    }

    match rest.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Ok((host.to_string(), parse_port(port)?)),
        _ => Ok((rest.to_string(), default_port)),
    }
}

/// Dial `host:port` over TCP, log in, and start the reader.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use asterisk_ami_tokio::{connect, engine, Command};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), asterisk_ami_tokio::AmiError> {
/// let session = connect("127.0.0.1", 5038, "admin", "secret", Duration::from_secs(2)).await?;
/// let reply = engine::single(&CancellationToken::new(), &session, Command::ping()).await?;
/// assert_eq!(reply.get("Ping"), "Pong");
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub async fn connect(
    host: &str,
    port: u16,
    username: &str,
    secret: &str,
    timeout: Duration,
) -> AmiResult<AmiSession> {
    let options = AmiConnectOptions::new(host, username, secret)
        .with_port(port)
        .with_timeout(timeout);
    connect_with_options(options).await
}

/// Dial per `options`, log in, and start the reader.
pub async fn connect_with_options(options: AmiConnectOptions) -> AmiResult<AmiSession> {
    options.validate()?;
    let (host, port) = parse_address(&options.host, options.port)?;
    info!(
        "[CONNECT] dialing {:?} {}:{} as {}",
        options.network, host, port, options.username
    );

    match options.network {
        Network::Tcp => {
            let stream = dial_tcp(&host, port, options.timeout_ms).await?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!("[CONNECT] set_nodelay: {}", e);
            }
            AmiSession::establish(stream, &options).await
        }
        Network::Udp => {
            let stream = dial_udp(&host, port, options.timeout_ms).await?;
            AmiSession::establish(stream, &options).await
        }
    }
}

async fn dial_tcp(host: &str, port: u16, timeout_ms: u64) -> AmiResult<TcpStream> {
    match timeout(
        Duration::from_millis(timeout_ms),
        TcpStream::connect((host, port)),
    )
    .await
    {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect failed: {}", e);
            Err(AmiError::from_io(e))
        }
        Err(_) => {
            warn!("[CONNECT] TCP connect timed out after {}ms", timeout_ms);
            Err(AmiError::ConnTimeout { timeout_ms })
        }
    }
}

async fn dial_udp(host: &str, port: u16, timeout_ms: u64) -> AmiResult<UdpStream> {
    let dial = async {
        let peer = lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for {}", host),
                )
            })?;
        UdpStream::connect(peer).await
    };
    match timeout(Duration::from_millis(timeout_ms), dial).await {
        Ok(Ok(s)) => {
            debug!("[CONNECT] UDP socket connected");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] UDP connect failed: {}", e);
            Err(AmiError::from_io(e))
        }
        Err(_) => Err(AmiError::ConnTimeout { timeout_ms }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_forms() {
        let cases = [
            ("pbx.local", ("pbx.local", 5038)),
            ("http://pbx.local", ("pbx.local", 5038)),
            ("HTTPS://pbx.local/", ("pbx.local", 5038)),
            ("pbx.local:6000", ("pbx.local", 6000)),
            ("https://10.0.0.1:7777/", ("10.0.0.1", 7777)),
            ("[::1]:5039", ("::1", 5039)),
            ("[fe80::1]", ("fe80::1", 5038)),
            ("::1", ("::1", 5038)),
        ];
        for (input, (host, port)) in cases {
            assert_eq!(
                parse_address(input, 5038).unwrap(),
                (host.to_string(), port),
                "input {}",
                input
            );
        }
    }

    #[test]
    fn bad_addresses() {
        assert!(parse_address("pbx:notaport", 5038).is_err());
        assert!(parse_address("[::1", 5038).is_err());
        assert!(parse_address("[::1]x", 5038).is_err());
    }

    #[test]
    fn validation() {
        let ok = AmiConnectOptions::new("h", "u", "s");
        assert!(ok
            .validate()
            .is_ok());

        for bad in [
            AmiConnectOptions::new("", "u", "s"),
            AmiConnectOptions::new("http://", "u", "s"),
            AmiConnectOptions::new("h", "", "s"),
            AmiConnectOptions::new("h", "u", ""),
            AmiConnectOptions::new("h", "u", "s").with_port(0),
            AmiConnectOptions::new("h", "u", "s").with_timeout_ms(0),
            AmiConnectOptions::new("h", "u", "s").with_error_queue_size(0),
        ] {
            let err = bad
                .validate()
                .unwrap_err();
            assert!(matches!(err, AmiError::Config(_)), "{:?}", bad);
        }
    }

    #[test]
    fn network_names() {
        assert_eq!("TCP".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("udp".parse::<Network>().unwrap(), Network::Udp);
        assert!("unix"
            .parse::<Network>()
            .is_err());
    }

    #[test]
    fn options_from_json() {
        let opts: AmiConnectOptions = serde_json::from_str(
            r#"{
                "host": "pbx.local",
                "username": "admin",
                "secret": "s3cr3t",
                "network": "udp",
                "retry": {"enabled": true, "max_retries": 5},
                "dictionary": {"CallerIDNum": "caller_id_num"}
            }"#,
        )
        .unwrap();
        assert_eq!(opts.port, DEFAULT_AMI_PORT);
        assert_eq!(opts.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(opts.network, Network::Udp);
        assert_eq!(opts.retry, RetryPolicy::attempts(5));
        assert_eq!(
            opts.dictionary
                .as_ref()
                .map(|d| d.translate("CallerIDNum")),
            Some("caller_id_num")
        );
        assert!(!format!("{:?}", opts).contains("s3cr3t"));
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener
            .local_addr()
            .unwrap()
            .port();
        drop(listener);

        let err = connect("127.0.0.1", port, "u", "s", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AmiError::Io(_) | AmiError::Network(_) | AmiError::ConnTimeout { .. }
        ));
    }
}
