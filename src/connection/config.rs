//! Connection configuration types (specification §3 "Client configuration", §6 timeout constants).

use std::time::Duration;

/// Default idle-notification delay (`TIMEOUT_ENTER_IDLE`).
pub const TIMEOUT_ENTER_IDLE: Duration = Duration::from_millis(1000);

/// Default lower bound for a per-write socket timeout (`TIMEOUT_SOCKET_LOWER_BOUND`).
pub const TIMEOUT_SOCKET_LOWER_BOUND: Duration = Duration::from_millis(10_000);

/// Default additional socket-timeout milliseconds per outbound byte (`TIMEOUT_SOCKET_MULTIPLIER`).
pub const TIMEOUT_SOCKET_MULTIPLIER_MS_PER_BYTE: f64 = 0.1;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade in-place via [`crate::engine::Client::upgrade`].
    StartTls,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// IMAP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port. Forces `security = Implicit` when 993 and otherwise unset.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Time allowed for the initial TCP/TLS handshake.
    pub connect_timeout: Duration,
    /// Identifier attached to every tracing span for this connection, for
    /// correlating logs across a fleet of connections.
    pub session_id: Option<String>,
    /// Delay after the command queue drains before `idle` fires (`TIMEOUT_ENTER_IDLE`).
    pub enter_idle_after: Duration,
    /// Minimum per-write socket timeout (`TIMEOUT_SOCKET_LOWER_BOUND`).
    pub socket_timeout_lower_bound: Duration,
    /// Additional per-write socket-timeout milliseconds per byte sent (`TIMEOUT_SOCKET_MULTIPLIER`).
    pub socket_timeout_multiplier_ms_per_byte: f64,
    /// Whether `enable_compression()` should offload codec work to a
    /// dedicated worker task rather than running it inline.
    pub compression_worker: bool,
}

impl Config {
    /// Creates a new configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::builder(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Computes the socket write timeout for a payload of `byte_len` bytes
    /// (`TIMEOUT_SOCKET_LOWER_BOUND + floor(bytes * TIMEOUT_SOCKET_MULTIPLIER)`).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn socket_timeout_for(&self, byte_len: usize) -> Duration {
        let extra_ms = (byte_len as f64 * self.socket_timeout_multiplier_ms_per_byte).floor();
        self.socket_timeout_lower_bound + Duration::from_millis(extra_ms as u64)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    session_id: Option<String>,
    enter_idle_after: Duration,
    socket_timeout_lower_bound: Duration,
    socket_timeout_multiplier_ms_per_byte: f64,
    compression_worker: bool,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
            session_id: None,
            enter_idle_after: TIMEOUT_ENTER_IDLE,
            socket_timeout_lower_bound: TIMEOUT_SOCKET_LOWER_BOUND,
            socket_timeout_multiplier_ms_per_byte: TIMEOUT_SOCKET_MULTIPLIER_MS_PER_BYTE,
            compression_worker: false,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the session identifier attached to this connection's log span.
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Overrides `TIMEOUT_ENTER_IDLE`.
    #[must_use]
    pub const fn enter_idle_after(mut self, duration: Duration) -> Self {
        self.enter_idle_after = duration;
        self
    }

    /// Overrides `TIMEOUT_SOCKET_LOWER_BOUND`.
    #[must_use]
    pub const fn socket_timeout_lower_bound(mut self, duration: Duration) -> Self {
        self.socket_timeout_lower_bound = duration;
        self
    }

    /// Overrides `TIMEOUT_SOCKET_MULTIPLIER`.
    #[must_use]
    pub const fn socket_timeout_multiplier_ms_per_byte(mut self, ms_per_byte: f64) -> Self {
        self.socket_timeout_multiplier_ms_per_byte = ms_per_byte;
        self
    }

    /// Requests that compression codec work run on a dedicated worker task.
    #[must_use]
    pub const fn compression_worker(mut self, enabled: bool) -> Self {
        self.compression_worker = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        let port = self.port.unwrap_or_else(|| self.security.default_port());
        let security = if port == 993 {
            Security::Implicit
        } else {
            self.security
        };

        Config {
            host: self.host,
            port,
            security,
            connect_timeout: self.connect_timeout,
            session_id: self.session_id,
            enter_idle_after: self.enter_idle_after,
            socket_timeout_lower_bound: self.socket_timeout_lower_bound,
            socket_timeout_multiplier_ms_per_byte: self.socket_timeout_multiplier_ms_per_byte,
            compression_worker: self.compression_worker,
        }
    }
}
