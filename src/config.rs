use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::{LogFacade, Logger};
use crate::types::Scope;

pub const DEFAULT_PEER_SCHEME: &str = "http";
pub const DEFAULT_PEER_PORT: u16 = 8080;
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Receives the complete peer list after every change.
pub type UpdateFn = Arc<dyn Fn(Vec<String>) + Send + Sync>;

/// Which object kind the pool derives peers from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    /// Service endpoints, already filtered to ready backends.
    #[default]
    Endpoints,
    /// Raw pods, filtered on container readiness.
    Pods,
}

impl FromStr for Mechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "endpoints" => Ok(Mechanism::Endpoints),
            "pods" => Ok(Mechanism::Pods),
            other => Err(Error::UnknownMechanism(other.to_string())),
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mechanism::Endpoints => "endpoints",
            Mechanism::Pods => "pods",
        })
    }
}

/// Programmatic configuration of a [`PeerPool`](crate::PeerPool).
///
/// Immutable once the pool is constructed.
#[derive(Clone)]
pub struct PoolConfig {
    pub mechanism: Mechanism,
    pub namespace: String,
    pub selector: String,
    pub peer_scheme: String,
    pub peer_port: u16,
    pub sync_timeout: Duration,
    /// Pause before re-listing after a failed list or watch.
    pub retry_delay: Duration,
    pub on_update: UpdateFn,
    pub logger: Arc<dyn Logger>,
}

impl PoolConfig {
    pub fn new<F>(on_update: F) -> Self
    where
        F: Fn(Vec<String>) + Send + Sync + 'static,
    {
        Self {
            mechanism: Mechanism::default(),
            namespace: String::new(),
            selector: String::new(),
            peer_scheme: DEFAULT_PEER_SCHEME.to_string(),
            peer_port: DEFAULT_PEER_PORT,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            on_update: Arc::new(on_update),
            logger: Arc::new(LogFacade),
        }
    }

    pub fn mechanism(mut self, mechanism: Mechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    pub fn peer_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.peer_scheme = scheme.into();
        self
    }

    pub fn peer_port(mut self, port: u16) -> Self {
        self.peer_port = port;
        self
    }

    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Fills in the defaults for fields left unset.
    pub(crate) fn normalized(mut self) -> Self {
        if self.peer_scheme.is_empty() {
            self.peer_scheme = DEFAULT_PEER_SCHEME.to_string();
        }
        if self.peer_port == 0 {
            self.peer_port = DEFAULT_PEER_PORT;
        }
        self
    }

    pub fn scope(&self) -> Scope {
        Scope {
            namespace: self.namespace.clone(),
            label_selector: self.selector.clone(),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("mechanism", &self.mechanism)
            .field("namespace", &self.namespace)
            .field("selector", &self.selector)
            .field("peer_scheme", &self.peer_scheme)
            .field("peer_port", &self.peer_port)
            .field("sync_timeout", &self.sync_timeout)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

/// Process settings for the `peerpool` daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Own address, used to log the local peer.
    pub self_ip: String,
    pub namespace: String,
    pub selector: String,
    pub port: u16,
    pub peer_scheme: String,
    /// Kept as a string so that an empty value falls back to endpoints.
    pub mechanism: String,
    pub sync_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            self_ip: std::env::var("POD_IP").unwrap_or_default(),
            namespace: std::env::var("POD_NAMESPACE").unwrap_or_default(),
            selector: std::env::var("SELECTOR").unwrap_or_default(),
            port: DEFAULT_PEER_PORT,
            peer_scheme: DEFAULT_PEER_SCHEME.into(),
            mechanism: String::new(),
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT.as_secs(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Settings::default()))
                .merge(Toml::file("peerpool.toml"))
                .merge(Json::file("peerpool.json"))
                .merge(Env::prefixed("PEERPOOL_")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }

    pub fn local_peer(&self) -> String {
        crate::peers::format_peer(&self.peer_scheme, &self.self_ip, self.port)
    }

    /// Builds the pool configuration, failing on an unknown mechanism.
    pub fn pool_config<F>(&self, on_update: F) -> Result<PoolConfig>
    where
        F: Fn(Vec<String>) + Send + Sync + 'static,
    {
        Ok(PoolConfig::new(on_update)
            .mechanism(self.mechanism.parse()?)
            .namespace(&self.namespace)
            .selector(&self.selector)
            .peer_scheme(&self.peer_scheme)
            .peer_port(self.port)
            .sync_timeout(Duration::from_secs(self.sync_timeout_secs)))
    }
}
