// crates/client_pool/src/pool.rs
//! Outbound HTTP client pool bound to distinct source addresses

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::balancer::P2cBalancer;
use voluspa_common::{Job, ProfileFetcher, ScrapeError, ScrapeResult};

/// Components requested for every profile: profile, records, collectibles.
pub const PROFILE_COMPONENTS: &str = "100,800,900";

/// Pool construction settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub api_base: String,
    pub api_key: String,
    /// One client per address. Empty means a single unbound client.
    pub source_addresses: Vec<IpAddr>,
    pub timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.bungie.net/Platform".to_string(),
            api_key: String::new(),
            source_addresses: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Fixed set of keep-alive clients behind a power-of-two-choices balancer.
///
/// HTTP error statuses are never turned into errors here; the body is handed
/// back as-is for the classifier to inspect.
pub struct ClientPool {
    clients: Vec<Client>,
    balancer: P2cBalancer,
    api_base: String,
}

impl ClientPool {
    pub fn new(config: PoolConfig) -> ScrapeResult<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| ScrapeError::Config(format!("invalid api key header: {e}")))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);

        let clients = if config.source_addresses.is_empty() {
            vec![build_client(&headers, None, config.timeout)?]
        } else {
            config
                .source_addresses
                .iter()
                .map(|addr| build_client(&headers, Some(*addr), config.timeout))
                .collect::<ScrapeResult<Vec<_>>>()?
        };

        debug!(clients = clients.len(), "client pool ready");
        Ok(Self {
            balancer: P2cBalancer::new(clients.len())?,
            clients,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Requests currently in flight per client.
    #[must_use]
    pub fn loads(&self) -> Vec<usize> {
        (0..self.balancer.len()).map(|i| self.balancer.load(i)).collect()
    }

    #[must_use]
    pub fn profile_url(&self, job: &Job) -> String {
        format!(
            "{}/Destiny2/{}/Profile/{}/?components={}",
            self.api_base, job.membership_type, job.membership_id, PROFILE_COMPONENTS
        )
    }
}

fn build_client(
    headers: &HeaderMap,
    local_address: Option<IpAddr>,
    timeout: Duration,
) -> ScrapeResult<Client> {
    Client::builder()
        .default_headers(headers.clone())
        .local_address(local_address)
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(timeout)
        .build()
        .map_err(|e| ScrapeError::Config(format!("failed to build http client: {e}")))
}

fn transport_error(err: reqwest::Error) -> ScrapeError {
    if err.is_timeout() {
        ScrapeError::Timeout(err.to_string())
    } else {
        ScrapeError::Transport(err.to_string())
    }
}

#[async_trait]
impl ProfileFetcher for ClientPool {
    #[instrument(skip(self), fields(member = %job))]
    async fn fetch_profile(&self, job: &Job) -> ScrapeResult<String> {
        let url = self.profile_url(job);
        let slot = self.balancer.acquire();
        let client = &self.clients[slot.index()];

        let response = client.get(&url).send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        drop(slot);

        if !status.is_success() {
            debug!(%status, "non-success status passed to classifier");
        }
        Ok(body)
    }

    fn name(&self) -> &str {
        "bungie client pool"
    }
}
