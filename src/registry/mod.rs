pub mod bootstrap;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::Config;
use crate::error::{MeshgateError, Result};

use self::bootstrap::{bootstrap_candidates, is_local_registry_url, normalize_api_base, select_bootstrap};
use self::schema::{
    normalize_basic_services, normalize_full_services, normalize_registry_info,
    normalize_search_results, RegistryInfo, SearchHit, ServiceDescriptor, ServiceMap,
};

/// Read-only client for the registry's versioned HTTP API.
///
/// Registry info and the service listing are cached independently; a stale
/// entry is replaced wholesale by whichever reader notices first.
pub struct RegistryClient {
    registry_url: String,
    registry_is_local: bool,
    base_url: String,
    bootstrap_override: Option<String>,
    http: reqwest::Client,
    timeout: Duration,
    info_cache: TtlCache<RegistryInfo>,
    services_cache: TtlCache<ServiceMap>,
}

impl RegistryClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let base_url = normalize_api_base(&config.registry_url)?;
        let timeout = Duration::from_millis(config.http_timeout_ms);
        let ttl = Duration::from_secs(config.cache_ttl_seconds);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeshgateError::Http(format!("failed to build http client: {e}")))?;
        Ok(Self {
            registry_url: config.registry_url.clone(),
            registry_is_local: config
                .registry_is_local
                .unwrap_or_else(|| is_local_registry_url(&config.registry_url)),
            base_url,
            bootstrap_override: config
                .bootstrap
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            http,
            timeout,
            info_cache: TtlCache::new(ttl, clock.clone()),
            services_cache: TtlCache::new(ttl, clock),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    pub fn registry_is_local(&self) -> bool {
        self.registry_is_local
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        debug!(url = %url, "Registry request");

        let request = async {
            let response = self
                .http
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(|e| MeshgateError::Http(format!("GET {url} failed: {e}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(MeshgateError::Http(format!("GET {url} returned {status}")));
            }
            response
                .json::<Value>()
                .await
                .map_err(|e| MeshgateError::Http(format!("GET {url} returned malformed JSON: {e}")))
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                MeshgateError::Http(format!("GET {url} timed out after {:?}", self.timeout))
            })?
    }

    pub async fn get_registry_info(&self) -> Result<Arc<RegistryInfo>> {
        if let Some(cached) = self.info_cache.get().await {
            return Ok(cached);
        }
        let raw = self.get_json("registry/info", &[]).await?;
        let info = normalize_registry_info(&raw)?;
        Ok(self.info_cache.put(info).await)
    }

    pub async fn get_services(&self) -> Result<Arc<ServiceMap>> {
        if let Some(cached) = self.services_cache.get().await {
            return Ok(cached);
        }
        let services = self.fetch_services().await?;
        info!(count = services.len(), "Refreshed registry service listing");
        Ok(self.services_cache.put(services).await)
    }

    async fn fetch_services(&self) -> Result<ServiceMap> {
        let full = match self.get_json("services_full", &[]).await {
            Ok(raw) => normalize_full_services(&raw),
            Err(err) => Err(err),
        };
        let full_err = match full {
            Ok(services) => return Ok(services),
            Err(err) => err,
        };

        warn!(
            error = %full_err,
            "Full service listing unavailable; falling back to basic listing without input schemas"
        );
        let raw = self.get_json("services", &[]).await.map_err(|basic_err| {
            MeshgateError::Http(format!(
                "service listing failed: services_full: {full_err}; services: {basic_err}"
            ))
        })?;
        normalize_basic_services(&raw)
    }

    pub async fn search_services(&self, query: &str) -> Result<Vec<SearchHit>> {
        let raw = self
            .get_json("services/search", &[("q", query.to_string())])
            .await?;
        normalize_search_results(&raw)
    }

    pub async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let raw = self
            .get_json(
                "services/semantic_search",
                &[("q", query.to_string()), ("k", k.max(1).to_string())],
            )
            .await?;
        normalize_search_results(&raw)
    }

    /// Case-insensitive lookup: map keys first, then each card's own name.
    pub async fn resolve_service(&self, name: &str) -> Result<ServiceDescriptor> {
        let services = self.get_services().await?;
        find_service(&services, name)
            .cloned()
            .ok_or_else(|| MeshgateError::NotFound(format!("service '{}' is not registered", name.trim())))
    }

    pub async fn resolve_bootstrap(&self) -> Result<String> {
        if let Some(explicit) = &self.bootstrap_override {
            return Ok(explicit.clone());
        }

        let info = self.get_registry_info().await?;
        let candidates = bootstrap_candidates(&info);
        let registry_is_local = self.registry_is_local;
        let selected = select_bootstrap(&candidates, registry_is_local).ok_or_else(|| {
            MeshgateError::Config(format!(
                "registry at {} advertised no bootstrap address; set `bootstrap` (or MESHGATE_BOOTSTRAP) explicitly",
                self.base_url
            ))
        })?;
        debug!(bootstrap = %selected, registry_is_local, "Resolved bootstrap address");
        Ok(selected.to_string())
    }

    pub async fn invalidate(&self) {
        self.info_cache.invalidate().await;
        self.services_cache.invalidate().await;
    }
}

pub fn find_service<'a>(services: &'a ServiceMap, name: &str) -> Option<&'a ServiceDescriptor> {
    let wanted = name.trim();
    services
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
        .or_else(|| {
            services
                .iter()
                .find(|(_, descriptor)| descriptor.card.name.eq_ignore_ascii_case(wanted))
        })
        .map(|(_, descriptor)| descriptor)
}

#[cfg(test)]
mod tests {
    use super::schema::ServiceCard;
    use super::*;

    fn descriptor(name: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            card: ServiceCard::synthetic(name),
            providers: Vec::new(),
        }
    }

    #[test]
    fn lookup_is_case_insensitive_on_keys_then_card_names() {
        let mut services = ServiceMap::new();
        services.insert("MathOracle".to_string(), descriptor("MathOracle"));
        services.insert("svc-7".to_string(), descriptor("Translator"));

        assert_eq!(find_service(&services, "mathoracle").unwrap().card.name, "MathOracle");
        assert_eq!(find_service(&services, "TRANSLATOR").unwrap().card.name, "Translator");
        assert!(find_service(&services, "weather").is_none());
    }

    #[test]
    fn map_key_match_beats_card_name_match() {
        let mut services = ServiceMap::new();
        services.insert("alpha".to_string(), descriptor("beta"));
        services.insert("beta".to_string(), descriptor("gamma"));
        assert_eq!(find_service(&services, "BETA").unwrap().card.name, "gamma");
    }

    #[tokio::test]
    async fn explicit_override_skips_the_network() {
        let config = Config {
            registry_url: "http://127.0.0.1:9".to_string(),
            bootstrap: Some(" /ip4/8.8.8.8/tcp/4001/p2p/Pinned ".to_string()),
            ..Config::default()
        };
        let client = RegistryClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9/v1");
        assert!(client.registry_is_local());
        assert_eq!(
            client.resolve_bootstrap().await.unwrap(),
            "/ip4/8.8.8.8/tcp/4001/p2p/Pinned"
        );
    }

    #[test]
    fn locality_override_beats_the_url() {
        let config = Config {
            registry_url: "http://127.0.0.1:8000".to_string(),
            registry_is_local: Some(false),
            ..Config::default()
        };
        assert!(!RegistryClient::from_config(&config).unwrap().registry_is_local());

        let config = Config {
            registry_url: "https://registry.example.com".to_string(),
            ..Config::default()
        };
        assert!(!RegistryClient::from_config(&config).unwrap().registry_is_local());
    }
}
