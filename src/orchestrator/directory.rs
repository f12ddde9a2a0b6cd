//! Agent directory
//!
//! Resolves a logical agent to a live address: TTL cache first, then the
//! registry search endpoint, then a static fallback table. Resolution never
//! fails.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{FallbackConfig, RegistryConfig};
use crate::error::DiscoveryError;
use crate::types::AgentId;

/// Scheme, host and port of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl AgentAddress {
    /// Parse an `agent_url` such as `http://10.0.0.4:8001/`.
    /// Paths are dropped; a missing port becomes the scheme's default.
    pub fn parse(raw: &str) -> Result<Self, DiscoveryError> {
        let malformed = |reason: &str| DiscoveryError::MalformedAddress {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = url::Url::parse(raw.trim()).map_err(|e| malformed(&e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| malformed("missing host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| malformed("missing port"))?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
        })
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Full URL for a path on this agent (path must start with `/`)
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

/// Where a descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorSource {
    Registry,
    Fallback,
}

/// A callable backend agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub agent: AgentId,
    pub capability: String,
    pub address: AgentAddress,
    pub discovered_at: DateTime<Utc>,
    pub source: DescriptorSource,
    /// Identifier the registry knows this agent by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
}

// ============ Clock ============

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::days(36_500));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============ Cache ============

/// Discovery cache keyed by agent
pub trait DiscoveryCache: Send + Sync {
    /// Unexpired entry for `agent`, if any. Expired entries are dropped.
    fn get(&self, agent: AgentId) -> Option<AgentDescriptor>;

    /// Store a descriptor. A concurrent duplicate put simply wins last.
    fn put(&self, descriptor: AgentDescriptor);
}

/// In-memory cache with a fixed time-to-live
pub struct TtlCache {
    entries: RwLock<HashMap<AgentId, AgentDescriptor>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            clock,
        }
    }

    fn is_fresh(&self, descriptor: &AgentDescriptor) -> bool {
        self.clock.now() - descriptor.discovered_at < self.ttl
    }
}

impl DiscoveryCache for TtlCache {
    fn get(&self, agent: AgentId) -> Option<AgentDescriptor> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(&agent) {
                Some(d) if self.is_fresh(d) => return Some(d.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // expired: evict lazily, unless someone refreshed it meanwhile
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(d) = entries.get(&agent) {
            if self.is_fresh(d) {
                return Some(d.clone());
            }
            debug!("Discovery cache entry for {} expired", agent);
            entries.remove(&agent);
        }
        None
    }

    fn put(&self, descriptor: AgentDescriptor) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(descriptor.agent, descriptor);
    }
}

// ============ Registry ============

/// One registry search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_url: String,
}

/// The registry answers with a bare array or with `{"agents": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    List(Vec<RegistryEntry>),
    Wrapped { agents: Vec<RegistryEntry> },
}

impl SearchResponse {
    fn into_entries(self) -> Vec<RegistryEntry> {
        match self {
            SearchResponse::List(entries) => entries,
            SearchResponse::Wrapped { agents } => agents,
        }
    }
}

/// Read path of the agent registry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// Live agents advertising `capability`, best match first
    async fn search(&self, capability: &str) -> Result<Vec<RegistryEntry>, DiscoveryError>;
}

/// Registry client over HTTP
pub struct HttpRegistry {
    client: Client,
    base_url: String,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build registry HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RegistryLookup for HttpRegistry {
    async fn search(&self, capability: &str) -> Result<Vec<RegistryEntry>, DiscoveryError> {
        let response = self.client
            .get(format!("{}/search", self.base_url))
            .query(&[("capabilities", capability), ("alive", "true")])
            .send()
            .await
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status { status: status.as_u16() });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))?;

        Ok(body.into_entries())
    }
}

// ============ Fallback ============

/// Static addresses for every agent
#[derive(Debug, Clone)]
pub struct FallbackTable {
    alerts: AgentAddress,
    stops: AgentAddress,
    planner: AgentAddress,
}

impl FallbackTable {
    pub fn from_config(config: &FallbackConfig) -> Result<Self> {
        let parse = |agent: AgentId, raw: &str| {
            AgentAddress::parse(raw)
                .with_context(|| format!("Invalid fallback address for {}", agent))
        };
        Ok(Self {
            alerts: parse(AgentId::Alerts, &config.alerts)?,
            stops: parse(AgentId::Stops, &config.stops)?,
            planner: parse(AgentId::Planner, &config.planner)?,
        })
    }

    pub fn address(&self, agent: AgentId) -> &AgentAddress {
        match agent {
            AgentId::Alerts => &self.alerts,
            AgentId::Stops => &self.stops,
            AgentId::Planner => &self.planner,
        }
    }

    pub fn descriptor(&self, agent: AgentId, now: DateTime<Utc>) -> AgentDescriptor {
        AgentDescriptor {
            agent,
            capability: agent.capability().to_string(),
            address: self.address(agent).clone(),
            discovered_at: now,
            source: DescriptorSource::Fallback,
            registry_id: None,
        }
    }
}

// ============ Directory ============

/// Resolves agents to addresses with cache, registry and fallback
pub struct AgentDirectory {
    registry: Arc<dyn RegistryLookup>,
    cache: Arc<dyn DiscoveryCache>,
    fallback: FallbackTable,
    clock: Arc<dyn Clock>,
    lookup_timeout: Duration,
}

impl AgentDirectory {
    pub fn new(
        registry: Arc<dyn RegistryLookup>,
        cache: Arc<dyn DiscoveryCache>,
        fallback: FallbackTable,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            fallback,
            clock: Arc::new(SystemClock),
            lookup_timeout,
        }
    }

    /// Use a specific clock for discovery timestamps (share it with the cache)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the HTTP-backed directory from configuration
    pub fn from_config(registry: &RegistryConfig, fallback: &FallbackConfig) -> Result<Self> {
        let lookup = HttpRegistry::new(&registry.url, registry.lookup_timeout())?;
        let cache = TtlCache::new(registry.cache_ttl());
        Ok(Self::new(
            Arc::new(lookup),
            Arc::new(cache),
            FallbackTable::from_config(fallback)?,
            registry.lookup_timeout(),
        ))
    }

    /// Resolve an agent. Always returns a usable descriptor.
    pub async fn resolve(&self, agent: AgentId) -> AgentDescriptor {
        if let Some(cached) = self.cache.get(agent) {
            debug!("Discovery cache hit for {} -> {}", agent, cached.address.base_url());
            return cached;
        }

        match self.discover(agent).await {
            Ok(descriptor) => {
                info!("Discovered {} at {}", agent, descriptor.address.base_url());
                self.cache.put(descriptor.clone());
                descriptor
            }
            Err(e) => {
                warn!("Registry discovery failed for {}: {}", agent, e);
                let descriptor = self.fallback.descriptor(agent, self.clock.now());
                info!("Using fallback for {} at {}", agent, descriptor.address.base_url());
                descriptor
            }
        }
    }

    async fn discover(&self, agent: AgentId) -> Result<AgentDescriptor, DiscoveryError> {
        let capability = agent.capability();

        let entries = tokio::time::timeout(self.lookup_timeout, self.registry.search(capability))
            .await
            .map_err(|_| DiscoveryError::Timeout {
                capability: capability.to_string(),
                secs: self.lookup_timeout.as_secs(),
            })??;

        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| DiscoveryError::NoMatch(capability.to_string()))?;

        let address = AgentAddress::parse(&entry.agent_url)?;

        Ok(AgentDescriptor {
            agent,
            capability: capability.to_string(),
            address,
            discovered_at: self.clock.now(),
            source: DescriptorSource::Registry,
            registry_id: entry.agent_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> RegistryEntry {
        RegistryEntry {
            agent_id: Some("alerts-prod".to_string()),
            agent_url: url.to_string(),
        }
    }

    fn directory(
        registry: MockRegistryLookup,
        clock: Arc<ManualClock>,
        ttl: Duration,
    ) -> AgentDirectory {
        let cache = TtlCache::with_clock(ttl, clock.clone());
        AgentDirectory::new(
            Arc::new(registry),
            Arc::new(cache),
            FallbackTable::from_config(&FallbackConfig::default()).unwrap(),
            Duration::from_secs(5),
        )
        .with_clock(clock)
    }

    #[test]
    fn test_parse_address() {
        let addr = AgentAddress::parse("http://10.1.2.3:8001/a2a").unwrap();
        assert_eq!(addr.host, "10.1.2.3");
        assert_eq!(addr.port, 8001);
        assert_eq!(addr.base_url(), "http://10.1.2.3:8001");
        assert_eq!(addr.endpoint("/a2a/message"), "http://10.1.2.3:8001/a2a/message");
    }

    #[test]
    fn test_parse_address_default_ports() {
        assert_eq!(AgentAddress::parse("http://agents.example").unwrap().port, 80);
        assert_eq!(AgentAddress::parse("https://agents.example").unwrap().port, 443);
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(AgentAddress::parse("").is_err());
        assert!(AgentAddress::parse("not a url").is_err());
        assert!(AgentAddress::parse("mailto:ops@example.com").is_err());
    }

    #[test]
    fn test_search_response_shapes() {
        let bare: SearchResponse =
            serde_json::from_str(r#"[{"agent_id":"a","agent_url":"http://h:1"}]"#).unwrap();
        assert_eq!(bare.into_entries().len(), 1);

        let wrapped: SearchResponse = serde_json::from_str(
            r#"{"agents":[{"agent_id":"a","agent_url":"http://h:1"}],"count":1}"#,
        )
        .unwrap();
        assert_eq!(wrapped.into_entries()[0].agent_url, "http://h:1");
    }

    #[test]
    fn test_cache_expiry() {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::with_clock(Duration::from_secs(300), clock.clone());
        let table = FallbackTable::from_config(&FallbackConfig::default()).unwrap();

        cache.put(table.descriptor(AgentId::Alerts, clock.now()));
        clock.advance(Duration::from_secs(299));
        assert!(cache.get(AgentId::Alerts).is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(AgentId::Alerts).is_none());
        // evicted, stays absent
        assert!(cache.get(AgentId::Alerts).is_none());
    }

    #[tokio::test]
    async fn test_resolve_cached_within_ttl() {
        let mut registry = MockRegistryLookup::new();
        registry
            .expect_search()
            .times(1)
            .returning(|_| Ok(vec![entry("http://10.0.0.7:9001")]));

        let clock = Arc::new(ManualClock::default());
        let dir = directory(registry, clock.clone(), Duration::from_secs(300));

        let first = dir.resolve(AgentId::Alerts).await;
        clock.advance(Duration::from_secs(120));
        let second = dir.resolve(AgentId::Alerts).await;

        assert_eq!(first, second);
        assert_eq!(first.source, DescriptorSource::Registry);
        assert_eq!(first.address.port, 9001);
        assert_eq!(first.registry_id.as_deref(), Some("alerts-prod"));
    }

    #[tokio::test]
    async fn test_resolve_refreshes_after_ttl() {
        let mut registry = MockRegistryLookup::new();
        registry
            .expect_search()
            .times(2)
            .returning(|_| Ok(vec![entry("http://10.0.0.7:9001")]));

        let clock = Arc::new(ManualClock::default());
        let dir = directory(registry, clock.clone(), Duration::from_secs(300));

        let first = dir.resolve(AgentId::Alerts).await;
        clock.advance(Duration::from_secs(301));
        let second = dir.resolve(AgentId::Alerts).await;

        assert!(second.discovered_at > first.discovered_at);
    }

    #[tokio::test]
    async fn test_resolve_searches_by_capability() {
        let mut registry = MockRegistryLookup::new();
        registry
            .expect_search()
            .withf(|cap: &str| cap == "trip-planning")
            .times(1)
            .returning(|_| Ok(vec![entry("http://planner.local:8002")]));

        let dir = directory(registry, Arc::new(ManualClock::default()), Duration::from_secs(300));
        let d = dir.resolve(AgentId::Planner).await;
        assert_eq!(d.address.host, "planner.local");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_registry_error() {
        let mut registry = MockRegistryLookup::new();
        registry
            .expect_search()
            .returning(|_| Err(DiscoveryError::Transport("connection refused".to_string())));

        let dir = directory(registry, Arc::new(ManualClock::default()), Duration::from_secs(300));
        let d = dir.resolve(AgentId::Stops).await;

        assert_eq!(d.source, DescriptorSource::Fallback);
        assert_eq!(d.address.base_url(), "http://localhost:8003");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_empty_or_malformed() {
        let mut registry = MockRegistryLookup::new();
        let mut calls = 0;
        registry.expect_search().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(vec![])
            } else {
                Ok(vec![entry("::::")])
            }
        });

        let dir = directory(registry, Arc::new(ManualClock::default()), Duration::from_secs(300));
        assert_eq!(dir.resolve(AgentId::Alerts).await.source, DescriptorSource::Fallback);
        // fallbacks are not cached, so the registry is asked again
        assert_eq!(dir.resolve(AgentId::Alerts).await.source, DescriptorSource::Fallback);
    }

    struct SlowRegistry;

    #[async_trait]
    impl RegistryLookup for SlowRegistry {
        async fn search(&self, _capability: &str) -> Result<Vec<RegistryEntry>, DiscoveryError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_timeout() {
        let dir = AgentDirectory::new(
            Arc::new(SlowRegistry),
            Arc::new(TtlCache::new(Duration::from_secs(300))),
            FallbackTable::from_config(&FallbackConfig::default()).unwrap(),
            Duration::from_millis(50),
        );
        let d = dir.resolve(AgentId::Planner).await;
        assert_eq!(d.source, DescriptorSource::Fallback);
        assert_eq!(d.address.port, 8002);
    }

    #[test]
    fn test_fallback_table_rejects_bad_config() {
        let config = FallbackConfig {
            alerts: "localhost".to_string(),
            ..FallbackConfig::default()
        };
        assert!(FallbackTable::from_config(&config).is_err());
    }
}
