//! Name-indexed adapter plugins
//!
//! Filled once at startup and read-only afterwards. Each plugin is indexed
//! by its self-reported name; the config key it was launched under resolves
//! to it as an alias.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::{PluginClient, PluginProcess};
use crate::core::config::PluginConfig;
use crate::core::constants::PLUGIN_HANDSHAKE_TIMEOUT_SECS;
use crate::core::error::{BenchError, BenchResult, ErrorKind};

const COMPONENT: &str = "plugin_registry";

struct RegisteredPlugin {
    client: Arc<PluginClient>,
    process: Mutex<Option<PluginProcess>>,
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<RegisteredPlugin>>,
    /// alias -> reported name
    aliases: HashMap<String, String>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch every configured plugin. Any start-up failure is fatal.
    pub async fn launch_all(plugins: &BTreeMap<String, PluginConfig>) -> BenchResult<Self> {
        let mut registry = Self::new();
        let timeout = Duration::from_secs(PLUGIN_HANDSHAKE_TIMEOUT_SECS);
        for (key, config) in plugins {
            let (process, client) =
                PluginProcess::launch(key, &config.command, &config.env, timeout).await?;
            let name = registry.register(client, Some(process)).await?;
            if name != *key {
                registry.alias(key, &name);
            }
        }
        Ok(registry)
    }

    /// Identify a connected plugin and index it by its reported name
    pub async fn register(
        &mut self,
        mut client: PluginClient,
        process: Option<PluginProcess>,
    ) -> BenchResult<String> {
        let name = client.identify().await?.to_string();
        if self.plugins.contains_key(&name) || self.aliases.contains_key(&name) {
            return Err(BenchError::invalid_input(
                COMPONENT,
                format!("plugin name '{}' already in use", name),
            ));
        }
        tracing::info!(
            plugin = %name,
            capabilities = ?client.capabilities(),
            pid = ?process.as_ref().and_then(PluginProcess::id),
            "Plugin registered"
        );
        self.plugins.insert(
            name.clone(),
            Arc::new(RegisteredPlugin {
                client: Arc::new(client),
                process: Mutex::new(process),
            }),
        );
        Ok(name)
    }

    /// Make `alias` resolve to the plugin registered as `name`.
    /// Ignored when `name` is unknown or `alias` is already taken.
    pub fn alias(&mut self, alias: &str, name: &str) {
        if self.plugins.contains_key(name) && !self.plugins.contains_key(alias) {
            self.aliases
                .entry(alias.to_string())
                .or_insert_with(|| name.to_string());
        }
    }

    fn resolve(&self, name: &str) -> Option<&Arc<RegisteredPlugin>> {
        self.plugins.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|target| self.plugins.get(target))
        })
    }

    /// Client for a usable plugin, by reported name or alias
    pub fn get(&self, name: &str) -> BenchResult<Arc<PluginClient>> {
        let plugin = self
            .resolve(name)
            .ok_or_else(|| BenchError::plugin_not_found(COMPONENT, name))?;
        if let Some(reason) = plugin.client.failure() {
            return Err(BenchError::new(
                ErrorKind::DatabaseConnection,
                COMPONENT,
                format!("plugin '{}' is unusable: {}", name, reason),
            ));
        }
        Ok(Arc::clone(&plugin.client))
    }

    /// Reported plugin names, one per plugin
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Round-trip a `GetName` call and return its latency
    pub async fn health_check(&self, name: &str) -> BenchResult<Duration> {
        let client = self.get(name)?;
        let start = Instant::now();
        let reported = client.get_name().await?;
        let elapsed = start.elapsed();
        tracing::debug!(plugin = %name, reported = %reported, elapsed = ?elapsed, "Plugin healthy");
        Ok(elapsed)
    }

    /// Kill every child process
    pub async fn shutdown(&self) {
        for plugin in self.plugins.values() {
            if let Some(mut process) = plugin.process.lock().await.take() {
                process.kill().await;
            }
        }
        tracing::debug!(count = self.plugins.len(), "Plugins shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqltracebench_plugin::{Adapter, Capabilities, serve};
    use tokio::io::duplex;

    struct Named(&'static str);

    #[async_trait]
    impl Adapter for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
    }

    async fn connect(name: &'static str) -> (PluginClient, tokio::task::JoinHandle<()>) {
        let (host, child) = duplex(16 * 1024);
        let (cr, cw) = tokio::io::split(child);
        let server = tokio::spawn(async move {
            let _ = serve(Arc::new(Named(name)), cr, cw).await;
        });
        let (hr, hw) = tokio::io::split(host);
        let client = PluginClient::connect("launch-label", hr, hw, Duration::from_secs(5))
            .await
            .unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_register_by_reported_name() {
        let mut registry = PluginRegistry::new();
        let (client, _server) = connect("starrocks").await;
        let name = registry.register(client, None).await.unwrap();
        assert_eq!(name, "starrocks");
        assert!(registry.get("starrocks").is_ok());
        assert!(registry.health_check("starrocks").await.is_ok());

        let err = registry.get("launch-label").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PluginNotFound);
    }

    #[tokio::test]
    async fn test_alias_and_duplicates() {
        let mut registry = PluginRegistry::new();
        let (client, _s1) = connect("clickhouse").await;
        registry.register(client, None).await.unwrap();
        registry.alias("ch", "clickhouse");
        assert_eq!(registry.names(), vec!["clickhouse"]);
        assert_eq!(registry.len(), 1);
        let by_alias = registry.get("ch").unwrap();
        assert!(Arc::ptr_eq(&by_alias, &registry.get("clickhouse").unwrap()));

        registry.alias("clickhouse", "clickhouse");
        registry.alias("other", "missing");
        assert_eq!(registry.get("other").unwrap_err().kind, ErrorKind::PluginNotFound);

        let (dup, _s2) = connect("clickhouse").await;
        let err = registry.register(dup, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_plugin_is_unusable() {
        let mut registry = PluginRegistry::new();
        let (client, server) = connect("flaky").await;
        registry.register(client, None).await.unwrap();

        server.abort();
        let _ = server.await;
        assert!(registry.health_check("flaky").await.is_err());

        let err = registry.get("flaky").unwrap_err();
        assert_eq!(err.kind, ErrorKind::DatabaseConnection);
    }

    #[tokio::test]
    async fn test_launch_all_empty() {
        let registry = PluginRegistry::launch_all(&BTreeMap::new()).await.unwrap();
        assert!(registry.is_empty());
    }
}
