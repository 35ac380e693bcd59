use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuración de servidor almacenada en JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(default = "default_auto_join")]
    pub auto_join_on_startup: bool,
}

fn default_auto_join() -> bool {
    true
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            channel_name: None,
            stream_url: None,
            auto_join_on_startup: true,
        }
    }
}

impl GuildConfig {
    /// Canal de voz configurado; `None` significa guild sin configurar.
    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.channel_id.filter(|id| *id != 0).map(ChannelId::new)
    }

    /// `true` when the startup scan and the sweep should join on their own.
    pub fn wants_auto_join(&self) -> bool {
        self.voice_channel().is_some() && self.auto_join_on_startup
    }
}

pub type GuildConfigMap = BTreeMap<GuildId, GuildConfig>;

/// Persistence of per-guild settings.
///
/// Reads never fail: a missing or malformed backing store is reported in the
/// logs and treated as an empty mapping.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_all(&self) -> GuildConfigMap;

    async fn get(&self, guild_id: GuildId) -> Option<GuildConfig>;

    async fn save(&self, guild_id: GuildId, config: GuildConfig) -> Result<()>;
}

/// Almacenamiento basado en un único archivo JSON (`{ "<guild_id>": {...} }`)
pub struct JsonConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonConfigStore {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        if fs::try_exists(&path).await? {
            info!("📁 {} cargado", path.display());
        } else {
            fs::write(&path, "{}").await?;
            info!("📝 {} creado vacío", path.display());
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    async fn read_raw(&self) -> BTreeMap<String, GuildConfig> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Error leyendo {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!("Error decodificando {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    async fn write_raw(&self, map: &BTreeMap<String, GuildConfig>) -> Result<()> {
        let content = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn load_all(&self) -> GuildConfigMap {
        self.read_raw()
            .await
            .into_iter()
            .filter_map(|(key, config)| match key.parse::<u64>() {
                Ok(id) if id != 0 => Some((GuildId::new(id), config)),
                _ => {
                    warn!("Clave de guild inválida en configuración: {}", key);
                    None
                }
            })
            .collect()
    }

    async fn get(&self, guild_id: GuildId) -> Option<GuildConfig> {
        self.read_raw().await.remove(&guild_id.get().to_string())
    }

    async fn save(&self, guild_id: GuildId, config: GuildConfig) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.read_raw().await;
        map.insert(guild_id.get().to_string(), config);
        self.write_raw(&map).await?;

        debug!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn store_in(dir: &tempfile::TempDir) -> JsonConfigStore {
        JsonConfigStore::new(dir.path().join("config.json")).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_is_created_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        assert!(dir.path().join("config.json").exists());
        assert!(store.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonConfigStore::new(path).await.unwrap();
        assert!(store.load_all().await.is_empty());
        assert_eq!(store.get(GuildId::new(1)).await, None);
    }

    #[tokio::test]
    async fn test_reads_legacy_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "111": {"channel_id": 222, "channel_name": "Radio"},
                "333": {"channel_id": 444, "channel_name": "Lounge", "stream_url": "https://a.example/live", "auto_join_on_startup": false},
                "nope": {"channel_id": 1}
            }"#,
        )
        .unwrap();

        let store = JsonConfigStore::new(path).await.unwrap();
        let all = store.load_all().await;

        assert_eq!(all.len(), 2);
        let radio = &all[&GuildId::new(111)];
        assert_eq!(radio.voice_channel(), Some(ChannelId::new(222)));
        assert!(radio.auto_join_on_startup);
        assert!(radio.wants_auto_join());

        let lounge = &all[&GuildId::new(333)];
        assert_eq!(lounge.stream_url.as_deref(), Some("https://a.example/live"));
        assert!(!lounge.wants_auto_join());
    }

    #[tokio::test]
    async fn test_save_replaces_only_that_guild() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let guild = GuildId::new(42);
        let neighbour = GuildId::new(43);

        let config = GuildConfig {
            channel_id: Some(7),
            channel_name: Some("Radio".to_string()),
            ..GuildConfig::default()
        };
        store.save(guild, config.clone()).await.unwrap();
        store.save(neighbour, config.clone()).await.unwrap();
        assert_eq!(store.get(guild).await, Some(config.clone()));

        let updated = GuildConfig {
            stream_url: Some("https://a.example/live".to_string()),
            ..config.clone()
        };
        store.save(guild, updated.clone()).await.unwrap();

        assert_eq!(store.get(guild).await, Some(updated));
        assert_eq!(store.get(neighbour).await, Some(config));
        assert_eq!(store.get(GuildId::new(44)).await, None);
    }

    #[test]
    fn test_config_without_channel_is_unconfigured() {
        let config = GuildConfig {
            stream_url: Some("https://a.example/live".to_string()),
            ..GuildConfig::default()
        };
        assert_eq!(config.voice_channel(), None);
        assert!(!config.wants_auto_join());
    }
}
