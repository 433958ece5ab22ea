use std::path::PathBuf;
use std::sync::Arc;

use blossom_auth::{AuthPolicy, AuthorizationGate, CapabilityVerifier};
use blossom_core::Telemetry;
use blossom_storage::{BlobStore, FilesystemStore, InMemoryStore, UploadPolicy};
use tokio::sync::watch;

use crate::config::{Config, StorageConfig, parse_duration, parse_size};
use crate::mirror::MirrorClient;

/// Everything a request needs that a config reload may replace
///
/// Handlers take one snapshot at the start and keep it for the whole
/// request.
pub struct Runtime {
    pub gate: AuthorizationGate,
    pub upload_policy: UploadPolicy,
    pub mirror: MirrorClient,
    /// Base for descriptor URLs, without trailing slash
    pub public_url: String,
    pub config: Config,
}

impl Runtime {
    pub fn from_config(config: &Config, telemetry: &Telemetry) -> anyhow::Result<Self> {
        let verifier = CapabilityVerifier::new()
            .with_scheme(config.auth.scheme.clone())
            .with_validity(parse_duration(&config.auth.expiration_time)?)
            .with_clock_skew(parse_duration(&config.auth.clock_skew)?);
        let policy = AuthPolicy {
            required: config.auth.required,
            get_requires_auth: config.auth.get_requires_auth,
            list_owner_only: config.auth.list_owner_only,
            delete_requires_owner: config.auth.delete_requires_owner,
        };
        let gate = AuthorizationGate::new(verifier, policy).with_telemetry(telemetry.clone());

        // 0 disables the limit
        let max_size = Some(parse_size(&config.server.max_upload_size)?).filter(|&max| max > 0);
        let upload_policy = UploadPolicy::new(config.security.allowed_mime_types.clone(), max_size);

        let mirror = MirrorClient::new(parse_duration(&config.mirror.timeout)?)?
            .with_telemetry(telemetry.clone());

        Ok(Self {
            gate,
            upload_policy,
            mirror,
            public_url: config.server.public_url(),
            config: config.clone(),
        })
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    runtime: Arc<watch::Sender<Arc<Runtime>>>,
    pub telemetry: Telemetry,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let telemetry = Telemetry::inherit();
        let store = open_store(&config.storage, &telemetry).await?;
        Self::with_store(store, config, telemetry)
    }

    /// Build around an existing store, e.g. one shared with a test
    pub fn with_store(
        store: Arc<dyn BlobStore>,
        config: &Config,
        telemetry: Telemetry,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let runtime = Runtime::from_config(config, &telemetry)?;
        let (sender, _) = watch::channel(Arc::new(runtime));
        Ok(Self {
            store,
            runtime: Arc::new(sender),
            telemetry,
        })
    }

    /// Current configuration snapshot
    pub fn runtime(&self) -> Arc<Runtime> {
        self.runtime.borrow().clone()
    }

    /// Change notifications for the runtime snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Runtime>> {
        self.runtime.subscribe()
    }

    /// Swap in a new configuration
    ///
    /// The storage backend is fixed for the life of the process; a changed
    /// `storage` section is reported and otherwise ignored.
    pub fn apply(&self, config: &Config) -> anyhow::Result<()> {
        config.validate()?;
        let current = self.runtime();
        if current.config.storage != config.storage {
            self.telemetry.in_scope(|| {
                tracing::warn!("Storage settings changed; restart to apply them")
            });
        }
        let runtime = Runtime::from_config(config, &self.telemetry)?;
        self.runtime.send_replace(Arc::new(runtime));
        Ok(())
    }

    pub fn reloader(&self, path: impl Into<PathBuf>) -> Reloader {
        Reloader {
            path: path.into(),
            state: self.clone(),
        }
    }
}

/// Re-reads the config file on demand (SIGHUP)
pub struct Reloader {
    path: PathBuf,
    state: AppState,
}

impl Reloader {
    /// A failed reload leaves the previous snapshot in place
    pub fn reload(&self) -> anyhow::Result<()> {
        let config = Config::load(&self.path)?;
        self.state.apply(&config)?;
        self.state.telemetry.in_scope(|| {
            tracing::info!(path = %self.path.display(), "Configuration reloaded")
        });
        Ok(())
    }
}

pub async fn open_store(
    config: &StorageConfig,
    telemetry: &Telemetry,
) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.backend.as_str() {
        "filesystem" | "file" | "local" => {
            let store = FilesystemStore::open(&config.path)
                .await?
                .with_telemetry(telemetry.clone());
            telemetry.in_scope(|| tracing::info!(path = %config.path, "Using filesystem storage"));
            Arc::new(store)
        }
        "memory" => {
            telemetry.in_scope(|| {
                tracing::warn!("Using in-memory storage - contents are lost on restart")
            });
            Arc::new(InMemoryStore::new().with_telemetry(telemetry.clone()))
        }
        other => {
            anyhow::bail!(
                "Unknown storage backend '{}'. Valid options: 'filesystem', 'memory'",
                other
            );
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.storage.backend = "memory".into();
        config
    }

    #[tokio::test]
    async fn test_apply_replaces_snapshot() {
        let state = AppState::new(&memory_config()).await.unwrap();
        let before = state.runtime();
        assert!(before.gate.policy().required);

        let mut config = memory_config();
        config.auth.required = false;
        config.server.public_url = Some("https://blobs.example.com".into());
        state.apply(&config).unwrap();

        let after = state.runtime();
        assert!(!after.gate.policy().required);
        assert_eq!(after.public_url, "https://blobs.example.com");
        // Snapshots taken earlier are unaffected
        assert!(before.gate.policy().required);
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_previous() {
        let state = AppState::new(&memory_config()).await.unwrap();
        let mut config = memory_config();
        config.server.max_upload_size = "huge".into();
        assert!(state.apply(&config).is_err());
        assert_eq!(state.runtime().config, memory_config());
    }

    #[tokio::test]
    async fn test_reloader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blossom-server.yaml");
        let state = AppState::new(&memory_config()).await.unwrap();

        std::fs::write(&path, "storage:\n  backend: memory\nauth:\n  get_requires_auth: true\n")
            .unwrap();
        state.reloader(&path).reload().unwrap();
        assert!(state.runtime().gate.policy().get_requires_auth);
    }

    #[tokio::test]
    async fn test_zero_max_size_is_unlimited() {
        let mut config = memory_config();
        config.server.max_upload_size = "0".into();
        let runtime = Runtime::from_config(&config, &Telemetry::inherit()).unwrap();
        assert_eq!(runtime.upload_policy.max_size(), None);
    }
}
