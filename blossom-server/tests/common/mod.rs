use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use blossom_core::PublicKey;
use blossom_server::config::Config;
use blossom_server::state::AppState;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub struct TestServer {
    pub url: String,
    #[allow(dead_code)]
    pub addr: SocketAddr,
    #[allow(dead_code)]
    pub state: AppState,
    _dir: TempDir,
}

impl TestServer {
    #[allow(dead_code)]
    pub async fn start() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Filesystem-backed server in a fresh temp dir, config adjusted by `f`
    pub async fn with_config(f: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();

        // Bind first so the public URL is known before the state is built
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = Config::default();
        config.storage.path = dir.path().join("store").to_string_lossy().into_owned();
        config.server.public_url = Some(format!("http://{addr}"));
        f(&mut config);

        let state = AppState::new(&config).await.unwrap();
        let app = blossom_server::routes::router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give server a moment to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            url: format!("http://{addr}"),
            addr,
            state,
            _dir: dir,
        }
    }
}

#[allow(dead_code)]
pub fn new_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

#[allow(dead_code)]
pub fn pubkey_hex(key: &SigningKey) -> String {
    PublicKey::from_bytes(key.verifying_key().to_bytes()).to_hex()
}

#[allow(dead_code)]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
