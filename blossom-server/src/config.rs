use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "blossom-server.yaml";

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub mirror: MirrorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base for descriptor URLs; defaults to `http://{host}:{port}`
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: String, // "50MB"
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl ServerConfig {
    pub fn public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String, // "filesystem" (alias "file", "local"), "memory"
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct SecurityConfig {
    /// Exact types or `major/*`; empty allows everything
    #[serde(default)]
    pub allowed_mime_types: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuthConfig {
    /// Uploads and mirrors need a token
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Lifetime of tokens without an `expiration` tag
    #[serde(default = "default_expiration_time")]
    pub expiration_time: String, // "24h"
    #[serde(default = "default_clock_skew")]
    pub clock_skew: String,
    #[serde(default)]
    pub get_requires_auth: bool,
    #[serde(default)]
    pub list_owner_only: bool,
    #[serde(default = "default_true")]
    pub delete_requires_owner: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            required: true,
            scheme: default_scheme(),
            expiration_time: default_expiration_time(),
            clock_skew: default_clock_skew(),
            get_requires_auth: false,
            list_owner_only: false,
            delete_requires_owner: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MirrorConfig {
    #[serde(default = "default_mirror_timeout")]
    pub timeout: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            timeout: default_mirror_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3000
}
fn default_max_upload_size() -> String {
    "50MB".into()
}
fn default_backend() -> String {
    "filesystem".into()
}
fn default_storage_path() -> String {
    "./data".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_scheme() -> String {
    "Nostr".into()
}
fn default_expiration_time() -> String {
    "24h".into()
}
fn default_clock_skew() -> String {
    "60s".into()
}
fn default_mirror_timeout() -> String {
    "30s".into()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Defaults, then the YAML file (if present), then `BLOSSOM_*` env vars
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("BLOSSOM_").split("__"))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: Config = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later at first use
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_size(&self.server.max_upload_size)?;
        parse_duration(&self.auth.expiration_time)?;
        parse_duration(&self.auth.clock_skew)?;
        parse_duration(&self.mirror.timeout)?;
        match self.storage.backend.as_str() {
            "filesystem" | "file" | "local" | "memory" => {}
            other => anyhow::bail!(
                "Unknown storage backend '{other}'. Valid options: 'filesystem', 'memory'"
            ),
        }
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Unknown log format '{other}'. Valid options: 'text', 'json'"),
        }
        Ok(())
    }
}

/// Parse a size like `"50MB"`, `"512KB"`, `"1GB"` or a bare byte count.
/// Units are binary (1KB = 1024 bytes) and case-insensitive.
pub fn parse_size(s: &str) -> anyhow::Result<u64> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();
    let (number, multiplier) = [("GB", 1u64 << 30), ("MB", 1 << 20), ("KB", 1 << 10), ("B", 1)]
        .iter()
        .find_map(|(unit, mult)| upper.strip_suffix(unit).map(|n| (n.trim(), *mult)))
        .unwrap_or((upper.as_str(), 1));

    let value: u64 = number
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid size '{s}': {e}"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("size '{s}' overflows"))
}

/// Parse a duration like `"24h"`, `"90m"`, `"1h30m"`, `"45s"`, `"7d"` or bare
/// seconds
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("empty duration");
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => anyhow::bail!("invalid duration '{s}': unknown unit '{c}'"),
        };
        let value: u64 = digits
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid duration '{s}'"))?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| anyhow::anyhow!("duration '{s}' overflows"))?;
        digits.clear();
    }
    if !digits.is_empty() {
        anyhow::bail!("invalid duration '{s}': trailing number without unit");
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("50MB").unwrap(), 50 * 1024 * 1024);
        assert_eq!(parse_size("512kb").unwrap(), 512 * 1024);
        assert_eq!(parse_size("1GB").unwrap(), 1 << 30);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("10TB").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("300").unwrap(), Duration::from_secs(300));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("5w").is_err());
    }

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.server.public_url(), "http://127.0.0.1:3000");
        assert!(config.auth.required);
        assert!(config.auth.delete_requires_owner);
    }

    #[test]
    fn test_yaml_file_layers_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blossom-server.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 8080\n  public_url: https://cdn.example.com/\nsecurity:\n  allowed_mime_types: [\"image/*\"]\nauth:\n  list_owner_only: true\n",
        )
        .unwrap();

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.public_url(), "https://cdn.example.com");
        assert_eq!(config.security.allowed_mime_types, vec!["image/*"]);
        assert!(config.auth.list_owner_only);
        assert_eq!(config.auth.expiration_time, "24h");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.path().join("absent.yaml")))
            .extract()
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_example_file_parses() {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(include_str!("../blossom-server.example.yaml")))
            .extract()
            .unwrap();
        config.validate().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = Config::default();
        config.storage.backend = "s3".into();
        assert!(config.validate().is_err());
    }
}
