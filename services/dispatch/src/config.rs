use anyhow::{Context, Result};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 32 * 1024 * 1024;

// Dispatch service configuration sourced from environment variables, with an
// optional YAML override file.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub tls: Option<TlsConfig>,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub auth: AuthConfig,
    pub caches: CacheConfig,
    pub defaults: DefaultsConfig,
    pub io_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => anyhow::bail!("unknown storage backend {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_pg_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_pg_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_pg_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_pg_max_connections() -> u32 {
    10
}

fn default_pg_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlsConfig {
    pub bind_addr: SocketAddr,
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Path segment the auth resource is mounted at, under the root.
    pub path: String,
    pub token_ttl_secs: u64,
    pub algorithm: Algorithm,
    /// HMAC secret, or the base64url Ed25519 seed for `EdDSA`.
    pub signing_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            path: "auth".to_string(),
            token_ttl_secs: 3600,
            algorithm: Algorithm::HS256,
            signing_secret: None,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("path", &self.path)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("algorithm", &self.algorithm)
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Entry capacity of each provider cache. Zero disables caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    pub users: usize,
    pub owners: usize,
    pub grants: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            users: 100,
            owners: 1000,
            grants: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultsConfig {
    /// Body size limit for resources that set none of their own.
    pub max_upload_size: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServiceConfigOverride {
    name: Option<String>,
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    tls: Option<TlsConfig>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresConfig>,
    auth: Option<AuthOverride>,
    caches: Option<CacheOverride>,
    max_upload_size: Option<usize>,
    io_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthOverride {
    path: Option<String>,
    token_ttl_secs: Option<u64>,
    algorithm: Option<Algorithm>,
    signing_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheOverride {
    users: Option<usize>,
    owners: Option<usize>,
    grants: Option<usize>,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|err| anyhow::anyhow!("parse {key}: {err}")),
        Err(_) => Ok(default),
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let name = std::env::var("WARDEN_NAME").unwrap_or_else(|_| "warden".to_string());
        let bind_addr = std::env::var("WARDEN_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .with_context(|| "parse WARDEN_BIND")?;
        let metrics_bind = std::env::var("WARDEN_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:9090".to_string())
            .parse()
            .with_context(|| "parse WARDEN_METRICS_BIND")?;

        let tls = match std::env::var("WARDEN_TLS_BIND") {
            Ok(addr) => Some(TlsConfig {
                bind_addr: addr.parse().with_context(|| "parse WARDEN_TLS_BIND")?,
                certificate_path: std::env::var("WARDEN_TLS_CERT")
                    .with_context(|| "WARDEN_TLS_CERT is required with WARDEN_TLS_BIND")?
                    .into(),
                private_key_path: std::env::var("WARDEN_TLS_KEY")
                    .with_context(|| "WARDEN_TLS_KEY is required with WARDEN_TLS_BIND")?
                    .into(),
            }),
            Err(_) => None,
        };

        let storage = env_or("WARDEN_STORAGE", StorageBackend::Memory)?;
        let postgres = match std::env::var("WARDEN_PG_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_or("WARDEN_PG_MAX_CONNECTIONS", default_pg_max_connections())?,
                connect_timeout_ms: env_or("WARDEN_PG_CONNECT_TIMEOUT_MS", default_pg_timeout_ms())?,
                acquire_timeout_ms: env_or("WARDEN_PG_ACQUIRE_TIMEOUT_MS", default_pg_timeout_ms())?,
            }),
            Err(_) => None,
        };

        let defaults = AuthConfig::default();
        let auth = AuthConfig {
            path: std::env::var("WARDEN_AUTH_PATH").unwrap_or(defaults.path),
            token_ttl_secs: env_or("WARDEN_TOKEN_TTL_SECS", defaults.token_ttl_secs)?,
            algorithm: env_or("WARDEN_TOKEN_ALGORITHM", defaults.algorithm)?,
            signing_secret: std::env::var("WARDEN_SIGNING_SECRET").ok(),
        };

        let cache_defaults = CacheConfig::default();
        let caches = CacheConfig {
            users: env_or("WARDEN_CACHE_USERS", cache_defaults.users)?,
            owners: env_or("WARDEN_CACHE_OWNERS", cache_defaults.owners)?,
            grants: env_or("WARDEN_CACHE_GRANTS", cache_defaults.grants)?,
        };

        Ok(Self {
            name,
            bind_addr,
            metrics_bind,
            tls,
            storage,
            postgres,
            auth,
            caches,
            defaults: DefaultsConfig {
                max_upload_size: env_or("WARDEN_MAX_UPLOAD_SIZE", DEFAULT_MAX_UPLOAD_SIZE)?,
            },
            io_timeout_secs: env_or("WARDEN_IO_TIMEOUT_SECS", 10)?,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("WARDEN_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read WARDEN_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: ServiceConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse service config yaml")?;
        if let Some(value) = override_cfg.name {
            self.name = value;
        }
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.tls {
            self.tls = Some(value);
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(auth) = override_cfg.auth {
            if let Some(value) = auth.path {
                self.auth.path = value;
            }
            if let Some(value) = auth.token_ttl_secs {
                self.auth.token_ttl_secs = value;
            }
            if let Some(value) = auth.algorithm {
                self.auth.algorithm = value;
            }
            if let Some(value) = auth.signing_secret {
                self.auth.signing_secret = Some(value);
            }
        }
        if let Some(caches) = override_cfg.caches {
            if let Some(value) = caches.users {
                self.caches.users = value;
            }
            if let Some(value) = caches.owners {
                self.caches.owners = value;
            }
            if let Some(value) = caches.grants {
                self.caches.grants = value;
            }
        }
        if let Some(value) = override_cfg.max_upload_size {
            self.defaults.max_upload_size = value;
        }
        if let Some(value) = override_cfg.io_timeout_secs {
            self.io_timeout_secs = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => unsafe {
                    std::env::set_var(self.key, value);
                },
                None => unsafe {
                    std::env::remove_var(self.key);
                },
            }
        }
    }

    fn clear_env() -> Vec<EnvGuard> {
        [
            "WARDEN_NAME",
            "WARDEN_BIND",
            "WARDEN_METRICS_BIND",
            "WARDEN_TLS_BIND",
            "WARDEN_STORAGE",
            "WARDEN_PG_URL",
            "DATABASE_URL",
            "WARDEN_AUTH_PATH",
            "WARDEN_TOKEN_TTL_SECS",
            "WARDEN_TOKEN_ALGORITHM",
            "WARDEN_SIGNING_SECRET",
            "WARDEN_CACHE_USERS",
            "WARDEN_CACHE_OWNERS",
            "WARDEN_CACHE_GRANTS",
            "WARDEN_MAX_UPLOAD_SIZE",
            "WARDEN_IO_TIMEOUT_SECS",
            "WARDEN_CONFIG",
        ]
        .into_iter()
        .map(EnvGuard::unset)
        .collect()
    }

    #[test]
    #[serial]
    fn defaults_without_env() {
        let _env = clear_env();
        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.name, "warden");
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().expect("addr"));
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.tls.is_none());
        assert!(config.postgres.is_none());
        assert_eq!(config.auth, AuthConfig::default());
        assert_eq!(config.caches, CacheConfig::default());
        assert_eq!(config.defaults.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
        assert_eq!(config.io_timeout_secs, 10);
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        let _env = clear_env();
        let _g1 = EnvGuard::set("WARDEN_STORAGE", "postgres");
        let _g2 = EnvGuard::set("WARDEN_PG_URL", "postgres://localhost/warden");
        let _g3 = EnvGuard::set("WARDEN_TOKEN_ALGORITHM", "HS512");
        let _g4 = EnvGuard::set("WARDEN_CACHE_GRANTS", "0");
        let _g5 = EnvGuard::set("WARDEN_AUTH_PATH", "login");
        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(
            config.postgres.as_ref().map(|pg| pg.url.as_str()),
            Some("postgres://localhost/warden")
        );
        assert_eq!(config.auth.algorithm, Algorithm::HS512);
        assert_eq!(config.auth.path, "login");
        assert_eq!(config.caches.grants, 0);
    }

    #[test]
    #[serial]
    fn bad_env_value_names_the_variable() {
        let _env = clear_env();
        let _g = EnvGuard::set("WARDEN_IO_TIMEOUT_SECS", "soon");
        let err = ServiceConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("WARDEN_IO_TIMEOUT_SECS"));
    }

    #[test]
    #[serial]
    fn yaml_overrides_env() {
        let _env = clear_env();
        let mut config = ServiceConfig::from_env().expect("config");
        config
            .apply_yaml(
                r#"
name: edge
bind_addr: "127.0.0.1:9000"
auth:
  path: token
  token_ttl_secs: 60
  algorithm: EdDSA
caches:
  users: 5
max_upload_size: 1024
tls:
  bind_addr: "127.0.0.1:9443"
  certificate_path: /etc/warden/cert.pem
  private_key_path: /etc/warden/key.pem
"#,
            )
            .expect("yaml");
        assert_eq!(config.name, "edge");
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().expect("addr"));
        assert_eq!(config.auth.path, "token");
        assert_eq!(config.auth.token_ttl_secs, 60);
        assert_eq!(config.auth.algorithm, Algorithm::EdDSA);
        assert_eq!(config.caches.users, 5);
        assert_eq!(config.caches.owners, CacheConfig::default().owners);
        assert_eq!(config.defaults.max_upload_size, 1024);
        assert_eq!(
            config.tls.map(|tls| tls.certificate_path),
            Some(PathBuf::from("/etc/warden/cert.pem"))
        );
    }

    #[test]
    fn signing_secret_is_redacted_in_debug() {
        let auth = AuthConfig {
            signing_secret: Some("hunter2".to_string()),
            ..AuthConfig::default()
        };
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));
    }
}
