use std::net::IpAddr;
use std::time::Duration;

use ipnet::IpNet;

use crate::token::TokenSettings;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub single_use_ttl_secs: i64,
    pub invitation_ttl_secs: i64,
    pub call_timeout: Duration,
    pub standalone_tenant: StandaloneTenantPolicy,
    pub role_delete: RoleDeletePolicy,
    pub max_body_size: usize,
    pub trusted_proxies: Vec<IpNet>,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Memory,
}

/// Where standalone registrations land.
#[derive(Debug, Clone, PartialEq)]
pub enum StandaloneTenantPolicy {
    /// One tenant, created on first use, holding every standalone user.
    Shared { domain: String },
    /// A fresh workspace tenant per user, with the user as owner.
    Personal,
}

/// What deleting a role that users still reference does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoleDeletePolicy {
    Reject,
    Cascade,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let store = match env_or("TENANTGATE_STORE", "postgres").as_str() {
            "memory" => StoreBackend::Memory,
            "postgres" => StoreBackend::Postgres {
                database_url: env_required("DATABASE_URL")?,
            },
            other => return Err(format!("Invalid TENANTGATE_STORE: {other}")),
        };

        let jwt_secret = env_required("JWT_SECRET")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(format!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes"));
        }

        let host: IpAddr = env_or("TENANTGATE_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid TENANTGATE_HOST: {e}"))?;

        let port: u16 = env_or("TENANTGATE_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid TENANTGATE_PORT: {e}"))?;

        let access_ttl_secs = env_secs("TENANTGATE_ACCESS_TTL_SECS", 900)?;
        let refresh_ttl_secs = env_secs("TENANTGATE_REFRESH_TTL_SECS", 604_800)?;
        let single_use_ttl_secs = env_secs("TENANTGATE_SINGLE_USE_TTL_SECS", 3600)?;
        let invitation_ttl_secs = env_secs("TENANTGATE_INVITATION_TTL_SECS", 604_800)?;

        let call_timeout_ms: u64 = env_or("TENANTGATE_CALL_TIMEOUT_MS", "10000")
            .parse()
            .map_err(|e| format!("Invalid TENANTGATE_CALL_TIMEOUT_MS: {e}"))?;

        let standalone_tenant = match env_or("TENANTGATE_STANDALONE_TENANT", "shared").as_str() {
            "shared" => StandaloneTenantPolicy::Shared {
                domain: env_or("TENANTGATE_SHARED_TENANT_DOMAIN", "users.tenantgate.local"),
            },
            "personal" => StandaloneTenantPolicy::Personal,
            other => return Err(format!("Invalid TENANTGATE_STANDALONE_TENANT: {other}")),
        };

        let role_delete = match env_or("TENANTGATE_ROLE_DELETE", "reject").as_str() {
            "reject" => RoleDeletePolicy::Reject,
            "cascade" => RoleDeletePolicy::Cascade,
            other => return Err(format!("Invalid TENANTGATE_ROLE_DELETE: {other}")),
        };

        let max_body_size: usize = env_or("TENANTGATE_MAX_BODY_SIZE", "1048576")
            .parse()
            .map_err(|e| format!("Invalid TENANTGATE_MAX_BODY_SIZE: {e}"))?;

        let trusted_proxies: Vec<IpNet> = env_or("TENANTGATE_TRUSTED_PROXIES", "")
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse()
                    .map_err(|e| format!("Invalid TENANTGATE_TRUSTED_PROXIES entry '{s}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let log_level = env_or("TENANTGATE_LOG_LEVEL", "info");

        Ok(Config {
            store,
            jwt_secret,
            host,
            port,
            access_ttl_secs,
            refresh_ttl_secs,
            single_use_ttl_secs,
            invitation_ttl_secs,
            call_timeout: Duration::from_millis(call_timeout_ms),
            standalone_tenant,
            role_delete,
            max_body_size,
            trusted_proxies,
            log_level,
        })
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            signing_secret: self.jwt_secret.as_bytes().to_vec(),
            access_ttl: chrono::Duration::seconds(self.access_ttl_secs),
            refresh_ttl: chrono::Duration::seconds(self.refresh_ttl_secs),
            single_use_ttl: chrono::Duration::seconds(self.single_use_ttl_secs),
            invitation_ttl: chrono::Duration::seconds(self.invitation_ttl_secs),
        }
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: i64) -> Result<i64, String> {
    let secs: i64 = env_or(key, &default.to_string())
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))?;
    if secs <= 0 {
        return Err(format!("{key} must be positive"));
    }
    Ok(secs)
}
