//! Server configuration from `UNIMARKET_*` environment variables.

use std::net::{IpAddr, SocketAddr};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use unimarket_auth::AuthConfig;
use unimarket_auth::config::MAX_LIFETIME_SECS;

use crate::error::ServerError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Create the demo accounts on startup.
    pub seed_demo_users: bool,
    /// Interval between idle-session and stale rate-limit sweeps.
    pub housekeeping_secs: u64,
    /// Peers allowed to supply `X-Forwarded-For`. Empty means the header
    /// is ignored and the socket peer is the client.
    pub trusted_proxies: Vec<IpAddr>,
    pub auth: AuthConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Missing keys keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = match get("UNIMARKET_LISTEN_ADDR") {
            Some(v) => v
                .parse()
                .map_err(|e| ServerError::Config(format!("UNIMARKET_LISTEN_ADDR: {e}")))?,
            None => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let mut auth = AuthConfig::default();
        if let Some(pem) = get("UNIMARKET_JWT_PRIVATE_KEY") {
            auth.jwt_private_key_pem = pem;
        }
        if let Some(pem) = get("UNIMARKET_JWT_PUBLIC_KEY") {
            auth.jwt_public_key_pem = pem;
        }
        if let Some(issuer) = get("UNIMARKET_JWT_ISSUER") {
            auth.jwt_issuer = issuer;
        }
        auth.pepper = get("UNIMARKET_PEPPER");
        if let Some(key) = get("UNIMARKET_MFA_KEY") {
            auth.mfa_encryption_key = Some(parse_mfa_key(&key)?);
        }
        if let Some(v) = get("UNIMARKET_TOKEN_LIFETIME_SECS") {
            auth.token_lifetime_secs = parse_lifetime("UNIMARKET_TOKEN_LIFETIME_SECS", &v)?;
        }
        if let Some(v) = get("UNIMARKET_SESSION_TTL_SECS") {
            auth.session_ttl_secs = parse_lifetime("UNIMARKET_SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = get("UNIMARKET_EMAIL_CODE_LIFETIME_SECS") {
            auth.email_code_lifetime_secs =
                parse_lifetime("UNIMARKET_EMAIL_CODE_LIFETIME_SECS", &v)?;
        }

        let seed_demo_users = match get("UNIMARKET_SEED_DEMO_USERS") {
            Some(v) => parse_bool("UNIMARKET_SEED_DEMO_USERS", &v)?,
            None => true,
        };
        let housekeeping_secs = match get("UNIMARKET_HOUSEKEEPING_SECS") {
            Some(v) => parse_number("UNIMARKET_HOUSEKEEPING_SECS", &v)?,
            None => 3_600,
        };
        let trusted_proxies = match get("UNIMARKET_TRUSTED_PROXIES") {
            Some(v) => parse_ip_list("UNIMARKET_TRUSTED_PROXIES", &v)?,
            None => Vec::new(),
        };

        Ok(Self {
            listen_addr,
            seed_demo_users,
            housekeeping_secs,
            trusted_proxies,
            auth,
        })
    }
}

/// Base64-encoded 32-byte AES key.
fn parse_mfa_key(encoded: &str) -> Result<[u8; 32], ServerError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ServerError::Config(format!("UNIMARKET_MFA_KEY: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| ServerError::Config("UNIMARKET_MFA_KEY must decode to 32 bytes".into()))
}

fn parse_number(key: &str, value: &str) -> Result<u64, ServerError> {
    value
        .trim()
        .parse()
        .map_err(|e| ServerError::Config(format!("{key}: {e}")))
}

/// A lifetime in seconds, at most [`MAX_LIFETIME_SECS`].
fn parse_lifetime(key: &str, value: &str) -> Result<u64, ServerError> {
    let secs = parse_number(key, value)?;
    if secs > MAX_LIFETIME_SECS {
        return Err(ServerError::Config(format!(
            "{key}: {secs} exceeds the maximum of {MAX_LIFETIME_SECS} seconds"
        )));
    }
    Ok(secs)
}

/// Comma-separated IP addresses.
fn parse_ip_list(key: &str, value: &str) -> Result<Vec<IpAddr>, ServerError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse()
                .map_err(|e| ServerError::Config(format!("{key}: {item}: {e}")))
        })
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ServerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ServerError::Config(format!("{key}: not a boolean: {other}"))),
    }
}
