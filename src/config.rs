//! Configuration for Wicket
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{Lifetime, LifetimePolicy, TokenKeys};
use crate::types::WicketError;

/// Wicket - session, permission and presence service
#[derive(Parser, Debug, Clone)]
#[command(name = "wicket")]
#[command(about = "Session tokens, role-based permissions and live presence")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Development mode: in-memory store with seeded data and fixed token secrets
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "wicket")]
    pub mongodb_db: String,

    /// Shared token secret; the refresh secret is derived from it unless set explicitly
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Access token secret (overrides JWT_SECRET)
    #[arg(long, env = "JWT_ACCESS_SECRET", hide_env_values = true)]
    pub jwt_access_secret: Option<String>,

    /// Refresh token secret (overrides the derived one)
    #[arg(long, env = "JWT_REFRESH_SECRET", hide_env_values = true)]
    pub jwt_refresh_secret: Option<String>,

    /// Access token lifetime (e.g. 15m)
    #[arg(long, env = "ACCESS_TOKEN_TTL", default_value = "15m")]
    pub access_token_ttl: Lifetime,

    /// Refresh token lifetime without "remember me"
    #[arg(long, env = "REFRESH_TOKEN_TTL_SHORT", default_value = "7d")]
    pub refresh_token_ttl_short: Lifetime,

    /// Refresh token lifetime with "remember me"
    #[arg(long, env = "REFRESH_TOKEN_TTL_LONG", default_value = "30d")]
    pub refresh_token_ttl_long: Lifetime,

    /// Upper bound on any single store call, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Per-subscriber backlog of presence events
    #[arg(long, env = "PRESENCE_CHANNEL_CAPACITY", default_value = "1024")]
    pub presence_channel_capacity: usize,

    /// Close realtime connections idle for this many seconds
    #[arg(long, env = "WS_IDLE_TIMEOUT_SECS", default_value = "300")]
    pub ws_idle_timeout_secs: u64,

    /// Append audit events to this JSONL file instead of MongoDB
    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,

    /// Allowed CORS origin
    #[arg(long, env = "CLIENT_ORIGIN", default_value = "*")]
    pub client_origin: String,

    /// Mark the refresh cookie `Secure`
    #[arg(long, env = "SECURE_COOKIES", default_value = "false")]
    pub secure_cookies: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn ws_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_idle_timeout_secs)
    }

    pub fn lifetime_policy(&self) -> LifetimePolicy {
        LifetimePolicy {
            access: self.access_token_ttl.clone(),
            refresh_short: self.refresh_token_ttl_short.clone(),
            refresh_long: self.refresh_token_ttl_long.clone(),
        }
    }

    /// Effective (access, refresh) secrets, if any are configured
    fn secrets(&self) -> Option<(String, String)> {
        let access = self
            .jwt_access_secret
            .clone()
            .or_else(|| self.jwt_secret.clone())?;
        let refresh = self
            .jwt_refresh_secret
            .clone()
            .or_else(|| self.jwt_secret.as_ref().map(|s| format!("{s}_refresh")))?;
        Some((access, refresh))
    }

    /// Token keys: configured secrets, or fixed dev secrets in dev mode
    pub fn token_keys(&self) -> Result<TokenKeys, WicketError> {
        match self.secrets() {
            Some((access, refresh)) => TokenKeys::new(&access, &refresh),
            None if self.dev_mode => Ok(TokenKeys::new_dev()),
            None => Err(WicketError::Config(
                "JWT_SECRET (or JWT_ACCESS_SECRET and JWT_REFRESH_SECRET) is required in production mode"
                    .into(),
            )),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.token_keys().map_err(|e| e.to_string())?;

        if self.refresh_token_ttl_short.millis > self.refresh_token_ttl_long.millis {
            return Err(
                "REFRESH_TOKEN_TTL_SHORT must not exceed REFRESH_TOKEN_TTL_LONG".to_string(),
            );
        }

        if self.access_token_ttl.millis > self.refresh_token_ttl_short.millis {
            return Err("ACCESS_TOKEN_TTL must not exceed REFRESH_TOKEN_TTL_SHORT".to_string());
        }

        if self.store_timeout_ms == 0 {
            return Err("STORE_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.presence_channel_capacity == 0 {
            return Err("PRESENCE_CHANNEL_CAPACITY must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["wicket"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    const SECRET: &str = "a-production-secret-of-at-least-32-chars";

    #[test]
    fn test_defaults() {
        let args = parse(&["--dev-mode"]);
        assert_eq!(args.listen.port(), 5000);
        assert_eq!(args.access_token_ttl.label, "15m");
        assert_eq!(args.lifetime_policy().refresh_for(true).label, "30d");
        assert_eq!(args.store_timeout(), Duration::from_secs(5));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        let args = parse(&[]);
        assert!(args.validate().is_err());

        let args = parse(&["--jwt-secret", SECRET]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_refresh_secret_derived_from_shared_secret() {
        let args = parse(&["--jwt-secret", SECRET]);
        let (access, refresh) = args.secrets().unwrap();
        assert_eq!(access, SECRET);
        assert_eq!(refresh, format!("{SECRET}_refresh"));

        let args = parse(&[
            "--jwt-secret",
            SECRET,
            "--jwt-refresh-secret",
            "an-explicit-refresh-secret-32-chars-long",
        ]);
        let (_, refresh) = args.secrets().unwrap();
        assert_eq!(refresh, "an-explicit-refresh-secret-32-chars-long");
    }

    #[test]
    fn test_bad_lifetime_rejected_at_parse() {
        let result = Args::try_parse_from(["wicket", "--access-token-ttl", "15x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_tier_order_enforced() {
        let args = parse(&[
            "--dev-mode",
            "--refresh-token-ttl-short",
            "60d",
            "--refresh-token-ttl-long",
            "30d",
        ]);
        assert!(args.validate().is_err());
    }
}
