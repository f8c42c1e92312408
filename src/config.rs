use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_minutes: i64,
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the board on the in-memory store.
    pub database_url: Option<String>,
    pub session: SessionConfig,
    /// Only set when both client credentials are non-empty.
    pub google: Option<GoogleConfig>,
    pub static_dir: String,
}

/// Ten years.
pub const MAX_SESSION_TTL_MINUTES: i64 = 60 * 24 * 365 * 10;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let ttl_minutes = match var("SESSION_TTL_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("SESSION_TTL_MINUTES is not a number: {raw}"))?,
            None => SessionConfig::default().ttl_minutes,
        };
        anyhow::ensure!(
            (1..=MAX_SESSION_TTL_MINUTES).contains(&ttl_minutes),
            "SESSION_TTL_MINUTES must be between 1 and {MAX_SESSION_TTL_MINUTES}, got {ttl_minutes}"
        );

        let session = SessionConfig {
            cookie_name: var("SESSION_COOKIE_NAME").unwrap_or_else(|| "secretboard_session".into()),
            ttl_minutes,
            secure_cookie: var("SESSION_COOKIE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        let google = match (var("CLIENT_ID"), var("CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                callback_url: var("GOOGLE_CALLBACK_URL")
                    .unwrap_or_else(|| "http://localhost:3000/auth/google/secrets".into()),
            }),
            _ => None,
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            session,
            google,
            static_dir: var("STATIC_DIR").unwrap_or_else(|| "public".into()),
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "secretboard_session".into(),
            ttl_minutes: 60 * 24 * 7,
            secure_cookie: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.database_url.is_none());
        assert!(cfg.google.is_none());
        assert_eq!(cfg.session.cookie_name, "secretboard_session");
        assert_eq!(cfg.session.ttl_minutes, 60 * 24 * 7);
        assert!(!cfg.session.secure_cookie);
        assert_eq!(cfg.static_dir, "public");
    }

    #[test]
    fn google_needs_both_credentials_non_empty() {
        let cfg = config(&[("CLIENT_ID", ""), ("CLIENT_SECRET", "")]).unwrap();
        assert!(cfg.google.is_none());

        let cfg = config(&[("CLIENT_ID", "id"), ("CLIENT_SECRET", "  ")]).unwrap();
        assert!(cfg.google.is_none());

        let cfg = config(&[("CLIENT_ID", "id"), ("CLIENT_SECRET", "shh")]).unwrap();
        let google = cfg.google.expect("google enabled");
        assert_eq!(google.client_id, "id");
        assert_eq!(google.callback_url, "http://localhost:3000/auth/google/secrets");
    }

    #[test]
    fn session_ttl_is_bounded() {
        assert!(config(&[("SESSION_TTL_MINUTES", "10000000000")]).is_err());
        assert!(config(&[("SESSION_TTL_MINUTES", "0")]).is_err());
        assert!(config(&[("SESSION_TTL_MINUTES", "soon")]).is_err());

        let cfg = config(&[("SESSION_TTL_MINUTES", "30")]).unwrap();
        assert_eq!(cfg.session.ttl_minutes, 30);
        let cfg = config(&[("SESSION_TTL_MINUTES", &MAX_SESSION_TTL_MINUTES.to_string())]).unwrap();
        assert_eq!(cfg.session.ttl_minutes, MAX_SESSION_TTL_MINUTES);
    }
}
