use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::GoogleConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// What the provider vouches for after a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub id: String,
    pub display_name: Option<String>,
}

/// An OAuth2 authorization-code provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent page URL carrying the anti-forgery `state`.
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> anyhow::Result<ExternalIdentity>;
}

pub struct GoogleProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: Url,
}

impl GoogleProvider {
    pub fn new(config: &GoogleConfig) -> anyhow::Result<Self> {
        Url::parse(&config.callback_url).context("GOOGLE_CALLBACK_URL is not a valid URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.callback_url.clone(),
            auth_url: Url::parse(GOOGLE_AUTH_URL)?,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "profile")
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> anyhow::Result<ExternalIdentity> {
        let token: GoogleTokenResponse = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("exchange authorization code")?
            .error_for_status()
            .context("token endpoint rejected the code")?
            .json()
            .await
            .context("parse token response")?;

        let profile: GoogleUserInfo = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("fetch user info")?
            .error_for_status()
            .context("userinfo endpoint rejected the token")?
            .json()
            .await
            .context("parse user info")?;

        debug!(external_id = %profile.sub, "google profile fetched");
        Ok(profile.into())
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
}

impl From<GoogleUserInfo> for ExternalIdentity {
    fn from(info: GoogleUserInfo) -> Self {
        Self {
            id: info.sub,
            display_name: info.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleProvider {
        GoogleProvider::new(&GoogleConfig {
            client_id: "client-123".into(),
            client_secret: "shh".into(),
            callback_url: "http://localhost:3000/auth/google/secrets".into(),
        })
        .expect("valid config")
    }

    #[test]
    fn authorization_url_requests_profile_scope() {
        let url = Url::parse(&provider().authorization_url("st4te")).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("scope"), Some("profile"));
        assert_eq!(get("state"), Some("st4te"));
        assert_eq!(get("client_id"), Some("client-123"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(
            get("redirect_uri"),
            Some("http://localhost:3000/auth/google/secrets")
        );
    }

    #[test]
    fn client_secret_never_leaks_into_consent_url() {
        assert!(!provider().authorization_url("s").contains("shh"));
    }

    #[test]
    fn rejects_bad_callback_url() {
        let res = GoogleProvider::new(&GoogleConfig {
            client_id: "a".into(),
            client_secret: "b".into(),
            callback_url: "not a url".into(),
        });
        assert!(res.is_err());
    }

    #[test]
    fn userinfo_maps_sub_to_external_id() {
        let info: GoogleUserInfo = serde_json::from_str(
            r#"{"sub":"1090","name":"Ada Lovelace","picture":"https://x/y.png"}"#,
        )
        .unwrap();
        let identity: ExternalIdentity = info.into();
        assert_eq!(identity.id, "1090");
        assert_eq!(identity.display_name.as_deref(), Some("Ada Lovelace"));
    }
}
