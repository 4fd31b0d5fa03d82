//! OAuth2 token exchange against the IAM authorization server

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use log::debug;
use serde::{Deserialize, Serialize};

use hsdp_core::config::{Credentials, OAuthClient, Secret};
use hsdp_core::error::{ProviderError, ProviderResult};

use crate::client::error_message;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion
const ASSERTION_TTL_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    1800
}

/// Bearer token with its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: Secret,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: Secret::new(value),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        self.value.expose()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Expired, or expiring within `grace`
    pub fn is_expired(&self, grace: Duration) -> bool {
        Utc::now() + grace >= self.expires_at
    }
}

/// Claims of the service identity assertion
#[derive(Debug, Serialize, PartialEq, Eq)]
struct AssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    exp: i64,
}

/// Exchanges credentials for access tokens
#[derive(Debug, Clone)]
pub struct Authenticator {
    http: reqwest::Client,
    /// Base URL of the authorization server
    iam_url: String,
    credentials: Credentials,
    oauth_client: Option<OAuthClient>,
}

impl Authenticator {
    pub fn new(
        http: reqwest::Client,
        iam_url: impl Into<String>,
        credentials: Credentials,
        oauth_client: Option<OAuthClient>,
    ) -> Self {
        Self {
            http,
            iam_url: iam_url.into(),
            credentials,
            oauth_client,
        }
    }

    pub fn iam_url(&self) -> &str {
        &self.iam_url
    }

    fn token_url(&self) -> String {
        format!("{}/authorize/oauth2/token", self.iam_url)
    }

    fn assertion_claims(&self, service_id: &str, now: DateTime<Utc>) -> AssertionClaims {
        AssertionClaims {
            iss: service_id.to_string(),
            sub: service_id.to_string(),
            aud: format!("{}/oauth2/access_token", self.iam_url),
            exp: now.timestamp() + ASSERTION_TTL_SECS,
        }
    }

    fn sign_assertion(&self, service_id: &str, private_key: &Secret) -> ProviderResult<String> {
        let key = EncodingKey::from_rsa_pem(private_key.expose().as_bytes()).map_err(|e| {
            ProviderError::AuthenticationFailed(format!("invalid service private key: {}", e))
        })?;
        let claims = self.assertion_claims(service_id, Utc::now());
        encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| {
            ProviderError::AuthenticationFailed(format!("failed to sign assertion: {}", e))
        })
    }

    /// Run the grant for the configured credentials
    pub async fn exchange(&self) -> ProviderResult<AccessToken> {
        let request = self
            .http
            .post(self.token_url())
            .header("Api-Version", "2")
            .header("Accept", "application/json");

        let request = match &self.credentials {
            Credentials::Service {
                service_id,
                private_key,
            } => {
                debug!("requesting token for service {}", service_id);
                let assertion = self.sign_assertion(service_id, private_key)?;
                request.form(&[
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ])
            }
            Credentials::User { username, password } => {
                debug!("requesting token for user {}", username);
                let request = request.form(&[
                    ("grant_type", "password"),
                    ("username", username.as_str()),
                    ("password", password.expose()),
                ]);
                match &self.oauth_client {
                    Some(client) => request
                        .basic_auth(&client.client_id, Some(client.client_secret.expose())),
                    None => request,
                }
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::AuthenticationFailed(format!("token request: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthenticationFailed(format!(
                "HTTP {}: {}",
                status,
                error_message(status, &body)
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ProviderError::AuthenticationFailed(format!("invalid token response: {}", e))
        })?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        debug!(
            "acquired access token, expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok(AccessToken::new(token.access_token, expires_at))
    }
}
