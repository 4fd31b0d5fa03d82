//! Config - Provider-wide configuration and per-record principal resolution
//!
//! [`GlobalConfig`] is built once from the provider block attributes, with
//! `HSDP_*` environment variables as fallbacks. It is read-only afterwards.
//! [`resolve`] merges it with a record's optional `principal` block into the
//! credentials a client is acquired with.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use log::debug;

use crate::client::ApiFamily;
use crate::error::{ProviderError, ProviderResult};
use crate::resource::{Record, Value};
use crate::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, RetryPolicy};

pub const DEFAULT_REGION: &str = "us-east";
pub const DEFAULT_ENVIRONMENT: &str = "client-test";

/// A value that must never be displayed
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Root credential of a configuration
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Service identity, authenticated with a signed JWT assertion
    Service {
        service_id: String,
        private_key: Secret,
    },
    /// User login, authenticated with the password grant
    User { username: String, password: Secret },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Service { service_id, .. } => f
                .debug_struct("Service")
                .field("service_id", service_id)
                .finish_non_exhaustive(),
            Credentials::User { username, .. } => f
                .debug_struct("User")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// OAuth client used for the password grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: Secret,
}

/// Process-wide provider configuration
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub region: String,
    pub environment: String,
    pub iam_url: Option<String>,
    pub idm_url: Option<String>,
    pub credentials: Option<Credentials>,
    pub oauth_client: Option<OAuthClient>,
    pub org_id: Option<String>,
    /// File that receives debug log output
    pub debug_log: Option<String>,
    pub retry: RetryPolicy,
    /// Explicit base URLs per API family
    pub endpoints: HashMap<ApiFamily, String>,
    pub shared_key: Option<String>,
    pub secret_key: Option<Secret>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            iam_url: None,
            idm_url: None,
            credentials: None,
            oauth_client: None,
            org_id: None,
            debug_log: None,
            retry: RetryPolicy::default(),
            endpoints: HashMap::new(),
            shared_key: None,
            secret_key: None,
        }
    }
}

/// Attribute lookup with environment fallback
struct Source<'a, E> {
    attributes: &'a HashMap<String, Value>,
    env: E,
}

impl<E: Fn(&str) -> Option<String>> Source<'_, E> {
    fn string(&self, key: &str, env_var: Option<&str>) -> Option<String> {
        match self.attributes.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => env_var
                .and_then(|name| (self.env)(name))
                .filter(|s| !s.is_empty()),
        }
    }

    fn int(&self, key: &str) -> ProviderResult<Option<i64>> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::Int(n)) if *n >= 0 => Ok(Some(*n)),
            Some(other) => Err(ProviderError::validation(format!(
                "'{}' must be a non-negative integer, got {:?}",
                key, other
            ))),
        }
    }
}

impl GlobalConfig {
    /// Build from provider block attributes, falling back to the process
    /// environment
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> ProviderResult<Self> {
        Self::from_attributes_with_env(attributes, |name| std::env::var(name).ok())
    }

    /// Build from provider block attributes with an explicit environment
    pub fn from_attributes_with_env(
        attributes: &HashMap<String, Value>,
        env: impl Fn(&str) -> Option<String>,
    ) -> ProviderResult<Self> {
        let src = Source { attributes, env };

        let service_id = src.string("service_id", Some("HSDP_SERVICE_ID"));
        let private_key = src.string("service_private_key", Some("HSDP_SERVICE_PRIVATE_KEY"));
        let username = src.string("username", Some("HSDP_USERNAME"));
        let password = src.string("password", Some("HSDP_PASSWORD"));

        let service_style = service_id.is_some() || private_key.is_some();
        let user_style = username.is_some() || password.is_some();
        if service_style && user_style {
            return Err(ProviderError::validation(
                "configure either service_id/service_private_key or username/password, not both",
            ));
        }

        let credentials = match (service_id, private_key, username, password) {
            (Some(service_id), Some(key), None, None) => Some(Credentials::Service {
                service_id,
                private_key: Secret::new(key),
            }),
            (None, None, Some(username), Some(password)) => Some(Credentials::User {
                username,
                password: Secret::new(password),
            }),
            (Some(_), None, _, _) => {
                return Err(ProviderError::validation(
                    "service_id requires service_private_key",
                ));
            }
            (None, Some(_), _, _) => {
                return Err(ProviderError::validation(
                    "service_private_key requires service_id",
                ));
            }
            (_, _, Some(_), None) => {
                return Err(ProviderError::validation("username requires password"));
            }
            (_, _, None, Some(_)) => {
                return Err(ProviderError::validation("password requires username"));
            }
            _ => None,
        };

        let oauth_client = match (
            src.string("oauth2_client_id", Some("HSDP_OAUTH2_CLIENT_ID")),
            src.string("oauth2_password", Some("HSDP_OAUTH2_PASSWORD")),
        ) {
            (Some(client_id), Some(secret)) => Some(OAuthClient {
                client_id,
                client_secret: Secret::new(secret),
            }),
            (None, None) => None,
            _ => {
                return Err(ProviderError::validation(
                    "oauth2_client_id and oauth2_password must be set together",
                ));
            }
        };

        let mut retry = RetryPolicy::default();
        retry.max_attempts = src
            .int("retry_max")?
            .map(|n| {
                u32::try_from(n).map_err(|_| {
                    ProviderError::validation(format!("retry_max {} is out of range", n))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let base_ms = src
            .int("retry_base_delay_ms")?
            .map(|n| {
                u64::try_from(n).map_err(|_| {
                    ProviderError::validation(format!("retry_base_delay_ms {} is negative", n))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_BASE_DELAY_MS);
        retry.base_delay = Duration::from_millis(base_ms);
        if base_ms == 0 {
            retry.jitter = false;
        }

        let mut endpoints = HashMap::new();
        for family in ApiFamily::ALL {
            if let Some(url) = src.string(family.config_key(), None) {
                endpoints.insert(family, url);
            }
        }

        let config = Self {
            region: src
                .string("region", Some("HSDP_REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            environment: src
                .string("environment", Some("HSDP_ENVIRONMENT"))
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            iam_url: src.string("iam_url", Some("HSDP_IAM_URL")),
            idm_url: src.string("idm_url", Some("HSDP_IDM_URL")),
            credentials,
            oauth_client,
            org_id: src.string("org_id", Some("HSDP_ORG_ID")),
            debug_log: src.string("debug_log", Some("HSDP_DEBUG_LOG")),
            retry,
            endpoints,
            shared_key: src.string("shared_key", Some("HSDP_SHARED_KEY")),
            secret_key: src
                .string("secret_key", Some("HSDP_SECRET_KEY"))
                .map(Secret::new),
        };
        debug!(
            "loaded provider configuration: region={} environment={} credentials={:?}",
            config.region, config.environment, config.credentials
        );
        Ok(config)
    }

    /// Explicitly configured base URL of a family
    pub fn endpoint(&self, family: ApiFamily) -> Option<&str> {
        match self.endpoints.get(&family) {
            Some(url) => Some(url),
            None if family == ApiFamily::Iam => self.idm_url.as_deref(),
            None => None,
        }
    }
}

/// Per-record credential override
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub service_id: Option<String>,
    pub service_private_key: Option<Secret>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub environment: Option<String>,
    pub organization_context: Option<String>,
}

impl Principal {
    /// Read the record's `principal` block; `None` when absent or empty
    pub fn from_record(record: &Record) -> Option<Self> {
        let block = record.get_block("principal")?;
        let field = |key: &str| match block.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };
        let principal = Self {
            service_id: field("service_id"),
            service_private_key: field("service_private_key").map(Secret::new),
            endpoint: field("endpoint"),
            region: field("region"),
            environment: field("environment"),
            organization_context: field("organization_context"),
        };
        (principal != Self::default()).then_some(principal)
    }
}

/// Credentials and scope for one client acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub credentials: Credentials,
    pub oauth_client: Option<OAuthClient>,
    pub region: String,
    pub environment: String,
    /// Endpoint override from the principal
    pub endpoint: Option<String>,
    pub organization: Option<String>,
}

/// Merge global credentials with an optional principal override. Principal
/// fields win; unset fields fall through to the global configuration.
pub fn resolve(
    config: &GlobalConfig,
    principal: Option<&Principal>,
) -> ProviderResult<ResolvedCredentials> {
    let empty = Principal::default();
    let principal = principal.unwrap_or(&empty);

    let credentials = match (&principal.service_id, &principal.service_private_key) {
        (Some(service_id), Some(key)) => {
            debug!("using principal service identity {}", service_id);
            Credentials::Service {
                service_id: service_id.clone(),
                private_key: key.clone(),
            }
        }
        (Some(_), None) => {
            return Err(ProviderError::validation(
                "principal.service_id requires principal.service_private_key",
            ));
        }
        (None, Some(_)) => {
            return Err(ProviderError::validation(
                "principal.service_private_key requires principal.service_id",
            ));
        }
        (None, None) => config.credentials.clone().ok_or_else(|| {
            ProviderError::MissingCredentials(
                "no service identity or user credentials configured".to_string(),
            )
        })?,
    };

    Ok(ResolvedCredentials {
        credentials,
        oauth_client: config.oauth_client.clone(),
        region: principal
            .region
            .clone()
            .unwrap_or_else(|| config.region.clone()),
        environment: principal
            .environment
            .clone()
            .unwrap_or_else(|| config.environment.clone()),
        endpoint: principal.endpoint.clone(),
        organization: principal
            .organization_context
            .clone()
            .or_else(|| config.org_id.clone()),
    })
}

/// Credentials for a call that may supply its own user login. An explicit
/// pair wins over the global credential.
pub fn resolve_user_override(
    config: &GlobalConfig,
    username: Option<&str>,
    password: Option<&str>,
) -> ProviderResult<ResolvedCredentials> {
    let username = username.filter(|s| !s.is_empty());
    let password = password.filter(|s| !s.is_empty());
    match (username, password) {
        (Some(username), Some(password)) => Ok(ResolvedCredentials {
            credentials: Credentials::User {
                username: username.to_string(),
                password: Secret::new(password),
            },
            oauth_client: config.oauth_client.clone(),
            region: config.region.clone(),
            environment: config.environment.clone(),
            endpoint: None,
            organization: config.org_id.clone(),
        }),
        (None, None) => resolve(config, None),
        _ => Err(ProviderError::validation(
            "username and password must be set together",
        )),
    }
}
