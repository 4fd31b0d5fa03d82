//! Client - Authenticated API clients and their scoped acquisition
//!
//! A [`ClientFactory`] turns resolved credentials into a fresh authenticated
//! client for one API family. Callers hold the client through a
//! [`ScopedClient`], which releases it exactly once on every exit path.

use std::fmt;
use std::ops::Deref;

use log::debug;

use crate::config::ResolvedCredentials;
use crate::error::ProviderResult;
use crate::provider::BoxFuture;
use crate::retry::TokenRefresh;

/// Remote API family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiFamily {
    Iam,
    Cdl,
    DicomConfig,
    DockerRegistry,
    Stl,
    Notification,
    S3Creds,
    Fhir,
}

impl ApiFamily {
    pub const ALL: [ApiFamily; 8] = [
        ApiFamily::Iam,
        ApiFamily::Cdl,
        ApiFamily::DicomConfig,
        ApiFamily::DockerRegistry,
        ApiFamily::Stl,
        ApiFamily::Notification,
        ApiFamily::S3Creds,
        ApiFamily::Fhir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFamily::Iam => "iam",
            ApiFamily::Cdl => "cdl",
            ApiFamily::DicomConfig => "dicom",
            ApiFamily::DockerRegistry => "docker-registry",
            ApiFamily::Stl => "stl",
            ApiFamily::Notification => "notification",
            ApiFamily::S3Creds => "s3creds",
            ApiFamily::Fhir => "fhir",
        }
    }

    /// Provider attribute holding an explicit base URL for the family
    pub fn config_key(&self) -> &'static str {
        match self {
            ApiFamily::Iam => "idm_url",
            ApiFamily::Cdl => "cdl_url",
            ApiFamily::DicomConfig => "dicom_url",
            ApiFamily::DockerRegistry => "docker_registry_url",
            ApiFamily::Stl => "stl_url",
            ApiFamily::Notification => "notification_url",
            ApiFamily::S3Creds => "s3creds_url",
            ApiFamily::Fhir => "fhir_url",
        }
    }
}

impl fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated, short-lived handle to one API family
pub trait ApiClient: TokenRefresh {
    fn family(&self) -> ApiFamily;

    /// Base URL requests are sent to
    fn endpoint(&self) -> &str;

    /// Mark the handle released. Idempotent.
    fn release(&self);

    fn is_released(&self) -> bool;
}

/// Parameters of one acquisition
#[derive(Debug, Clone, Copy)]
pub struct ClientRequest<'a> {
    pub family: ApiFamily,
    pub credentials: &'a ResolvedCredentials,
    /// Per-call endpoint taken from a record attribute (e.g. `cdl_endpoint`)
    pub endpoint: Option<&'a str>,
}

impl<'a> ClientRequest<'a> {
    pub fn new(family: ApiFamily, credentials: &'a ResolvedCredentials) -> Self {
        Self {
            family,
            credentials,
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Option<&'a str>) -> Self {
        self.endpoint = endpoint.filter(|e| !e.is_empty());
        self
    }
}

/// Produces authenticated clients. Does not pool.
pub trait ClientFactory: Send + Sync {
    type Client: ApiClient;

    fn connect<'a>(
        &'a self,
        request: ClientRequest<'a>,
    ) -> BoxFuture<'a, ProviderResult<Self::Client>>;
}

/// Owns an acquired client and releases it when dropped
pub struct ScopedClient<C: ApiClient> {
    client: C,
}

impl<C: ApiClient> ScopedClient<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Release now rather than at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl<C: ApiClient> Deref for ScopedClient<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C: ApiClient> Drop for ScopedClient<C> {
    fn drop(&mut self) {
        debug!("releasing {} client", self.client.family());
        self.client.release();
    }
}

/// Acquire a client whose release is tied to the returned guard
pub async fn acquire<F: ClientFactory>(
    factory: &F,
    request: ClientRequest<'_>,
) -> ProviderResult<ScopedClient<F::Client>> {
    debug!("acquiring {} client", request.family);
    let client = factory.connect(request).await?;
    Ok(ScopedClient::new(client))
}
