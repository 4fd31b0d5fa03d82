//! Endpoint inference and validation

use hsdp_core::client::ApiFamily;
use hsdp_core::error::{ProviderError, ProviderResult};

/// Host prefix of a family's default endpoint
fn host_prefix(family: ApiFamily) -> &'static str {
    match family {
        ApiFamily::Iam => "idm",
        ApiFamily::Cdl => "cdl",
        ApiFamily::DicomConfig => "dicom",
        ApiFamily::DockerRegistry => "docker-registry",
        ApiFamily::Stl => "stl",
        ApiFamily::Notification => "notification",
        ApiFamily::S3Creds => "s3creds",
        ApiFamily::Fhir => "fhir",
    }
}

fn build(host: &str, region: &str, environment: &str) -> String {
    if environment == "prod" {
        format!("https://{}.{}.hsdp.io", host, region)
    } else {
        format!("https://{}-{}.{}.hsdp.io", host, environment, region)
    }
}

/// Default base URL of a family in (region, environment)
pub fn infer(family: ApiFamily, region: &str, environment: &str) -> String {
    build(host_prefix(family), region, environment)
}

/// Default base URL of the OAuth server in (region, environment)
pub fn infer_iam(region: &str, environment: &str) -> String {
    build("iam", region, environment)
}

/// Check that `url` is an absolute http(s) URL; returns it without a
/// trailing slash
pub fn validate(url: &str) -> ProviderResult<String> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| ProviderError::EndpointInvalid(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ProviderError::EndpointInvalid(url.to_string()));
    }
    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_non_prod() {
        assert_eq!(
            infer(ApiFamily::Notification, "us-east", "client-test"),
            "https://notification-client-test.us-east.hsdp.io"
        );
    }

    #[test]
    fn infer_prod_drops_suffix() {
        assert_eq!(
            infer(ApiFamily::Iam, "eu-west", "prod"),
            "https://idm.eu-west.hsdp.io"
        );
        assert_eq!(infer_iam("eu-west", "prod"), "https://iam.eu-west.hsdp.io");
    }

    #[test]
    fn validate_endpoints() {
        assert_eq!(
            validate("https://cdl.example/store/cdl/org/").unwrap(),
            "https://cdl.example/store/cdl/org"
        );
        assert!(matches!(
            validate("not a url"),
            Err(ProviderError::EndpointInvalid(_))
        ));
        assert!(validate("ftp://files.example").is_err());
    }
}
