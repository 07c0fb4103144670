//! Current-version lookup for digital objects.
//!
//! [`VersionService`] is the seam to the external object registry.
//! [`HttpVersionService`] talks to it over HTTP and [`VersionResolver`] turns its
//! answers into a version number, falling back to version 1 for objects the
//! registry does not know yet.
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Version stamped on rows of objects the registry cannot find.
pub const FALLBACK_VERSION: i32 = 1;

/// Source of an object's current version, as the raw text the service returns.
#[async_trait]
pub trait VersionService: Send + Sync {
    /// Fetch the current version of `druid`.
    ///
    /// Must return [`Error::VersionNotFound`] when the registry does not know the
    /// object, so the resolver can apply the fallback.
    async fn current_version(&self, druid: &str) -> Result<String>;
}

/// reqwest client for `GET {base}/dor/objects/{druid}/versions/current`.
#[derive(Debug, Clone)]
pub struct HttpVersionService {
    client: reqwest::Client,
    base: Url,
}

impl HttpVersionService {
    pub fn new(base_uri: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_uri).map_err(|e| Error::InvalidConfig {
            field: "service_uri".to_string(),
            message: format!("Invalid service URI '{}': {}", base_uri, e),
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidConfig {
                field: "service_uri".to_string(),
                message: format!("Service URI '{}' cannot carry a path", base_uri),
            });
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn version_url(&self, druid: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Internal {
                message: format!("Service URI '{}' cannot carry a path", self.base),
            })?
            .pop_if_empty()
            .extend(["dor", "objects", druid, "versions", "current"]);
        Ok(url)
    }
}

#[async_trait]
impl VersionService for HttpVersionService {
    async fn current_version(&self, druid: &str) -> Result<String> {
        let url = self.version_url(druid)?;
        tracing::debug!("Requesting current version from {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_failure(druid, status, &body))
        }
    }
}

/// Map a non-success response onto the not-found or other-failure error.
///
/// Not found is a 404, or a 500 whose body reports the object missing from
/// fedora.
pub fn classify_failure(druid: &str, status: StatusCode, body: &str) -> Error {
    let message = format!("{}: {}", status, body.trim());
    let not_found = status == StatusCode::NOT_FOUND
        || (status == StatusCode::INTERNAL_SERVER_ERROR && reports_missing_object(body));
    if not_found {
        Error::VersionNotFound {
            druid: druid.to_string(),
            message,
        }
    } else {
        Error::VersionLookup {
            druid: druid.to_string(),
            message,
        }
    }
}

// "Unable to find ... in fedora", on a single line
fn reports_missing_object(body: &str) -> bool {
    body.lines().any(|line| {
        line.find("Unable to find")
            .map(|start| line[start..].contains("in fedora"))
            .unwrap_or(false)
    })
}

/// Resolves the version stamped on a unit's archived rows.
#[derive(Clone)]
pub struct VersionResolver {
    service: Arc<dyn VersionService>,
}

impl VersionResolver {
    pub fn new(service: Arc<dyn VersionService>) -> Self {
        Self { service }
    }

    /// Current version of `druid` as a positive integer.
    ///
    /// Not-found lookups resolve to [`FALLBACK_VERSION`] with a warning. Every
    /// other failure, an unparseable body included, is returned to the caller.
    pub async fn resolve_version(&self, druid: &str) -> Result<i32> {
        match self.service.current_version(druid).await {
            Ok(body) => parse_version(druid, &body),
            Err(Error::VersionNotFound { message, .. }) => {
                tracing::warn!(
                    druid = %druid,
                    "Unable to find {} in the object registry ({}). Moving workflow rows with version set to '{}'",
                    druid,
                    message,
                    FALLBACK_VERSION
                );
                Ok(FALLBACK_VERSION)
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_version(druid: &str, body: &str) -> Result<i32> {
    match body.trim().parse::<i32>() {
        Ok(version) if version > 0 => Ok(version),
        _ => Err(Error::InvalidVersion {
            druid: druid.to_string(),
            body: body.to_string(),
        }),
    }
}
