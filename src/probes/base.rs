use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{CapabilityStatement, ProbeContext};
use crate::core::{CertifyConfig, FhirVersion, UseCase};
use crate::error::TransportError;
use crate::suite::registry::TestDescriptor;
use crate::transport::Requester;

/// State and checks shared by every test variant.
pub struct BaseTest {
    slug: String,
    versions: BTreeSet<FhirVersion>,
    use_cases: BTreeSet<UseCase>,
    config: Arc<CertifyConfig>,
    requester: Requester,
    capability: Option<CapabilityStatement>,
}

fn joined<T: ToString>(items: &BTreeSet<T>) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl BaseTest {
    pub fn new(descriptor: &TestDescriptor, ctx: &ProbeContext) -> Self {
        Self {
            slug: descriptor.slug.clone(),
            versions: descriptor.versions.clone(),
            use_cases: descriptor.use_cases.clone(),
            config: ctx.config.clone(),
            requester: Requester::new(ctx.http.clone()),
            capability: None,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn config(&self) -> &CertifyConfig {
        &self.config
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Capability statement fetched by [`BaseTest::should_skip`].
    pub fn capability(&self) -> Option<&CapabilityStatement> {
        self.capability.as_ref()
    }

    /// Version, use case and capability checks, in that order.
    pub async fn should_skip(&mut self) -> Option<String> {
        if !self.versions.contains(&self.config.fhir_version) {
            return Some(format!(
                "This test only supports version(s) {}",
                joined(&self.versions)
            ));
        }
        if self.use_cases.is_disjoint(&self.config.use_cases) {
            return Some(format!(
                "This test only supports use case(s) {}",
                joined(&self.use_cases)
            ));
        }

        match self.fetch_capability().await {
            Ok(statement) => {
                self.capability = Some(statement);
                None
            }
            Err(e) => {
                tracing::warn!(slug = %self.slug, error = %e, "capability statement unavailable");
                Some("The server's conformance statement could not be retrieved".to_string())
            }
        }
    }

    async fn fetch_capability(&self) -> Result<CapabilityStatement, TransportError> {
        let url = self.config.metadata_uri();
        let response = self.requester.get(url.as_str(), None).await?;
        if !response.is_ok() {
            return Err(TransportError::Status {
                status: response.status,
                url,
            });
        }
        Ok(CapabilityStatement::from_json(&response.json()?))
    }

    /// GET `{base_uri}/{path}` with the configured bearer token.
    pub async fn fetch_resource(&self, path: &str) -> Result<JsonValue, TransportError> {
        let url = format!("{}/{path}", self.config.trimmed_base_uri());
        self.fetch_url(url).await
    }

    /// GET `url`. The bearer token is only sent to URLs below `base_uri`;
    /// anything else is fetched anonymously.
    pub async fn fetch_url(&self, url: String) -> Result<JsonValue, TransportError> {
        let bearer = self
            .config
            .is_server_url(&url)
            .then_some(self.config.bearer_token.as_str());
        if bearer.is_none() {
            tracing::debug!(slug = %self.slug, url = %url, "fetching outside base_uri without credentials");
        }
        let response = self.requester.get(url.as_str(), bearer).await?;
        if !response.is_ok() {
            return Err(TransportError::Status {
                status: response.status,
                url,
            });
        }
        response.json()
    }
}
