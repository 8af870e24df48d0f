use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::types::{FhirVersion, UseCase};
use crate::error::{CertifyError, Result};
use crate::transport::AuthorizationStep;

/// Settings for one certification run against one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertifyConfig {
    pub fhir_version: FhirVersion,
    pub use_cases: BTreeSet<UseCase>,
    /// Base URI resources are fetched from.
    pub base_uri: String,
    /// Base URI of the FHIR endpoint; `metadata` is resolved against it.
    pub base_fhir_uri: String,
    pub patient_id: String,
    pub bearer_token: String,
    /// OAuth `state` value sent with every authorization request.
    #[serde(default = "default_state")]
    pub state: String,
    pub auth: AuthConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default = "default_redirect_timeout_secs")]
    pub redirect_timeout_secs: u64,
    /// Slugs to run, in order. Empty means every registered test supporting
    /// one of `use_cases`.
    #[serde(default)]
    pub tests: Vec<String>,
}

/// Client registration and consent-flow script for the server under test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_uri: String,
    pub token_uri: String,
    pub redirect_uri: String,
    pub scope: String,
    pub aud: String,
    #[serde(default)]
    pub authorization_steps: Vec<AuthorizationStep>,
}

/// Where resources are sent for independent structural validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub dstu2_endpoint: String,
    pub stu3_endpoint: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            dstu2_endpoint: "http://hapi.fhir.org/baseDstu2".to_string(),
            stu3_endpoint: "http://hapi.fhir.org/baseDstu3".to_string(),
        }
    }
}

impl ValidatorConfig {
    pub fn endpoint_for(&self, version: FhirVersion) -> &str {
        match version {
            FhirVersion::Dstu2 => &self.dstu2_endpoint,
            FhirVersion::Stu3 => &self.stu3_endpoint,
        }
    }
}

fn default_state() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_redirect_timeout_secs() -> u64 {
    60
}

impl CertifyConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CertifyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn redirect_timeout(&self) -> Duration {
        Duration::from_secs(self.redirect_timeout_secs)
    }

    /// Reject configurations no test could run with.
    pub fn validate(&self) -> Result<()> {
        if self.use_cases.is_empty() {
            return Err(CertifyError::config("at least one use case is required"));
        }
        if self.patient_id.trim().is_empty() {
            return Err(CertifyError::config("patient_id must not be empty"));
        }
        if self.auth.client_id.trim().is_empty() {
            return Err(CertifyError::config("auth.client_id must not be empty"));
        }

        for (field, value) in [
            ("base_uri", &self.base_uri),
            ("base_fhir_uri", &self.base_fhir_uri),
            ("auth.authorize_uri", &self.auth.authorize_uri),
            ("auth.token_uri", &self.auth.token_uri),
            ("auth.redirect_uri", &self.auth.redirect_uri),
        ] {
            Url::parse(value)
                .map_err(|e| CertifyError::config(format!("{field} is not a valid URI: {e}")))?;
        }

        Ok(())
    }

    /// `base_uri` without a trailing slash, ready for `{base}/{path}` joins.
    pub fn trimmed_base_uri(&self) -> &str {
        self.base_uri.trim_end_matches('/')
    }

    pub fn metadata_uri(&self) -> String {
        format!("{}/metadata", self.base_fhir_uri.trim_end_matches('/'))
    }

    /// Whether `url` lies below `base_uri`, i.e. may carry the bearer token.
    pub fn is_server_url(&self, url: &str) -> bool {
        url.strip_prefix(self.trimmed_base_uri())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
    }
}
