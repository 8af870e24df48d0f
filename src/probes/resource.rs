//! Probes that fetch clinical resources for the configured patient and check
//! them against external validation, reference integrity and profiles.

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{BaseTest, ProbeContext, TestCase};
use crate::core::{FhirVersion, ScenarioLog, UseCase};
use crate::suite::registry::{TestDescriptor, TestKind};
use crate::transport::ResourceValidationService;
use crate::validation::profiles::{
    ALLERGIES_ARGONAUT, CONDITION_ARGONAUT, DOCUMENT_REFERENCE_ARGONAUT, IMMUNIZATION_ARGONAUT,
    LAB_RESULTS_ARGONAUT, MEDICATION_ORDER_ARGONAUT, MEDICATION_REQUEST_ARGONAUT,
    MEDICATION_STATEMENT_ARGONAUT, PATIENT, PROCEDURE_ARGONAUT, SMOKING_STATUS_ARGONAUT,
    VITAL_SIGNS_ARGONAUT,
};
use crate::validation::{
    BundleContext, ContainedContext, KnownReferences, Schema, SchemaValidator,
    collect_references,
};

static RESOURCE_TYPE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\w+").ok());

const RESOURCE_GROUP: u32 = 1;

/// Extra checks some resource probes run after the common scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCheck {
    /// The returned patient's `id` equals the queried patient id.
    PatientIdMatches,
}

#[derive(Debug, Clone)]
pub struct ResourceProbeSpec {
    /// Path below `base_uri`; `{patient_id}` is substituted.
    pub path_template: &'static str,
    /// Root schema whose `profiles` entries each become one scenario.
    pub schema: Option<Arc<Schema>>,
    pub post_check: Option<PostCheck>,
}

impl ResourceProbeSpec {
    pub fn new(path_template: &'static str) -> Self {
        Self {
            path_template,
            schema: None,
            post_check: None,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn with_post_check(mut self, check: PostCheck) -> Self {
        self.post_check = Some(check);
        self
    }

    pub fn path(&self, patient_id: &str) -> String {
        self.path_template.replace("{patient_id}", patient_id)
    }

    /// Resource type probed, i.e. the leading word of the path.
    pub fn resource_type(&self) -> &'static str {
        let template = self.path_template;
        RESOURCE_TYPE
            .as_ref()
            .and_then(|re| re.find(template))
            .map(|m| m.as_str())
            .unwrap_or(template)
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.schema
            .as_deref()
            .map(Schema::profile_names)
            .unwrap_or_default()
    }
}

/// Root schema carrying a single Argonaut profile for `resource`.
fn argonaut(resource: &str, profile: &Schema) -> Schema {
    Schema::new().profile(format!("Argonaut {resource}"), Some(profile.clone()))
}

fn resource_test(
    slug: &str,
    spec: ResourceProbeSpec,
    use_cases: &[UseCase],
) -> TestDescriptor {
    TestDescriptor::new(slug, TestKind::Resource(spec))
        .use_cases(use_cases)
        .group(RESOURCE_GROUP)
}

/// Every resource probe, in registration order.
pub fn catalog() -> Vec<TestDescriptor> {
    use UseCase::{Ehr, Financial};

    vec![
        resource_test(
            "patient-demographics",
            ResourceProbeSpec::new("Patient/{patient_id}")
                .with_schema(PATIENT.clone())
                .with_post_check(PostCheck::PatientIdMatches),
            &[Ehr, Financial],
        ),
        resource_test(
            "allergies-and-intolerance",
            ResourceProbeSpec::new("AllergyIntolerance?patient={patient_id}")
                .with_schema(argonaut("allergy intolerance", &ALLERGIES_ARGONAUT)),
            &[Ehr],
        ),
        resource_test(
            "coverage",
            ResourceProbeSpec::new("Coverage?beneficiary={patient_id}"),
            &[Financial],
        )
        .versions(&[FhirVersion::Stu3]),
        resource_test(
            "explanation-of-benefit",
            ResourceProbeSpec::new("ExplanationOfBenefit?patient={patient_id}"),
            &[Financial],
        )
        .versions(&[FhirVersion::Stu3]),
        resource_test(
            "immunizations",
            ResourceProbeSpec::new("Immunization?patient={patient_id}")
                .with_schema(argonaut("immunization", &IMMUNIZATION_ARGONAUT)),
            &[Ehr],
        ),
        resource_test(
            "lab-results",
            ResourceProbeSpec::new("Observation?category=laboratory&patient={patient_id}")
                .with_schema(argonaut("lab results", &LAB_RESULTS_ARGONAUT)),
            &[Ehr],
        ),
        resource_test(
            "medication-administration",
            ResourceProbeSpec::new("MedicationAdministration?patient={patient_id}"),
            &[Ehr],
        ),
        resource_test(
            "medication-dispense",
            ResourceProbeSpec::new("MedicationDispense?patient={patient_id}"),
            &[Ehr],
        ),
        resource_test(
            "medication-order",
            ResourceProbeSpec::new("MedicationOrder?patient={patient_id}")
                .with_schema(argonaut("medication order", &MEDICATION_ORDER_ARGONAUT)),
            &[Ehr],
        )
        .versions(&[FhirVersion::Dstu2]),
        resource_test(
            "medication-request",
            ResourceProbeSpec::new("MedicationRequest?patient={patient_id}")
                .with_schema(argonaut("medication request", &MEDICATION_REQUEST_ARGONAUT)),
            &[Ehr],
        )
        .versions(&[FhirVersion::Stu3]),
        resource_test(
            "medication-statement",
            ResourceProbeSpec::new("MedicationStatement?patient={patient_id}")
                .with_schema(argonaut("medication statement", &MEDICATION_STATEMENT_ARGONAUT)),
            &[Ehr],
        ),
        resource_test(
            "document-reference",
            ResourceProbeSpec::new("DocumentReference?patient={patient_id}")
                .with_schema(argonaut("document reference", &DOCUMENT_REFERENCE_ARGONAUT)),
            &[Ehr],
        ),
        resource_test(
            "condition",
            ResourceProbeSpec::new("Condition?patient={patient_id}")
                .with_schema(argonaut("condition", &CONDITION_ARGONAUT)),
            &[Ehr],
        ),
        resource_test(
            "procedure",
            ResourceProbeSpec::new("Procedure?patient={patient_id}")
                .with_schema(argonaut("procedure", &PROCEDURE_ARGONAUT)),
            &[Ehr],
        ),
        resource_test(
            "smoking-status",
            ResourceProbeSpec::new("Observation?code=http://loinc.org%7C72166-2&patient={patient_id}")
                .with_schema(argonaut("smoking status", &SMOKING_STATUS_ARGONAUT)),
            &[Ehr],
        ),
        resource_test(
            "vital-signs",
            ResourceProbeSpec::new("Observation?category=vital-signs&patient={patient_id}")
                .with_schema(argonaut("vital signs", &VITAL_SIGNS_ARGONAUT)),
            &[Ehr],
        ),
    ]
}

/// Resources a check applies to: each entry of a search bundle, or the
/// resource itself. Bundle entries carry their JSON pointer.
fn units(resource: &JsonValue) -> Vec<(Option<String>, &JsonValue)> {
    if resource.get("resourceType").and_then(JsonValue::as_str) != Some("Bundle") {
        return vec![(None, resource)];
    }
    resource
        .get("entry")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(i, entry)| {
            entry
                .get("resource")
                .map(|r| (Some(format!("/entry/{i}/resource")), r))
        })
        .collect()
}

pub struct ResourceProbe {
    base: BaseTest,
    spec: ResourceProbeSpec,
    validation: Arc<dyn ResourceValidationService>,
}

impl ResourceProbe {
    pub fn new(base: BaseTest, spec: ResourceProbeSpec, ctx: &ProbeContext) -> Self {
        Self {
            base,
            spec,
            validation: ctx.validation.clone(),
        }
    }

    async fn check_external_validity(&self, resource: &JsonValue, log: &mut ScenarioLog) {
        let version = self.base.config().fhir_version;
        let title = format!("Resource is valid {version} content");

        match self
            .validation
            .validate(self.base.requester(), version, resource)
            .await
        {
            Ok(issues) if issues.is_empty() => log.pass(title),
            Ok(issues) => {
                let rendered = serde_json::to_string_pretty(&issues)
                    .unwrap_or_else(|_| format!("{issues:?}"));
                log.fail(title, format!("These issues were reported:\n{rendered}"));
            }
            Err(e) => {
                tracing::warn!(slug = %self.base.slug(), error = %e, "validation service unavailable");
                log.skip(title, "Validation server unavailable or has errors");
            }
        }
    }

    async fn resolve(
        &self,
        reference: &str,
        contained: &ContainedContext,
        bundle: &BundleContext,
    ) -> bool {
        if let Some(id) = reference.strip_prefix('#') {
            return contained.contains(id);
        }
        if bundle.contains(reference) {
            return true;
        }

        let url = if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else {
            format!("{}/{reference}", self.base.config().trimmed_base_uri())
        };
        match self.base.fetch_url(url).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(reference, error = %e, "reference did not resolve");
                false
            }
        }
    }

    /// Resolve every reference in the resource and return the ones that
    /// resolved.
    async fn check_references(&self, resource: &JsonValue, log: &mut ScenarioLog) -> KnownReferences {
        let bundle = BundleContext::from_bundle(resource);
        let mut resolved: IndexMap<String, bool> = IndexMap::new();

        for (_, unit) in units(resource) {
            let contained = ContainedContext::from_resource(unit);
            for reference in collect_references(unit) {
                // local references are scoped to their own resource
                if let Some(&ok) = resolved.get(&reference)
                    && (ok || !reference.starts_with('#'))
                {
                    continue;
                }
                let ok = self.resolve(&reference, &contained, &bundle).await;
                *resolved.entry(reference).or_insert(false) |= ok;
            }
        }

        let failed: Vec<&str> = resolved
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(r, _)| r.as_str())
            .collect();
        if failed.is_empty() {
            log.pass("All references resolve");
        } else {
            log.fail(
                "All references resolve",
                format!("These references failed to resolve: {}", failed.join(", ")),
            );
        }

        resolved
            .into_iter()
            .filter_map(|(reference, ok)| ok.then_some(reference))
            .collect()
    }

    fn check_profiles(&self, resource: &JsonValue, known: KnownReferences, log: &mut ScenarioLog) {
        let Some(schema) = self.spec.schema.as_deref() else {
            return;
        };
        const BINDINGS: &str = "Resources honor terminology bindings";
        let validator = match SchemaValidator::with_resolver(schema, Arc::new(known)) {
            Ok(validator) => validator,
            Err(e) => {
                tracing::error!(slug = %self.base.slug(), error = %e, "profile schema does not compile");
                log.fail(BINDINGS, e.to_string());
                return;
            }
        };

        let mut by_profile: IndexMap<Option<String>, Vec<String>> = IndexMap::new();
        for (location, unit) in units(resource) {
            for error in validator.iter_errors(unit) {
                let profile = error
                    .profile
                    .as_deref()
                    .and_then(|p| p.split('/').next())
                    .map(str::to_string);
                let message = match &location {
                    Some(prefix) => format!("{prefix}{}: {}", error.instance_path, error.message),
                    None => error.to_string(),
                };
                by_profile.entry(profile).or_default().push(message);
            }
        }

        if schema.has_properties() || by_profile.contains_key(&None) {
            match by_profile.get(&None) {
                Some(errors) => log.fail(BINDINGS, errors.join("; ")),
                None => log.pass(BINDINGS),
            }
        }

        for name in self.spec.profile_names() {
            let title = format!("Resources fulfill the {name} profile");
            match by_profile.get(&Some(name.to_string())) {
                Some(errors) => log.warn(title, errors.join("; ")),
                None => log.pass(title),
            }
        }
    }

    fn check_patient_id(&self, resource: &JsonValue, log: &mut ScenarioLog) {
        const TITLE: &str = "Returned patient ID matches queried patient ID";
        let returned = resource.get("id").and_then(JsonValue::as_str);
        if returned == Some(self.base.config().patient_id.as_str()) {
            log.pass(TITLE);
        } else {
            log.fail(TITLE, "Returned and queried patient IDs do not match");
        }
    }
}

#[async_trait]
impl TestCase for ResourceProbe {
    fn base(&self) -> &BaseTest {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseTest {
        &mut self.base
    }

    async fn should_skip(&mut self) -> Option<String> {
        if let Some(reason) = self.base.should_skip().await {
            return Some(reason);
        }

        let resource_type = self.spec.resource_type();
        let supported = self
            .base
            .capability()
            .is_some_and(|c| c.supports(resource_type));
        if !supported {
            return Some(format!(
                "The {resource_type} resource type is not supported by the server"
            ));
        }
        None
    }

    async fn run(&mut self, log: &mut ScenarioLog) {
        let path = self.spec.path(&self.base.config().patient_id);
        let resource = match self.base.fetch_resource(&path).await {
            Ok(resource) => resource,
            Err(e) => {
                log.fail(
                    "Resource is retrievable",
                    format!("The resource could not be fetched: {e}"),
                );
                return;
            }
        };

        self.check_external_validity(&resource, log).await;
        let known = self.check_references(&resource, log).await;
        // code validation against terminology servers is not implemented
        log.pass("All codes are valid");
        self.check_profiles(&resource, known, log);

        if self.spec.post_check == Some(PostCheck::PatientIdMatches) {
            self.check_patient_id(&resource, log);
        }
    }
}
