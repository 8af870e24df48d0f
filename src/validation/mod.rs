//! Structural and semantic validation of clinical resources.
//!
//! [`SchemaValidator`] compiles a [`Schema`] with the `jsonschema` crate and
//! lazily yields [`SchemaError`]s. Structural keywords are plain JSON Schema.
//! Three custom keywords are registered on top:
//!
//! - `fhirType` checks the clinical types (`code`, `coding`,
//!   `codeableConcept`, `reference`), resolving references through a
//!   [`ReferenceResolver`]
//! - `binding` delegates to the terminology binding checks
//! - `profiles` validates the same instance against named sub-schemas
//!
//! Root-level profiles are compiled separately so their errors can be
//! reported per profile. Validation never fails for bad data. An empty error
//! sequence means the instance conforms.

pub mod profiles;
pub mod reference;
pub mod schema;

use jsonschema::paths::{LazyLocation, Location};
use jsonschema::{Draft, Keyword, ValidationError};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::terminology::{BindableKind, BindingError, BindingStrength, ValueSet};
use schema::{BINDING_KEYWORD, FHIR_TYPE_KEYWORD, PROFILES_KEYWORD};

pub use reference::{
    BundleContext, ContainedContext, KnownReferences, NoOpReferenceResolver, ReferenceResolver,
    collect_references,
};
pub use schema::{Binding, Schema, SchemaType, required};

const CODING_FIELDS: &[&str] = &["system", "version", "code", "display", "userSelected"];
const CODEABLE_CONCEPT_FIELDS: &[&str] = &["coding", "text"];
const REFERENCE_FIELDS: &[&str] = &["reference", "display"];

/// Longest rendering of an instance embedded in an error message.
const MAX_RENDERED_LEN: usize = 80;

/// A schema document that cannot be compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid schema: {message}")]
pub struct InvalidSchema {
    message: String,
}

impl InvalidSchema {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A single structural or semantic violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaError {
    /// Keyword that produced the error (`required`, `binding`, ...).
    pub keyword: String,
    pub message: String,
    /// JSON pointer to the failing value; empty for the root.
    pub instance_path: String,
    /// Profile the error was found under; nested profiles are joined with `/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl SchemaError {
    fn in_profile(mut self, name: &str) -> Self {
        self.profile = Some(match self.profile.take() {
            Some(inner) => format!("{name}/{inner}"),
            None => name.to_string(),
        });
        self
    }
}

impl From<ValidationError<'_>> for SchemaError {
    fn from(error: ValidationError<'_>) -> Self {
        let schema_path = error.schema_path.to_string();
        let keyword = schema_path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            keyword,
            message: error.to_string(),
            instance_path: error.instance_path.to_string(),
            profile: None,
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

pub type ErrorIter<'a> = Box<dyn Iterator<Item = SchemaError> + 'a>;

fn render(value: &JsonValue) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() <= MAX_RENDERED_LEN {
        rendered
    } else {
        let truncated: String = rendered.chars().take(MAX_RENDERED_LEN).collect();
        format!("{truncated}...")
    }
}

fn has_only_fields(value: &JsonValue, allowed: &[&str]) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.keys().all(|k| allowed.contains(&k.as_str())))
}

fn invalid_keyword<'a>(path: Location, value: &'a JsonValue, message: String) -> ValidationError<'a> {
    ValidationError::custom(Location::new(), path, value, message)
}

/// State shared by the custom keywords of one compiled schema tree.
struct Vocabulary {
    resolver: Arc<dyn ReferenceResolver>,
    value_sets: BTreeMap<String, Arc<ValueSet>>,
}

impl Vocabulary {
    fn compile(
        self: &Arc<Self>,
        document: &Map<String, JsonValue>,
    ) -> Result<jsonschema::Validator, InvalidSchema> {
        let fhir_type = Arc::clone(self);
        let binding = Arc::clone(self);
        let profiles = Arc::clone(self);
        jsonschema::options()
            .with_draft(Draft::Draft202012)
            .with_keyword(FHIR_TYPE_KEYWORD, move |_, value, path| {
                fhir_type.fhir_type_keyword(value, path)
            })
            .with_keyword(BINDING_KEYWORD, move |_, value, path| {
                binding.binding_keyword(value, path)
            })
            .with_keyword(PROFILES_KEYWORD, move |_, value, path| {
                profiles.profiles_keyword(value, path)
            })
            .build(&JsonValue::Object(document.clone()))
            .map_err(|err| InvalidSchema::new(err.to_string()))
    }

    fn is_type(&self, instance: &JsonValue, ty: SchemaType) -> bool {
        match ty {
            SchemaType::Null => instance.is_null(),
            SchemaType::Boolean => instance.is_boolean(),
            SchemaType::Object => instance.is_object(),
            SchemaType::Array => instance.is_array(),
            SchemaType::Number => instance.is_number(),
            SchemaType::Integer => {
                instance.is_i64()
                    || instance.is_u64()
                    || instance.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            SchemaType::String | SchemaType::Code => instance.is_string(),
            SchemaType::Coding => has_only_fields(instance, CODING_FIELDS),
            SchemaType::CodeableConcept => {
                has_only_fields(instance, CODEABLE_CONCEPT_FIELDS)
                    && match instance.get("coding") {
                        None => true,
                        Some(JsonValue::Array(codings)) => codings
                            .iter()
                            .all(|c| self.is_type(c, SchemaType::Coding)),
                        Some(_) => false,
                    }
            }
            SchemaType::Reference => {
                has_only_fields(instance, REFERENCE_FIELDS)
                    && instance
                        .get("reference")
                        .and_then(JsonValue::as_str)
                        .is_some_and(|r| !r.is_empty() && self.resolver.exists(r))
            }
        }
    }

    fn bindable_kind(&self, instance: &JsonValue) -> Option<BindableKind> {
        if self.is_type(instance, SchemaType::Code) {
            Some(BindableKind::Code)
        } else if self.is_type(instance, SchemaType::Coding) {
            Some(BindableKind::Coding)
        } else if self.is_type(instance, SchemaType::CodeableConcept) {
            Some(BindableKind::CodeableConcept)
        } else {
            None
        }
    }

    fn fhir_type_keyword<'a>(
        self: &Arc<Self>,
        value: &'a JsonValue,
        path: Location,
    ) -> Result<Box<dyn Keyword>, ValidationError<'a>> {
        let names: Vec<&JsonValue> = match value {
            JsonValue::Array(names) => names.iter().collect(),
            name => vec![name],
        };
        let mut types = Vec::with_capacity(names.len());
        for name in names {
            match serde_json::from_value::<SchemaType>(name.clone()) {
                Ok(ty) if ty.is_clinical() => types.push(ty),
                _ => {
                    let message = format!("{} is not a clinical type", render(name));
                    return Err(invalid_keyword(path, value, message));
                }
            }
        }
        Ok(Box::new(FhirTypeKeyword {
            types,
            vocabulary: Arc::clone(self),
            schema_path: path.join(FHIR_TYPE_KEYWORD),
        }))
    }

    fn binding_keyword<'a>(
        self: &Arc<Self>,
        value: &'a JsonValue,
        path: Location,
    ) -> Result<Box<dyn Keyword>, ValidationError<'a>> {
        let uri = value.get("valueSet").and_then(JsonValue::as_str);
        let strength = value.get("strength").and_then(JsonValue::as_str);
        let target = match (uri, strength) {
            (Some(uri), Some(strength)) => {
                let Some(value_set) = self.value_sets.get(uri) else {
                    return Err(invalid_keyword(path, value, format!("unknown value set {uri}")));
                };
                let Some(strength) = BindingStrength::parse_str(strength) else {
                    let message = format!("unknown binding strength {strength}");
                    return Err(invalid_keyword(path, value, message));
                };
                Some((Arc::clone(value_set), strength))
            }
            _ => None,
        };
        Ok(Box::new(BindingKeyword {
            target,
            vocabulary: Arc::clone(self),
            schema_path: path.join(BINDING_KEYWORD),
        }))
    }

    fn profiles_keyword<'a>(
        self: &Arc<Self>,
        value: &'a JsonValue,
        path: Location,
    ) -> Result<Box<dyn Keyword>, ValidationError<'a>> {
        let profiles = match SchemaValidator::compile_profiles(value, self) {
            Ok(profiles) => profiles,
            Err(err) => return Err(invalid_keyword(path, value, err.to_string())),
        };
        Ok(Box::new(ProfilesKeyword {
            profiles,
            schema_path: path.join(PROFILES_KEYWORD),
        }))
    }
}

struct FhirTypeKeyword {
    types: Vec<SchemaType>,
    vocabulary: Arc<Vocabulary>,
    schema_path: Location,
}

impl Keyword for FhirTypeKeyword {
    fn validate<'i>(
        &self,
        instance: &'i JsonValue,
        location: &LazyLocation,
    ) -> Result<(), ValidationError<'i>> {
        if self.is_valid(instance) {
            return Ok(());
        }
        let expected: Vec<String> = self
            .types
            .iter()
            .map(|ty| format!("\"{}\"", ty.name()))
            .collect();
        Err(ValidationError::custom(
            self.schema_path.clone(),
            location.into(),
            instance,
            format!("{} is not of type {}", render(instance), expected.join(", ")),
        ))
    }

    fn is_valid(&self, instance: &JsonValue) -> bool {
        self.types
            .iter()
            .any(|ty| self.vocabulary.is_type(instance, *ty))
    }
}

struct BindingKeyword {
    /// `None` when the keyword lacks a value set or a strength.
    target: Option<(Arc<ValueSet>, BindingStrength)>,
    vocabulary: Arc<Vocabulary>,
    schema_path: Location,
}

impl BindingKeyword {
    fn check(&self, instance: &JsonValue) -> Result<(), BindingError> {
        let Some((value_set, strength)) = &self.target else {
            return Ok(());
        };
        match self.vocabulary.bindable_kind(instance) {
            Some(kind) => kind.validate(instance, value_set, *strength),
            None => Ok(()),
        }
    }
}

impl Keyword for BindingKeyword {
    fn validate<'i>(
        &self,
        instance: &'i JsonValue,
        location: &LazyLocation,
    ) -> Result<(), ValidationError<'i>> {
        self.check(instance).map_err(|err| {
            ValidationError::custom(
                self.schema_path.clone(),
                location.into(),
                instance,
                err.to_string(),
            )
        })
    }

    fn is_valid(&self, instance: &JsonValue) -> bool {
        self.check(instance).is_ok()
    }
}

/// `profiles` below the root: the first failing profile is reported as one
/// error at the instance location.
struct ProfilesKeyword {
    profiles: Vec<(String, SchemaValidator)>,
    schema_path: Location,
}

impl Keyword for ProfilesKeyword {
    fn validate<'i>(
        &self,
        instance: &'i JsonValue,
        location: &LazyLocation,
    ) -> Result<(), ValidationError<'i>> {
        for (name, profile) in &self.profiles {
            if let Some(error) = profile.iter_errors(instance).next() {
                return Err(ValidationError::custom(
                    self.schema_path.clone(),
                    location.into(),
                    instance,
                    format!("{name} profile: {error}"),
                ));
            }
        }
        Ok(())
    }

    fn is_valid(&self, instance: &JsonValue) -> bool {
        self.profiles
            .iter()
            .all(|(_, profile)| profile.is_valid(instance))
    }
}

/// Compiled schema bound to one reference resolver.
pub struct SchemaValidator {
    root: jsonschema::Validator,
    profiles: Vec<(String, SchemaValidator)>,
    vocabulary: Arc<Vocabulary>,
}

impl SchemaValidator {
    /// Validator whose `reference` type accepts any well-formed reference.
    pub fn new(schema: &Schema) -> Result<Self, InvalidSchema> {
        Self::with_resolver(schema, Arc::new(NoOpReferenceResolver))
    }

    pub fn with_resolver(
        schema: &Schema,
        resolver: Arc<dyn ReferenceResolver>,
    ) -> Result<Self, InvalidSchema> {
        let vocabulary = Arc::new(Vocabulary {
            resolver,
            value_sets: schema.value_sets().clone(),
        });
        Self::compile(schema.document(), &vocabulary)
    }

    fn compile(
        document: &Map<String, JsonValue>,
        vocabulary: &Arc<Vocabulary>,
    ) -> Result<Self, InvalidSchema> {
        let mut root = document.clone();
        let profiles = match root.remove(PROFILES_KEYWORD) {
            Some(entries) => Self::compile_profiles(&entries, vocabulary)?,
            None => Vec::new(),
        };
        Ok(Self {
            root: vocabulary.compile(&root)?,
            profiles,
            vocabulary: Arc::clone(vocabulary),
        })
    }

    fn compile_profiles(
        entries: &JsonValue,
        vocabulary: &Arc<Vocabulary>,
    ) -> Result<Vec<(String, SchemaValidator)>, InvalidSchema> {
        let entries = entries
            .as_object()
            .ok_or_else(|| InvalidSchema::new("profiles must be an object"))?;
        let mut profiles = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            match entry.get("schema") {
                None | Some(JsonValue::Null) => {}
                Some(JsonValue::Object(document)) => {
                    profiles.push((name.clone(), Self::compile(document, vocabulary)?));
                }
                Some(other) => {
                    return Err(InvalidSchema::new(format!(
                        "profile {name:?} schema must be an object, got {}",
                        render(other)
                    )));
                }
            }
        }
        Ok(profiles)
    }

    /// Lazily yield every error for `instance`, root errors first.
    pub fn iter_errors<'a>(&'a self, instance: &'a JsonValue) -> ErrorIter<'a> {
        let root = self.root.iter_errors(instance).map(SchemaError::from);
        let profiles = self.profiles.iter().flat_map(move |(name, profile)| {
            profile
                .iter_errors(instance)
                .map(move |error| error.in_profile(name))
        });
        Box::new(root.chain(profiles))
    }

    pub fn validate(&self, instance: &JsonValue) -> Vec<SchemaError> {
        self.iter_errors(instance).collect()
    }

    pub fn is_valid(&self, instance: &JsonValue) -> bool {
        self.root.is_valid(instance)
            && self
                .profiles
                .iter()
                .all(|(_, profile)| profile.is_valid(instance))
    }

    /// Type predicate for both JSON and clinical types.
    pub fn is_type(&self, instance: &JsonValue, ty: SchemaType) -> bool {
        self.vocabulary.is_type(instance, ty)
    }

    /// Which binding check applies to `instance`, decided by the first
    /// matching clinical type.
    pub fn bindable_kind(&self, instance: &JsonValue) -> Option<BindableKind> {
        self.vocabulary.bindable_kind(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::{BindingStrength, ValueSet};
    use serde_json::json;

    fn gender() -> Arc<ValueSet> {
        Arc::new(
            ValueSet::new("Administrative gender", "urn:vs:gender")
                .with_codes("http://hl7.org/fhir/administrative-gender", ["male", "female"]),
        )
    }

    fn keywords(errors: &[SchemaError]) -> Vec<&str> {
        let mut keywords: Vec<&str> = errors.iter().map(|e| e.keyword.as_str()).collect();
        keywords.sort_unstable();
        keywords
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        let validator = SchemaValidator::new(&Schema::new()).unwrap();
        assert!(validator.is_valid(&json!({"anything": [1, 2, 3]})));
        assert!(validator.is_valid(&json!(null)));
    }

    #[test]
    fn test_required_and_nested_paths() {
        let schema = Schema::new().require(&["name"]).property(
            "name",
            Schema::new()
                .min_items(1)
                .items(required(&["family", "given"])),
        );
        let validator = SchemaValidator::new(&schema).unwrap();

        let errors = validator.validate(&json!({"name": [{"family": "Doe"}]}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "required");
        assert_eq!(errors[0].instance_path, "/name/0");
        assert_eq!(errors[0].message, "\"given\" is a required property");
        assert_eq!(
            errors[0].to_string(),
            "/name/0: \"given\" is a required property"
        );

        let errors = validator.validate(&json!({}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].instance_path, "");
    }

    #[test]
    fn test_one_of_exactly_one() {
        let schema = Schema::new().one_of(vec![
            required(&["performedDateTime"]),
            required(&["performedPeriod"]),
        ]);
        let validator = SchemaValidator::new(&schema).unwrap();

        assert!(validator.is_valid(&json!({"performedDateTime": "2017-01-01"})));
        let none = validator.validate(&json!({}));
        assert_eq!(none.len(), 1);
        assert_eq!(none[0].keyword, "oneOf");
        let both = validator.validate(&json!({"performedDateTime": "x", "performedPeriod": {}}));
        assert_eq!(both.len(), 1);
        assert!(both[0].message.contains("more than one"));
    }

    #[test]
    fn test_not_const_and_enum() {
        let schema = Schema::new()
            .property("status", Schema::new().one_of_values(vec![json!("a"), json!("b")]))
            .property("kind", Schema::new().constant(json!("has-member")))
            .not(required(&["forbidden"]));
        let validator = SchemaValidator::new(&schema).unwrap();

        assert!(validator.is_valid(&json!({"status": "a", "kind": "has-member"})));
        let errors = validator.validate(&json!({"status": "c", "kind": "x", "forbidden": 1}));
        assert_eq!(keywords(&errors), vec!["const", "enum", "not"]);
    }

    #[test]
    fn test_contains_and_item_bounds() {
        let schema = Schema::new().min_items(1).max_items(2).contains(
            Schema::new()
                .property("code", Schema::new().constant(json!("vital-signs")))
                .require(&["code"]),
        );
        let validator = SchemaValidator::new(&schema).unwrap();

        assert!(validator.is_valid(&json!([{"code": "other"}, {"code": "vital-signs"}])));
        let errors = validator.validate(&json!([]));
        assert_eq!(keywords(&errors), vec!["contains", "minItems"]);
        let errors = validator.validate(&json!([{"code": "a"}, {"code": "b"}, {"code": "c"}]));
        assert_eq!(keywords(&errors), vec!["contains", "maxItems"]);
    }

    #[test]
    fn test_semantic_type_predicates() {
        let validator = SchemaValidator::new(&Schema::new()).unwrap();

        assert!(validator.is_type(&json!("M"), SchemaType::Code));
        assert!(validator.is_type(
            &json!({"system": "s", "code": "c", "display": "d", "userSelected": true}),
            SchemaType::Coding
        ));
        assert!(!validator.is_type(&json!({"code": "c", "extra": 1}), SchemaType::Coding));
        assert!(validator.is_type(
            &json!({"coding": [{"code": "c"}], "text": "t"}),
            SchemaType::CodeableConcept
        ));
        assert!(!validator.is_type(
            &json!({"coding": [{"bogus": "c"}]}),
            SchemaType::CodeableConcept
        ));
        assert!(!validator.is_type(&json!({"coding": "x"}), SchemaType::CodeableConcept));
        assert!(validator.is_type(&json!(3.0), SchemaType::Integer));
        assert!(!validator.is_type(&json!(3.5), SchemaType::Integer));
    }

    #[test]
    fn test_clinical_type_keyword() {
        let schema = Schema::new()
            .property("status", Schema::new().of_type(SchemaType::Code))
            .property("concept", Schema::new().of_type(SchemaType::CodeableConcept));
        let validator = SchemaValidator::new(&schema).unwrap();

        assert!(validator.is_valid(&json!({"status": "final", "concept": {"text": "t"}})));
        let errors = validator.validate(&json!({"status": 1, "concept": {"coding": [{"x": 1}]}}));
        assert_eq!(keywords(&errors), vec!["fhirType", "fhirType"]);
        assert!(
            errors
                .iter()
                .any(|e| e.message == "1 is not of type \"code\"")
        );
    }

    #[test]
    fn test_reference_type_uses_resolver() {
        let schema = Schema::new().property("org", Schema::new().of_type(SchemaType::Reference));
        let known: KnownReferences = vec!["Organization/1".to_string()].into_iter().collect();
        let validator = SchemaValidator::with_resolver(&schema, Arc::new(known)).unwrap();

        assert!(validator.is_valid(&json!({"org": {"reference": "Organization/1", "display": "Acme"}})));
        let errors = validator.validate(&json!({"org": {"reference": "Organization/2"}}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "fhirType");
        assert_eq!(errors[0].instance_path, "/org");
        assert!(!validator.is_valid(&json!({"org": {"reference": ""}})));
        assert!(!validator.is_valid(&json!({"org": {"display": "no reference"}})));
    }

    #[test]
    fn test_binding_dispatches_on_inferred_kind() {
        let schema = Schema::new()
            .property(
                "gender",
                Schema::new()
                    .of_type(SchemaType::Code)
                    .bind(gender(), BindingStrength::Required),
            )
            .property(
                "concept",
                Schema::new()
                    .of_type(SchemaType::CodeableConcept)
                    .bind(gender(), BindingStrength::Required),
            )
            .property(
                "loose",
                Schema::new().bind(gender(), BindingStrength::Extensible),
            );
        let validator = SchemaValidator::new(&schema).unwrap();

        assert!(validator.is_valid(&json!({
            "gender": "male",
            "concept": {"coding": [{"system": "http://hl7.org/fhir/administrative-gender", "code": "female"}]},
            "loose": "anything"
        })));

        let errors = validator.validate(&json!({
            "gender": "xmale",
            "concept": {"coding": [{"system": "http://other", "code": "female"}]}
        }));
        assert_eq!(keywords(&errors), vec!["binding", "binding"]);
        let gender = errors.iter().find(|e| e.instance_path == "/gender").unwrap();
        assert_eq!(
            gender.message,
            "\"xmale\" is not in the \"Administrative gender\" value set"
        );
        assert!(errors.iter().any(|e| e.instance_path == "/concept"));
    }

    #[test]
    fn test_binding_without_value_set_is_noop() {
        let schema = Schema::new().with_binding(Binding {
            value_set: None,
            strength: Some(BindingStrength::Required),
        });
        assert!(SchemaValidator::new(&schema).unwrap().is_valid(&json!("whatever")));

        let schema = Schema::new().with_binding(Binding {
            value_set: Some(gender()),
            strength: None,
        });
        assert!(SchemaValidator::new(&schema).unwrap().is_valid(&json!("whatever")));
    }

    #[test]
    fn test_hand_written_binding_needs_registered_value_set() {
        let document = json!({
            "properties": {
                "gender": {"binding": {"valueSet": "urn:vs:gender", "strength": "required"}}
            }
        });

        let unregistered = Schema::from_json(document.clone()).unwrap();
        let err = SchemaValidator::new(&unregistered).err().unwrap();
        assert!(err.to_string().contains("unknown value set urn:vs:gender"));

        let schema = Schema::from_json(document).unwrap().with_value_set(gender());
        let validator = SchemaValidator::new(&schema).unwrap();
        assert!(validator.is_valid(&json!({"gender": "female"})));
        assert!(!validator.is_valid(&json!({"gender": "robot"})));
    }

    #[test]
    fn test_unknown_clinical_type_rejected() {
        let schema = Schema::from_json(json!({"fhirType": "quantity"})).unwrap();
        assert!(SchemaValidator::new(&schema).is_err());
    }

    #[test]
    fn test_profiles_union_tagged_by_name() {
        let schema = Schema::new()
            .profile("Argonaut patient", Some(required(&["identifier"])))
            .profile("CMS patient", Some(required(&["identifier", "address"])))
            .profile("Draft", None);
        let validator = SchemaValidator::new(&schema).unwrap();

        let errors = validator.validate(&json!({}));
        assert_eq!(errors.len(), 3);
        let mut tagged: Vec<_> = errors
            .iter()
            .map(|e| (e.profile.as_deref().unwrap(), e.message.as_str()))
            .collect();
        tagged.sort_unstable();
        assert_eq!(
            tagged,
            vec![
                ("Argonaut patient", "\"identifier\" is a required property"),
                ("CMS patient", "\"address\" is a required property"),
                ("CMS patient", "\"identifier\" is a required property"),
            ]
        );

        let none = Schema::new();
        assert!(SchemaValidator::new(&none).unwrap().validate(&json!({})).is_empty());
    }

    #[test]
    fn test_nested_profiles_join_names() {
        let inner = Schema::new().profile("Inner", Some(required(&["x"])));
        let schema = Schema::new().profile("Outer", Some(inner));
        let errors = SchemaValidator::new(&schema).unwrap().validate(&json!({}));
        assert_eq!(errors[0].profile.as_deref(), Some("Outer/Inner"));
    }

    #[test]
    fn test_profiles_below_root_report_first_failure() {
        let schema = Schema::new().property(
            "contact",
            Schema::new().profile("Contact", Some(required(&["name"]))),
        );
        let validator = SchemaValidator::new(&schema).unwrap();

        assert!(validator.is_valid(&json!({"contact": {"name": "x"}})));
        let errors = validator.validate(&json!({"contact": {}}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "profiles");
        assert_eq!(errors[0].instance_path, "/contact");
        assert_eq!(errors[0].profile, None);
        assert_eq!(
            errors[0].message,
            "Contact profile: \"name\" is a required property"
        );
    }

    #[test]
    fn test_errors_are_lazy() {
        let schema = Schema::new().require(&["a", "b", "c"]);
        let validator = SchemaValidator::new(&schema).unwrap();
        let instance = json!({});
        let mut iter = validator.iter_errors(&instance);
        assert!(iter.next().unwrap().message.ends_with("is a required property"));
        assert!(iter.next().is_some());
    }

    #[test]
    fn test_pointer_escaping() {
        let schema = Schema::new().property("a/b", required(&["x"]));
        let errors = SchemaValidator::new(&schema).unwrap().validate(&json!({"a/b": {}}));
        assert_eq!(errors[0].instance_path, "/a~1b");
    }
}
