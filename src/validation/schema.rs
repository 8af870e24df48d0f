//! JSON Schema documents used by [`SchemaValidator`](super::SchemaValidator).
//!
//! A [`Schema`] is a plain JSON Schema (draft 2020-12) document plus the value
//! sets its `binding` keywords refer to. Three keywords are specific to
//! clinical data:
//!
//! - `fhirType` names one or more clinical types (`code`, `coding`,
//!   `codeableConcept`, `reference`)
//! - `binding` ties a coded value to a [`ValueSet`] by URI
//! - `profiles` nests named sub-schemas whose errors are reported under the
//!   profile name
//!
//! The builder methods emit standard keywords wherever JSON Schema already
//! has one, so a schema can also be written by hand and loaded with
//! [`Schema::from_json`].

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::InvalidSchema;
use crate::terminology::{BindingStrength, ValueSet};

pub(crate) const FHIR_TYPE_KEYWORD: &str = "fhirType";
pub(crate) const BINDING_KEYWORD: &str = "binding";
pub(crate) const PROFILES_KEYWORD: &str = "profiles";

/// Values accepted by the `type` and `fhirType` keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
    Code,
    Coding,
    CodeableConcept,
    Reference,
}

impl SchemaType {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaType::Null => "null",
            SchemaType::Boolean => "boolean",
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::String => "string",
            SchemaType::Code => "code",
            SchemaType::Coding => "coding",
            SchemaType::CodeableConcept => "codeableConcept",
            SchemaType::Reference => "reference",
        }
    }

    /// Clinical types are checked by `fhirType`, the rest by the standard
    /// `type` keyword.
    pub fn is_clinical(&self) -> bool {
        matches!(
            self,
            SchemaType::Code
                | SchemaType::Coding
                | SchemaType::CodeableConcept
                | SchemaType::Reference
        )
    }
}

/// `binding` keyword payload. Without both a value set and a strength the
/// keyword does nothing.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    pub value_set: Option<Arc<ValueSet>>,
    pub strength: Option<BindingStrength>,
}

impl Binding {
    pub fn new(value_set: Arc<ValueSet>, strength: BindingStrength) -> Self {
        Self {
            value_set: Some(value_set),
            strength: Some(strength),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    document: Map<String, JsonValue>,
    value_sets: BTreeMap<String, Arc<ValueSet>>,
}

/// Shorthand for a schema that only requires `names`.
pub fn required(names: &[&str]) -> Schema {
    Schema::new().require(names)
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a hand-written document. Value sets named by its `binding`
    /// keywords are registered with [`Schema::with_value_set`].
    pub fn from_json(value: JsonValue) -> Result<Self, InvalidSchema> {
        match value {
            JsonValue::Object(document) => Ok(Self {
                document,
                value_sets: BTreeMap::new(),
            }),
            other => Err(InvalidSchema::new(format!(
                "schema must be an object, got {other}"
            ))),
        }
    }

    pub fn with_value_set(mut self, value_set: Arc<ValueSet>) -> Self {
        self.value_sets
            .insert(value_set.uri().to_string(), value_set);
        self
    }

    pub fn document(&self) -> &Map<String, JsonValue> {
        &self.document
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.document.clone())
    }

    /// Value sets reachable from this schema, keyed by URI.
    pub fn value_sets(&self) -> &BTreeMap<String, Arc<ValueSet>> {
        &self.value_sets
    }

    pub fn has_properties(&self) -> bool {
        self.document.contains_key("properties")
    }

    /// Names of the root-level `profiles` entries.
    pub fn profile_names(&self) -> Vec<&str> {
        self.document
            .get(PROFILES_KEYWORD)
            .and_then(JsonValue::as_object)
            .map(|profiles| profiles.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Take over a nested schema's value sets and return its document.
    fn nest(&mut self, schema: Schema) -> JsonValue {
        self.value_sets.extend(schema.value_sets);
        JsonValue::Object(schema.document)
    }

    fn with_object(&mut self, keyword: &str, update: impl FnOnce(&mut Map<String, JsonValue>)) {
        let entry = self
            .document
            .entry(keyword)
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !entry.is_object() {
            *entry = JsonValue::Object(Map::new());
        }
        if let JsonValue::Object(map) = entry {
            update(map);
        }
    }

    fn with_array(&mut self, keyword: &str, update: impl FnOnce(&mut Vec<JsonValue>)) {
        let entry = self
            .document
            .entry(keyword)
            .or_insert_with(|| JsonValue::Array(Vec::new()));
        if !entry.is_array() {
            let previous = entry.take();
            *entry = JsonValue::Array(vec![previous]);
        }
        if let JsonValue::Array(items) = entry {
            update(items);
        }
    }

    pub fn of_type(mut self, ty: SchemaType) -> Self {
        let keyword = if ty.is_clinical() {
            FHIR_TYPE_KEYWORD
        } else {
            "type"
        };
        let name = JsonValue::from(ty.name());
        match self.document.get(keyword).cloned() {
            None => {
                self.document.insert(keyword.to_string(), name);
            }
            Some(existing) if existing == name => {}
            Some(_) => self.with_array(keyword, |types| types.push(name)),
        }
        self
    }

    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let nested = self.nest(schema);
        self.with_object("properties", |properties| {
            properties.insert(name.into(), nested);
        });
        self
    }

    pub fn items(mut self, schema: Schema) -> Self {
        let nested = self.nest(schema);
        self.document.insert("items".to_string(), nested);
        self
    }

    pub fn require(mut self, names: &[&str]) -> Self {
        self.with_array("required", |required| {
            for name in names {
                let name = JsonValue::from(*name);
                if !required.contains(&name) {
                    required.push(name);
                }
            }
        });
        self
    }

    fn combine(mut self, keyword: &str, schemas: Vec<Schema>) -> Self {
        let nested: Vec<JsonValue> = schemas.into_iter().map(|s| self.nest(s)).collect();
        self.document
            .insert(keyword.to_string(), JsonValue::Array(nested));
        self
    }

    pub fn one_of(self, schemas: Vec<Schema>) -> Self {
        self.combine("oneOf", schemas)
    }

    pub fn any_of(self, schemas: Vec<Schema>) -> Self {
        self.combine("anyOf", schemas)
    }

    pub fn all_of(self, schemas: Vec<Schema>) -> Self {
        self.combine("allOf", schemas)
    }

    pub fn not(mut self, schema: Schema) -> Self {
        let nested = self.nest(schema);
        self.document.insert("not".to_string(), nested);
        self
    }

    pub fn constant(mut self, value: JsonValue) -> Self {
        self.document.insert("const".to_string(), value);
        self
    }

    pub fn one_of_values(mut self, values: Vec<JsonValue>) -> Self {
        self.document
            .insert("enum".to_string(), JsonValue::Array(values));
        self
    }

    pub fn contains(mut self, schema: Schema) -> Self {
        let nested = self.nest(schema);
        self.document.insert("contains".to_string(), nested);
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.document.insert("minItems".to_string(), json!(n));
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.document.insert("maxItems".to_string(), json!(n));
        self
    }

    pub fn bind(self, value_set: Arc<ValueSet>, strength: BindingStrength) -> Self {
        self.with_binding(Binding::new(value_set, strength))
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        let mut payload = Map::new();
        if let Some(value_set) = binding.value_set {
            payload.insert("valueSet".to_string(), json!(value_set.uri()));
            self = self.with_value_set(value_set);
        }
        if let Some(strength) = binding.strength {
            payload.insert("strength".to_string(), json!(strength));
        }
        self.document
            .insert(BINDING_KEYWORD.to_string(), JsonValue::Object(payload));
        self
    }

    /// Add a named profile. Entries without a schema are declared but never
    /// checked.
    pub fn profile(mut self, name: impl Into<String>, schema: Option<Schema>) -> Self {
        let entry = match schema {
            Some(schema) => json!({ "schema": self.nest(schema) }),
            None => json!({}),
        };
        self.with_object(PROFILES_KEYWORD, |profiles| {
            profiles.insert(name.into(), entry);
        });
        self
    }
}
