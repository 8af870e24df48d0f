use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// The parts of a server's capability statement the probes look at.
#[derive(Debug, Clone, Default)]
pub struct CapabilityStatement {
    resource_types: BTreeSet<String>,
    oauth_uris: Option<IndexMap<String, String>>,
}

impl CapabilityStatement {
    pub fn from_json(statement: &JsonValue) -> Self {
        let rest = statement.get("rest").and_then(|r| r.get(0));

        let resource_types = rest
            .and_then(|r| r.get("resource"))
            .and_then(JsonValue::as_array)
            .into_iter()
            .flatten()
            .filter_map(|r| r.get("type").and_then(JsonValue::as_str))
            .map(str::to_string)
            .collect();

        // rest[0].security.extension[0].extension[] holds {url, valueUri} pairs
        let oauth_uris = rest
            .and_then(|r| r.get("security"))
            .and_then(|s| s.get("extension"))
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("extension"))
            .and_then(JsonValue::as_array)
            .map(|extensions| {
                extensions
                    .iter()
                    .filter_map(|ex| {
                        let url = ex.get("url")?.as_str()?;
                        let value = ex.get("valueUri")?.as_str()?;
                        Some((url.to_string(), value.to_string()))
                    })
                    .collect()
            });

        Self {
            resource_types,
            oauth_uris,
        }
    }

    pub fn supports(&self, resource_type: &str) -> bool {
        self.resource_types.contains(resource_type)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resource_types.iter().map(String::as_str)
    }

    /// OAuth endpoints keyed by extension url (`authorize`, `token`, ...).
    /// `None` when the statement has no security extension at all.
    pub fn oauth_uris(&self) -> Option<&IndexMap<String, String>> {
        self.oauth_uris.as_ref()
    }

    pub fn oauth_uri(&self, name: &str) -> Option<&str> {
        self.oauth_uris.as_ref()?.get(name).map(String::as_str)
    }
}
