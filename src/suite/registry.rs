use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::core::{FhirVersion, UseCase};
use crate::error::{CertifyError, Result};
use crate::probes::resource::{self, ResourceProbeSpec};
use crate::probes::BehaviorKind;

/// Which variant family a test belongs to.
#[derive(Debug, Clone)]
pub enum TestKind {
    Conformance,
    Resource(ResourceProbeSpec),
    Behavior(BehaviorKind),
}

impl TestKind {
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::Conformance => "conformance",
            TestKind::Resource(_) => "resource",
            TestKind::Behavior(_) => "behavior",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestDescriptor {
    pub slug: String,
    pub kind: TestKind,
    pub versions: BTreeSet<FhirVersion>,
    pub use_cases: BTreeSet<UseCase>,
    /// Tests sharing a key run in the same stage; `None` runs last.
    pub group_key: Option<u32>,
}

impl TestDescriptor {
    /// Descriptor supporting every version and use case, without a group.
    pub fn new(slug: impl Into<String>, kind: TestKind) -> Self {
        Self {
            slug: slug.into(),
            kind,
            versions: [FhirVersion::Dstu2, FhirVersion::Stu3].into_iter().collect(),
            use_cases: [UseCase::Ehr, UseCase::Financial, UseCase::Security]
                .into_iter()
                .collect(),
            group_key: None,
        }
    }

    pub fn versions(mut self, versions: &[FhirVersion]) -> Self {
        self.versions = versions.iter().copied().collect();
        self
    }

    pub fn use_cases(mut self, use_cases: &[UseCase]) -> Self {
        self.use_cases = use_cases.iter().copied().collect();
        self
    }

    pub fn group(mut self, key: u32) -> Self {
        self.group_key = Some(key);
        self
    }
}

/// Collects descriptors before the registry is frozen.
#[derive(Debug, Default)]
pub struct TestRegistryBuilder {
    tests: IndexMap<String, Arc<TestDescriptor>>,
}

impl TestRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: TestDescriptor) -> Result<&mut Self> {
        if self.tests.contains_key(&descriptor.slug) {
            return Err(CertifyError::duplicate_slug(descriptor.slug));
        }
        self.tests
            .insert(descriptor.slug.clone(), Arc::new(descriptor));
        Ok(self)
    }

    pub fn build(self) -> TestRegistry {
        let mut by_use_case: HashMap<UseCase, Vec<Arc<TestDescriptor>>> = HashMap::new();
        for descriptor in self.tests.values() {
            for use_case in &descriptor.use_cases {
                by_use_case
                    .entry(*use_case)
                    .or_default()
                    .push(descriptor.clone());
            }
        }
        tracing::debug!(tests = self.tests.len(), "test registry built");
        TestRegistry {
            tests: self.tests,
            by_use_case,
        }
    }
}

/// Immutable slug to descriptor map, shared freely between tasks.
#[derive(Debug, Clone)]
pub struct TestRegistry {
    tests: IndexMap<String, Arc<TestDescriptor>>,
    by_use_case: HashMap<UseCase, Vec<Arc<TestDescriptor>>>,
}

impl TestRegistry {
    pub fn builder() -> TestRegistryBuilder {
        TestRegistryBuilder::new()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = TestDescriptor>) -> Result<Self> {
        let mut builder = TestRegistryBuilder::new();
        for descriptor in descriptors {
            builder.register(descriptor)?;
        }
        Ok(builder.build())
    }

    /// Registry holding every built-in test.
    pub fn standard() -> Result<Self> {
        Self::from_descriptors(standard_tests())
    }

    pub fn resolve(&self, slug: &str) -> Result<Arc<TestDescriptor>> {
        self.tests
            .get(slug)
            .cloned()
            .ok_or_else(|| CertifyError::unknown_test(slug))
    }

    pub fn by_use_case(&self, use_case: UseCase) -> &[Arc<TestDescriptor>] {
        self.by_use_case
            .get(&use_case)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TestDescriptor>> {
        self.tests.values()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// The built-in registration list.
pub fn standard_tests() -> Vec<TestDescriptor> {
    let mut tests = vec![
        TestDescriptor::new("s4s", TestKind::Conformance).use_cases(&[UseCase::Ehr]),
        TestDescriptor::new(
            "ask-for-authorization",
            TestKind::Behavior(BehaviorKind::AskForAuthorization),
        ),
        TestDescriptor::new(
            "exchange-code-for-token",
            TestKind::Behavior(BehaviorKind::ExchangeCodeForToken),
        ),
        TestDescriptor::new(
            "refresh-token",
            TestKind::Behavior(BehaviorKind::RefreshToken),
        ),
    ];
    tests.extend(resource::catalog());
    tests
}
