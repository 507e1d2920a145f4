//! Identity of the resources copied for a revision.
//!
//! A resource is addressed by its revision-independent prefix plus the revision
//! being installed. The pair stays structured all the way to the API lookup, so
//! the staging directory is named from the prefix directly and never derived by
//! stripping a suffix off a display name.

use std::collections::BTreeMap;
use std::fmt;

/// Kind of object copied onto the node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `v1/Secret`
    Secret,
    /// `v1/ConfigMap`
    ConfigMap,
}

impl ResourceKind {
    /// Lowercase kind used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "secret",
            ResourceKind::ConfigMap => "configmap",
        }
    }

    /// Directory under the revision's staging root holding this kind
    pub fn dir_name(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "secrets",
            ResourceKind::ConfigMap => "configmaps",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a missing resource fails the install
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourceRequirement {
    /// Missing means the install fails
    #[default]
    Required,
    /// Missing means the resource is skipped
    Optional,
}

impl ResourceRequirement {
    /// Whether this is [`ResourceRequirement::Optional`]
    pub fn is_optional(&self) -> bool {
        matches!(self, ResourceRequirement::Optional)
    }
}

/// `(prefix, revision)` pair naming one revisioned object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevisionedName {
    prefix: String,
    revision: String,
}

impl RevisionedName {
    /// Name `prefix` at `revision`
    pub fn new(prefix: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            revision: revision.into(),
        }
    }

    /// Revision-independent prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Revision identifier
    pub fn revision(&self) -> &str {
        &self.revision
    }
}

/// Renders the object name stored in the API: `<prefix>-<revision>`
impl fmt::Display for RevisionedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.revision)
    }
}

/// One object to copy for the revision being installed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSource {
    namespace: String,
    name: RevisionedName,
    requirement: ResourceRequirement,
}

impl ResourceSource {
    /// Source for `name` in `namespace`
    pub fn new(
        namespace: impl Into<String>,
        name: RevisionedName,
        requirement: ResourceRequirement,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name,
            requirement,
        }
    }

    /// Required source for `prefix` at `revision`
    pub fn required(
        namespace: impl Into<String>,
        prefix: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self::new(
            namespace,
            RevisionedName::new(prefix, revision),
            ResourceRequirement::Required,
        )
    }

    /// Optional source for `prefix` at `revision`
    pub fn optional(
        namespace: impl Into<String>,
        prefix: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self::new(
            namespace,
            RevisionedName::new(prefix, revision),
            ResourceRequirement::Optional,
        )
    }

    /// Namespace the object lives in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Structured revisioned name
    pub fn name(&self) -> &RevisionedName {
        &self.name
    }

    /// Revision-independent prefix; names the staging directory
    pub fn prefix(&self) -> &str {
        self.name.prefix()
    }

    /// Name looked up in the API
    pub fn api_name(&self) -> String {
        self.name.to_string()
    }

    /// Whether a missing object fails the install
    pub fn requirement(&self) -> ResourceRequirement {
        self.requirement
    }
}

/// Prefixes of one resource kind with their requirement, ordered by prefix.
///
/// Built from separate required and optional lists; a prefix can only carry
/// one requirement, so the two lists can never disagree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceSet {
    entries: BTreeMap<String, ResourceRequirement>,
}

impl ResourceSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from required and optional prefix lists.
    ///
    /// Returns the first prefix present in both lists as `Err`.
    pub fn from_lists<R, O>(required: R, optional: O) -> Result<Self, String>
    where
        R: IntoIterator,
        R::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        let mut set = Self::new();
        for prefix in required {
            set.insert(prefix, ResourceRequirement::Required);
        }
        for prefix in optional {
            let prefix = prefix.into();
            if set.entries.get(&prefix) == Some(&ResourceRequirement::Required) {
                return Err(prefix);
            }
            set.insert(prefix, ResourceRequirement::Optional);
        }
        Ok(set)
    }

    /// Add or replace `prefix`
    pub fn insert(&mut self, prefix: impl Into<String>, requirement: ResourceRequirement) {
        self.entries.insert(prefix.into(), requirement);
    }

    /// Builder form of [`ResourceSet::insert`] with `Required`
    pub fn with_required(mut self, prefix: impl Into<String>) -> Self {
        self.insert(prefix, ResourceRequirement::Required);
        self
    }

    /// Builder form of [`ResourceSet::insert`] with `Optional`
    pub fn with_optional(mut self, prefix: impl Into<String>) -> Self {
        self.insert(prefix, ResourceRequirement::Optional);
        self
    }

    /// Prefixes with their requirement, in lexical prefix order
    pub fn iter(&self) -> impl Iterator<Item = (&str, ResourceRequirement)> {
        self.entries.iter().map(|(p, r)| (p.as_str(), *r))
    }

    /// Number of prefixes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether at least one prefix is required
    pub fn has_required(&self) -> bool {
        self.entries
            .values()
            .any(|r| *r == ResourceRequirement::Required)
    }

    /// Sources for every prefix at `revision`, in lexical prefix order
    pub fn sources(&self, namespace: &str, revision: &str) -> Vec<ResourceSource> {
        self.iter()
            .map(|(prefix, requirement)| {
                ResourceSource::new(
                    namespace,
                    RevisionedName::new(prefix, revision),
                    requirement,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisioned_name_renders_prefix_dash_revision() {
        let name = RevisionedName::new("kube-apiserver-pod", "12");
        assert_eq!(name.to_string(), "kube-apiserver-pod-12");
        assert_eq!(name.prefix(), "kube-apiserver-pod");
        assert_eq!(name.revision(), "12");
    }

    #[test]
    fn prefix_survives_revision_that_looks_like_a_suffix() {
        // The prefix is carried, not recovered from the name, so a prefix that
        // itself ends in digits is never truncated.
        let source = ResourceSource::required("ns", "serving-cert-2", "2");
        assert_eq!(source.api_name(), "serving-cert-2-2");
        assert_eq!(source.prefix(), "serving-cert-2");
    }

    #[test]
    fn sources_are_sorted_by_prefix() {
        let set = ResourceSet::new()
            .with_required("zeta")
            .with_optional("alpha")
            .with_required("mid");
        let prefixes: Vec<_> = set
            .sources("ns", "3")
            .iter()
            .map(|s| s.prefix().to_string())
            .collect();
        assert_eq!(prefixes, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn from_lists_rejects_overlap() {
        let err = ResourceSet::from_lists(vec!["a", "b"], vec!["c", "b"]).unwrap_err();
        assert_eq!(err, "b");
    }

    #[test]
    fn from_lists_tags_requirements() {
        let set = ResourceSet::from_lists(vec!["config"], vec!["extra"]).unwrap();
        let sources = set.sources("openshift-kube-apiserver", "7");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].prefix(), "config");
        assert_eq!(sources[0].requirement(), ResourceRequirement::Required);
        assert_eq!(sources[1].prefix(), "extra");
        assert!(sources[1].requirement().is_optional());
        assert_eq!(sources[1].namespace(), "openshift-kube-apiserver");
        assert!(set.has_required());
    }

    #[test]
    fn optional_only_set_has_no_required() {
        let set = ResourceSet::from_lists(Vec::<String>::new(), vec!["x"]).unwrap();
        assert!(!set.has_required());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn kind_directories() {
        assert_eq!(ResourceKind::Secret.dir_name(), "secrets");
        assert_eq!(ResourceKind::ConfigMap.dir_name(), "configmaps");
        assert_eq!(ResourceKind::ConfigMap.to_string(), "configmap");
    }
}
