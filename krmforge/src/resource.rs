mod refs;
mod shorthash;
mod view;

use std::fmt;

use compact_str::format_compact;
use serde::{Deserialize, Serialize};

pub use self::{
    refs::{RefSpec, RefSpecs},
    view::StrMapView,
};
use crate::{
    error::{Error, Result},
    manifest::{Behavior, Str},
    tree::{CreateKind, Node},
};

pub mod annotation {
    /// Set on a resource (or by a generator) to request a content hash name suffix.
    pub const NEEDS_HASH: &str = "kustomize.config.k8s.io/needs-hash";
    pub const BEHAVIOR: &str = "kustomize.config.k8s.io/behavior";
    pub const ORIGIN: &str = "config.kubernetes.io/origin";
    pub const TRANSFORMATIONS: &str = "alpha.config.kubernetes.io/transformations";
    /// Prefix of annotations that are only meaningful during a build.
    pub const INTERNAL_PREFIX: &str = "internal.config.kubernetes.io/";
    /// Marks a resource as input to the build that is never emitted.
    pub const LOCAL_CONFIG: &str = "config.kubernetes.io/local-config";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gvk {
    #[serde(default)]
    pub group: Str,
    pub version: Str,
    pub kind: Str,
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.kind, self.version)
        } else {
            write!(f, "{}.{}.{}", self.kind, self.version, self.group)
        }
    }
}

impl Gvk {
    pub fn new(group: impl Into<Str>, version: impl Into<Str>, kind: impl Into<Str>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Split an `apiVersion` of the form `group/version` or `version`.
    pub fn from_api_version(api_version: &str, kind: impl Into<Str>) -> Self {
        let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
        Self::new(group, version, kind)
    }

    pub fn api_version(&self) -> Str {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format_compact!("{}/{}", self.group, self.version)
        }
    }
}

/// Selects resource types. Absent or empty parts match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct GvkMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Str>,
}

impl fmt::Display for GvkMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kind) = &self.kind {
            write!(f, "{kind}.")?;
        }

        if let Some(version) = &self.version {
            write!(f, "{version}.")?;
        }

        if let Some(group) = &self.group {
            write!(f, "{group}")
        } else {
            write!(f, "*")
        }
    }
}

impl GvkMatcher {
    pub fn kind(kind: impl Into<Str>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, gvk: &Gvk) -> bool {
        fn part(selector: &Option<Str>, value: &str) -> bool {
            selector.as_deref().is_none_or(|s| s.is_empty() || s == value)
        }

        part(&self.group, &gvk.group)
            && part(&self.version, &gvk.version)
            && part(&self.kind, &gvk.kind)
    }
}

/// The identity of a resource. An absent namespace means cluster-scoped or unset.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResId {
    #[serde(flatten)]
    pub gvk: Gvk,
    pub name: Str,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Str>,
}

impl std::ops::Deref for ResId {
    type Target = Gvk;

    fn deref(&self) -> &Self::Target {
        &self.gvk
    }
}

impl fmt::Debug for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{}/{}.{namespace}", self.gvk, self.name)
        } else {
            write!(f, "{}/{}", self.gvk, self.name)
        }
    }
}

pub const DEFAULT_NAMESPACE: &str = "default";

impl ResId {
    pub fn new(gvk: Gvk, name: impl Into<Str>, namespace: Option<Str>) -> Self {
        Self {
            gvk,
            name: name.into(),
            namespace,
        }
    }

    pub fn effective_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Equality where an absent namespace and the default namespace are the same.
    pub fn equivalent(&self, other: &ResId) -> bool {
        self.gvk == other.gvk
            && self.name == other.name
            && self.effective_namespace() == other.effective_namespace()
    }

    /// Derive the identity from a document's `apiVersion`, `kind` and `metadata`.
    pub fn derive(root: &Node) -> Result<ResId> {
        let kind = root
            .get_str("kind")
            .ok_or_else(|| Error::config("resource is missing `kind`"))?;
        let api_version = root.get_str("apiVersion").unwrap_or_default();
        let metadata = root.get("metadata");
        let name = metadata
            .and_then(|m| m.get_str("name"))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::config(format_args!(
                    "resource of kind `{kind}` is missing `metadata.name`"
                ))
            })?;
        let namespace = metadata
            .and_then(|m| m.get_str("namespace"))
            .filter(|ns| !ns.is_empty())
            .map(Str::from);

        Ok(ResId::new(
            Gvk::from_api_version(api_version, kind),
            name,
            namespace,
        ))
    }
}

/// Where a resource came from, as recorded in the origin annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_in: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_by: Option<ConfiguredBy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredBy {
    pub api_version: Str,
    pub kind: Str,
}

impl ConfiguredBy {
    pub fn builtin(kind: &str) -> Self {
        Self {
            api_version: Str::const_new("builtin"),
            kind: kind.into(),
        }
    }
}

/// Bookkeeping that travels with a resource through a build but is never emitted as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    /// Name prefixes applied so far, innermost layer first.
    pub prefixes: Vec<Str>,
    pub suffixes: Vec<Str>,
    pub origin: Option<Origin>,
    /// The transformers that changed the resource, in order.
    pub transformations: Vec<Origin>,
    pub needs_hash: bool,
    pub behavior: Behavior,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    id: ResId,
    original_id: ResId,
    /// Every identity this resource held before the current one, oldest first.
    previous_ids: Vec<ResId>,
    root: Node,
    provenance: Provenance,
}

impl Resource {
    /// Build a resource from a parsed document, moving any internal annotations it carries
    /// into its provenance.
    pub fn from_node(mut root: Node) -> Result<Self> {
        if !matches!(root, Node::Mapping(_)) {
            return Err(Error::config("resource document must be a mapping"));
        }

        let id = ResId::derive(&root)?;
        let mut provenance = Provenance::default();

        if let Some(annotations) = root
            .get_mut("metadata")
            .and_then(|m| m.get_mut("annotations"))
        {
            if let Some(needs_hash) = annotations.remove(annotation::NEEDS_HASH) {
                provenance.needs_hash = needs_hash.as_str() == Some("true");
            }

            if let Some(behavior) = annotations.remove(annotation::BEHAVIOR) {
                provenance.behavior = match behavior.as_str() {
                    Some("create") | None => Behavior::Create,
                    Some("merge") => Behavior::Merge,
                    Some("replace") => Behavior::Replace,
                    Some(other) => {
                        return Err(Error::config(format_args!(
                            "resource `{id}` has unknown behavior `{other}`"
                        )));
                    }
                };
            }

            if annotations.as_mapping().is_some_and(|m| m.is_empty()) {
                root.get_mut("metadata").and_then(|m| m.remove("annotations"));
            }
        }

        Ok(Resource {
            original_id: id.clone(),
            id,
            previous_ids: vec![],
            root,
            provenance,
        })
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn id(&self) -> &ResId {
        &self.id
    }

    /// The identity captured when the resource was loaded or generated.
    pub fn original_id(&self) -> &ResId {
        &self.original_id
    }

    pub fn previous_ids(&self) -> &[ResId] {
        &self.previous_ids
    }

    /// The current identity followed by every earlier one, most recent first.
    pub fn all_ids(&self) -> impl Iterator<Item = &ResId> {
        std::iter::once(&self.id).chain(self.previous_ids.iter().rev())
    }

    pub fn any_id_matches(&self, f: impl Fn(&ResId) -> bool) -> bool {
        self.all_ids().any(f)
    }

    pub fn name(&self) -> &Str {
        &self.id.name
    }

    pub fn namespace(&self) -> Option<&Str> {
        self.id.namespace.as_ref()
    }

    pub fn gvk(&self) -> &Gvk {
        &self.id.gvk
    }

    pub fn kind(&self) -> &Str {
        &self.id.kind
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Direct access to the tree. Identity changes made through it only take effect once
    /// [`Resource::sync_id`] runs, which the owning `ResourceMap` does after every mutation.
    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub(crate) fn split_mut(&mut self) -> (&ResId, &mut Node) {
        (&self.id, &mut self.root)
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn provenance_mut(&mut self) -> &mut Provenance {
        &mut self.provenance
    }

    /// Re-derive the identity from the tree, recording the old one if it changed.
    pub fn sync_id(&mut self) -> Result<bool> {
        let id = ResId::derive(&self.root)?;
        if id == self.id {
            return Ok(false);
        }

        tracing::trace!(from = %self.id, to = %id, "resource identity changed");
        let previous = std::mem::replace(&mut self.id, id);
        self.previous_ids.retain(|prev| *prev != previous);
        self.previous_ids.push(previous);
        Ok(true)
    }

    pub fn set_name(&mut self, name: impl Into<Str>) -> Result<()> {
        self.root
            .get_or_create("metadata", CreateKind::Mapping)?
            .set("name", Node::string(name), None)?;
        self.sync_id()?;
        Ok(())
    }

    pub fn set_namespace(&mut self, namespace: Option<&str>) -> Result<()> {
        let metadata = self.root.get_or_create("metadata", CreateKind::Mapping)?;
        match namespace {
            Some(namespace) => {
                metadata.set("namespace", Node::string(namespace), None)?;
            }
            None => {
                metadata.remove("namespace");
            }
        }
        self.sync_id()?;
        Ok(())
    }

    /// Names this resource has had, most recent first.
    pub fn historic_names(&self) -> impl Iterator<Item = &Str> {
        self.all_ids().map(|id| &id.name)
    }

    /// Names this resource was known by before its current one, starting with the original.
    /// A resource that was never renamed reports its current name.
    pub fn prior_names(&self) -> impl Iterator<Item = &Str> {
        std::iter::once(&self.original_id.name).chain(self.previous_ids.iter().map(|id| &id.name))
    }

    pub fn historic_namespaces(&self) -> impl Iterator<Item = &str> {
        self.all_ids().map(ResId::effective_namespace)
    }

    /// Whether both resources had the same prefixes and suffixes applied to them.
    pub fn prefix_suffix_equals(&self, other: &Resource) -> bool {
        self.provenance.prefixes == other.provenance.prefixes
            && self.provenance.suffixes == other.provenance.suffixes
    }
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.root.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let root = Node::deserialize(deserializer)?;
        Resource::from_node(root)
            .map_err(|err| serde::de::Error::custom(format!("parsing resource: {err}")))
    }
}
