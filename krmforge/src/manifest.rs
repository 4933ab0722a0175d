use core::fmt;
use std::path::PathBuf;

use compact_str::CompactString;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    fieldspec::FieldSpecs,
    resource::{ResId, Resource},
    selector::Selector,
    tree::Node,
};

pub type Str = CompactString;

/// The configuration of one layer of a build.
///
/// A layer names its input resources (files or directories holding other layers), the
/// generators that add resources, and the transformations applied to everything it
/// accumulates.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Kustomization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<apiversion::V1Beta1>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<kind::Kustomization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Node>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub resources: Box<[PathBuf]>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub patches: Vec<Patch>,
    /// Legacy field, use `patches` instead.
    #[serde(
        rename = "patchesJson6902",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub patches_json: Vec<Patch>,
    /// Legacy field, use `patches` instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches_strategic_merge: Vec<Str>,
    #[serde(
        default,
        skip_serializing_if = "<[_]>::is_empty",
        rename = "configMapGenerator"
    )]
    pub config_map_generators: Box<[Generator]>,
    #[serde(
        default,
        skip_serializing_if = "<[_]>::is_empty",
        rename = "secretGenerator"
    )]
    pub secret_generators: Box<[SecretGenerator]>,
    #[serde(default)]
    pub generator_options: GeneratorOptions,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub generators: Box<[PluginSource]>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub transformers: Box<[PluginSource]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Str>,
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub name_prefix: Str,
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub name_suffix: Str,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    /// Deprecated, use `labels` field instead.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub common_labels: IndexMap<Str, Str>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub common_annotations: IndexMap<Str, Str>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub images: Box<[ImageTag]>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub replicas: Box<[Replica]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<ReplacementEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_options: Option<SortOptions>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub build_metadata: Box<[BuildMetadata]>,
    /// Files with extra field specs layered over the builtin tables for this layer.
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub configurations: Box<[PathBuf]>,
}

impl Kustomization {
    /// Fold deprecated fields into their replacements.
    pub fn transform_legacy_fields(&mut self) {
        if !self.common_labels.is_empty() {
            tracing::warn!("`commonLabels` is deprecated, use `labels` instead");
            self.labels.insert(
                0,
                Label {
                    pairs: std::mem::take(&mut self.common_labels),
                    include_selectors: true,
                    include_templates: false,
                    fields: FieldSpecs::default(),
                },
            );
        }

        if !self.patches_strategic_merge.is_empty() {
            tracing::warn!("`patchesStrategicMerge` is deprecated, use `patches` instead");
            for entry in std::mem::take(&mut self.patches_strategic_merge) {
                // Entries are either a path or, for legacy reasons, the patch content itself.
                let source = if entry.contains('\n') {
                    PatchSource::Inline(entry)
                } else {
                    PatchSource::Path(PathBuf::from(entry.as_str()))
                };
                self.patches.push(Patch {
                    source,
                    target: None,
                });
            }
        }

        if !self.patches_json.is_empty() {
            tracing::warn!("`patchesJson6902` is deprecated, use `patches` instead");
            self.patches.append(&mut self.patches_json);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ImageTag {
    pub name: Str,
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub new_name: Str,
    // `new_tag` is the value used to replace the original tag.
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub new_tag: Str,
    // `digest` is the value used to replace the original image tag.
    // If `digest` is present `new_tag` is ignored.
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub digest: Str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Generator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Str>,
    pub name: Str,
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(flatten)]
    pub sources: KeyValuePairSources,
    #[serde(default)]
    pub options: GeneratorOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretGenerator {
    #[serde(default, rename = "type")]
    pub ty: SecretType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Str>,
    pub name: Str,
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(flatten)]
    pub sources: KeyValuePairSources,
    #[serde(default)]
    pub options: GeneratorOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum SecretType {
    #[default]
    Opaque,
    #[serde(rename = "kubernetes.io/tls")]
    Tls,
    #[serde(rename = "kubernetes.io/dockerconfigjson")]
    DockerConfigJson,
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque => write!(f, "Opaque"),
            Self::Tls => write!(f, "kubernetes.io/tls"),
            Self::DockerConfigJson => write!(f, "kubernetes.io/dockerconfigjson"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratorOptions {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<Str, Str>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<Str, Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_name_suffix_hash: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub immutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValuePairSources {
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub literals: Box<[KeyValuePair]>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub files: Box<[MaybeKeyValuePair]>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub envs: Box<[PathBuf]>,
}

impl<'de> Deserialize<'de> for KeyValuePairSources {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct Helper {
            #[serde(default)]
            literals: Box<[KeyValuePair]>,
            #[serde(default)]
            files: Box<[MaybeKeyValuePair]>,
            #[serde(default)]
            envs: Vec<PathBuf>,
            // Support for legacy singular `env` field
            env: Option<PathBuf>,
        }

        let mut helper = Helper::deserialize(deserializer)?;
        helper.envs.extend(helper.env);

        Ok(KeyValuePairSources {
            literals: helper.literals,
            files: helper.files,
            envs: helper.envs.into_boxed_slice(),
        })
    }
}

/// `key=value` or a bare `value`, as used by file sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeKeyValuePair {
    pub key: Option<Str>,
    pub value: Str,
}

impl Serialize for MaybeKeyValuePair {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match &self.key {
            Some(key) => serializer.collect_str(&format_args!("{key}={}", self.value)),
            None => serializer.serialize_str(&self.value),
        }
    }
}

impl<'de> Deserialize<'de> for MaybeKeyValuePair {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value: Str = Deserialize::deserialize(deserializer)?;
        Ok(match value.split_once('=') {
            Some((key, value)) => MaybeKeyValuePair {
                key: Some(key.into()),
                value: value.into(),
            },
            None => MaybeKeyValuePair { key: None, value },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: Str,
    pub value: Str,
}

impl Serialize for KeyValuePair {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&format_args!("{}={}", self.key, self.value))
    }
}

impl<'de> Deserialize<'de> for KeyValuePair {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let maybe_pair: MaybeKeyValuePair = Deserialize::deserialize(deserializer)?;
        Ok(KeyValuePair {
            key: maybe_pair.key.ok_or_else(|| {
                serde::de::Error::custom("missing key, must be in the format `<key>=<value>`")
            })?,
            value: maybe_pair.value,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Behavior {
    #[default]
    Create,
    Merge,
    Replace,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Merge => write!(f, "merge"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Replica {
    pub name: Str,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Label {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub pairs: IndexMap<Str, Str>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_selectors: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_templates: bool,
    /// Additional field specs, layered over the builtin ones.
    #[serde(default, skip_serializing_if = "FieldSpecs::is_empty")]
    pub fields: FieldSpecs,
}

#[derive(Debug, Clone)]
pub struct Patch {
    pub source: PatchSource,
    pub target: Option<Target>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchSource {
    Path(PathBuf),
    Inline(Str),
}

impl Serialize for Patch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        match &self.source {
            PatchSource::Path(path) => map.serialize_entry("path", path)?,
            PatchSource::Inline(patch) => map.serialize_entry("patch", patch)?,
        }
        if let Some(target) = &self.target {
            map.serialize_entry("target", target)?;
        }
        map.end()
    }
}

// Untagged errors are too terrible to read, so we implement custom deserialization.
impl<'de> Deserialize<'de> for Patch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct Helper {
            path: Option<PathBuf>,
            patch: Option<Str>,
            target: Option<Target>,
            // Accepted for compatibility, patches never rename their target.
            #[serde(default)]
            #[allow(dead_code)]
            options: Option<IndexMap<Str, bool>>,
        }

        let helper = Helper::deserialize(deserializer)?;
        let source = match (helper.path, helper.patch) {
            (Some(path), None) => PatchSource::Path(path),
            (None, Some(patch)) if !patch.trim().is_empty() => PatchSource::Inline(patch),
            (None, Some(_)) => return Err(serde::de::Error::custom("patch content is empty")),
            (Some(_), Some(_)) => {
                return Err(serde::de::Error::custom(
                    "patch must specify exactly one of `path` or `patch`",
                ));
            }
            (None, None) => {
                return Err(serde::de::Error::custom(
                    "patch must specify one of `path` or `patch`",
                ));
            }
        };

        Ok(Patch {
            source,
            target: helper.target,
        })
    }
}

/// Selects the resources a patch applies to.
///
/// Every specified part must match; the name, namespace and gvk parts are anchored regular
/// expressions matched against any of the ids a resource has had.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Target {
    #[serde(
        with = "crate::serde_ex::opt_regex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub group: Option<Regex>,
    #[serde(
        with = "crate::serde_ex::opt_regex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<Regex>,
    #[serde(
        with = "crate::serde_ex::opt_regex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<Regex>,
    #[serde(
        with = "crate::serde_ex::opt_regex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<Regex>,
    #[serde(
        with = "crate::serde_ex::opt_regex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub namespace: Option<Regex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_selector: Option<Selector>,
}

impl Target {
    pub fn matches(&self, resource: &Resource) -> bool {
        let id_matches = |id: &ResId| {
            self.group.as_ref().is_none_or(|re| re.is_match(&id.group))
                && self.version.as_ref().is_none_or(|re| re.is_match(&id.version))
                && self.kind.as_ref().is_none_or(|re| re.is_match(&id.kind))
                && self.name.as_ref().is_none_or(|re| re.is_match(&id.name))
                && self.namespace.as_ref().is_none_or(|re| match id.namespace.as_deref() {
                    Some(namespace) => re.is_match(namespace),
                    // An absent namespace is the default one.
                    None => re.is_match("") || re.is_match("default"),
                })
        };

        resource.any_id_matches(id_matches)
            && self
                .label_selector
                .as_ref()
                .is_none_or(|s| s.matches(resource.labels().as_ref()))
            && self
                .annotation_selector
                .as_ref()
                .is_none_or(|s| s.matches(resource.annotations().as_ref()))
    }
}

/// A `replacements` entry: a file holding one or more replacements, or one inline.
#[derive(Debug, Clone)]
pub enum ReplacementEntry {
    Path(PathBuf),
    Inline(Replacement),
}

impl Serialize for ReplacementEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        match self {
            ReplacementEntry::Path(path) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("path", path)?;
                map.end()
            }
            ReplacementEntry::Inline(replacement) => replacement.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ReplacementEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct Helper {
            path: Option<PathBuf>,
            source: Option<ReplacementSource>,
            targets: Option<Vec<ReplacementTarget>>,
        }

        let helper = Helper::deserialize(deserializer)?;
        match (helper.path, helper.source, helper.targets) {
            (Some(path), None, None) => Ok(ReplacementEntry::Path(path)),
            (None, Some(source), Some(targets)) => {
                Ok(ReplacementEntry::Inline(Replacement { source, targets }))
            }
            (Some(_), _, _) => Err(serde::de::Error::custom(
                "replacement must specify either `path` or `source` and `targets`",
            )),
            (None, None, _) => Err(serde::de::Error::custom("replacement is missing `source`")),
            (None, Some(_), None) => {
                Err(serde::de::Error::custom("replacement is missing `targets`"))
            }
        }
    }
}

/// Copies one field of a source resource into fields of target resources.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Replacement {
    pub source: ReplacementSource,
    pub targets: Vec<ReplacementTarget>,
}

/// The single resource a replacement reads from. Unset parts match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReplacementSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Str>,
    /// Dotted path of the copied field.
    #[serde(default = "default_source_field", skip_serializing_if = "is_default_source_field")]
    pub field_path: Str,
    #[serde(default, skip_serializing_if = "FieldOptions::is_default")]
    pub options: FieldOptions,
}

fn default_source_field() -> Str {
    Str::const_new("metadata.name")
}

fn is_default_source_field(path: &Str) -> bool {
    *path == default_source_field()
}

impl ReplacementSource {
    /// Whether any identity `resource` has had is the one described. An absent namespace is the
    /// default one.
    pub fn matches(&self, resource: &Resource) -> bool {
        let part = |expected: &Option<Str>, actual: &str| {
            expected.as_deref().is_none_or(|expected| expected == actual)
        };
        resource.any_id_matches(|id| {
            part(&self.group, &id.group)
                && part(&self.version, &id.version)
                && part(&self.kind, &id.kind)
                && part(&self.name, &id.name)
                && self.namespace.as_deref().is_none_or(|ns| {
                    ns == id.effective_namespace() || (ns.is_empty() && id.namespace.is_none())
                })
        })
    }
}

impl fmt::Display for ReplacementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            ("group", &self.group),
            ("version", &self.version),
            ("kind", &self.kind),
            ("name", &self.name),
            ("namespace", &self.namespace),
        ];
        let mut first = true;
        for (key, value) in parts {
            let Some(value) = value else { continue };
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Where a replacement writes: the selected resources, minus the rejected ones, at each of the
/// dotted field paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReplacementTarget {
    pub select: Target,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reject: Vec<Target>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_paths: Vec<Str>,
    #[serde(default, skip_serializing_if = "FieldOptions::is_default")]
    pub options: FieldOptions,
}

impl ReplacementTarget {
    pub fn selects(&self, resource: &Resource) -> bool {
        self.select.matches(resource) && !self.reject.iter().any(|reject| reject.matches(resource))
    }
}

/// How a replacement reads or writes part of a delimited scalar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldOptions {
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub delimiter: Str,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub index: isize,
    /// Create the target field if it is absent.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create: bool,
}

fn is_zero(index: &isize) -> bool {
    *index == 0
}

impl FieldOptions {
    fn is_default(&self) -> bool {
        *self == FieldOptions::default()
    }
}

/// A transformer plugin entry, either a path to its configuration or the configuration inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PluginSource {
    Path(PathBuf),
    Inline(Node),
}

impl<'de> Deserialize<'de> for PluginSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match Node::deserialize(deserializer)? {
            node @ Node::Mapping(_) => Ok(PluginSource::Inline(node)),
            node => match node.as_str() {
                Some(path) => Ok(PluginSource::Path(PathBuf::from(path))),
                None => Err(serde::de::Error::custom(
                    "transformer must be a path or an inline configuration",
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SortOptions {
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_sort_options: Option<LegacySortOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Legacy,
    Fifo,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LegacySortOptions {
    #[serde(default)]
    pub order_first: Vec<Str>,
    #[serde(default)]
    pub order_last: Vec<Str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildMetadata {
    OriginAnnotations,
    TransformerAnnotations,
}

pub mod kind {
    use super::define_symbol;

    define_symbol!(Kustomization = "Kustomization");
}

pub mod apiversion {
    use super::define_symbol;

    define_symbol!(V1Beta1 = "kustomize.config.k8s.io/v1beta1");
}

macro_rules! define_symbol {
    ($name:ident = $value:literal) => {
        #[derive(Clone, PartialEq, Eq, Hash, Default)]
        #[allow(non_camel_case_types)]
        pub struct $name;

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", $value)
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", $value)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str($value)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value: $crate::manifest::Str = ::serde::Deserialize::deserialize(deserializer)?;
                if value == $value {
                    Ok($name)
                } else {
                    Err(serde::de::Error::custom(format!(
                        "expected `{}`, found `{value}`",
                        $value
                    )))
                }
            }
        }
    };
}

use define_symbol;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_fields_fold_into_current_ones() -> anyhow::Result<()> {
        let mut k: Kustomization = serde_yaml::from_str(
            r#"
commonLabels:
  app: web
patchesStrategicMerge:
- patch.yaml
- |-
  apiVersion: v1
  kind: ConfigMap
  metadata:
    name: cm
patchesJson6902:
- path: ops.yaml
  target:
    kind: Deployment
    name: web
"#,
        )?;
        k.transform_legacy_fields();

        assert!(k.common_labels.is_empty());
        assert!(k.labels[0].include_selectors);
        assert_eq!(k.patches.len(), 3);
        assert_eq!(k.patches[0].source, PatchSource::Path("patch.yaml".into()));
        assert!(matches!(k.patches[1].source, PatchSource::Inline(_)));
        assert!(k.patches[2].target.is_some());
        Ok(())
    }

    #[test]
    fn patch_requires_exactly_one_source() {
        for bad in ["target: {kind: x}", "path: a\npatch: b", "patch: ''"] {
            assert!(serde_yaml::from_str::<Patch>(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn replacement_entries_are_a_path_or_inline() -> anyhow::Result<()> {
        let k: Kustomization = serde_yaml::from_str(
            r#"
replacements:
- path: replacements.yaml
- source:
    kind: ConfigMap
    name: cm
    fieldPath: data.tag
  targets:
  - select:
      kind: Deployment
    fieldPaths:
    - spec.replicas
"#,
        )?;
        assert!(matches!(
            &k.replacements[0],
            ReplacementEntry::Path(path) if path.ends_with("replacements.yaml")
        ));
        let ReplacementEntry::Inline(replacement) = &k.replacements[1] else {
            panic!("expected an inline replacement");
        };
        assert_eq!(replacement.source.field_path, "data.tag");
        assert_eq!(replacement.targets[0].options, FieldOptions::default());

        for bad in [
            "path: a\nsource: {kind: x}",
            "source: {kind: x}",
            "targets: []",
            "source: {kind: x, nope: y}\ntargets: []",
        ] {
            assert!(serde_yaml::from_str::<ReplacementEntry>(bad).is_err(), "{bad}");
        }
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<Kustomization>("nameprefix: x-").is_err());
    }

    #[test]
    fn api_version_symbol_must_match() {
        assert!(
            serde_yaml::from_str::<Kustomization>("apiVersion: v1\nkind: Kustomization").is_err()
        );
        assert!(
            serde_yaml::from_str::<Kustomization>(
                "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization"
            )
            .is_ok()
        );
    }
}
