//! Engine-wide tables that drive the builtin transformers.
//!
//! [`Defaults::builtin`] is the shipped value. A layer may layer its own `configurations`
//! over it with [`Defaults::with_overrides`]; nothing here is ever mutated in place.

use std::sync::OnceLock;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{
    fieldspec::{self, FieldSpecs},
    manifest::{LegacySortOptions, Str},
    patch::MergeKeys,
    resource::RefSpecs,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub field_specs: fieldspec::Builtin,
    pub name_references: RefSpecs,
    pub merge_keys: MergeKeys,
    pub cluster_scoped: ClusterScoped,
    pub sort_order: LegacySortOptions,
}

impl Defaults {
    pub fn builtin() -> &'static Defaults {
        static INSTANCE: OnceLock<Defaults> = OnceLock::new();
        INSTANCE.get_or_init(|| Defaults {
            field_specs: fieldspec::Builtin::get().clone(),
            name_references: RefSpecs::load_builtin().clone(),
            merge_keys: MergeKeys::load_builtin().clone(),
            cluster_scoped: ClusterScoped::default(),
            sort_order: legacy_sort_order(),
        })
    }

    /// A copy of these tables with `config` layered on top.
    ///
    /// Label specs cascade: `metadataLabels` entries also apply wherever template or common
    /// labels do, and `templateLabels` entries also apply wherever common labels do.
    pub fn with_overrides(&self, config: &TransformerConfig) -> Defaults {
        let metadata_labels = config.metadata_labels.clone();
        let template_labels = metadata_labels.merged(&config.template_labels);
        let common_labels = template_labels.merged(&config.common_labels);

        let overrides = fieldspec::Builtin {
            name_prefix: config.name_prefix.merged(&config.name_suffix),
            namespace: config.namespace.clone(),
            metadata_labels,
            common_annotations: config.common_annotations.clone(),
            template_labels,
            common_labels,
            images: config.images.clone(),
            replicas: config.replicas.clone(),
        };

        Defaults {
            field_specs: self.field_specs.merged(&overrides),
            name_references: self.name_references.merged(&config.name_reference),
            merge_keys: self.merge_keys.merged(&config.merge_keys),
            cluster_scoped: self.cluster_scoped.clone(),
            sort_order: self.sort_order.clone(),
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults::builtin().clone()
    }
}

/// The contents of a file listed under a layer's `configurations`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransformerConfig {
    #[serde(default)]
    pub name_prefix: FieldSpecs,
    #[serde(default)]
    pub name_suffix: FieldSpecs,
    #[serde(default)]
    pub namespace: FieldSpecs,
    #[serde(default)]
    pub common_labels: FieldSpecs,
    #[serde(default)]
    pub template_labels: FieldSpecs,
    #[serde(default)]
    pub metadata_labels: FieldSpecs,
    #[serde(default)]
    pub common_annotations: FieldSpecs,
    #[serde(default)]
    pub images: FieldSpecs,
    #[serde(default)]
    pub replicas: FieldSpecs,
    #[serde(default)]
    pub name_reference: RefSpecs,
    #[serde(default)]
    pub merge_keys: MergeKeys,
}

/// Kinds whose instances never live in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ClusterScoped(IndexSet<Str>);

const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "CSIDriver",
    "CSINode",
    "CertificateSigningRequest",
    "ClusterIssuer",
    "ClusterRole",
    "ClusterRoleBinding",
    "ComponentStatus",
    "CustomResourceDefinition",
    "FlowSchema",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PodSecurityPolicy",
    "PriorityClass",
    "PriorityLevelConfiguration",
    "RuntimeClass",
    "SelfSubjectAccessReview",
    "SelfSubjectRulesReview",
    "StorageClass",
    "SubjectAccessReview",
    "TokenReview",
    "ValidatingAdmissionPolicy",
    "ValidatingAdmissionPolicyBinding",
    "ValidatingWebhookConfiguration",
    "VolumeAttachment",
];

impl Default for ClusterScoped {
    fn default() -> Self {
        Self(CLUSTER_SCOPED_KINDS.iter().copied().map(Str::from).collect())
    }
}

impl ClusterScoped {
    pub fn contains(&self, kind: &str) -> bool {
        self.0.contains(kind)
    }
}

const ORDER_FIRST: &[&str] = &[
    "Namespace",
    "ResourceQuota",
    "StorageClass",
    "CustomResourceDefinition",
    "ServiceAccount",
    "PodSecurityPolicy",
    "Role",
    "ClusterRole",
    "RoleBinding",
    "ClusterRoleBinding",
    "ConfigMap",
    "Secret",
    "Endpoints",
    "Service",
    "LimitRange",
    "PriorityClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "Deployment",
    "StatefulSet",
    "CronJob",
    "PodDisruptionBudget",
];

const ORDER_LAST: &[&str] = &["MutatingWebhookConfiguration", "ValidatingWebhookConfiguration"];

fn legacy_sort_order() -> LegacySortOptions {
    LegacySortOptions {
        order_first: ORDER_FIRST.iter().copied().map(Str::from).collect(),
        order_last: ORDER_LAST.iter().copied().map(Str::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Gvk;

    #[test]
    fn overrides_cascade_label_specs() -> anyhow::Result<()> {
        let config: TransformerConfig = serde_yaml::from_str(
            r#"
metadataLabels:
- path: spec/extra/labels
  kind: MyKind
  create: true
nameReference:
- kind: Secret
  version: v1
  fieldSpecs:
  - path: spec/secretName
    kind: MyKind
"#,
        )?;
        let builtin = Defaults::builtin();
        let defaults = builtin.with_overrides(&config);

        let has_extra = |specs: &FieldSpecs| {
            specs.iter().any(|spec| spec.path.to_string() == "spec/extra/labels")
        };
        assert!(has_extra(&defaults.field_specs.metadata_labels));
        assert!(has_extra(&defaults.field_specs.template_labels));
        assert!(has_extra(&defaults.field_specs.common_labels));
        assert!(!has_extra(&builtin.field_specs.common_labels));

        let secret = Gvk::new("", "v1", "Secret");
        assert!(
            defaults
                .name_references
                .for_referee(&secret)
                .flat_map(|spec| spec.referrers.iter())
                .any(|spec| spec.path.to_string() == "spec/secretName")
        );
        Ok(())
    }

    #[test]
    fn unknown_configuration_keys_are_rejected() {
        assert!(serde_yaml::from_str::<TransformerConfig>("varReference: []").is_err());
    }

    #[test]
    fn cluster_scoped_kinds() {
        let kinds = ClusterScoped::default();
        assert!(kinds.contains("ClusterRole"));
        assert!(kinds.contains("Namespace"));
        assert!(!kinds.contains("ServiceAccount"));
    }
}
