use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::FieldSpecs;

const NAME_PREFIX: &[u8] = include_bytes!("namePrefix.yaml");
const NAMESPACE: &[u8] = include_bytes!("namespace.yaml");
const COMMON_ANNOTATIONS: &[u8] = include_bytes!("commonAnnotations.yaml");
const METADATA_LABELS: &[u8] = include_bytes!("metadataLabels.yaml");
const TEMPLATE_LABELS: &[u8] = include_bytes!("templateLabels.yaml");
const OTHER_LABELS: &[u8] = include_bytes!("otherLabels.yaml");
const IMAGES: &[u8] = include_bytes!("images.yaml");
const REPLICAS: &[u8] = include_bytes!("replicas.yaml");

/// The field spec tables each builtin transformer starts from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Builtin {
    /// Used for both name prefixes and suffixes.
    #[serde(default)]
    pub name_prefix: FieldSpecs,
    #[serde(default)]
    pub namespace: FieldSpecs,
    #[serde(default)]
    pub metadata_labels: FieldSpecs,
    #[serde(default)]
    pub common_annotations: FieldSpecs,
    /// Template labels on top of the metadata labels.
    #[serde(default)]
    pub template_labels: FieldSpecs,
    /// Every label location, selectors included.
    #[serde(default)]
    pub common_labels: FieldSpecs,
    #[serde(default)]
    pub images: FieldSpecs,
    #[serde(default)]
    pub replicas: FieldSpecs,
}

impl Builtin {
    pub fn get() -> &'static Self {
        static INSTANCE: OnceLock<Builtin> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            let parse = |name: &str, bytes: &[u8]| {
                serde_yaml::from_slice::<FieldSpecs>(bytes)
                    .unwrap_or_else(|err| panic!("invalid builtin {name} field specs: {err}"))
            };

            let metadata_labels = parse("metadata labels", METADATA_LABELS);
            let template_labels =
                metadata_labels.merged(&parse("template labels", TEMPLATE_LABELS));
            let common_labels = template_labels.merged(&parse("other labels", OTHER_LABELS));

            Builtin {
                name_prefix: parse("name prefix", NAME_PREFIX),
                namespace: parse("namespace", NAMESPACE),
                common_annotations: parse("common annotations", COMMON_ANNOTATIONS),
                metadata_labels,
                template_labels,
                common_labels,
                images: parse("images", IMAGES),
                replicas: parse("replicas", REPLICAS),
            }
        })
    }

    /// Layer user supplied tables over these ones, table by table.
    pub fn merged(&self, overrides: &Builtin) -> Builtin {
        Builtin {
            name_prefix: self.name_prefix.merged(&overrides.name_prefix),
            namespace: self.namespace.merged(&overrides.namespace),
            metadata_labels: self.metadata_labels.merged(&overrides.metadata_labels),
            common_annotations: self.common_annotations.merged(&overrides.common_annotations),
            template_labels: self.template_labels.merged(&overrides.template_labels),
            common_labels: self.common_labels.merged(&overrides.common_labels),
            images: self.images.merged(&overrides.images),
            replicas: self.replicas.merged(&overrides.replicas),
        }
    }
}

#[cfg(test)]
#[test]
fn ensure_builtin_fieldspecs_valid() {
    let builtin = Builtin::get();
    assert!(builtin.common_labels.len() > builtin.template_labels.len());
    assert!(builtin.template_labels.len() > builtin.metadata_labels.len());
    assert_eq!(builtin.name_prefix.len(), 1);
}
