use compact_str::format_compact;
use serde::Deserialize;

use crate::{
    error::Result,
    fieldspec::FieldSpecs,
    manifest::Str,
    resmap::ResourceMap,
    resource::{ConfiguredBy, Gvk},
    tree::{CreateKind, NodeKind, PathStep, Tag, mismatch},
};

use super::{Context, Transformer};

/// Kinds whose names are never prefixed or suffixed, as `(group, kind)`.
const SKIPPED: &[(&str, &str)] = &[
    ("apiextensions.k8s.io", "CustomResourceDefinition"),
    ("apiregistration.k8s.io", "APIService"),
    ("", "Namespace"),
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixSuffixTransformer {
    #[serde(default)]
    pub prefix: Str,
    #[serde(default)]
    pub suffix: Str,
    #[serde(default)]
    pub field_specs: FieldSpecs,
}

impl PrefixSuffixTransformer {
    pub fn new(prefix: impl Into<Str>, suffix: impl Into<Str>, field_specs: FieldSpecs) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            field_specs,
        }
    }
}

fn skipped(gvk: &Gvk) -> bool {
    SKIPPED
        .iter()
        .any(|&(group, kind)| gvk.group == group && gvk.kind == kind)
}

fn is_own_name(steps: &[PathStep]) -> bool {
    matches!(steps, [PathStep::Key(a), PathStep::Key(b)] if a == "metadata" && b == "name")
}

#[async_trait::async_trait]
impl Transformer for PrefixSuffixTransformer {
    #[tracing::instrument(
        skip_all,
        name = "prefix_suffix_transform",
        fields(prefix = %self.prefix, suffix = %self.suffix)
    )]
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()> {
        if self.prefix.is_empty() && self.suffix.is_empty() {
            return Ok(());
        }

        let strict = cx.strict;
        resources.try_for_each_mut(|resource| {
            if skipped(resource.gvk()) {
                return Ok(());
            }

            let mut renamed = false;
            self.field_specs
                .apply(resource, CreateKind::Scalar(Tag::Str), strict, |field| {
                    let Some(current) = field.node.as_str() else {
                        return Err(mismatch(field.location, NodeKind::Scalar, field.node.kind()));
                    };
                    let value = format_compact!("{}{current}{}", self.prefix, self.suffix);
                    let own_name = is_own_name(field.location.steps());
                    if cx.set_scalar(field, &value, Tag::Str)? && own_name {
                        renamed = true;
                    }
                    Ok(())
                })?;

            if renamed {
                let provenance = resource.provenance_mut();
                if !self.prefix.is_empty() {
                    provenance.prefixes.push(self.prefix.clone());
                }
                if !self.suffix.is_empty() {
                    provenance.suffixes.push(self.suffix.clone());
                }
            }
            Ok(())
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("PrefixSuffixTransformer")
    }
}
