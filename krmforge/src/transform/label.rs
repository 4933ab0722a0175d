use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
    error::Result,
    fieldspec::{Builtin, FieldSpecs},
    manifest::{Label, Str},
    resmap::ResourceMap,
    resource::ConfiguredBy,
    tree::CreateKind,
};

use super::{Context, Transformer};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelTransformer {
    pub labels: IndexMap<Str, Str>,
    #[serde(default)]
    pub field_specs: FieldSpecs,
}

impl LabelTransformer {
    /// One `labels` entry of a layer: the builtin table it selects plus its own `fields`.
    pub fn from_label(label: &Label, builtin: &Builtin) -> Self {
        let field_specs = match (label.include_selectors, label.include_templates) {
            (true, _) => &builtin.common_labels,
            (false, true) => &builtin.template_labels,
            (false, false) => &builtin.metadata_labels,
        };

        Self {
            labels: label.pairs.clone(),
            field_specs: field_specs.merged(&label.fields),
        }
    }
}

#[async_trait::async_trait]
impl Transformer for LabelTransformer {
    #[tracing::instrument(skip_all, name = "label_transform", fields(labels = ?self.labels))]
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()> {
        if self.labels.is_empty() {
            return Ok(());
        }

        let strict = cx.strict;
        resources.try_for_each_mut(|resource| {
            self.field_specs
                .apply(resource, CreateKind::Mapping, strict, |field| {
                    cx.merge_pairs(field, &self.labels)
                })
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("LabelTransformer")
    }
}
