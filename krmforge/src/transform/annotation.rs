use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
    error::Result,
    fieldspec::FieldSpecs,
    manifest::Str,
    resmap::ResourceMap,
    resource::ConfiguredBy,
    tree::CreateKind,
};

use super::{Context, Transformer};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationTransformer {
    pub annotations: IndexMap<Str, Str>,
    #[serde(default)]
    pub field_specs: FieldSpecs,
}

impl AnnotationTransformer {
    pub fn new(annotations: IndexMap<Str, Str>, field_specs: FieldSpecs) -> Self {
        Self {
            annotations,
            field_specs,
        }
    }
}

#[async_trait::async_trait]
impl Transformer for AnnotationTransformer {
    #[tracing::instrument(
        skip_all,
        name = "annotation_transform",
        fields(annotations = ?self.annotations)
    )]
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()> {
        if self.annotations.is_empty() {
            return Ok(());
        }

        let strict = cx.strict;
        resources.try_for_each_mut(|resource| {
            self.field_specs
                .apply(resource, CreateKind::Mapping, strict, |field| {
                    cx.merge_pairs(field, &self.annotations)
                })
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("AnnotationsTransformer")
    }
}
