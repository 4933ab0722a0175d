use compact_str::ToCompactString;
use serde::Deserialize;

use crate::{
    error::Result,
    fieldspec::FieldSpecs,
    manifest::Replica,
    resmap::ResourceMap,
    resource::ConfiguredBy,
    tree::{CreateKind, NodeKind, Tag, mismatch},
};

use super::{Context, Transformer};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaTransformer {
    pub replica: Replica,
    #[serde(default)]
    pub field_specs: FieldSpecs,
}

impl ReplicaTransformer {
    pub fn new(replica: Replica, field_specs: FieldSpecs) -> Self {
        Self {
            replica,
            field_specs,
        }
    }
}

#[async_trait::async_trait]
impl Transformer for ReplicaTransformer {
    #[tracing::instrument(
        skip_all,
        name = "replica_transform",
        fields(name = %self.replica.name, count = self.replica.count)
    )]
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()> {
        let count = self.replica.count.to_compact_string();
        let strict = cx.strict;
        resources.try_for_each_mut(|resource| {
            // Overlays name the workload the way their base did.
            if !resource.historic_names().any(|name| *name == self.replica.name) {
                return Ok(());
            }

            self.field_specs
                .apply(resource, CreateKind::Scalar(Tag::Int), strict, |field| {
                    match field.node.as_scalar() {
                        Some(scalar) if matches!(scalar.tag, Tag::Int | Tag::Null) => {}
                        Some(_) if field.node.as_str().is_some_and(str::is_empty) => {}
                        _ => {
                            return Err(mismatch(
                                field.location,
                                NodeKind::Scalar,
                                field.node.kind(),
                            ));
                        }
                    }
                    cx.set_scalar(field, &count, Tag::Int)?;
                    Ok(())
                })
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("ReplicaCountTransformer")
    }
}
