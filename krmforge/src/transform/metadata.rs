use indexmap::IndexSet;

use crate::{
    error::Result,
    fieldspec::{FieldWrite, MutationTracker},
    manifest::{BuildMetadata, Str},
    resmap::ResourceMap,
    resource::{ConfiguredBy, Origin, ResId, annotation},
};

use super::{Context, Transformer};

/// Remembers which resources one transformer wrote to, so the write can be attributed to
/// it afterwards.
#[derive(Debug)]
pub struct Recorder {
    origin: Origin,
    touched: IndexSet<ResId>,
}

impl Recorder {
    pub fn new(configured_by: ConfiguredBy, configured_in: Option<Str>) -> Self {
        Self {
            origin: Origin {
                path: None,
                configured_in,
                configured_by: Some(configured_by),
            },
            touched: IndexSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// Attribute the recorded writes to the resources they landed in.
    ///
    /// Writes are keyed by the id a resource had when it was visited; a transformer that
    /// renamed the resource left that id at the end of its history.
    pub fn commit(self, resources: &mut ResourceMap) -> Result<()> {
        if self.touched.is_empty() {
            return Ok(());
        }

        resources.try_for_each_mut(|resource| {
            let touched = self.touched.contains(resource.id())
                || resource
                    .previous_ids()
                    .last()
                    .is_some_and(|id| self.touched.contains(id));
            if touched {
                resource
                    .provenance_mut()
                    .transformations
                    .push(self.origin.clone());
            }
            Ok(())
        })
    }
}

impl MutationTracker for Recorder {
    fn on_field_write(&mut self, write: &FieldWrite<'_>) {
        self.on_resource_rewrite(write.resource);
    }

    fn on_resource_rewrite(&mut self, resource: &ResId) {
        if !self.touched.contains(resource) {
            self.touched.insert(resource.clone());
        }
    }
}

/// Emits the provenance a build collected as annotations, when the root layer asks for it.
#[derive(Debug, Default)]
pub struct BuildMetadataTransformer {
    options: IndexSet<BuildMetadata>,
}

impl BuildMetadataTransformer {
    pub fn new(options: &[BuildMetadata]) -> Self {
        Self {
            options: options.iter().copied().collect(),
        }
    }
}

#[async_trait::async_trait]
impl Transformer for BuildMetadataTransformer {
    #[tracing::instrument(
        skip_all,
        name = "build_metadata_transform",
        fields(options = ?self.options)
    )]
    async fn transform(
        &mut self,
        resources: &mut ResourceMap,
        _cx: &mut Context<'_>,
    ) -> Result<()> {
        if self.options.is_empty() {
            return Ok(());
        }

        let origins = self.options.contains(&BuildMetadata::OriginAnnotations);
        let transformations = self.options.contains(&BuildMetadata::TransformerAnnotations);
        resources.try_for_each_mut(|resource| {
            if origins && let Some(origin) = resource.provenance().origin.clone() {
                resource.set_annotation(annotation::ORIGIN, crate::yaml::to_string(&origin)?)?;
            }

            if transformations && !resource.provenance().transformations.is_empty() {
                let value = crate::yaml::to_string(&resource.provenance().transformations)?;
                resource.set_annotation(annotation::TRANSFORMATIONS, value)?;
            }
            Ok(())
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("BuildMetadataTransformer")
    }
}
