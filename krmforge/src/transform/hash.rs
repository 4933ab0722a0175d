use compact_str::format_compact;

use crate::{
    error::Result,
    fieldspec::FieldMut,
    resmap::ResourceMap,
    resource::ConfiguredBy,
    tree::{CreateKind, Location, PathStep, Tag},
};

use super::{Context, Transformer};

/// Appends a content hash to the names of resources that asked for one.
///
/// Runs once per build, after every patch, so the hash covers the final content and is
/// always the last part of the name.
#[derive(Debug, Default)]
pub struct HashSuffixTransformer(());

#[async_trait::async_trait]
impl Transformer for HashSuffixTransformer {
    #[tracing::instrument(skip_all, name = "hash_suffix_transform")]
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()> {
        resources.try_for_each_mut(|resource| {
            if !resource.provenance().needs_hash {
                return Ok(());
            }

            let hash = resource.shorthash()?;
            let name = format_compact!("{}-{hash}", resource.name());
            tracing::debug!(id = %resource.id(), %name, "appending content hash");

            let location = Location::from(vec![
                PathStep::Key("metadata".into()),
                PathStep::Key("name".into()),
            ]);
            let (id, root) = resource.split_mut();
            let node = root
                .get_or_create("metadata", CreateKind::Mapping)?
                .get_or_create("name", CreateKind::Scalar(Tag::Str))?;
            cx.set_scalar(
                FieldMut {
                    resource: id,
                    location: &location,
                    node,
                },
                &name,
                Tag::Str,
            )?;

            resource.provenance_mut().needs_hash = false;
            Ok(())
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("HashSuffixTransformer")
    }
}
