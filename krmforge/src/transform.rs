mod annotation;
mod cleanup;
mod hash;
mod image;
mod label;
mod metadata;
mod name;
mod namespace;
mod patch;
mod refs;
mod replacement;
mod replica;
mod sort;

pub use self::annotation::AnnotationTransformer;
pub use self::cleanup::CleanupTransformer;
pub use self::hash::HashSuffixTransformer;
pub use self::image::ImageTagTransformer;
pub use self::label::LabelTransformer;
pub use self::metadata::{BuildMetadataTransformer, Recorder};
pub use self::name::PrefixSuffixTransformer;
pub use self::namespace::{NamespaceTransformer, RoleBindingSubjects};
pub use self::patch::{LoadedPatch, PatchTransformer};
pub use self::refs::NameReferenceResolver;
pub(crate) use self::replacement::parse_replacements;
pub use self::replacement::ReplacementTransformer;
pub use self::replica::ReplicaTransformer;
pub use self::sort::SortTransformer;

use indexmap::IndexMap;

use crate::{
    error::Result,
    fieldspec::{self, FieldMut, MutationTracker, NoopTracker},
    manifest::Str,
    resmap::ResourceMap,
    resource::{ConfiguredBy, ResId},
    tree::{Node, PathStep, Tag},
};

#[async_trait::async_trait]
pub trait Transformer: Send {
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()>;

    /// How this transformer is named in transformation annotations.
    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("Transformer")
    }
}

/// What a transformer gets besides the resources: the strictness of the build and the
/// tracker every scalar write is reported to.
pub struct Context<'a> {
    pub strict: bool,
    tracker: &'a mut (dyn MutationTracker + Send),
}

impl<'a> Context<'a> {
    pub fn new(tracker: &'a mut (dyn MutationTracker + Send)) -> Self {
        Self {
            strict: false,
            tracker,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn set_scalar(&mut self, field: FieldMut<'_>, value: &str, tag: Tag) -> Result<bool> {
        fieldspec::set_scalar(field, value, tag, &mut *self.tracker)
    }

    /// Report that `resource` was rewritten without going through [`Context::set_scalar`].
    pub fn rewrote(&mut self, resource: &ResId) {
        self.tracker.on_resource_rewrite(resource);
    }

    /// Merge `pairs` key by key into the mapping at `field`. Existing keys are overwritten,
    /// everything else is left alone.
    pub fn merge_pairs(&mut self, field: FieldMut<'_>, pairs: &IndexMap<Str, Str>) -> Result<()> {
        let FieldMut {
            resource,
            location,
            node,
        } = field;
        let map = node.expect_mapping_mut(location)?;

        let mut location = location.clone();
        for (key, value) in pairs {
            location.push(PathStep::Key(key.clone()));
            // New keys start out null so that setting them to "" still counts as a write.
            let node = map.entry(key.clone()).or_insert_with(Node::null);
            self.set_scalar(
                FieldMut {
                    resource,
                    location: &location,
                    node,
                },
                value,
                Tag::Str,
            )?;
            location.pop();
        }

        Ok(())
    }
}

/// Run `transformer` with nothing observing its writes.
pub async fn apply(transformer: &mut dyn Transformer, resources: &mut ResourceMap) -> Result<()> {
    let mut tracker = NoopTracker;
    transformer
        .transform(resources, &mut Context::new(&mut tracker))
        .await
}
