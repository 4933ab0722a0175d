use compact_str::format_compact;
use serde::Deserialize;

use crate::{
    error::Result,
    fieldspec::FieldSpecs,
    manifest::{ImageTag, Str},
    resmap::ResourceMap,
    resource::ConfiguredBy,
    tree::{CreateKind, Tag},
};

use super::{Context, Transformer};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTagTransformer {
    pub image_tag: ImageTag,
    #[serde(default)]
    pub field_specs: FieldSpecs,
}

impl ImageTagTransformer {
    pub fn new(image_tag: ImageTag, field_specs: FieldSpecs) -> Self {
        Self {
            image_tag,
            field_specs,
        }
    }

    /// The replacement for `image`, or `None` if this transformer does not apply to it.
    fn rewrite(&self, image: &str) -> Option<Str> {
        let reference = ImageRef::parse(image);
        if reference.name != self.image_tag.name {
            return None;
        }

        let name = match self.image_tag.new_name.as_str() {
            "" => reference.name,
            new_name => new_name,
        };

        Some(if !self.image_tag.digest.is_empty() {
            format_compact!("{name}@{}", self.image_tag.digest)
        } else if !self.image_tag.new_tag.is_empty() {
            format_compact!("{name}:{}", self.image_tag.new_tag)
        } else {
            format_compact!("{name}{}", reference.suffix)
        })
    }
}

/// An image reference split into its name and the `:tag` and/or `@digest` that follow it.
#[derive(Debug, PartialEq, Eq)]
struct ImageRef<'a> {
    name: &'a str,
    suffix: &'a str,
}

impl<'a> ImageRef<'a> {
    fn parse(image: &'a str) -> Self {
        let digest_start = image.find('@').unwrap_or(image.len());
        let (before_digest, _) = image.split_at(digest_start);

        // A colon before the last slash belongs to a registry port, not a tag.
        let path_start = before_digest.rfind('/').map_or(0, |i| i + 1);
        let end = before_digest[path_start..]
            .find(':')
            .map_or(digest_start, |i| path_start + i);

        let (name, suffix) = image.split_at(end);
        Self { name, suffix }
    }
}

#[async_trait::async_trait]
impl Transformer for ImageTagTransformer {
    #[tracing::instrument(
        skip_all,
        name = "image_tag_transform",
        fields(
            image = %self.image_tag.name,
            new_name = %self.image_tag.new_name,
            new_tag = %self.image_tag.new_tag,
        )
    )]
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()> {
        let strict = cx.strict;
        resources.try_for_each_mut(|resource| {
            self.field_specs
                .apply(resource, CreateKind::Scalar(Tag::Str), strict, |field| {
                    let Some(value) = field.node.as_str().and_then(|image| self.rewrite(image))
                    else {
                        return Ok(());
                    };
                    cx.set_scalar(field, &value, Tag::Str)?;
                    Ok(())
                })
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("ImageTagTransformer")
    }
}
