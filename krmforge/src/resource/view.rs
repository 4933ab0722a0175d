use crate::{
    error::Result,
    manifest::Str,
    selector::StringMap,
    tree::{CreateKind, Mapping, Node},
};

use super::Resource;

impl Resource {
    pub fn metadata(&self) -> Option<&Node> {
        self.root().get("metadata")
    }

    pub fn labels(&self) -> Option<StrMapView<'_>> {
        self.metadata()?.get("labels")?.as_mapping().map(StrMapView)
    }

    pub fn annotations(&self) -> Option<StrMapView<'_>> {
        self.metadata()?
            .get("annotations")?
            .as_mapping()
            .map(StrMapView)
    }

    /// Insert an annotation, creating `metadata.annotations` if needed.
    pub fn set_annotation(&mut self, key: impl Into<Str>, value: impl Into<Str>) -> Result<()> {
        self.root_mut()
            .get_or_create("metadata", CreateKind::Mapping)?
            .get_or_create("annotations", CreateKind::Mapping)?
            .set(key, Node::string(value), None)?;
        Ok(())
    }

    /// Remove every annotation matching `f`, dropping the annotations mapping if it ends up
    /// empty.
    pub fn retain_annotations(&mut self, mut f: impl FnMut(&str) -> bool) {
        let Some(metadata) = self.root_mut().get_mut("metadata") else {
            return;
        };

        let Some(annotations) = metadata
            .get_mut("annotations")
            .and_then(Node::as_mapping_mut)
        else {
            return;
        };

        annotations.retain(|key, _| f(key));
        if annotations.is_empty() {
            metadata.remove("annotations");
        }
    }
}

/// A read-only view of a mapping of string values, such as labels or annotations.
#[derive(Debug, Clone, Copy)]
pub struct StrMapView<'a>(&'a Mapping);

impl<'a> StrMapView<'a> {
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(|v| v.as_scalar()).map(|s| s.value.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.0.iter().filter_map(|(k, v)| {
            v.as_scalar()
                .map(|scalar| (k.as_str(), scalar.value.as_str()))
        })
    }
}

impl StringMap for StrMapView<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        StrMapView::get(self, key)
    }

    fn has(&self, key: &str) -> bool {
        StrMapView::has(self, key)
    }
}
