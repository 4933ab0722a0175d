use crate::{
    error::{Error, Result},
    manifest::{Str, Target},
    patch::{self, MergeKeys, Outcome, PatchContent},
    resmap::{IdSet, ResourceMap},
    resource::{ConfiguredBy, ResId},
    tree::Node,
};

use super::{Context, Transformer};

/// A patch whose content has been read and parsed.
#[derive(Debug, Clone)]
pub struct LoadedPatch {
    pub content: PatchContent,
    pub target: Option<Target>,
    /// Where the content came from, for error messages.
    pub source: Str,
}

/// Applies strategic merge and JSON patches in declaration order.
///
/// A patch with a `target` applies to every resource the target selects, which may be none.
/// Strategic merge documents without a target name their resource themselves; that resource
/// must exist exactly once, among the [scoped](PatchTransformer::scoped) resources if a
/// scope was given.
#[derive(Debug, Clone)]
pub struct PatchTransformer {
    patches: Vec<LoadedPatch>,
    merge_keys: MergeKeys,
    scope: Option<IdSet>,
}

impl PatchTransformer {
    pub fn new(patches: Vec<LoadedPatch>, merge_keys: MergeKeys) -> Self {
        Self {
            patches,
            merge_keys,
            scope: None,
        }
    }

    /// Only patch resources whose current identity is in `scope`.
    pub fn scoped(mut self, scope: IdSet) -> Self {
        self.scope = Some(scope);
        self
    }

    fn in_scope(&self, id: &ResId) -> bool {
        self.scope.as_ref().is_none_or(|scope| scope.contains(id))
    }

    fn merge_into(
        &self,
        resources: &mut ResourceMap,
        cx: &mut Context<'_>,
        id: &ResId,
        document: &Node,
    ) -> Result<()> {
        let mut outcome = Outcome::Merged;
        resources.try_update(id, |resource| {
            let gvk = resource.gvk().clone();
            outcome = patch::strategic_merge(
                resource.root_mut(),
                document.clone(),
                &gvk,
                &self.merge_keys,
            )?;
            Ok(())
        })?;

        cx.rewrote(id);
        if outcome == Outcome::Deleted {
            tracing::debug!(%id, "patch deleted resource");
            resources.remove(id);
        }
        Ok(())
    }

    fn apply_json(
        &self,
        resources: &mut ResourceMap,
        cx: &mut Context<'_>,
        id: &ResId,
        operations: &json_patch::Patch,
    ) -> Result<()> {
        resources.try_update(id, |resource| {
            patch::apply_json_patch(resource.root_mut(), operations).map_err(|source| Error::Patch {
                id: Box::new(id.clone()),
                source,
            })
        })?;
        cx.rewrote(id);
        Ok(())
    }

    fn apply_targeted(
        &self,
        resources: &mut ResourceMap,
        cx: &mut Context<'_>,
        patch: &LoadedPatch,
        target: &Target,
    ) -> Result<()> {
        let ids = resources
            .select(target)
            .map(|resource| resource.id().clone())
            .filter(|id| self.in_scope(id))
            .collect::<Vec<_>>();
        if ids.is_empty() {
            tracing::debug!(source = %patch.source, "patch target selected nothing");
        }

        for id in ids {
            match &patch.content {
                PatchContent::StrategicMerge(documents) => {
                    for document in documents {
                        if resources.get(&id).is_none() {
                            break;
                        }
                        self.merge_into(resources, cx, &id, document)?;
                    }
                }
                PatchContent::Json(operations) => self.apply_json(resources, cx, &id, operations)?,
            }
        }
        Ok(())
    }

    fn apply_untargeted(
        &self,
        resources: &mut ResourceMap,
        cx: &mut Context<'_>,
        patch: &LoadedPatch,
    ) -> Result<()> {
        let PatchContent::StrategicMerge(documents) = &patch.content else {
            return Err(Error::config(format_args!(
                "JSON patch `{}` requires a target",
                patch.source
            )));
        };

        for document in documents {
            let named = ResId::derive(document)?;
            let id = resources
                .get_by_any_id(&named, self.scope.as_ref())?
                .id()
                .clone();
            self.merge_into(resources, cx, &id, document)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transformer for PatchTransformer {
    #[tracing::instrument(skip_all, name = "patch_transform", fields(patches = self.patches.len()))]
    async fn transform(
        &mut self,
        resources: &mut ResourceMap,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        for patch in &self.patches {
            match &patch.target {
                Some(target) => self.apply_targeted(resources, cx, patch, target)?,
                None => self.apply_untargeted(resources, cx, patch)?,
            }
        }
        Ok(())
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("PatchTransformer")
    }
}
