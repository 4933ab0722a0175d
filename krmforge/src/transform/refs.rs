use crate::{
    defaults::ClusterScoped,
    error::{Error, Errors, Result},
    fieldspec::FieldMut,
    manifest::Str,
    resmap::ResourceMap,
    resource::{ConfiguredBy, RefSpec, RefSpecs, Resource},
    tree::{Location, Node, PathStep, Tag},
};

use super::{Context, Transformer};

/// Rewrites references to resources that were renamed or moved so they point at the
/// resource's current name and namespace.
///
/// A reference is either a plain name or a mapping with a `name` and optionally `kind` and
/// `namespace`. Only fields that already exist are rewritten.
#[derive(Debug, Clone)]
pub struct NameReferenceResolver {
    ref_specs: RefSpecs,
    cluster_scoped: ClusterScoped,
}

/// A single scalar to overwrite in the resource at `index`.
#[derive(Debug)]
struct Rewrite {
    index: usize,
    location: Location,
    value: Str,
}

/// What a reference field says about its referee.
struct Reference<'a> {
    name: &'a str,
    kind: Option<&'a str>,
    namespace: Option<&'a str>,
}

impl NameReferenceResolver {
    pub fn new(ref_specs: RefSpecs, cluster_scoped: ClusterScoped) -> Self {
        Self {
            ref_specs,
            cluster_scoped,
        }
    }

    fn plan(&self, resources: &ResourceMap, strict: bool) -> Result<(Vec<Rewrite>, Errors)> {
        let mut rewrites = vec![];
        let mut errors = Errors(vec![]);

        for (index, referrer) in resources.iter().enumerate() {
            for spec in self.ref_specs.iter() {
                for field_spec in spec.referrers.iter() {
                    if !field_spec.selects(referrer.gvk()) {
                        continue;
                    }
                    let locations = match field_spec.locate(referrer) {
                        Ok(locations) => locations,
                        Err(err) if err.is_type_mismatch() && !strict => continue,
                        Err(err) => return Err(err),
                    };

                    for location in locations {
                        let Some(node) = referrer.root().get_path(location.steps()) else {
                            continue;
                        };
                        let cx = Lookup {
                            resolver: self,
                            resources,
                            index,
                            referrer,
                            spec,
                        };
                        match cx.resolve_node(node, location, &mut rewrites) {
                            Ok(()) => {}
                            Err(err @ Error::ReferenceAmbiguous { .. }) => errors.0.push(err),
                            Err(err) => return Err(err),
                        }
                    }
                }
            }
        }

        Ok((rewrites, errors))
    }
}

struct Lookup<'a> {
    resolver: &'a NameReferenceResolver,
    resources: &'a ResourceMap,
    index: usize,
    referrer: &'a Resource,
    spec: &'a RefSpec,
}

impl<'a> Lookup<'a> {
    fn resolve_node(
        &self,
        node: &Node,
        location: Location,
        rewrites: &mut Vec<Rewrite>,
    ) -> Result<()> {
        match node {
            Node::Scalar(_) => {
                let Some(name) = node.as_str() else {
                    return Ok(());
                };
                let reference = Reference {
                    name,
                    kind: None,
                    namespace: None,
                };
                if let Some(referee) = self.referee(&reference, &location)? {
                    self.push(rewrites, location, referee.name().clone());
                }
            }
            Node::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if matches!(item, Node::Scalar(_)) {
                        let mut location = location.clone();
                        location.push(PathStep::Index(i));
                        self.resolve_node(item, location, rewrites)?;
                    }
                }
            }
            Node::Mapping(_) => {
                let Some(name) = node.get_str("name") else {
                    return Ok(());
                };
                let reference = Reference {
                    name,
                    kind: node.get_str("kind"),
                    namespace: node.get_str("namespace").filter(|ns| !ns.is_empty()),
                };
                let Some(referee) = self.referee(&reference, &location)? else {
                    return Ok(());
                };

                let mut name_location = location.clone();
                name_location.push(PathStep::Key("name".into()));
                self.push(rewrites, name_location, referee.name().clone());

                if node.get("namespace").is_some()
                    && let Some(namespace) = referee.namespace()
                {
                    let mut namespace_location = location;
                    namespace_location.push(PathStep::Key("namespace".into()));
                    self.push(rewrites, namespace_location, namespace.clone());
                }
            }
        }
        Ok(())
    }

    fn push(&self, rewrites: &mut Vec<Rewrite>, location: Location, value: Str) {
        rewrites.push(Rewrite {
            index: self.index,
            location,
            value,
        });
    }

    /// The single resource `reference` designates, if any.
    fn referee(
        &self,
        reference: &Reference<'_>,
        location: &Location,
    ) -> Result<Option<&'a Resource>> {
        let mut candidates = self
            .resources
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != self.index)
            .map(|(_, candidate)| candidate)
            .filter(|candidate| self.spec.referee.matches(candidate.gvk()))
            // The current name needs no rewrite and may be another resource's old name.
            .filter(|candidate| candidate.prior_names().any(|name| name == reference.name))
            .filter(|candidate| reference.kind.is_none_or(|kind| kind == candidate.kind()))
            .filter(|candidate| self.same_namespace(reference, candidate))
            .collect::<Vec<_>>();

        if candidates.len() > 1 {
            // Resources renamed by the same layers as the referrer are the ones it means.
            let narrowed = candidates
                .iter()
                .copied()
                .filter(|candidate| candidate.prefix_suffix_equals(self.referrer))
                .collect::<Vec<_>>();
            if !narrowed.is_empty() {
                candidates = narrowed;
            }
        }

        match candidates[..] {
            [] => Ok(None),
            [referee] => Ok(Some(referee)),
            [first, ..]
                if candidates
                    .iter()
                    .all(|c| c.name() == first.name() && c.namespace() == first.namespace()) =>
            {
                Ok(Some(first))
            }
            _ => Err(Error::ReferenceAmbiguous {
                referrer: Box::new(self.referrer.id().clone()),
                path: compact_str::format_compact!("{location}"),
                value: reference.name.into(),
                candidates: candidates.iter().map(|c| c.id().clone()).collect(),
            }),
        }
    }

    fn same_namespace(&self, reference: &Reference<'_>, candidate: &Resource) -> bool {
        let cluster_scoped = &self.resolver.cluster_scoped;
        if cluster_scoped.contains(candidate.kind()) {
            return true;
        }

        if let Some(namespace) = reference.namespace {
            return candidate.historic_namespaces().any(|ns| ns == namespace);
        }

        if cluster_scoped.contains(self.referrer.kind()) {
            return true;
        }

        let namespace = self.referrer.id().effective_namespace();
        candidate.id().effective_namespace() == namespace
            || candidate.historic_namespaces().any(|ns| ns == namespace)
    }
}

#[async_trait::async_trait]
impl Transformer for NameReferenceResolver {
    #[tracing::instrument(skip_all, name = "name_reference_resolve")]
    async fn transform(
        &mut self,
        resources: &mut ResourceMap,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        let (rewrites, errors) = self.plan(resources, cx.strict)?;
        tracing::debug!(
            rewrites = rewrites.len(),
            ambiguous = errors.0.len(),
            "resolved references"
        );
        if !errors.0.is_empty() {
            return errors.into_result();
        }

        let mut rewrites = rewrites.into_iter().peekable();
        let mut index = 0;
        resources.try_for_each_mut(|resource| {
            let current = index;
            index += 1;

            let (id, root) = resource.split_mut();
            while let Some(rewrite) = rewrites.next_if(|rewrite| rewrite.index == current) {
                let Some(node) = root.get_path_mut(rewrite.location.steps()) else {
                    continue;
                };
                cx.set_scalar(
                    FieldMut {
                        resource: id,
                        location: &rewrite.location,
                        node,
                    },
                    &rewrite.value,
                    Tag::Str,
                )?;
            }
            Ok(())
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("NameReferenceTransformer")
    }
}
