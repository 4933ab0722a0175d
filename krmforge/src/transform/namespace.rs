use serde::Deserialize;

use crate::{
    defaults::ClusterScoped,
    error::Result,
    fieldspec::{FieldMut, FieldPath, FieldPathSegment, FieldSpecs},
    manifest::Str,
    resmap::ResourceMap,
    resource::{ConfiguredBy, DEFAULT_NAMESPACE, ResId, Resource},
    tree::{CreateKind, Location, Node, PathStep, Tag},
};

use super::{Context, Transformer};

/// Which `subjects` of role bindings get the namespace too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleBindingSubjects {
    /// Service accounts without a namespace or in the default one.
    #[default]
    DefaultOnly,
    AllServiceAccounts,
    None,
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceTransformer {
    pub namespace: Str,
    /// Only fill in namespaces that are absent or empty.
    pub unset_only: bool,
    pub set_role_binding_subjects: RoleBindingSubjects,
    pub field_specs: FieldSpecs,
    pub cluster_scoped: ClusterScoped,
}

impl NamespaceTransformer {
    pub fn new(
        namespace: impl Into<Str>,
        field_specs: FieldSpecs,
        cluster_scoped: ClusterScoped,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            field_specs,
            cluster_scoped,
            ..Default::default()
        }
    }

    fn write(&self, cx: &mut Context<'_>, field: FieldMut<'_>) -> Result<()> {
        if self.unset_only && field.node.as_str().is_some_and(|ns| !ns.is_empty()) {
            return Ok(());
        }
        cx.set_scalar(field, &self.namespace, Tag::Str)?;
        Ok(())
    }

    /// Set `namespace` on the mapping `node` found at `location`, creating the key.
    fn write_key(
        &self,
        cx: &mut Context<'_>,
        id: &ResId,
        node: &mut Node,
        location: &mut Location,
    ) -> Result<()> {
        let Some(map) = node.as_mapping_mut() else {
            return Ok(());
        };
        let node = map
            .entry(Str::const_new("namespace"))
            .or_insert_with(|| CreateKind::Scalar(Tag::Str).empty_node());
        location.push(PathStep::Key("namespace".into()));
        let res = self.write(
            cx,
            FieldMut {
                resource: id,
                location,
                node,
            },
        );
        location.pop();
        res
    }

    fn update_subjects(&self, resource: &mut Resource, cx: &mut Context<'_>) -> Result<()> {
        let (id, root) = resource.split_mut();
        let Some(subjects) = root.get_mut("subjects").and_then(Node::as_sequence_mut) else {
            return Ok(());
        };

        let mut location = Location::from(vec![PathStep::Key("subjects".into())]);
        for (i, subject) in subjects.iter_mut().enumerate() {
            if subject.get_str("kind") != Some("ServiceAccount") {
                continue;
            }

            let selected = match self.set_role_binding_subjects {
                RoleBindingSubjects::DefaultOnly => subject
                    .get_str("namespace")
                    .is_none_or(|ns| ns.is_empty() || ns == DEFAULT_NAMESPACE),
                RoleBindingSubjects::AllServiceAccounts => true,
                RoleBindingSubjects::None => false,
            };
            if !selected {
                continue;
            }

            location.push(PathStep::Index(i));
            let res = self.write_key(cx, id, subject, &mut location);
            location.pop();
            res?;
        }
        Ok(())
    }

    fn update_webhooks(&self, resource: &mut Resource, cx: &mut Context<'_>) -> Result<()> {
        let (id, root) = resource.split_mut();
        let Some(webhooks) = root.get_mut("webhooks").and_then(Node::as_sequence_mut) else {
            return Ok(());
        };

        let mut location = Location::from(vec![PathStep::Key("webhooks".into())]);
        for (i, webhook) in webhooks.iter_mut().enumerate() {
            let Some(service) = webhook
                .get_mut("clientConfig")
                .and_then(|config| config.get_mut("service"))
            else {
                continue;
            };

            location.push(PathStep::Index(i));
            location.push(PathStep::Key("clientConfig".into()));
            location.push(PathStep::Key("service".into()));
            let res = self.write_key(cx, id, service, &mut location);
            location.pop();
            location.pop();
            location.pop();
            res?;
        }
        Ok(())
    }
}

fn is_own_namespace(path: &FieldPath) -> bool {
    matches!(
        &path[..],
        [FieldPathSegment::Field(a), FieldPathSegment::Field(b)]
            if a == "metadata" && b == "namespace"
    )
}

#[async_trait::async_trait]
impl Transformer for NamespaceTransformer {
    #[tracing::instrument(
        skip_all,
        name = "namespace_transform",
        fields(namespace = %self.namespace)
    )]
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()> {
        let strict = cx.strict;
        resources.try_for_each_mut(|resource| {
            let cluster_scoped = self.cluster_scoped.contains(resource.kind());
            self.field_specs.apply_where(
                resource,
                CreateKind::Scalar(Tag::Str),
                strict,
                |spec| !(cluster_scoped && is_own_namespace(&spec.path)),
                |field| self.write(cx, field),
            )?;

            // These fields refer to other objects' namespaces, which no field spec can tell
            // apart from the object's own.
            match (resource.gvk().group.as_str(), resource.kind().as_str()) {
                ("rbac.authorization.k8s.io", "RoleBinding" | "ClusterRoleBinding") => {
                    self.update_subjects(resource, cx)
                }
                (
                    "admissionregistration.k8s.io",
                    "ValidatingWebhookConfiguration" | "MutatingWebhookConfiguration",
                ) => self.update_webhooks(resource, cx),
                _ => Ok(()),
            }
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("NamespaceTransformer")
    }
}
