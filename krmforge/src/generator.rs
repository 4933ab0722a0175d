mod common;
mod configmap;
mod secret;

pub use self::configmap::ConfigMapGenerator;
pub use self::secret::SecretGenerator;

use std::path::Path;

use crate::{
    build::Loader,
    error::Result,
    manifest::Behavior,
    resource::{ConfiguredBy, Resource},
    tree::{CreateKind, Node},
};

/// Produces new resources for a layer.
#[async_trait::async_trait]
pub trait Generator: Send {
    /// Generate resources, reading any files through `loader` relative to the layer
    /// directory `dir`.
    async fn generate(&mut self, loader: &dyn Loader, dir: &Path) -> Result<Vec<Resource>>;

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("Generator")
    }
}

/// Keys whose mappings are combined entry by entry when merging generated resources.
const MERGED_MAPS: [&str; 3] = ["data", "binaryData", "stringData"];

/// Fold the generated resource `new` into `existing`, which has, or once had, the same
/// identity.
///
/// `merge` combines data, labels and annotations with `new` winning on conflicts. `replace`
/// swaps in the content of `new`. Either way `existing` keeps its current name, namespace and
/// history.
pub fn absorb(existing: &mut Resource, new: Resource, behavior: Behavior) -> Result<()> {
    let needs_hash = new.provenance().needs_hash;
    let name = existing.name().clone();
    let namespace = existing.namespace().cloned();

    let Node::Mapping(incoming) = new.root().clone() else {
        return Ok(());
    };

    match behavior {
        Behavior::Create => {}
        Behavior::Replace => {
            *existing.root_mut() = Node::Mapping(incoming);
        }
        Behavior::Merge => {
            let root = existing.root_mut();
            for (key, value) in incoming {
                match key.as_str() {
                    "metadata" => {
                        for field in ["labels", "annotations"] {
                            if let Some(Node::Mapping(pairs)) = value.get(field) {
                                let metadata =
                                    root.get_or_create("metadata", CreateKind::Mapping)?;
                                merge_map(metadata, field, pairs)?;
                            }
                        }
                    }
                    key if MERGED_MAPS.contains(&key) => {
                        if let Node::Mapping(pairs) = &value {
                            merge_map(root, key, pairs)?;
                        }
                    }
                    _ => {
                        root.set(key.as_str(), value, None)?;
                    }
                }
            }
        }
    }

    existing.set_name(name)?;
    existing.set_namespace(namespace.as_deref())?;
    let provenance = existing.provenance_mut();
    provenance.needs_hash = needs_hash;
    provenance.behavior = Behavior::Create;
    Ok(())
}

fn merge_map(parent: &mut Node, key: &str, pairs: &crate::tree::Mapping) -> Result<()> {
    let map = parent
        .get_or_create(key, CreateKind::Mapping)?
        .expect_mapping_mut(&key)?;
    for (k, v) in pairs {
        map.insert(k.clone(), v.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resmap::ResourceMap;

    fn resource(yaml: &str) -> Resource {
        Resource::from_node(crate::yaml::from_str(yaml).unwrap()).unwrap()
    }

    const EXISTING: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: app
  labels:
    app: web
data:
  a: "1"
  b: "2"
"#;

    const INCOMING: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: app
  labels:
    env: prod
  annotations:
    kustomize.config.k8s.io/behavior: merge
data:
  b: "3"
  c: "4"
"#;

    fn data(resource: &Resource) -> Vec<(String, String)> {
        resource
            .root()
            .get("data")
            .and_then(Node::as_mapping)
            .unwrap()
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_str().unwrap().to_owned()))
            .collect()
    }

    #[test]
    fn merge_combines_data_and_labels() -> anyhow::Result<()> {
        let mut resources = ResourceMap::from_resources([resource(EXISTING)])?;
        resources.try_for_each_mut(|r| r.set_name("prod-app"))?;

        let incoming = resource(INCOMING);
        assert_eq!(incoming.provenance().behavior, Behavior::Merge);
        resources.absorb(incoming)?;

        let merged = resources.iter().next().unwrap();
        assert_eq!(merged.name(), "prod-app");
        assert_eq!(
            data(merged),
            [("a", "1"), ("b", "3"), ("c", "4")].map(|(k, v)| (k.to_owned(), v.to_owned()))
        );
        let labels = merged.labels().unwrap();
        assert_eq!(labels.get("app"), Some("web"));
        assert_eq!(labels.get("env"), Some("prod"));
        Ok(())
    }

    #[test]
    fn replace_swaps_content_but_keeps_identity() -> anyhow::Result<()> {
        let mut existing = resource(EXISTING);
        existing.set_name("prod-app")?;
        absorb(&mut existing, resource(INCOMING), Behavior::Replace)?;

        assert_eq!(existing.name(), "prod-app");
        assert_eq!(existing.original_id().name, "app");
        assert_eq!(
            data(&existing),
            [("b", "3"), ("c", "4")].map(|(k, v)| (k.to_owned(), v.to_owned()))
        );
        assert!(existing.labels().unwrap().get("app").is_none());
        Ok(())
    }

    #[test]
    fn merge_without_existing_resource_is_not_found() {
        let mut resources = ResourceMap::new();
        let err = resources.absorb(resource(INCOMING)).unwrap_err();
        assert!(matches!(err, crate::Error::NotFound { .. }), "{err}");
    }
}
