//! Strategic merge and JSON patches over document trees.
//!
//! Strategic merge follows the Kubernetes conventions: `null` deletes a key, `$patch: delete`
//! removes the enclosing object or list element, `$patch: replace` replaces instead of
//! merging, and lists of objects are merged element by element on a merge key. Which key
//! applies to which list comes from the [`MergeKeys`] table; lists without one are merged on
//! `name` when every element has one and replaced wholesale otherwise.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    manifest::Str,
    resource::{Gvk, GvkMatcher},
    tree::{Mapping, Node, Sequence},
};

const MERGE_KEYS: &str = include_str!("./patch/merge_keys.yaml");

const DIRECTIVE: &str = "$patch";
const DELETE_FROM_PRIMITIVE_LIST: &str = "$deleteFromPrimitiveList/";
// Ordering hints that only matter to API servers.
const IGNORED_DIRECTIVES: &[&str] = &["$setElementOrder/", "$retainKeys"];

/// One list and the key its elements are identified by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeKey {
    #[serde(flatten)]
    pub matcher: GvkMatcher,
    /// Trailing part of the list's location, `[]` marking a step through a list.
    pub path: Str,
    pub key: Str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergeKeys {
    entries: Vec<MergeKey>,
}

impl MergeKeys {
    pub fn load_builtin() -> &'static Self {
        static INSTANCE: OnceLock<MergeKeys> = OnceLock::new();
        INSTANCE.get_or_init(|| serde_yaml::from_str(MERGE_KEYS).expect("valid merge_keys.yaml"))
    }

    /// Layer `overrides` on top, replacing entries for the same type and path.
    pub fn merged(&self, overrides: &MergeKeys) -> MergeKeys {
        let mut out = self.clone();
        for entry in &overrides.entries {
            match out
                .entries
                .iter_mut()
                .find(|e| e.matcher == entry.matcher && e.path == entry.path)
            {
                Some(existing) => *existing = entry.clone(),
                None => out.entries.push(entry.clone()),
            }
        }
        out
    }

    /// The merge key of the list at `shape` in a resource of type `gvk`.
    pub fn key_for(&self, gvk: &Gvk, shape: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.matcher.matches(gvk))
            .filter(|entry| {
                shape == entry.path
                    || shape
                        .strip_suffix(entry.path.as_str())
                        .is_some_and(|rest| rest.ends_with('/'))
            })
            .max_by_key(|entry| entry.path.len())
            .map(|entry| entry.key.as_str())
    }
}

/// What a strategic merge patch did to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Merged,
    /// The patch was `$patch: delete`; the target should be removed.
    Deleted,
}

/// The parsed content of one patch.
#[derive(Debug, Clone)]
pub enum PatchContent {
    /// One or more partial resources.
    StrategicMerge(Vec<Node>),
    Json(json_patch::Patch),
}

impl PatchContent {
    /// A document holding a list is a JSON patch, anything else strategic merge documents.
    pub fn parse(content: &[u8]) -> Result<PatchContent> {
        let documents = crate::yaml::documents(content)?;
        match &documents[..] {
            [] => Err(Error::config("patch content is empty")),
            [Node::Sequence(_)] => {
                let patch = serde_json::from_value(documents[0].to_json())?;
                Ok(PatchContent::Json(patch))
            }
            documents if documents.iter().all(|doc| matches!(doc, Node::Mapping(_))) => {
                Ok(PatchContent::StrategicMerge(documents.to_vec()))
            }
            _ => Err(Error::config(
                "patch must be a list of JSON patch operations or partial resources",
            )),
        }
    }
}

/// Merge `patch` into the resource tree `base` of type `gvk`.
///
/// The patch's identity fields only name the target and are never merged.
#[tracing::instrument(skip_all, fields(%gvk))]
pub fn strategic_merge(
    base: &mut Node,
    patch: Node,
    gvk: &Gvk,
    keys: &MergeKeys,
) -> Result<Outcome> {
    let Node::Mapping(mut patch) = patch else {
        return Err(Error::config("strategic merge patch must be a mapping"));
    };
    if directive(&patch) == Some("delete") {
        return Ok(Outcome::Deleted);
    }

    patch.shift_remove("apiVersion");
    patch.shift_remove("kind");
    if let Some(Node::Mapping(metadata)) = patch.get_mut("metadata") {
        metadata.shift_remove("name");
        metadata.shift_remove("namespace");
    }

    let merger = Merger { gvk, keys };
    match base {
        Node::Mapping(base) if directive(&patch) == Some("replace") => {
            // Identity survives a wholesale replacement.
            let identity = ["apiVersion", "kind"]
                .into_iter()
                .filter_map(|key| Some((Str::from(key), base.get(key)?.clone())))
                .collect::<Vec<_>>();
            let metadata = base.get("metadata").cloned();
            patch.shift_remove(DIRECTIVE);
            *base = identity.into_iter().collect();
            if let Some(metadata) = metadata {
                base.insert("metadata".into(), metadata);
            }
            merger.merge_mapping(base, patch, "")?;
        }
        Node::Mapping(base) => merger.merge_mapping(base, patch, "")?,
        _ => return Err(Error::config("patch target must be a mapping")),
    }
    Ok(Outcome::Merged)
}

/// Apply JSON patch operations to `root`. A failed `test` aborts the whole patch.
pub fn apply_json_patch(
    root: &mut Node,
    patch: &json_patch::Patch,
) -> Result<(), json_patch::PatchError> {
    let mut value = root.to_json();
    json_patch::patch(&mut value, &patch.0)?;
    *root = Node::from_json(value);
    Ok(())
}

fn directive(map: &Mapping) -> Option<&str> {
    map.get(DIRECTIVE).and_then(Node::as_str)
}

fn element_directive(node: &Node) -> Option<&str> {
    node.as_mapping().and_then(directive)
}

fn is_ignored(key: &str) -> bool {
    IGNORED_DIRECTIVES.iter().any(|prefix| key.starts_with(prefix))
}

fn child(shape: &str, key: &str) -> String {
    if shape.is_empty() {
        key.to_owned()
    } else {
        format!("{shape}/{key}")
    }
}

/// Strip directives and nulls from patch content that is inserted rather than merged.
fn clean(node: Node) -> Node {
    match node {
        Node::Mapping(map) => Node::Mapping(
            map.into_iter()
                .filter(|(key, value)| {
                    key != DIRECTIVE
                        && !key.starts_with(DELETE_FROM_PRIMITIVE_LIST)
                        && !is_ignored(key)
                        && !value.is_null()
                })
                .map(|(key, value)| (key, clean(value)))
                .collect(),
        ),
        Node::Sequence(seq) => Node::Sequence(
            seq.into_iter()
                .filter(|element| element_directive(element) != Some("delete"))
                .map(clean)
                .collect(),
        ),
        scalar => scalar,
    }
}

struct Merger<'a> {
    gvk: &'a Gvk,
    keys: &'a MergeKeys,
}

impl Merger<'_> {
    /// Merge `patch` into `base`, returning whether `base` should be kept.
    fn merge_node(&self, base: &mut Node, patch: Node, shape: &str) -> Result<bool> {
        match patch {
            Node::Mapping(mut patch) => match directive(&patch).map(Str::from).as_deref() {
                Some("delete") => return Ok(false),
                Some("replace") => {
                    patch.shift_remove(DIRECTIVE);
                    *base = clean(Node::Mapping(patch));
                }
                _ => match base {
                    Node::Mapping(base) => self.merge_mapping(base, patch, shape)?,
                    base => *base = clean(Node::Mapping(patch)),
                },
            },
            Node::Sequence(patch) => match base {
                Node::Sequence(base) => self.merge_sequence(base, patch, shape)?,
                base => *base = clean(Node::Sequence(patch)),
            },
            scalar => *base = scalar,
        }
        Ok(true)
    }

    fn merge_mapping(&self, base: &mut Mapping, patch: Mapping, shape: &str) -> Result<()> {
        for (key, value) in patch {
            if key == DIRECTIVE || is_ignored(&key) {
                continue;
            }

            if let Some(field) = key.strip_prefix(DELETE_FROM_PRIMITIVE_LIST) {
                if let (Some(Node::Sequence(items)), Node::Sequence(remove)) =
                    (base.get_mut(field), &value)
                {
                    items.retain(|item| !remove.contains(item));
                }
                continue;
            }

            if value.is_null() {
                base.shift_remove(&key);
                continue;
            }

            match base.get_mut(&key).filter(|existing| !existing.is_null()) {
                Some(existing) => {
                    if !self.merge_node(existing, value, &child(shape, &key))? {
                        base.shift_remove(&key);
                    }
                }
                None if element_directive(&value) == Some("delete") => {}
                None => {
                    base.insert(key, clean(value));
                }
            }
        }
        Ok(())
    }

    fn merge_sequence(&self, base: &mut Sequence, patch: Sequence, shape: &str) -> Result<()> {
        if patch.iter().any(|e| element_directive(e) == Some("replace")) {
            *base = patch
                .into_iter()
                .filter(|e| element_directive(e).is_none())
                .map(clean)
                .collect();
            return Ok(());
        }

        let Some(key) = self.merge_key(base, &patch, shape) else {
            *base = patch.into_iter().map(clean).collect();
            return Ok(());
        };

        let element_shape = format!("{shape}[]");
        for element in patch {
            let Some(value) = element.get(key).cloned() else {
                base.push(clean(element));
                continue;
            };

            let position = base.iter().position(|existing| existing.get(key) == Some(&value));
            let action = element_directive(&element).map(Str::from);
            match (position, action.as_deref()) {
                (Some(i), Some("delete")) => {
                    base.remove(i);
                }
                (None, Some("delete")) => {}
                (Some(i), _) => {
                    if !self.merge_node(&mut base[i], element, &element_shape)? {
                        base.remove(i);
                    }
                }
                (None, _) => base.push(clean(element)),
            }
        }
        Ok(())
    }

    fn merge_key<'k>(&'k self, base: &[Node], patch: &[Node], shape: &str) -> Option<&'k str> {
        let all_mappings = |nodes: &[Node]| nodes.iter().all(|n| matches!(n, Node::Mapping(_)));
        if !all_mappings(patch) || !all_mappings(base) {
            return None;
        }

        if let Some(key) = self.keys.key_for(self.gvk, shape) {
            return Some(key);
        }

        let named = |nodes: &[Node]| nodes.iter().all(|n| n.get_str("name").is_some());
        (named(base) && named(patch)).then_some("name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(yaml: &str) -> Node {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn merge(gvk: Gvk, base: &str, patch: &str) -> (Outcome, Node) {
        let mut base = node(base);
        let outcome =
            strategic_merge(&mut base, node(patch), &gvk, MergeKeys::load_builtin()).unwrap();
        (outcome, base)
    }

    fn deployment() -> Gvk {
        Gvk::new("apps", "v1", "Deployment")
    }

    const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  labels:
    app: web
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: web
        image: nginx
        args: [a, b]
        env:
        - name: A
          value: "1"
        ports:
        - containerPort: 80
          protocol: TCP
      - name: sidecar
        image: envoy
"#;

    #[test]
    fn lists_merge_by_key_and_append_new_elements() {
        let (outcome, merged) = merge(
            deployment(),
            DEPLOYMENT,
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: web
        image: nginx:1.9
        args: [c]
        env:
        - name: B
          value: "2"
        ports:
        - containerPort: 80
          name: http
      - name: logger
        image: fluentd
"#,
        );
        assert_eq!(outcome, Outcome::Merged);
        assert_eq!(
            merged,
            node(
                r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  labels:
    app: web
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: web
        image: nginx:1.9
        args: [c]
        env:
        - name: A
          value: "1"
        - name: B
          value: "2"
        ports:
        - containerPort: 80
          protocol: TCP
          name: http
      - name: sidecar
        image: envoy
      - name: logger
        image: fluentd
"#
            )
        );
    }

    #[test]
    fn null_and_delete_directives_remove() {
        let (_, merged) = merge(
            deployment(),
            DEPLOYMENT,
            r#"
metadata:
  name: web
  labels: null
spec:
  replicas: null
  template:
    spec:
      containers:
      - name: sidecar
        $patch: delete
"#,
        );
        assert_eq!(merged.get("metadata"), Some(&node("name: web")));
        assert_eq!(merged.get("spec").and_then(|s| s.get("replicas")), None);
        let containers = merged
            .get_path(&[
                "spec".into(),
                "template".into(),
                "spec".into(),
                "containers".into(),
            ])
            .and_then(Node::as_sequence)
            .unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].get_str("name"), Some("web"));
    }

    #[test]
    fn replace_directive_replaces_lists_and_maps() {
        let (_, merged) = merge(
            deployment(),
            DEPLOYMENT,
            r#"
spec:
  template:
    spec:
      $patch: replace
      containers:
      - name: only
        image: busybox
"#,
        );
        assert_eq!(
            merged.get("spec").and_then(|s| s.get("template")),
            Some(&node("spec:\n  containers:\n  - name: only\n    image: busybox\n"))
        );
    }

    #[test]
    fn whole_resource_delete() {
        let (outcome, _) = merge(
            deployment(),
            DEPLOYMENT,
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n$patch: delete\n",
        );
        assert_eq!(outcome, Outcome::Deleted);
    }

    #[test]
    fn service_ports_merge_by_port() {
        let (_, merged) = merge(
            Gvk::new("", "v1", "Service"),
            "kind: Service\nspec:\n  ports:\n  - port: 80\n    name: http\n  - port: 443\n    name: https\n",
            "spec:\n  ports:\n  - port: 443\n    targetPort: 8443\n",
        );
        assert_eq!(
            merged.get("spec"),
            Some(&node(
                "ports:\n- port: 80\n  name: http\n- port: 443\n  name: https\n  targetPort: 8443\n"
            ))
        );
    }

    #[test]
    fn unkeyed_lists_are_replaced() {
        let (_, merged) = merge(
            Gvk::new("example.com", "v1", "Widget"),
            "spec:\n  items:\n  - a: 1\n  - a: 2\n  tags: [x, y]\n",
            "spec:\n  items:\n  - a: 3\n  $deleteFromPrimitiveList/tags: [x]\n",
        );
        assert_eq!(merged.get("spec"), Some(&node("items:\n- a: 3\ntags: [y]\n")));
    }

    #[test]
    fn lookup_prefers_the_longest_path() {
        let keys = MergeKeys::load_builtin();
        let gvk = deployment();
        assert_eq!(keys.key_for(&gvk, "spec/template/spec/containers"), Some("name"));
        assert_eq!(
            keys.key_for(&gvk, "spec/template/spec/containers[]/ports"),
            Some("containerPort")
        );
        assert_eq!(keys.key_for(&gvk, "spec/template/spec/xcontainers"), None);
        assert_eq!(keys.key_for(&gvk, "spec/ports"), None);
    }

    #[test]
    fn json_patch_test_failure_aborts() -> anyhow::Result<()> {
        let PatchContent::Json(patch) = PatchContent::parse(
            b"- op: test\n  path: /spec/replicas\n  value: 2\n- op: replace\n  path: /spec/replicas\n  value: 5\n",
        )?
        else {
            panic!("expected a JSON patch");
        };

        let mut base = node(DEPLOYMENT);
        let before = base.clone();
        assert!(apply_json_patch(&mut base, &patch).is_err());
        assert_eq!(base, before);
        Ok(())
    }

    #[test]
    fn json_patch_operations() -> anyhow::Result<()> {
        let PatchContent::Json(patch) = PatchContent::parse(
            br#"[{"op": "replace", "path": "/spec/replicas", "value": 3}, {"op": "add", "path": "/metadata/labels/tier", "value": "web"}]"#,
        )?
        else {
            panic!("expected a JSON patch");
        };

        let mut base = node(DEPLOYMENT);
        apply_json_patch(&mut base, &patch)?;
        assert_eq!(base.get("spec").and_then(|s| s.get("replicas")), Some(&Node::int(3)));
        assert_eq!(
            base.get("metadata").and_then(|m| m.get("labels")),
            Some(&node("app: web\ntier: web"))
        );
        Ok(())
    }

    #[test]
    fn empty_patch_is_a_configuration_error() {
        let err = PatchContent::parse(b"\n---\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }
}
