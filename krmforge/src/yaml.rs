use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{error::Result, resource::Resource, tree::Node};

pub fn from_str<T>(s: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_str(s).map_err(Into::into)
}

pub fn from_slice<T>(s: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_slice(s).map_err(Into::into)
}

pub fn to_string<T>(value: &T) -> Result<String>
where
    T: Serialize,
{
    serde_yaml::to_string(value).map_err(Into::into)
}

/// Every non-empty document in a `---` separated stream.
pub fn documents(s: &[u8]) -> Result<Vec<Node>> {
    let mut out = vec![];
    for document in serde_yaml::Deserializer::from_slice(s) {
        let node = Node::deserialize(document)?;
        if !node.is_null() {
            out.push(node);
        }
    }
    Ok(out)
}

/// The resources in a document stream. `kind: List` documents contribute their items.
pub fn resources(s: &[u8]) -> Result<Vec<Resource>> {
    let mut out = vec![];
    for node in documents(s)? {
        if node.get_str("kind") == Some("List")
            && let Some(items) = node.get("items").and_then(Node::as_sequence)
        {
            for item in items {
                out.push(Resource::from_node(item.clone())?);
            }
            continue;
        }
        out.push(Resource::from_node(node)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_skip_empty_ones() -> anyhow::Result<()> {
        let docs = documents(b"---\na: 1\n---\n---\nb: 2\n")?;
        assert_eq!(docs.len(), 2);
        Ok(())
    }

    #[test]
    fn lists_are_flattened() -> anyhow::Result<()> {
        let resources = resources(
            br#"
apiVersion: v1
kind: List
items:
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: a
- apiVersion: v1
  kind: Secret
  metadata:
    name: b
---
apiVersion: v1
kind: Service
metadata:
  name: c
"#,
        )?;
        let names = resources.iter().map(|r| r.name().as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["a", "b", "c"]);
        Ok(())
    }
}
