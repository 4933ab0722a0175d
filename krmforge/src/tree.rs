//! Ordered, mutable document tree.
//!
//! Every resource owns one [`Node`] tree. The tree only knows three structural kinds (scalar,
//! mapping and sequence) and scalars keep their textual value alongside a [`Tag`] so a value
//! can be rewritten without losing whether it was a string, number, boolean or null.

use core::fmt;

use compact_str::ToCompactString;
use indexmap::IndexMap;
use serde::{
    Deserialize, Serialize,
    de::{self, MapAccess, SeqAccess, Visitor},
    ser::{SerializeMap, SerializeSeq},
};

use crate::{
    error::{Error, Result},
    manifest::Str,
};

pub type Mapping = IndexMap<Str, Node>;
pub type Sequence = Vec<Node>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(Scalar),
    Mapping(Mapping),
    Sequence(Sequence),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scalar {
    pub value: Str,
    pub tag: Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Null,
    Bool,
    Int,
    Float,
    Str,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Null => "!!null",
            Tag::Bool => "!!bool",
            Tag::Int => "!!int",
            Tag::Float => "!!float",
            Tag::Str => "!!str",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    Mapping,
    Sequence,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Scalar => "a scalar",
            NodeKind::Mapping => "a mapping",
            NodeKind::Sequence => "a sequence",
        }
    }
}

/// The kind of node to create when a field is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    Scalar(Tag),
    Mapping,
    Sequence,
}

impl CreateKind {
    pub fn empty_node(self) -> Node {
        match self {
            CreateKind::Scalar(Tag::Null) => Node::null(),
            CreateKind::Scalar(tag) => Node::Scalar(Scalar {
                value: Str::default(),
                tag,
            }),
            CreateKind::Mapping => Node::Mapping(Mapping::new()),
            CreateKind::Sequence => Node::Sequence(Sequence::new()),
        }
    }
}

/// One step of a concrete location inside a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(Str),
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => write!(f, "{}", key.replace('/', "\\/")),
            PathStep::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        PathStep::Key(key.into())
    }
}

/// A concrete location of a node inside a tree, as produced by a field spec match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location(Vec<PathStep>);

impl Location {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn push(&mut self, step: PathStep) {
        self.0.push(step);
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }

    pub fn last_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|step| match step {
            PathStep::Key(key) => Some(key.as_str()),
            PathStep::Index(_) => None,
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

impl From<Vec<PathStep>> for Location {
    fn from(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::null()
    }
}

impl Node {
    pub fn null() -> Self {
        Node::Scalar(Scalar {
            value: Str::const_new("null"),
            tag: Tag::Null,
        })
    }

    pub fn string(value: impl Into<Str>) -> Self {
        Node::Scalar(Scalar {
            value: value.into(),
            tag: Tag::Str,
        })
    }

    pub fn int(value: i64) -> Self {
        Node::Scalar(Scalar {
            value: value.to_compact_string(),
            tag: Tag::Int,
        })
    }

    pub fn bool(value: bool) -> Self {
        Node::Scalar(Scalar {
            value: value.to_compact_string(),
            tag: Tag::Bool,
        })
    }

    pub fn mapping() -> Self {
        Node::Mapping(Mapping::new())
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Scalar(_) => NodeKind::Scalar,
            Node::Mapping(_) => NodeKind::Mapping,
            Node::Sequence(_) => NodeKind::Sequence,
        }
    }

    /// Null scalars are treated as absent fields by traversal and creation.
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(Scalar { tag: Tag::Null, .. }))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// The value of a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar {
                value,
                tag: Tag::Str,
            }) => Some(value),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Node::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Sequence> {
        match self {
            Node::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn expect_mapping_mut(&mut self, path: &dyn fmt::Display) -> Result<&mut Mapping> {
        let found = self.kind();
        self.as_mapping_mut()
            .ok_or_else(|| mismatch(path, NodeKind::Mapping, found))
    }

    /// Look up a mapping key. Non-mapping nodes have no keys.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping()?.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.as_mapping_mut()?.get_mut(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_path(&self, steps: &[PathStep]) -> Option<&Node> {
        steps.iter().try_fold(self, |node, step| match step {
            PathStep::Key(key) => node.get(key),
            PathStep::Index(index) => node.as_sequence()?.get(*index),
        })
    }

    pub fn get_path_mut(&mut self, steps: &[PathStep]) -> Option<&mut Node> {
        steps.iter().try_fold(self, |node, step| match step {
            PathStep::Key(key) => node.get_mut(key),
            PathStep::Index(index) => node.as_sequence_mut()?.get_mut(*index),
        })
    }

    /// Set `key` on this mapping, returning the previous value.
    ///
    /// With `create` set, a null node is first turned into an empty mapping. The node's kind
    /// never changes otherwise.
    pub fn set(
        &mut self,
        key: impl Into<Str>,
        value: Node,
        create: Option<CreateKind>,
    ) -> Result<Option<Node>> {
        let key = key.into();
        if self.is_null() && create.is_some() {
            *self = Node::mapping();
        }
        let map = self.expect_mapping_mut(&key)?;
        Ok(map.insert(key, value))
    }

    /// Return the child at `key`, inserting an empty node of the declared kind if it is absent
    /// or null.
    pub fn get_or_create(&mut self, key: &str, create: CreateKind) -> Result<&mut Node> {
        if self.is_null() {
            *self = Node::mapping();
        }
        let map = self.expect_mapping_mut(&key)?;
        let child = map
            .entry(Str::from(key))
            .or_insert_with(|| create.empty_node());
        if child.is_null() {
            *child = create.empty_node();
        }
        Ok(child)
    }

    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.as_mapping_mut()?.shift_remove(key)
    }

    /// Overwrite this scalar's value, returning the old scalar. Null nodes count as absent
    /// scalars and may be overwritten, collections may not.
    pub fn set_scalar(&mut self, value: impl Into<Str>, tag: Tag) -> Result<Scalar> {
        match self {
            Node::Scalar(scalar) => Ok(std::mem::replace(
                scalar,
                Scalar {
                    value: value.into(),
                    tag,
                },
            )),
            node => Err(mismatch(&"<scalar>", NodeKind::Scalar, node.kind())),
        }
    }

    /// Visit the entries of a mapping or the elements of a sequence in order.
    pub fn each(&self, mut f: impl FnMut(PathStep, &Node)) {
        match self {
            Node::Mapping(map) => map
                .iter()
                .for_each(|(key, value)| f(PathStep::Key(key.clone()), value)),
            Node::Sequence(seq) => seq
                .iter()
                .enumerate()
                .for_each(|(i, value)| f(PathStep::Index(i), value)),
            Node::Scalar(_) => {}
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Node::null(),
            Value::Bool(b) => Node::bool(b),
            Value::Number(n) => Node::Scalar(Scalar {
                value: n.to_compact_string(),
                tag: if n.is_f64() { Tag::Float } else { Tag::Int },
            }),
            Value::String(s) => Node::string(s),
            Value::Array(items) => Node::Sequence(items.into_iter().map(Node::from_json).collect()),
            Value::Object(obj) => Node::Mapping(
                obj.into_iter()
                    .map(|(k, v)| (Str::from(k), Node::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Node::Scalar(scalar) => match scalar.tag {
                Tag::Null => Value::Null,
                Tag::Bool => Value::Bool(scalar.value == "true"),
                Tag::Int => scalar
                    .value
                    .parse::<i64>()
                    .map(Value::from)
                    .or_else(|_| scalar.value.parse::<u64>().map(Value::from))
                    .unwrap_or_else(|_| Value::String(scalar.value.to_string())),
                Tag::Float => scalar
                    .value
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(scalar.value.to_string())),
                Tag::Str => Value::String(scalar.value.to_string()),
            },
            Node::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Node::Sequence(seq) => Value::Array(seq.iter().map(Node::to_json).collect()),
        }
    }
}

pub(crate) fn mismatch(path: &dyn fmt::Display, expected: NodeKind, found: NodeKind) -> Error {
    Error::TypeMismatch {
        path: path.to_compact_string(),
        expected: expected.as_str(),
        found: found.as_str(),
    }
}

impl From<Mapping> for Node {
    fn from(map: Mapping) -> Self {
        Node::Mapping(map)
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Node {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Node::Mapping(
            iter.into_iter()
                .map(|(k, v)| (Str::from(k), Node::string(v)))
                .collect(),
        )
    }
}

impl Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Node::Scalar(scalar) => scalar.serialize(serializer),
            Node::Mapping(map) => {
                let mut s = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    s.serialize_entry(key.as_str(), value)?;
                }
                s.end()
            }
            Node::Sequence(seq) => {
                let mut s = serializer.serialize_seq(Some(seq.len()))?;
                for item in seq {
                    s.serialize_element(item)?;
                }
                s.end()
            }
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let value = self.value.as_str();
        match self.tag {
            Tag::Null => serializer.serialize_unit(),
            Tag::Bool => serializer.serialize_bool(value == "true"),
            Tag::Int => match value.parse::<i64>() {
                Ok(i) => serializer.serialize_i64(i),
                Err(_) => match value.parse::<u64>() {
                    Ok(u) => serializer.serialize_u64(u),
                    Err(_) => serializer.serialize_str(value),
                },
            },
            Tag::Float => match value.parse::<f64>() {
                Ok(f) => serializer.serialize_f64(f),
                Err(_) => serializer.serialize_str(value),
            },
            Tag::Str => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a yaml node")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(Node::Scalar(Scalar {
            value: v.to_compact_string(),
            tag: Tag::Int,
        }))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Scalar(Scalar {
            value: v.to_compact_string(),
            tag: Tag::Float,
        }))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::string(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::null())
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::null())
    }

    fn visit_some<D: serde::Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        Node::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Node, A::Error> {
        let mut seq = Sequence::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(item) = access.next_element::<Node>()? {
            seq.push(item);
        }
        Ok(Node::Sequence(seq))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Node, A::Error> {
        let mut map = Mapping::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(key) = access.next_key::<Key>()? {
            let value = access.next_value::<Node>()?;
            map.insert(key.0, value);
        }
        Ok(Node::Mapping(map))
    }
}

/// Mapping keys are always strings in the tree, even if the source used a number or boolean.
struct Key(Str);

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a scalar mapping key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Key, E> {
                Ok(Key(v.into()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Key, E> {
                Ok(Key(v.to_compact_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Key, E> {
                Ok(Key(v.to_compact_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Key, E> {
                Ok(Key(v.to_compact_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Key, E> {
                Ok(Key(v.to_compact_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Key, E> {
                Ok(Key(Str::const_new("null")))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Node {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn yaml_round_trip_preserves_order_and_tags() -> anyhow::Result<()> {
        let src = "b: 1\na: true\nc: ~\nd: '1'\ne:\n- x\n- 2.5\n";
        let node = parse(src);
        let map = node.as_mapping().unwrap();
        assert_eq!(map.keys().map(|k| k.as_str()).collect::<Vec<_>>(), ["b", "a", "c", "d", "e"]);
        assert_eq!(node.get("b").unwrap().as_scalar().unwrap().tag, Tag::Int);
        assert_eq!(node.get("d").unwrap().as_str(), Some("1"));
        assert!(node.get("c").unwrap().is_null());

        let reparsed = parse(&serde_yaml::to_string(&node)?);
        assert_eq!(reparsed, node);
        Ok(())
    }

    #[test]
    fn json_conversion_round_trip() {
        let node = parse("a: [1, x, {b: null}]\nf: 1.5\n");
        assert_eq!(Node::from_json(node.to_json()), node);
    }

    #[test]
    fn get_or_create_only_replaces_absent_or_null() -> anyhow::Result<()> {
        let mut node = parse("a: null\nb: 1\n");
        node.get_or_create("a", CreateKind::Mapping)?;
        assert_eq!(node.get("a"), Some(&Node::mapping()));
        node.get_or_create("c", CreateKind::Sequence)?;
        assert_eq!(node.get("c"), Some(&Node::Sequence(vec![])));
        assert_eq!(node.get_or_create("b", CreateKind::Mapping)?, &Node::int(1));
        Ok(())
    }

    #[test]
    fn traversing_through_scalar_is_type_mismatch() {
        let mut node = Node::string("x");
        let err = node.set("k", Node::null(), None).unwrap_err();
        assert!(err.is_type_mismatch(), "{err}");

        let err = Node::mapping().set_scalar("v", Tag::Str).unwrap_err();
        assert!(err.is_type_mismatch(), "{err}");
    }

    #[test]
    fn path_lookup_and_each() {
        let node = parse("a:\n  b:\n  - c: 1\n  - c: 2\n");
        let steps = [
            PathStep::Key("a".into()),
            PathStep::Key("b".into()),
            PathStep::Index(1),
            PathStep::Key("c".into()),
        ];
        assert_eq!(node.get_path(&steps), Some(&Node::int(2)));

        let mut seen = vec![];
        node.get("a").unwrap().get("b").unwrap().each(|step, _| seen.push(step));
        assert_eq!(seen, [PathStep::Index(0), PathStep::Index(1)]);
    }

    #[test]
    fn clone_is_deep() {
        let node = parse("a: {b: c}\n");
        let mut copy = node.clone();
        copy.get_mut("a").unwrap().set("b", Node::string("d"), None).unwrap();
        assert_eq!(node.get("a").unwrap().get_str("b"), Some("c"));
    }
}
