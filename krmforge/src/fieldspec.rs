mod builtin;

use core::fmt;
use std::{ops::Deref, str::FromStr};

pub use self::builtin::Builtin;

use crate::{
    error::Result,
    manifest::Str,
    resource::{Gvk, GvkMatcher, ResId, Resource},
    tree::{CreateKind, Location, Node, NodeKind, PathStep, Tag, mismatch},
};
use anyhow::bail;
use serde::{Deserialize, Serialize};

// See kustomize/internal/konfig/builtinpluginconsts

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(flatten)]
    pub matcher: GvkMatcher,
    #[serde(with = "crate::serde_ex::string")]
    pub path: FieldPath,
    /// The `create` field indicates whether the field should be created if it does not exist.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Box<[FieldPathSegment]>,
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#""{self}""#)
    }
}

impl Deref for FieldPath {
    type Target = [FieldPathSegment];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

pub type PathRef<'a> = &'a [FieldPathSegment];

impl FromStr for FieldPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            bail!("field path cannot be empty");
        }

        let segments = split_unescaped(s)
            .into_iter()
            .map(|segment| segment.parse::<FieldPathSegment>())
            .collect::<Result<Box<_>, _>>()?;

        Ok(FieldPath { segments })
    }
}

impl FieldPath {
    /// Parse the dotted notation of replacement field paths, e.g.
    /// `spec.template.spec.containers.[name=web].image`.
    ///
    /// Brackets protect dots: `[key=value]` selects sequence elements, and `[some.key]` is a
    /// key containing dots. `*` stands for every element of a sequence.
    pub fn parse_dotted(s: &str) -> anyhow::Result<Self> {
        if s.is_empty() {
            bail!("field path cannot be empty");
        }

        let mut segments = vec![];
        let mut current = String::new();
        let mut depth = 0usize;
        for c in s.chars() {
            match c {
                '[' => depth += 1,
                ']' if depth == 0 => bail!("unbalanced `]` in field path `{s}`"),
                ']' => depth -= 1,
                '.' if depth == 0 => {
                    segments.push(dotted_segment(&std::mem::take(&mut current), s)?);
                    continue;
                }
                _ => {}
            }
            current.push(c);
        }
        if depth > 0 {
            bail!("unbalanced `[` in field path `{s}`");
        }
        segments.push(dotted_segment(&current, s)?);

        Ok(FieldPath {
            segments: segments.into(),
        })
    }
}

fn dotted_segment(segment: &str, path: &str) -> anyhow::Result<FieldPathSegment> {
    if segment.is_empty() {
        bail!("field path `{path}` has an empty segment");
    }
    if segment == "*" {
        return Ok(FieldPathSegment::Elements);
    }
    match segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(inner) => match inner.split_once('=') {
            Some((key, value)) => Ok(FieldPathSegment::Match {
                key: key.into(),
                value: value.into(),
            }),
            None => Ok(FieldPathSegment::Field(inner.into())),
        },
        None => Ok(FieldPathSegment::Field(segment.into())),
    }
}

/// Split on `/`, except where it is escaped as `\/`.
fn split_unescaped(s: &str) -> Vec<Str> {
    let mut segments = vec![];
    let mut current = Str::default();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'/') => {
                current.push('/');
                chars.next();
            }
            '/' => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    segments.push(current);
    segments
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPathSegment {
    /// A mapping key, or a literal index when the current node is a sequence.
    Field(Str),
    /// `key[]`: every element of the sequence under `key`.
    Array(Str),
    /// `[]`: every element of the current sequence.
    Elements,
    /// `[key=value]`: the elements of the current sequence whose `key` is `value`.
    Match { key: Str, value: Str },
}

impl fmt::Display for FieldPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPathSegment::Field(field) => write!(f, "{}", field.replace('/', "\\/")),
            FieldPathSegment::Array(field) => write!(f, "{}[]", field.replace('/', "\\/")),
            FieldPathSegment::Elements => write!(f, "[]"),
            FieldPathSegment::Match { key, value } => write!(f, "[{key}={value}]"),
        }
    }
}

impl FromStr for FieldPathSegment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => bail!("field path segments cannot be empty"),
            "[]" => Ok(FieldPathSegment::Elements),
            s if s.starts_with('[') && s.ends_with(']') => {
                let Some((key, value)) = s[1..s.len() - 1].split_once('=') else {
                    bail!("expected `[key=value]`, found `{s}`");
                };
                Ok(FieldPathSegment::Match {
                    key: key.into(),
                    value: value.into(),
                })
            }
            s => match s.strip_suffix("[]") {
                Some(field) => Ok(FieldPathSegment::Array(field.into())),
                None => Ok(FieldPathSegment::Field(s.into())),
            },
        }
    }
}

impl FieldPathSegment {
    fn fans_out(&self) -> bool {
        matches!(self, FieldPathSegment::Array(_) | FieldPathSegment::Elements)
    }
}

/// A mutable view of one location matched by a field spec.
pub struct FieldMut<'a> {
    pub resource: &'a ResId,
    pub location: &'a Location,
    pub node: &'a mut Node,
}

impl FieldSpec {
    pub fn new(matcher: GvkMatcher, path: &str, create: bool) -> anyhow::Result<Self> {
        Ok(Self {
            matcher,
            path: path.parse()?,
            create,
        })
    }

    pub fn selects(&self, gvk: &Gvk) -> bool {
        self.matcher.matches(gvk)
    }

    /// All existing locations this spec designates in `resource`. Nothing is created.
    pub fn locate(&self, resource: &Resource) -> Result<Vec<Location>> {
        if !self.selects(resource.gvk()) {
            return Ok(vec![]);
        }
        let mut out = vec![];
        walk(resource.root(), &self.path, &mut Location::root(), &mut out)?;
        Ok(out)
    }

    /// Invoke `f` on every location this spec designates in `resource`.
    ///
    /// If the spec has `create` set, absent fields along the path are created as mappings and
    /// an absent final field as an empty node of kind `create_kind`. Elements of sequences are
    /// never created, except that a `[key=value]` segment with no match appends `{key: value}`.
    pub fn apply(
        &self,
        resource: &mut Resource,
        create_kind: CreateKind,
        f: &mut dyn FnMut(FieldMut<'_>) -> Result<()>,
    ) -> Result<()> {
        if !self.selects(resource.gvk()) {
            return Ok(());
        }

        let create = self.create.then_some(create_kind);
        let (id, root) = resource.split_mut();
        walk_mut(root, &self.path, &mut Location::root(), create, id, f)
    }
}

fn child_path(location: &Location, key: &str) -> Str {
    if location.steps().is_empty() {
        key.into()
    } else {
        compact_str::format_compact!("{location}/{key}")
    }
}

fn walk(
    node: &Node,
    path: PathRef<'_>,
    location: &mut Location,
    out: &mut Vec<Location>,
) -> Result<()> {
    let Some((segment, rest)) = path.split_first() else {
        if !node.is_null() {
            out.push(location.clone());
        }
        return Ok(());
    };

    match segment {
        FieldPathSegment::Field(key) => match node {
            Node::Mapping(map) => {
                if let Some(child) = map.get(key.as_str()) {
                    location.push(PathStep::Key(key.clone()));
                    walk(child, rest, location, out)?;
                    location.pop();
                }
            }
            Node::Sequence(seq) => {
                let index = key
                    .parse::<usize>()
                    .map_err(|_| {
                        let path = child_path(location, key);
                        mismatch(&path, NodeKind::Mapping, NodeKind::Sequence)
                    })?;
                if let Some(child) = seq.get(index) {
                    location.push(PathStep::Index(index));
                    walk(child, rest, location, out)?;
                    location.pop();
                }
            }
            node if node.is_null() => {}
            node => {
                let path = child_path(location, key);
                return Err(mismatch(&path, NodeKind::Mapping, node.kind()));
            }
        },
        FieldPathSegment::Array(key) => {
            let child = match node {
                Node::Mapping(map) => map.get(key.as_str()),
                node if node.is_null() => None,
                node => {
                    let path = child_path(location, key);
                    return Err(mismatch(&path, NodeKind::Mapping, node.kind()));
                }
            };
            if let Some(child) = child {
                location.push(PathStep::Key(key.clone()));
                walk_elements(child, rest, location, out)?;
                location.pop();
            }
        }
        FieldPathSegment::Elements => walk_elements(node, rest, location, out)?,
        FieldPathSegment::Match { key, value } => match node {
            Node::Sequence(seq) => {
                for (i, item) in seq.iter().enumerate() {
                    if item.get_str(key) == Some(value.as_str()) {
                        location.push(PathStep::Index(i));
                        walk(item, rest, location, out)?;
                        location.pop();
                    }
                }
            }
            node if node.is_null() => {}
            node => return Err(mismatch(&*location, NodeKind::Sequence, node.kind())),
        },
    }

    Ok(())
}

fn walk_elements(
    node: &Node,
    rest: PathRef<'_>,
    location: &mut Location,
    out: &mut Vec<Location>,
) -> Result<()> {
    match node {
        Node::Sequence(seq) => {
            for (i, item) in seq.iter().enumerate() {
                location.push(PathStep::Index(i));
                walk(item, rest, location, out)?;
                location.pop();
            }
            Ok(())
        }
        node if node.is_null() => Ok(()),
        node => Err(mismatch(&*location, NodeKind::Sequence, node.kind())),
    }
}

fn walk_mut(
    node: &mut Node,
    path: PathRef<'_>,
    location: &mut Location,
    create: Option<CreateKind>,
    id: &ResId,
    f: &mut dyn FnMut(FieldMut<'_>) -> Result<()>,
) -> Result<()> {
    let Some((segment, rest)) = path.split_first() else {
        if node.is_null() {
            match create {
                Some(kind) => *node = kind.empty_node(),
                None => return Ok(()),
            }
        }
        return f(FieldMut {
            resource: id,
            location,
            node,
        });
    };

    // Intermediate structure is only created for plain keys that lead to a single location.
    let creatable = create.filter(|_| rest.first().is_none_or(|s| !s.fans_out()));

    match segment {
        FieldPathSegment::Field(key) => {
            if let Node::Sequence(seq) = node {
                let index = key.parse::<usize>().map_err(|_| {
                    mismatch(&child_path(location, key), NodeKind::Mapping, NodeKind::Sequence)
                })?;
                let Some(child) = seq.get_mut(index) else {
                    return Ok(());
                };
                location.push(PathStep::Index(index));
                walk_mut(child, rest, location, create, id, f)?;
                location.pop();
                return Ok(());
            }

            if node.is_null() {
                if creatable.is_none() {
                    return Ok(());
                }
                *node = Node::mapping();
            }

            let found = node.kind();
            let Node::Mapping(map) = node else {
                return Err(mismatch(&child_path(location, key), NodeKind::Mapping, found));
            };

            let child = match map.get_index_of(key.as_str()) {
                Some(index) => &mut map[index],
                None => match creatable {
                    None => return Ok(()),
                    Some(kind) => map.entry(key.clone()).or_insert(match rest.first() {
                        None => kind.empty_node(),
                        Some(FieldPathSegment::Match { .. }) => Node::Sequence(vec![]),
                        Some(_) => Node::mapping(),
                    }),
                },
            };

            location.push(PathStep::Key(key.clone()));
            walk_mut(child, rest, location, create, id, f)?;
            location.pop();
        }
        FieldPathSegment::Array(key) => {
            let child = match node {
                Node::Mapping(map) => map.get_mut(key.as_str()),
                _ if node.is_null() => None,
                _ => {
                    let path = child_path(location, key);
                    return Err(mismatch(&path, NodeKind::Mapping, node.kind()));
                }
            };
            if let Some(child) = child {
                location.push(PathStep::Key(key.clone()));
                walk_elements_mut(child, rest, location, create, id, f)?;
                location.pop();
            }
        }
        FieldPathSegment::Elements => walk_elements_mut(node, rest, location, create, id, f)?,
        FieldPathSegment::Match { key, value } => {
            if node.is_null() {
                if creatable.is_none() {
                    return Ok(());
                }
                *node = Node::Sequence(vec![]);
            }
            let found = node.kind();
            let Node::Sequence(seq) = node else {
                return Err(mismatch(&*location, NodeKind::Sequence, found));
            };

            let matching = seq
                .iter()
                .enumerate()
                .filter(|(_, item)| item.get_str(key) == Some(value.as_str()))
                .map(|(i, _)| i)
                .collect::<Vec<_>>();
            let matching = match (matching.is_empty(), creatable) {
                // A missing element is created holding just the matched key.
                (true, Some(_)) => {
                    seq.push(Node::from_iter([(key.as_str(), value.as_str())]));
                    vec![seq.len() - 1]
                }
                _ => matching,
            };
            for i in matching {
                location.push(PathStep::Index(i));
                walk_mut(&mut seq[i], rest, location, create, id, f)?;
                location.pop();
            }
        }
    }

    Ok(())
}

fn walk_elements_mut(
    node: &mut Node,
    rest: PathRef<'_>,
    location: &mut Location,
    create: Option<CreateKind>,
    id: &ResId,
    f: &mut dyn FnMut(FieldMut<'_>) -> Result<()>,
) -> Result<()> {
    match node {
        Node::Sequence(seq) => {
            for (i, item) in seq.iter_mut().enumerate() {
                location.push(PathStep::Index(i));
                walk_mut(item, rest, location, create, id, f)?;
                location.pop();
            }
            Ok(())
        }
        _ if node.is_null() => Ok(()),
        _ => Err(mismatch(&*location, NodeKind::Sequence, node.kind())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSpecs {
    specs: Vec<FieldSpec>,
}

impl Deref for FieldSpecs {
    type Target = [FieldSpec];

    fn deref(&self) -> &Self::Target {
        &self.specs
    }
}

impl FromIterator<FieldSpec> for FieldSpecs {
    fn from_iter<T: IntoIterator<Item = FieldSpec>>(iter: T) -> Self {
        let mut specs = FieldSpecs::default();
        iter.into_iter().for_each(|spec| specs.add(spec));
        specs
    }
}

impl FieldSpecs {
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Layer `overrides` on top of `self`. A spec for the same gvk matcher and path replaces
    /// the existing one in place, anything else is appended.
    pub fn merged(&self, overrides: &FieldSpecs) -> FieldSpecs {
        let mut out = self.clone();
        for spec in overrides.iter() {
            out.add(spec.clone());
        }
        out
    }

    pub fn add(&mut self, spec: FieldSpec) {
        match self
            .specs
            .iter_mut()
            .find(|s| s.matcher == spec.matcher && s.path == spec.path)
        {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    /// Apply every spec, in declaration order, to `resource`.
    ///
    /// A type mismatch only abandons the spec that hit it unless `strict` is set.
    pub fn apply(
        &self,
        resource: &mut Resource,
        create_kind: CreateKind,
        strict: bool,
        f: impl FnMut(FieldMut<'_>) -> Result<()>,
    ) -> Result<()> {
        self.apply_where(resource, create_kind, strict, |_| true, f)
    }

    /// Like [`FieldSpecs::apply`], restricted to the specs accepted by `filter`.
    pub fn apply_where(
        &self,
        resource: &mut Resource,
        create_kind: CreateKind,
        strict: bool,
        filter: impl Fn(&FieldSpec) -> bool,
        mut f: impl FnMut(FieldMut<'_>) -> Result<()>,
    ) -> Result<()> {
        for spec in self.specs.iter().filter(|spec| filter(spec)) {
            match spec.apply(resource, create_kind, &mut f) {
                Ok(()) => {}
                Err(err) if err.is_type_mismatch() && !strict => {
                    tracing::debug!(
                        resource = %resource.id(),
                        path = %spec.path,
                        %err,
                        "skipping field spec"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// The union of all locations matched by the specs, in declaration order.
    pub fn locate(&self, resource: &Resource, strict: bool) -> Result<Vec<Location>> {
        let mut out = vec![];
        for spec in &self.specs {
            match spec.locate(resource) {
                Ok(locations) => out.extend(locations),
                Err(err) if err.is_type_mismatch() && !strict => {}
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}

/// Reports scalar writes performed while transforming resources.
pub trait MutationTracker {
    fn on_field_write(&mut self, write: &FieldWrite<'_>);

    /// Called when a resource was rewritten wholesale, e.g. by a patch.
    fn on_resource_rewrite(&mut self, _resource: &ResId) {}
}

impl<F> MutationTracker for F
where
    F: FnMut(&FieldWrite<'_>),
{
    fn on_field_write(&mut self, write: &FieldWrite<'_>) {
        self(write)
    }
}

#[derive(Debug, Default)]
pub struct NoopTracker;

impl MutationTracker for NoopTracker {
    fn on_field_write(&mut self, _write: &FieldWrite<'_>) {}
}

#[derive(Debug)]
pub struct FieldWrite<'a> {
    /// The id the resource had when the transformer visited it.
    pub resource: &'a ResId,
    pub location: &'a Location,
    pub value: &'a str,
    pub tag: Tag,
}

impl FieldWrite<'_> {
    pub fn key(&self) -> Option<&str> {
        self.location.last_key()
    }
}

/// Overwrite the scalar at `field`, notifying `tracker` only if the value changed.
pub fn set_scalar(
    field: FieldMut<'_>,
    value: &str,
    tag: Tag,
    tracker: &mut dyn MutationTracker,
) -> Result<bool> {
    if let Some(scalar) = field.node.as_scalar()
        && scalar.value == value
        && scalar.tag == tag
    {
        return Ok(false);
    }

    field
        .node
        .set_scalar(value, tag)
        .map_err(|_| mismatch(field.location, NodeKind::Scalar, field.node.kind()))?;
    tracker.on_field_write(&FieldWrite {
        resource: field.resource,
        location: field.location,
        value,
        tag,
    });
    Ok(true)
}

#[cfg(test)]
mod tests;
