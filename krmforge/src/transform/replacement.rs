use serde::Deserialize;

use crate::{
    error::{Error, Result},
    fieldspec::{FieldMut, FieldPath, FieldSpec},
    manifest::{FieldOptions, Replacement, Str},
    resmap::ResourceMap,
    resource::{ConfiguredBy, GvkMatcher, Resource},
    tree::{CreateKind, Node, NodeKind, Tag, mismatch},
};

use super::{Context, Transformer};

const DEFAULT_TARGET_FIELD: &str = "metadata.name";

/// Copies a field of one resource into fields of others, in declaration order. Later
/// replacements see the values written by earlier ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementTransformer {
    pub replacements: Vec<Replacement>,
}

impl ReplacementTransformer {
    pub fn new(replacements: Vec<Replacement>) -> Self {
        Self { replacements }
    }
}

fn spec(path: &str, create: bool) -> Result<FieldSpec> {
    let path = FieldPath::parse_dotted(path)
        .map_err(|err| Error::config(format_args!("invalid field path `{path}`: {err}")))?;
    Ok(FieldSpec {
        matcher: GvkMatcher::default(),
        path,
        create,
    })
}

/// The value `replacement` copies, read from its single source resource.
fn source_value(resources: &ResourceMap, replacement: &Replacement) -> Result<Node> {
    let source = &replacement.source;
    let mut matching = resources.iter().filter(|r| source.matches(r));
    let resource = match (matching.next(), matching.next()) {
        (Some(resource), None) => resource,
        (None, _) => {
            return Err(Error::config(format_args!(
                "replacement source `{source}` matches no resource"
            )));
        }
        (Some(first), Some(second)) => {
            let mut ids = vec![first.id().clone(), second.id().clone()];
            ids.extend(matching.map(|r| r.id().clone()));
            return Err(Error::AmbiguousMatch {
                id: Box::new(first.id().clone()),
                candidates: ids,
            });
        }
    };

    let field = &source.field_path;
    let node = spec(field, false)?
        .locate(resource)?
        .first()
        .and_then(|location| resource.root().get_path(location.steps()))
        .cloned()
        .ok_or_else(|| {
            Error::config(format_args!(
                "field `{field}` not found in replacement source `{}`",
                resource.id()
            ))
        })?;

    let options = &source.options;
    if options.delimiter.is_empty() {
        return Ok(node);
    }
    let Some(value) = node.as_scalar().map(|scalar| scalar.value.as_str()) else {
        return Err(Error::config(format_args!(
            "field `{field}` of replacement source `{}` must be a scalar to split on `{}`",
            resource.id(),
            options.delimiter
        )));
    };
    let part = usize::try_from(options.index)
        .ok()
        .and_then(|index| value.split(options.delimiter.as_str()).nth(index))
        .ok_or_else(|| {
            Error::config(format_args!(
                "index {} is out of bounds for `{value}` split on `{}`",
                options.index, options.delimiter
            ))
        })?;
    Ok(Node::string(part))
}

/// Write `value` into `field`, honoring the target's delimiter options.
fn write(
    field: FieldMut<'_>,
    value: &Node,
    options: &FieldOptions,
    cx: &mut Context<'_>,
) -> Result<()> {
    if !options.delimiter.is_empty() {
        let Some(value) = value.as_scalar().map(|scalar| scalar.value.as_str()) else {
            return Err(Error::config(format_args!(
                "cannot splice {} into `{}`",
                value.kind().as_str(),
                field.location
            )));
        };
        let current = match field.node.as_scalar() {
            Some(scalar) => scalar.value.clone(),
            None if field.node.is_null() => Str::default(),
            None => return Err(mismatch(field.location, NodeKind::Scalar, field.node.kind())),
        };

        let mut parts = current.split(options.delimiter.as_str()).collect::<Vec<_>>();
        match usize::try_from(options.index) {
            Err(_) => parts.insert(0, value),
            Ok(index) if index >= parts.len() => parts.push(value),
            Ok(index) => parts[index] = value,
        }
        cx.set_scalar(field, &parts.join(options.delimiter.as_str()), Tag::Str)?;
        return Ok(());
    }

    match value {
        Node::Scalar(scalar) if field.node.as_scalar().is_some() || field.node.is_null() => {
            cx.set_scalar(field, &scalar.value, scalar.tag)?;
        }
        value => {
            if field.node != value {
                *field.node = value.clone();
                cx.rewrote(field.resource);
            }
        }
    }
    Ok(())
}

fn apply_target(
    resource: &mut Resource,
    spec: &FieldSpec,
    value: &Node,
    options: &FieldOptions,
    cx: &mut Context<'_>,
) -> Result<()> {
    let mut hits = 0;
    spec.apply(resource, CreateKind::Scalar(Tag::Null), &mut |field| {
        hits += 1;
        write(field, value, options, cx)
    })?;
    if hits == 0 {
        return Err(Error::config(format_args!(
            "field `{}` not found in replacement target `{}`",
            spec.path,
            resource.id()
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl Transformer for ReplacementTransformer {
    #[tracing::instrument(
        skip_all,
        name = "replacement_transform",
        fields(replacements = self.replacements.len())
    )]
    async fn transform(&mut self, resources: &mut ResourceMap, cx: &mut Context<'_>) -> Result<()> {
        for replacement in &self.replacements {
            let value = source_value(resources, replacement)?;
            tracing::debug!(source = %replacement.source, "replacing");

            for target in &replacement.targets {
                let default_paths = [Str::const_new(DEFAULT_TARGET_FIELD)];
                let paths = match target.field_paths.as_slice() {
                    [] => &default_paths[..],
                    paths => paths,
                };
                let specs = paths
                    .iter()
                    .map(|path| spec(path, target.options.create))
                    .collect::<Result<Vec<_>>>()?;

                resources.try_for_each_mut(|resource| {
                    if !target.selects(resource) {
                        return Ok(());
                    }
                    specs.iter().try_for_each(|spec| {
                        apply_target(resource, spec, &value, &target.options, cx)
                    })
                })?;
            }
        }
        Ok(())
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("ReplacementTransformer")
    }
}

/// The replacements in a `replacements` file, which holds either one replacement or a list.
pub(crate) fn parse_replacements(content: &[u8]) -> Result<Vec<Replacement>> {
    let value: serde_yaml::Value = crate::yaml::from_slice(content)?;
    if value.is_sequence() {
        Ok(serde_yaml::from_value(value)?)
    } else {
        Ok(vec![serde_yaml::from_value(value)?])
    }
}
