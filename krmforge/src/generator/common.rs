use std::path::Path;

use indexmap::IndexMap;

use crate::{
    build::Loader,
    error::{Error, Result},
    manifest::{Behavior, GeneratorOptions, KeyValuePairSources, Str},
    resource::{Provenance, Resource},
    tree::Node,
};

/// Layer-wide options with a generator's own options on top.
pub fn merge_options(global: &GeneratorOptions, local: &GeneratorOptions) -> GeneratorOptions {
    GeneratorOptions {
        labels: global
            .labels
            .iter()
            .chain(&local.labels)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        annotations: global
            .annotations
            .iter()
            .chain(&local.annotations)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        disable_name_suffix_hash: local
            .disable_name_suffix_hash
            .or(global.disable_name_suffix_hash),
        immutable: global.immutable || local.immutable,
    }
}

/// Read every source into one key to content table, in declaration order: literals, then
/// files, then env files.
pub async fn collect_sources(
    loader: &dyn Loader,
    dir: &Path,
    sources: &KeyValuePairSources,
    resource_type: &str,
) -> Result<IndexMap<Str, Vec<u8>>> {
    let mut out = IndexMap::new();
    let mut insert = |key: Str, value: Vec<u8>| -> Result<()> {
        validate_key(&key, resource_type)?;
        if out.insert(key.clone(), value).is_some() {
            return Err(Error::config(format_args!(
                "duplicate key `{key}` in {resource_type} sources"
            )));
        }
        Ok(())
    };

    for kv in &sources.literals {
        insert(kv.key.clone(), unquote(&kv.value).as_bytes().to_vec())?;
    }

    for kv in &sources.files {
        let path = dir.join(kv.value.as_str());
        let key = match &kv.key {
            Some(key) => key.clone(),
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into())
                .ok_or_else(|| {
                    Error::config(format_args!("file source `{}` has no file name", kv.value))
                })?,
        };
        insert(key, loader.load(&path).await?)?;
    }

    for env in &sources.envs {
        let content = loader.load(&dir.join(env)).await?;
        let content = String::from_utf8(content).map_err(|_| {
            Error::config(format_args!("env file `{}` is not valid UTF-8", env.display()))
        })?;
        for (key, value) in parse_env(&content)? {
            insert(key, value.into_bytes())?;
        }
    }

    Ok(out)
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped; a bare `KEY` takes its
/// value from the process environment and is skipped if unset there.
pub fn parse_env(content: &str) -> Result<Vec<(Str, String)>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut out = vec![];
    for (i, line) in content.lines().enumerate() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match line.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                if key.is_empty() {
                    return Err(Error::config(format_args!("env line {} has an empty key", i + 1)));
                }
                out.push((key.into(), value.to_owned()));
            }
            None => {
                let key = line.trim_end();
                if let Ok(value) = std::env::var(key) {
                    out.push((key.into(), value));
                }
            }
        }
    }
    Ok(out)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn validate_key(key: &str, resource_type: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(Error::config(format_args!(
            "`{key}` is not a valid {resource_type} key"
        )));
    }
    Ok(())
}

/// Assemble a generated `v1` resource of `kind`. `body` entries go after `metadata`.
pub fn generated(
    kind: &str,
    name: &Str,
    namespace: Option<&Str>,
    options: &GeneratorOptions,
    behavior: Behavior,
    body: Vec<(&str, Node)>,
) -> Result<Resource> {
    let mut metadata = Node::mapping();
    metadata.set("name", Node::string(name.clone()), None)?;
    if let Some(namespace) = namespace {
        metadata.set("namespace", Node::string(namespace.clone()), None)?;
    }
    if !options.labels.is_empty() {
        metadata.set("labels", string_map(&options.labels), None)?;
    }
    if !options.annotations.is_empty() {
        metadata.set("annotations", string_map(&options.annotations), None)?;
    }

    let mut root = Node::mapping();
    root.set("apiVersion", Node::string("v1"), None)?;
    root.set("kind", Node::string(kind), None)?;
    root.set("metadata", metadata, None)?;
    for (key, value) in body {
        root.set(key, value, None)?;
    }
    if options.immutable {
        root.set("immutable", Node::bool(true), None)?;
    }

    let provenance = Provenance {
        needs_hash: options.disable_name_suffix_hash != Some(true),
        behavior,
        ..Default::default()
    };
    Ok(Resource::from_node(root)?.with_provenance(provenance))
}

fn string_map(pairs: &IndexMap<Str, Str>) -> Node {
    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}
