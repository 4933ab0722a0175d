use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
    time::{Duration, Instant},
};

use compact_str::format_compact;

use crate::{
    defaults::{Defaults, TransformerConfig},
    error::{BuildError, Error, LoadError, Result, Stage},
    generator::{ConfigMapGenerator, Generator, SecretGenerator},
    manifest::{Kustomization, Patch, PatchSource, Replacement, ReplacementEntry, Str},
    patch::PatchContent,
    plugin::{Plugin, PluginRegistry},
    resmap::ResourceMap,
    resource::{ConfiguredBy, Origin},
    transform::{
        AnnotationTransformer, BuildMetadataTransformer, CleanupTransformer, Context,
        HashSuffixTransformer, ImageTagTransformer, LabelTransformer, LoadedPatch,
        NameReferenceResolver, NamespaceTransformer, PatchTransformer, PrefixSuffixTransformer,
        Recorder, ReplacementTransformer, ReplicaTransformer, SortTransformer, Transformer,
        parse_replacements,
    },
};

/// File names a layer directory may hold its configuration in, by preference.
const KUSTOMIZATION_FILES: [&str; 3] = ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Where the files of a build come from.
///
/// Paths handed to a loader are relative to its [`root`](Loader::root) and already
/// normalized.
#[async_trait::async_trait]
pub trait Loader: Send + Sync {
    fn root(&self) -> &Path;

    async fn load(&self, path: &Path) -> Result<Vec<u8>>;

    /// Whether `path` is a directory, and so names a layer rather than a resource file.
    async fn is_dir(&self, path: &Path) -> Result<bool>;
}

/// Loads files relative to a directory on disk.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> Error {
    match source.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_owned()),
        _ => LoadError::PermissionOrFetch {
            path: path.to_owned(),
            source,
        },
    }
    .into()
}

#[async_trait::async_trait]
impl Loader for FsLoader {
    fn root(&self) -> &Path {
        &self.root
    }

    #[tracing::instrument(skip_all, level = "debug", fields(path = %path.display()))]
    async fn load(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(self.root.join(path))
            .await
            .map_err(|err| io_error(path, err))
    }

    async fn is_dir(&self, path: &Path) -> Result<bool> {
        tokio::fs::metadata(self.root.join(path))
            .await
            .map(|metadata| metadata.is_dir())
            .map_err(|err| io_error(path, err))
    }
}

/// Serves files from memory, for tests and for embedders that already hold their inputs.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new<'a>(files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        let mut loader = Self::default();
        for (path, content) in files {
            loader.insert(path, content);
        }
        loader
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(normalize(path.as_ref()), content.into());
        self
    }
}

#[async_trait::async_trait]
impl Loader for MemoryLoader {
    fn root(&self) -> &Path {
        Path::new("")
    }

    async fn load(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.to_owned()).into())
    }

    async fn is_dir(&self, path: &Path) -> Result<bool> {
        let path = normalize(path);
        if self.files.contains_key(&path) {
            return Ok(false);
        }
        if self.files.keys().any(|file| file.starts_with(&path)) {
            return Ok(true);
        }
        Err(LoadError::NotFound(path).into())
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir
                if matches!(out.components().next_back(), Some(Component::Normal(_))) =>
            {
                out.pop();
            }
            component => out.push(component.as_os_str()),
        }
    }
    out
}

/// Read and parse the content of `patch`, declared by the layer in `dir`.
pub(crate) async fn load_patch(
    loader: &dyn Loader,
    dir: &Path,
    patch: &Patch,
) -> Result<LoadedPatch> {
    let (content, source) = match &patch.source {
        PatchSource::Path(path) => {
            let path = normalize(&dir.join(path));
            let content = loader.load(&path).await?;
            (content, format_compact!("{}", path.display()))
        }
        PatchSource::Inline(content) => (content.as_bytes().to_vec(), Str::const_new("<inline>")),
    };

    let content = PatchContent::parse(&content)
        .map_err(|err| Error::config(format_args!("patch `{source}`: {err}")))?;
    Ok(LoadedPatch {
        content,
        target: patch.target.clone(),
        source,
    })
}

/// The replacements `entries` declare, reading files relative to `dir`.
pub(crate) async fn load_replacements(
    loader: &dyn Loader,
    dir: &Path,
    entries: &[ReplacementEntry],
) -> Result<Vec<Replacement>> {
    let mut replacements = vec![];
    for entry in entries {
        match entry {
            ReplacementEntry::Inline(replacement) => replacements.push(replacement.clone()),
            ReplacementEntry::Path(path) => {
                let path = normalize(&dir.join(path));
                let content = loader.load(&path).await?;
                let loaded = parse_replacements(&content).map_err(|err| {
                    Error::config(format_args!("replacements `{}`: {err}", path.display()))
                })?;
                replacements.extend(loaded);
            }
        }
    }
    Ok(replacements)
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Make field type mismatches fatal instead of skipping the field.
    pub strict: bool,
    /// How long a single plugin may run.
    pub plugin_timeout: Duration,
    pub defaults: Defaults,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            strict: false,
            plugin_timeout: Duration::from_secs(30),
            defaults: Defaults::default(),
        }
    }
}

/// One built layer.
struct Layer {
    resources: ResourceMap,
    kustomization: Kustomization,
    file: PathBuf,
}

fn fail(stage: Stage, layer: &Path, detail: Option<Str>) -> impl FnOnce(Error) -> BuildError {
    let layer = layer.to_owned();
    move |source| BuildError {
        stage,
        layer,
        detail,
        source,
    }
}

#[derive(Debug, Default)]
pub struct Builder {
    options: BuildOptions,
    plugins: PluginRegistry,
    /// Layer directories currently being built, outermost first.
    stack: Vec<PathBuf>,
}

impl Builder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Build the layer in directory `path` and every layer below it.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub async fn build(
        &mut self,
        loader: &dyn Loader,
        path: &Path,
    ) -> Result<ResourceMap, BuildError> {
        self.stack.clear();
        let Layer {
            mut resources,
            kustomization,
            file,
        } = self.build_layer(loader, normalize(path), true).await?;

        let configured_in = format_compact!("{}", file.display());
        let sort_options = kustomization.sort_options.clone().unwrap_or_default();
        let mut finalizers: [Box<dyn Transformer>; 3] = [
            Box::new(BuildMetadataTransformer::new(&kustomization.build_metadata)),
            Box::new(CleanupTransformer::default()),
            Box::new(SortTransformer::new(&sort_options, &self.options.defaults.sort_order)),
        ];
        for transformer in &mut finalizers {
            self.run(&mut **transformer, &mut resources, &configured_in)
                .await
                .map_err(fail(Stage::Finalize, &file, None))?;
        }

        tracing::debug!(resources = resources.len(), "build complete");
        Ok(resources)
    }

    #[tracing::instrument(skip_all, fields(dir = %dir.display()))]
    async fn build_layer(
        &mut self,
        loader: &dyn Loader,
        dir: PathBuf,
        root: bool,
    ) -> Result<Layer, BuildError> {
        let (file, kustomization) = load_kustomization(loader, &dir)
            .await
            .map_err(fail(Stage::Load, &dir, None))?;

        if self.stack.contains(&dir) {
            let cycle = self
                .stack
                .iter()
                .chain([&dir])
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(fail(Stage::Load, &file, None)(Error::config(format_args!(
                "layers form a cycle: {cycle}"
            ))));
        }

        self.stack.push(dir.clone());
        let res = self.build_layer_contents(loader, &dir, file, kustomization, root).await;
        self.stack.pop();
        res
    }

    async fn build_layer_contents(
        &mut self,
        loader: &dyn Loader,
        dir: &Path,
        file: PathBuf,
        kustomization: Kustomization,
        root: bool,
    ) -> Result<Layer, BuildError> {
        let configured_in = format_compact!("{}", file.display());
        let defaults = self
            .layer_defaults(loader, dir, &kustomization)
            .await
            .map_err(fail(Stage::Load, &file, None))?;

        // Resources, including whole sub-layers.
        let mut resources = ResourceMap::new();
        for entry in &kustomization.resources {
            let path = normalize(&dir.join(entry));
            let detail = Some(format_compact!("{}", entry.display()));
            let is_dir = loader
                .is_dir(&path)
                .await
                .map_err(fail(Stage::Load, &file, detail.clone()))?;

            if is_dir {
                let layer = Box::pin(self.build_layer(loader, path, false)).await?;
                resources
                    .merge(layer.resources)
                    .map_err(fail(Stage::Load, &file, detail))?;
                continue;
            }

            let loaded = async {
                let content = loader.load(&path).await?;
                for mut resource in crate::yaml::resources(&content)? {
                    resource.provenance_mut().origin.get_or_insert_with(|| Origin {
                        path: Some(format_compact!("{}", path.display())),
                        configured_in: None,
                        configured_by: None,
                    });
                    resources.append(resource)?;
                }
                Ok::<_, Error>(())
            };
            loaded.await.map_err(fail(Stage::Load, &file, detail))?;
        }

        // Generators.
        let mut generators: Vec<Box<dyn Generator>> = vec![];
        if !kustomization.config_map_generators.is_empty() {
            generators.push(Box::new(ConfigMapGenerator::new(
                kustomization.config_map_generators.clone(),
                kustomization.generator_options.clone(),
            )));
        }
        if !kustomization.secret_generators.is_empty() {
            generators.push(Box::new(SecretGenerator::new(
                kustomization.secret_generators.clone(),
                kustomization.generator_options.clone(),
            )));
        }
        let builtin_generators = generators.len();
        let plugins = self
            .plugins
            .resolve_all(&kustomization.generators, loader, dir, &defaults)
            .await
            .map_err(fail(Stage::Generate, &file, None))?;
        for plugin in plugins {
            match plugin {
                Plugin::Generator(generator) => generators.push(generator),
                plugin => {
                    return Err(fail(Stage::Generate, &file, None)(Error::config(format_args!(
                        "{plugin:?} listed under `generators` is not a generator"
                    ))));
                }
            }
        }

        for (i, generator) in generators.iter_mut().enumerate() {
            let configured_by = generator.configured_by();
            let detail = Some(configured_by.kind.clone());
            let generate = generator.generate(loader, dir);
            let generated = if i < builtin_generators {
                generate.await
            } else {
                self.bounded(&configured_by, generate).await
            }
            .map_err(fail(Stage::Generate, &file, detail.clone()))?;

            for mut resource in generated {
                resource.provenance_mut().origin = Some(Origin {
                    path: None,
                    configured_in: Some(configured_in.clone()),
                    configured_by: Some(configured_by.clone()),
                });
                resources
                    .absorb(resource)
                    .map_err(fail(Stage::Generate, &file, detail.clone()))?;
            }
        }

        // Builtin transformers, then plugin transformers.
        let mut transformers = builtin_transformers(&kustomization, &defaults);
        let builtin_transformers = transformers.len();
        let plugins = self
            .plugins
            .resolve_all(&kustomization.transformers, loader, dir, &defaults)
            .await
            .map_err(fail(Stage::Transform, &file, None))?;
        for plugin in plugins {
            match plugin {
                Plugin::Transformer(transformer) => transformers.push(transformer),
                plugin => {
                    return Err(fail(Stage::Transform, &file, None)(Error::config(format_args!(
                        "{plugin:?} listed under `transformers` is not a transformer"
                    ))));
                }
            }
        }

        for (i, transformer) in transformers.iter_mut().enumerate() {
            let configured_by = transformer.configured_by();
            let run = self.run(&mut **transformer, &mut resources, &configured_in);
            let res = if i < builtin_transformers {
                run.await
            } else {
                self.bounded(&configured_by, run).await
            };
            res.map_err(fail(Stage::Transform, &file, Some(configured_by.kind)))?;
        }

        // Patches.
        if !kustomization.patches.is_empty() {
            let mut patches = Vec::with_capacity(kustomization.patches.len());
            for patch in &kustomization.patches {
                patches.push(
                    load_patch(loader, dir, patch)
                        .await
                        .map_err(fail(Stage::Patch, &file, None))?,
                );
            }
            let mut transformer = PatchTransformer::new(patches, defaults.merge_keys.clone());
            self.run(&mut transformer, &mut resources, &configured_in)
                .await
                .map_err(fail(Stage::Patch, &file, None))?;
        }

        // Replacements see patched content.
        if !kustomization.replacements.is_empty() {
            let replacements = load_replacements(loader, dir, &kustomization.replacements)
                .await
                .map_err(fail(Stage::Replacement, &file, None))?;
            let mut transformer = ReplacementTransformer::new(replacements);
            self.run(&mut transformer, &mut resources, &configured_in)
                .await
                .map_err(fail(Stage::Replacement, &file, None))?;
        }

        // Generated names get their hash once their content is final.
        if root {
            self.run(&mut HashSuffixTransformer::default(), &mut resources, &configured_in)
                .await
                .map_err(fail(Stage::HashSuffix, &file, None))?;
        }

        let mut resolver = NameReferenceResolver::new(
            defaults.name_references.clone(),
            defaults.cluster_scoped.clone(),
        );
        self.run(&mut resolver, &mut resources, &configured_in)
            .await
            .map_err(fail(Stage::ResolveReferences, &file, None))?;

        Ok(Layer {
            resources,
            kustomization,
            file,
        })
    }

    /// The engine tables with the layer's `configurations` applied in order.
    async fn layer_defaults(
        &self,
        loader: &dyn Loader,
        dir: &Path,
        kustomization: &Kustomization,
    ) -> Result<Defaults> {
        let mut defaults = self.options.defaults.clone();
        for path in &kustomization.configurations {
            let content = loader.load(&normalize(&dir.join(path))).await?;
            let config: TransformerConfig = crate::yaml::from_slice(&content)?;
            defaults = defaults.with_overrides(&config);
        }
        Ok(defaults)
    }

    /// Run `transformer`, attributing what it changes to it.
    async fn run(
        &self,
        transformer: &mut dyn Transformer,
        resources: &mut ResourceMap,
        configured_in: &Str,
    ) -> Result<()> {
        let mut recorder = Recorder::new(transformer.configured_by(), Some(configured_in.clone()));
        transformer
            .transform(resources, &mut Context::new(&mut recorder).strict(self.options.strict))
            .await?;
        recorder.commit(resources)
    }

    /// Await a plugin, failing if it takes longer than the configured timeout.
    async fn bounded<T>(
        &self,
        configured_by: &ConfiguredBy,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.options.plugin_timeout;
        let start = Instant::now();
        let out = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::Timeout {
                description: format_compact!("plugin `{}`", configured_by.kind),
                timeout,
            })?;
        tracing::info!(plugin = %configured_by.kind, duration = ?start.elapsed(), "ran plugin");
        out
    }
}

async fn load_kustomization(loader: &dyn Loader, dir: &Path) -> Result<(PathBuf, Kustomization)> {
    for name in KUSTOMIZATION_FILES {
        let file = dir.join(name);
        match loader.load(&file).await {
            Ok(content) => {
                let mut kustomization: Kustomization = crate::yaml::from_slice(&content)?;
                kustomization.transform_legacy_fields();
                return Ok((file, kustomization));
            }
            Err(Error::Load(LoadError::NotFound(_))) => continue,
            Err(err) => return Err(err),
        }
    }
    Err(LoadError::NotFound(dir.join(KUSTOMIZATION_FILES[0])).into())
}

/// The transformers a layer's own fields ask for, in the order they run.
fn builtin_transformers(
    kustomization: &Kustomization,
    defaults: &Defaults,
) -> Vec<Box<dyn Transformer>> {
    let specs = &defaults.field_specs;
    let mut transformers: Vec<Box<dyn Transformer>> = vec![];

    if let Some(namespace) = &kustomization.namespace {
        transformers.push(Box::new(NamespaceTransformer::new(
            namespace.clone(),
            specs.namespace.clone(),
            defaults.cluster_scoped.clone(),
        )));
    }

    if !kustomization.name_prefix.is_empty() || !kustomization.name_suffix.is_empty() {
        transformers.push(Box::new(PrefixSuffixTransformer::new(
            kustomization.name_prefix.clone(),
            kustomization.name_suffix.clone(),
            specs.name_prefix.clone(),
        )));
    }

    for label in &kustomization.labels {
        transformers.push(Box::new(LabelTransformer::from_label(label, specs)));
    }

    if !kustomization.common_annotations.is_empty() {
        transformers.push(Box::new(AnnotationTransformer::new(
            kustomization.common_annotations.clone(),
            specs.common_annotations.clone(),
        )));
    }

    for image in &kustomization.images {
        transformers.push(Box::new(ImageTagTransformer::new(image.clone(), specs.images.clone())));
    }

    for replica in &kustomization.replicas {
        transformers.push(Box::new(ReplicaTransformer::new(
            replica.clone(),
            specs.replicas.clone(),
        )));
    }

    transformers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::PathStep;

    fn loader(files: &[(&str, &str)]) -> MemoryLoader {
        MemoryLoader::new(files.iter().map(|(path, content)| (*path, content.as_bytes())))
    }

    async fn build(loader: &MemoryLoader, path: &str) -> Result<ResourceMap, BuildError> {
        Builder::default().build(loader, Path::new(path)).await
    }

    #[test]
    fn normalize_paths() {
        assert_eq!(normalize(Path::new("a/./b/../c")), Path::new("a/c"));
        assert_eq!(normalize(Path::new("a/../../b")), Path::new("../b"));
        assert_eq!(normalize(Path::new("./")), Path::new(""));
    }

    #[tokio::test]
    async fn memory_loader_knows_directories() -> anyhow::Result<()> {
        let loader = loader(&[("base/kustomization.yaml", ""), ("base/cm.yaml", "")]);
        assert!(loader.is_dir(Path::new("base")).await?);
        assert!(!loader.is_dir(Path::new("base/cm.yaml")).await?);
        assert!(loader.is_dir(Path::new("")).await?);
        assert!(matches!(
            loader.is_dir(Path::new("other")).await,
            Err(Error::Load(LoadError::NotFound(_)))
        ));
        Ok(())
    }

    const BASE: &[(&str, &str)] = &[
        (
            "base/kustomization.yaml",
            "resources:\n- deployment.yaml\nconfigMapGenerator:\n- name: settings\n  literals:\n  - mode=base\n",
        ),
        (
            "base/deployment.yaml",
            r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      volumes:
      - name: settings
        configMap:
          name: settings
"#,
        ),
    ];

    #[tokio::test]
    async fn overlay_renames_and_rehashes() -> anyhow::Result<()> {
        let mut files = BASE.to_vec();
        files.push((
            "prod/kustomization.yaml",
            "resources:\n- ../base\nnamePrefix: prod-\nnamespace: prod\nconfigMapGenerator:\n- name: settings\n  behavior: merge\n  literals:\n  - mode=prod\n",
        ));
        let loader = loader(&files);
        let resources = build(&loader, "prod").await?;

        let ids = resources.iter().map(|r| r.id().to_string()).collect::<Vec<_>>();
        let [configmap, deployment] = &ids[..] else {
            panic!("unexpected resources: {ids:?}");
        };
        assert!(configmap.starts_with("ConfigMap.v1/prod-settings-"), "{configmap}");
        assert!(configmap.ends_with(".prod"), "{configmap}");
        assert_eq!(deployment, "Deployment.v1.apps/prod-web.prod");

        let configmap = resources.iter().next().unwrap();
        let deployment = resources.iter().nth(1).unwrap();
        let referenced = deployment
            .root()
            .get_path(&["spec", "template", "spec", "volumes"].map(PathStep::from))
            .and_then(|volumes| volumes.as_sequence()?.first()?.get("configMap")?.get_str("name"));
        assert_eq!(referenced, Some(configmap.name().as_str()));
        assert_eq!(
            configmap.root().get("data").and_then(|d| d.get_str("mode")),
            Some("prod")
        );
        // Internal bookkeeping never reaches the output.
        assert!(configmap.annotations().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn cycles_are_reported() {
        let loader = loader(&[
            ("a/kustomization.yaml", "resources:\n- ../b\n"),
            ("b/kustomization.yaml", "resources:\n- ../a\n"),
        ]);
        let err = build(&loader, "a").await.unwrap_err();
        assert_eq!(err.stage, Stage::Load);
        assert!(err.to_string().contains("a -> b -> a"), "{err}");
    }

    #[tokio::test]
    async fn missing_patch_target_names_stage_and_resource() {
        let mut files = BASE.to_vec();
        files.push((
            "patched/kustomization.yaml",
            "resources:\n- ../base\npatches:\n- patch: |\n    apiVersion: apps/v1\n    kind: Deployment\n    metadata:\n      name: api\n    spec:\n      replicas: 2\n",
        ));
        let loader = loader(&files);
        let err = build(&loader, "patched").await.unwrap_err();
        assert_eq!(err.stage, Stage::Patch);
        assert_eq!(err.layer, Path::new("patched/kustomization.yaml"));
        assert_eq!(err.resource().map(|id| id.name.as_str()), Some("api"));
    }

    #[tokio::test]
    async fn replacement_failures_name_their_stage() {
        let mut files = BASE.to_vec();
        files.push((
            "replaced/kustomization.yaml",
            "resources:\n- ../base\nreplacements:\n- path: replacements.yaml\n",
        ));
        files.push((
            "replaced/replacements.yaml",
            "source:\n  kind: Secret\ntargets:\n- select:\n    kind: Deployment\n",
        ));
        let loader = loader(&files);
        let err = build(&loader, "replaced").await.unwrap_err();
        assert_eq!(err.stage, Stage::Replacement);
        assert!(err.to_string().contains("replacement stage failed"), "{err}");
    }

    #[tokio::test]
    async fn slow_plugins_time_out() {
        struct Sleepy;

        #[async_trait::async_trait]
        impl Transformer for Sleepy {
            async fn transform(&mut self, _: &mut ResourceMap, _: &mut Context<'_>) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }

        let mut registry = PluginRegistry::default();
        registry.register("example.com/v1", "Sleepy", |_| {
            Ok(Plugin::Transformer(Box::new(Sleepy)))
        });
        let loader = loader(&[(
            "kustomization.yaml",
            "transformers:\n- apiVersion: example.com/v1\n  kind: Sleepy\n",
        )]);

        let options = BuildOptions {
            plugin_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let err = Builder::new(options)
            .with_plugins(registry)
            .build(&loader, Path::new(""))
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Transform);
        assert!(matches!(err.source, Error::Timeout { .. }), "{err}");
    }
}
