//! Plugins configured by `transformers` and `generators` entries of a layer.
//!
//! Every configuration is resolved into a [`Plugin`] before the layer runs. Builtin kinds are
//! recognized directly; anything else must have been registered with a [`PluginRegistry`].

use std::{fmt, path::Path, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    build::{Loader, load_patch, load_replacements},
    defaults::Defaults,
    error::{Error, Result},
    fieldspec::FieldSpecs,
    generator::{ConfigMapGenerator, Generator, SecretGenerator},
    manifest::{self, GeneratorOptions, Patch, PluginSource, ReplacementEntry, SortOptions, Str},
    resource::ConfiguredBy,
    transform::{
        AnnotationTransformer, ImageTagTransformer, LabelTransformer, NamespaceTransformer,
        PatchTransformer, PrefixSuffixTransformer, ReplacementTransformer, ReplicaTransformer,
        RoleBindingSubjects, SortTransformer, Transformer,
    },
    tree::Node,
};

pub enum Plugin {
    Transformer(Box<dyn Transformer>),
    Generator(Box<dyn Generator>),
}

impl Plugin {
    pub fn configured_by(&self) -> ConfiguredBy {
        match self {
            Plugin::Transformer(transformer) => transformer.configured_by(),
            Plugin::Generator(generator) => generator.configured_by(),
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let configured_by = self.configured_by();
        let variant = match self {
            Plugin::Transformer(_) => "Transformer",
            Plugin::Generator(_) => "Generator",
        };
        write!(f, "{variant}({}/{})", configured_by.api_version, configured_by.kind)
    }
}

type Factory = Arc<dyn Fn(&Node) -> Result<Plugin> + Send + Sync>;

/// Plugins supplied by the embedding program, keyed by `apiVersion` and `kind`.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: IndexMap<(Str, Str), Factory>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl PluginRegistry {
    /// Make configurations with `apiVersion` and `kind` construct plugins with `factory`.
    /// Registered plugins take precedence over builtins.
    pub fn register(
        &mut self,
        api_version: impl Into<Str>,
        kind: impl Into<Str>,
        factory: impl Fn(&Node) -> Result<Plugin> + Send + Sync + 'static,
    ) -> &mut Self {
        self.factories
            .insert((api_version.into(), kind.into()), Arc::new(factory));
        self
    }

    /// All plugins the `sources` of a layer in `dir` configure, in order.
    pub(crate) async fn resolve_all(
        &self,
        sources: &[PluginSource],
        loader: &dyn Loader,
        dir: &Path,
        defaults: &Defaults,
    ) -> Result<Vec<Plugin>> {
        let mut plugins = vec![];
        for source in sources {
            match source {
                PluginSource::Inline(config) => {
                    plugins.push(self.resolve(config, loader, dir, defaults).await?);
                }
                PluginSource::Path(path) => {
                    let content = loader.load(&dir.join(path)).await?;
                    for config in crate::yaml::documents(&content)? {
                        plugins.push(self.resolve(&config, loader, dir, defaults).await?);
                    }
                }
            }
        }
        Ok(plugins)
    }

    pub(crate) async fn resolve(
        &self,
        config: &Node,
        loader: &dyn Loader,
        dir: &Path,
        defaults: &Defaults,
    ) -> Result<Plugin> {
        let (Some(api_version), Some(kind)) =
            (config.get_str("apiVersion"), config.get_str("kind"))
        else {
            return Err(Error::config("plugin configuration requires `apiVersion` and `kind`"));
        };

        if let Some(factory) = self.factories.get(&(Str::from(api_version), Str::from(kind))) {
            tracing::debug!(api_version, kind, "resolved registered plugin");
            return factory(config);
        }

        let builtin = Builtin { config, defaults };
        let plugin = match kind {
            "PrefixSuffixTransformer" => {
                let mut transformer: PrefixSuffixTransformer = builtin.parse()?;
                builtin.default_specs(&mut transformer.field_specs, |d| &d.field_specs.name_prefix);
                Plugin::Transformer(Box::new(transformer))
            }
            "NamespaceTransformer" => Plugin::Transformer(Box::new(builtin.namespace()?)),
            "LabelTransformer" => {
                let mut transformer: LabelTransformer = builtin.parse()?;
                builtin
                    .default_specs(&mut transformer.field_specs, |d| &d.field_specs.common_labels);
                Plugin::Transformer(Box::new(transformer))
            }
            "AnnotationsTransformer" => {
                let mut transformer: AnnotationTransformer = builtin.parse()?;
                builtin.default_specs(&mut transformer.field_specs, |d| {
                    &d.field_specs.common_annotations
                });
                Plugin::Transformer(Box::new(transformer))
            }
            "ImageTagTransformer" => {
                let mut transformer: ImageTagTransformer = builtin.parse()?;
                builtin.default_specs(&mut transformer.field_specs, |d| &d.field_specs.images);
                Plugin::Transformer(Box::new(transformer))
            }
            "ReplicaCountTransformer" => {
                let mut transformer: ReplicaTransformer = builtin.parse()?;
                builtin.default_specs(&mut transformer.field_specs, |d| &d.field_specs.replicas);
                Plugin::Transformer(Box::new(transformer))
            }
            "PatchTransformer" => {
                let patch: Patch = builtin.parse()?;
                let patch = load_patch(loader, dir, &patch).await?;
                let merge_keys = defaults.merge_keys.clone();
                Plugin::Transformer(Box::new(PatchTransformer::new(vec![patch], merge_keys)))
            }
            "ReplacementTransformer" => {
                #[derive(Deserialize)]
                struct Config {
                    replacements: Vec<ReplacementEntry>,
                }
                let Config { replacements } = builtin.parse()?;
                let replacements = load_replacements(loader, dir, &replacements).await?;
                Plugin::Transformer(Box::new(ReplacementTransformer::new(replacements)))
            }
            "SortOrderTransformer" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Config {
                    #[serde(default)]
                    sort_options: SortOptions,
                }
                let Config { sort_options } = builtin.parse()?;
                let sort = SortTransformer::new(&sort_options, &defaults.sort_order);
                Plugin::Transformer(Box::new(sort))
            }
            "ConfigMapGenerator" => {
                let generator: manifest::Generator = builtin.parse_generator()?;
                Plugin::Generator(Box::new(ConfigMapGenerator::new(
                    Box::new([generator]),
                    GeneratorOptions::default(),
                )))
            }
            "SecretGenerator" => {
                let generator: manifest::SecretGenerator = builtin.parse_generator()?;
                Plugin::Generator(Box::new(SecretGenerator::new(
                    Box::new([generator]),
                    GeneratorOptions::default(),
                )))
            }
            _ => {
                return Err(Error::config(format_args!(
                    "unknown plugin `{kind}` with apiVersion `{api_version}`"
                )));
            }
        };
        Ok(plugin)
    }
}

/// A builtin plugin configuration being decoded.
struct Builtin<'a> {
    config: &'a Node,
    defaults: &'a Defaults,
}

impl Builtin<'_> {
    /// The configuration without its `apiVersion`, `kind` and `metadata`.
    fn body(&self) -> Node {
        let mut body = self.config.clone();
        for key in ["apiVersion", "kind", "metadata"] {
            body.remove(key);
        }
        body
    }

    fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body().to_json())?)
    }

    /// Generator configurations take their name and namespace from `metadata`.
    fn parse_generator<T: DeserializeOwned>(&self) -> Result<T> {
        let mut body = self.body();
        let metadata = self.config.get("metadata");
        for key in ["name", "namespace"] {
            if let Some(value) = metadata.and_then(|m| m.get(key)) {
                body.set(key, value.clone(), None)?;
            }
        }
        Ok(serde_json::from_value(body.to_json())?)
    }

    /// Plugins that list no field specs of their own use the engine's table.
    fn default_specs(&self, specs: &mut FieldSpecs, table: impl FnOnce(&Defaults) -> &FieldSpecs) {
        if specs.is_empty() {
            *specs = table(self.defaults).clone();
        }
    }

    fn namespace(&self) -> Result<NamespaceTransformer> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Config {
            #[serde(default)]
            unset_only: bool,
            #[serde(default)]
            set_role_binding_subjects: RoleBindingSubjects,
            #[serde(default)]
            field_specs: FieldSpecs,
        }

        let namespace = self
            .config
            .get("metadata")
            .and_then(|m| m.get_str("namespace"))
            .ok_or_else(|| Error::config("NamespaceTransformer requires `metadata.namespace`"))?;
        let mut config: Config = self.parse()?;
        self.default_specs(&mut config.field_specs, |d| &d.field_specs.namespace);

        let mut transformer = NamespaceTransformer::new(
            namespace,
            config.field_specs,
            self.defaults.cluster_scoped.clone(),
        );
        transformer.unset_only = config.unset_only;
        transformer.set_role_binding_subjects = config.set_role_binding_subjects;
        Ok(transformer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build::MemoryLoader, resmap::ResourceMap, transform::testing::resources};

    async fn resolve(registry: &PluginRegistry, yaml: &str) -> Result<Plugin> {
        let config: Node = crate::yaml::from_str(yaml)?;
        registry
            .resolve(&config, &MemoryLoader::default(), Path::new(""), Defaults::builtin())
            .await
    }

    async fn run(plugin: Plugin, resources: &mut ResourceMap) -> Result<()> {
        let Plugin::Transformer(mut transformer) = plugin else {
            panic!("expected a transformer");
        };
        crate::transform::apply(&mut *transformer, resources).await
    }

    const DEPLOYMENT: &str = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n";

    #[tokio::test]
    async fn builtin_transformers_use_default_field_specs() -> anyhow::Result<()> {
        let registry = PluginRegistry::default();
        let mut resources = resources(DEPLOYMENT);

        let plugin = resolve(
            &registry,
            "apiVersion: builtin\nkind: PrefixSuffixTransformer\nmetadata:\n  name: p\nprefix: a-\n",
        )
        .await?;
        assert_eq!(plugin.configured_by(), ConfiguredBy::builtin("PrefixSuffixTransformer"));
        run(plugin, &mut resources).await?;

        let plugin = resolve(
            &registry,
            "apiVersion: builtin\nkind: NamespaceTransformer\nmetadata:\n  name: ns\n  namespace: prod\n",
        )
        .await?;
        run(plugin, &mut resources).await?;

        let id = resources.iter().next().unwrap().id().to_string();
        assert_eq!(id, "Deployment.v1.apps/a-web.prod");
        Ok(())
    }

    #[tokio::test]
    async fn generators_take_their_name_from_metadata() -> anyhow::Result<()> {
        let plugin = resolve(
            &PluginRegistry::default(),
            "apiVersion: builtin\nkind: ConfigMapGenerator\nmetadata:\n  name: settings\nliterals:\n- a=b\n",
        )
        .await?;
        let Plugin::Generator(mut generator) = plugin else {
            panic!("expected a generator");
        };
        let generated = generator.generate(&MemoryLoader::default(), Path::new("")).await?;
        assert_eq!(generated[0].name(), "settings");
        Ok(())
    }

    #[tokio::test]
    async fn registered_plugins_win() -> anyhow::Result<()> {
        let mut registry = PluginRegistry::default();
        registry.register("example.com/v1", "Stamp", |config| {
            let value = config.get_str("value").unwrap_or_default().into();
            Ok(Plugin::Transformer(Box::new(AnnotationTransformer::new(
                [("stamp".into(), value)].into_iter().collect(),
                Defaults::builtin().field_specs.common_annotations.clone(),
            ))))
        });

        let mut resources = resources(DEPLOYMENT);
        let plugin =
            resolve(&registry, "apiVersion: example.com/v1\nkind: Stamp\nvalue: x\n").await?;
        run(plugin, &mut resources).await?;
        let annotations = resources.iter().next().unwrap().annotations().unwrap();
        assert_eq!(annotations.get("stamp"), Some("x"));
        Ok(())
    }

    #[tokio::test]
    async fn replacement_plugins_read_replacement_files() -> anyhow::Result<()> {
        let loader = MemoryLoader::new([(
            "replacements.yaml",
            &b"source:\n  kind: Deployment\ntargets:\n- select:\n    kind: Deployment\n  fieldPaths:\n  - metadata.labels.app\n  options:\n    create: true\n"[..],
        )]);
        let config: Node = crate::yaml::from_str(
            "apiVersion: builtin\nkind: ReplacementTransformer\nmetadata:\n  name: r\nreplacements:\n- path: replacements.yaml\n",
        )?;
        let plugin = PluginRegistry::default()
            .resolve(&config, &loader, Path::new(""), Defaults::builtin())
            .await?;

        let mut resources = resources(DEPLOYMENT);
        run(plugin, &mut resources).await?;
        let labels = resources.iter().next().unwrap().labels().unwrap();
        assert_eq!(labels.get("app"), Some("web"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_kinds_are_rejected() {
        let err = resolve(&PluginRegistry::default(), "apiVersion: example.com/v1\nkind: Nope\n")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }
}
