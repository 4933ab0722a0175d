use std::path::Path;

use base64::Engine as _;

use crate::{
    build::Loader,
    error::Result,
    manifest::{self, GeneratorOptions},
    resource::{ConfiguredBy, Resource},
    tree::Node,
};

use super::{
    Generator,
    common::{collect_sources, generated, merge_options},
};

/// `configMapGenerator` entries of one layer.
pub struct ConfigMapGenerator {
    generators: Box<[manifest::Generator]>,
    options: GeneratorOptions,
}

impl ConfigMapGenerator {
    pub fn new(generators: Box<[manifest::Generator]>, options: GeneratorOptions) -> Self {
        Self {
            generators,
            options,
        }
    }

    async fn generate_one(
        &self,
        loader: &dyn Loader,
        dir: &Path,
        generator: &manifest::Generator,
    ) -> Result<Resource> {
        let options = merge_options(&self.options, &generator.options);
        let sources = collect_sources(loader, dir, &generator.sources, "ConfigMap").await?;

        // Text goes to `data`, anything that is not UTF-8 to `binaryData`.
        let mut data = Node::mapping();
        let mut binary = Node::mapping();
        for (key, bytes) in sources {
            match String::from_utf8(bytes) {
                Ok(text) => data.set(key, Node::string(text), None)?,
                Err(err) => binary.set(
                    key,
                    Node::string(base64::engine::general_purpose::STANDARD.encode(err.as_bytes())),
                    None,
                )?,
            };
        }

        let mut body = vec![];
        if data.as_mapping().is_some_and(|m| !m.is_empty()) {
            body.push(("data", data));
        }
        if binary.as_mapping().is_some_and(|m| !m.is_empty()) {
            body.push(("binaryData", binary));
        }

        generated(
            "ConfigMap",
            &generator.name,
            generator.namespace.as_ref(),
            &options,
            generator.behavior,
            body,
        )
    }
}

#[async_trait::async_trait]
impl Generator for ConfigMapGenerator {
    #[tracing::instrument(skip_all, name = "generate_configmap", fields(dir = %dir.display()))]
    async fn generate(&mut self, loader: &dyn Loader, dir: &Path) -> Result<Vec<Resource>> {
        let mut resources = Vec::with_capacity(self.generators.len());
        for generator in &self.generators {
            resources.push(self.generate_one(loader, dir, generator).await?);
        }
        Ok(resources)
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("ConfigMapGenerator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::MemoryLoader;

    #[tokio::test]
    async fn literals_files_and_envs() -> anyhow::Result<()> {
        let loader = MemoryLoader::new([
            ("app/config.properties", b"color=blue".as_slice()),
            ("app/settings.env", b"# comment\nLEVEL=debug\n".as_slice()),
            ("app/logo.bin", [0xff, 0xfe, 0x00].as_slice()),
        ]);
        let generators: Vec<manifest::Generator> = serde_yaml::from_str(
            r#"
- name: app
  literals:
  - MODE=prod
  files:
  - config.properties
  - logo=logo.bin
  envs:
  - settings.env
  options:
    disableNameSuffixHash: true
    labels:
      team: web
"#,
        )?;
        let mut generator = ConfigMapGenerator::new(generators.into(), GeneratorOptions::default());
        let resources = generator.generate(&loader, Path::new("app")).await?;

        let [configmap] = &resources[..] else {
            panic!("expected one resource, got {}", resources.len());
        };
        assert!(!configmap.provenance().needs_hash);
        assert_eq!(
            crate::yaml::to_string(configmap.root())?,
            r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: app
  labels:
    team: web
data:
  MODE: prod
  config.properties: color=blue
  LEVEL: debug
binaryData:
  logo: //4A
"#
        );
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_keys_are_rejected() -> anyhow::Result<()> {
        let loader = MemoryLoader::default();
        let generators: Vec<manifest::Generator> =
            serde_yaml::from_str("- name: dup\n  literals:\n  - a=1\n  - a=2\n")?;
        let mut generator = ConfigMapGenerator::new(generators.into(), GeneratorOptions::default());
        let err = generator.generate(&loader, Path::new("")).await.unwrap_err();
        assert!(err.to_string().contains("duplicate key `a`"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() -> anyhow::Result<()> {
        let loader = MemoryLoader::default();
        let generators: Vec<manifest::Generator> =
            serde_yaml::from_str("- name: cfg\n  files:\n  - missing.txt\n")?;
        let mut generator = ConfigMapGenerator::new(generators.into(), GeneratorOptions::default());
        let err = generator.generate(&loader, Path::new("")).await.unwrap_err();
        assert!(err.to_string().contains("missing.txt"), "{err}");
        Ok(())
    }
}
