use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};

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

/// `secretGenerator` entries of one layer. Values are stored base64 encoded under `data`.
pub struct SecretGenerator {
    generators: Box<[manifest::SecretGenerator]>,
    options: GeneratorOptions,
}

impl SecretGenerator {
    pub fn new(generators: Box<[manifest::SecretGenerator]>, options: GeneratorOptions) -> Self {
        Self {
            generators,
            options,
        }
    }

    async fn generate_one(
        &self,
        loader: &dyn Loader,
        dir: &Path,
        generator: &manifest::SecretGenerator,
    ) -> Result<Resource> {
        let options = merge_options(&self.options, &generator.options);
        let sources = collect_sources(loader, dir, &generator.sources, "Secret").await?;

        let data = sources
            .iter()
            .map(|(key, bytes)| (key.clone(), STANDARD.encode(bytes)))
            .collect::<Vec<_>>();
        let data = data
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect::<Node>();

        let mut body = vec![];
        if data.as_mapping().is_some_and(|m| !m.is_empty()) {
            body.push(("data", data));
        }
        body.push(("type", Node::string(generator.ty.to_string())));

        generated(
            "Secret",
            &generator.name,
            generator.namespace.as_ref(),
            &options,
            generator.behavior,
            body,
        )
    }
}

#[async_trait::async_trait]
impl Generator for SecretGenerator {
    #[tracing::instrument(skip_all, name = "generate_secret", fields(dir = %dir.display()))]
    async fn generate(&mut self, loader: &dyn Loader, dir: &Path) -> Result<Vec<Resource>> {
        let mut resources = Vec::with_capacity(self.generators.len());
        for generator in &self.generators {
            resources.push(self.generate_one(loader, dir, generator).await?);
        }
        Ok(resources)
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("SecretGenerator")
    }
}
