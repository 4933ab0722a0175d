//! Build Kubernetes resource sets from layered kustomization directories.
//!
//! A build reads the kustomization in a directory, recursively builds the layers it lists
//! as resources, and runs generators, transformers, patches and name reference resolution
//! over the combined set. See [`Builder`] for the full pipeline.

use std::path::Path;

pub mod build;
pub mod defaults;
pub mod error;
pub mod fieldspec;
pub mod generator;
pub mod manifest;
pub mod patch;
pub mod plugin;
pub mod resmap;
pub mod resource;
pub mod selector;
mod serde_ex;
pub mod transform;
pub mod tree;
pub mod yaml;

pub use self::{
    build::{BuildOptions, Builder, FsLoader, Loader, MemoryLoader},
    error::{BuildError, Error, Result},
    resmap::ResourceMap,
};

/// Build the layer in directory `path` from the filesystem with default options.
pub async fn build(path: impl AsRef<Path>) -> Result<ResourceMap, BuildError> {
    let loader = FsLoader::new(".");
    Builder::default().build(&loader, path.as_ref()).await
}
