use core::fmt;
use std::path::PathBuf;

use crate::{manifest::Str, resource::ResId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no resource matches `{id}`")]
    NotFound { id: Box<ResId> },

    #[error("multiple resources match `{id}`: {}", display_ids(.candidates))]
    AmbiguousMatch {
        id: Box<ResId>,
        candidates: Vec<ResId>,
    },

    #[error("expected {expected} at `{path}` but found {found}")]
    TypeMismatch {
        path: Str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Configuration(Str),

    #[error(
        "reference `{value}` at `{path}` in `{referrer}` matches multiple resources: {}",
        display_ids(.candidates)
    )]
    ReferenceAmbiguous {
        referrer: Box<ResId>,
        path: Str,
        value: Str,
        candidates: Vec<ResId>,
    },

    #[error("may not add resource with an already registered id `{id}`")]
    Conflict { id: Box<ResId> },

    #[error("applying patch operations to `{id}`: {source}")]
    Patch {
        id: Box<ResId>,
        #[source]
        source: json_patch::PatchError,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{description} did not complete within {timeout:?}")]
    Timeout {
        description: Str,
        timeout: std::time::Duration,
    },

    #[error("{0}")]
    Multiple(Errors),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Configuration(compact_str::format_compact!("{msg}"))
    }

    pub fn not_found(id: &ResId) -> Self {
        Error::NotFound {
            id: Box::new(id.clone()),
        }
    }

    /// The resource this error is about, if it names one.
    pub fn resource(&self) -> Option<&ResId> {
        match self {
            Error::NotFound { id }
            | Error::AmbiguousMatch { id, .. }
            | Error::Conflict { id }
            | Error::Patch { id, .. } => Some(id),
            Error::ReferenceAmbiguous { referrer, .. } => Some(referrer),
            _ => None,
        }
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Error::TypeMismatch { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::config(format_args!("{err:#}"))
    }
}

/// A non-empty batch of errors that were all collected during one pass.
#[derive(Debug)]
pub struct Errors(pub Vec<Error>);

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl Errors {
    pub fn into_result(mut self) -> Result<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(Error::Multiple(self)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("`{}` not found", .0.display())]
    NotFound(PathBuf),
    #[error("reading `{}`: {source}", .path.display())]
    PermissionOrFetch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The pipeline stage that a fatal error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Generate,
    Transform,
    Patch,
    Replacement,
    HashSuffix,
    ResolveReferences,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Load => "load",
            Stage::Generate => "generate",
            Stage::Transform => "transform",
            Stage::Patch => "patch",
            Stage::Replacement => "replacement",
            Stage::HashSuffix => "hash suffix",
            Stage::ResolveReferences => "resolve references",
            Stage::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// The single error a build returns: which stage of which layer failed, and why.
#[derive(Debug, thiserror::Error)]
#[error(
    "{stage} stage failed in layer `{}`{}: {source}",
    .layer.display(),
    display_stage_detail(.detail)
)]
pub struct BuildError {
    pub stage: Stage,
    pub layer: PathBuf,
    pub detail: Option<Str>,
    #[source]
    pub source: Error,
}

impl BuildError {
    pub fn resource(&self) -> Option<&ResId> {
        self.source.resource()
    }
}

fn display_stage_detail(detail: &Option<Str>) -> String {
    match detail {
        Some(detail) => format!(" ({detail})"),
        None => String::new(),
    }
}

fn display_ids(ids: &[ResId]) -> String {
    ids.iter()
        .map(|id| format!("`{id}`"))
        .collect::<Vec<_>>()
        .join(", ")
}
