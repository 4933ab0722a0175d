use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::fieldspec::FieldSpecs;

use super::{Gvk, GvkMatcher};

const REFSPECS: &str = include_str!("./refspecs.yaml");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefSpecs {
    // naive implementation, since the list is probably small
    specs: Vec<RefSpec>,
}

impl RefSpecs {
    pub fn load_builtin() -> &'static Self {
        static INSTANCE: OnceLock<RefSpecs> = OnceLock::new();
        INSTANCE.get_or_init(|| serde_yaml::from_str(REFSPECS).expect("valid refspecs.yaml"))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RefSpec> {
        self.specs.iter()
    }

    /// The specs whose referee matches `gvk`.
    pub fn for_referee<'a>(&'a self, gvk: &'a Gvk) -> impl Iterator<Item = &'a RefSpec> {
        self.specs.iter().filter(move |spec| spec.referee.matches(gvk))
    }

    /// Layer `overrides` on top: referrers for an already known referee are added to its
    /// entry, new referees are appended.
    pub fn merged(&self, overrides: &RefSpecs) -> RefSpecs {
        let mut out = self.clone();
        for spec in &overrides.specs {
            match out.specs.iter_mut().find(|s| s.referee == spec.referee) {
                Some(existing) => existing.referrers = existing.referrers.merged(&spec.referrers),
                None => out.specs.push(spec.clone()),
            }
        }
        out
    }
}

/// A description of how resources of one type refer to resources of another type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSpec {
    /// The type of the resource that is referred to by the referrers.
    #[serde(flatten)]
    pub referee: GvkMatcher,
    /// The fields that contain the reference to the referee.
    #[serde(alias = "fieldSpecs")]
    pub referrers: FieldSpecs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_refspecs_valid() {
        let specs = RefSpecs::load_builtin();
        let gvk = Gvk::new("", "v1", "ServiceAccount");
        let referrers = specs
            .for_referee(&gvk)
            .flat_map(|spec| spec.referrers.iter())
            .map(|spec| spec.path.to_string())
            .collect::<Vec<_>>();
        assert!(referrers.contains(&"spec/template/spec/serviceAccountName".to_string()));
        assert!(referrers.contains(&"subjects[]".to_string()));
    }

    #[test]
    fn overrides_extend_existing_referees() -> anyhow::Result<()> {
        let overrides: RefSpecs = serde_yaml::from_str(
            "- kind: ConfigMap\n  version: v1\n  fieldSpecs:\n  - path: spec/configMapName\n    kind: MyKind\n",
        )?;
        let merged = RefSpecs::load_builtin().merged(&overrides);
        assert_eq!(merged.iter().count(), RefSpecs::load_builtin().iter().count());
        let gvk = Gvk::new("", "v1", "ConfigMap");
        assert!(
            merged
                .for_referee(&gvk)
                .flat_map(|spec| spec.referrers.iter())
                .any(|spec| spec.path.to_string() == "spec/configMapName")
        );
        Ok(())
    }
}
