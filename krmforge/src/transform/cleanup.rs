use crate::{
    error::Result,
    resmap::ResourceMap,
    resource::{ConfiguredBy, annotation},
};

use super::{Context, Transformer};

/// Strips build-only state before output: local configuration resources are dropped and
/// internal annotations removed.
#[derive(Debug, Default)]
pub struct CleanupTransformer(());

#[async_trait::async_trait]
impl Transformer for CleanupTransformer {
    #[tracing::instrument(skip_all, name = "cleanup_transform")]
    async fn transform(
        &mut self,
        resources: &mut ResourceMap,
        _cx: &mut Context<'_>,
    ) -> Result<()> {
        resources.retain(|resource| {
            let local = resource
                .annotations()
                .and_then(|annotations| annotations.get(annotation::LOCAL_CONFIG))
                .is_some_and(|value| value == "true");
            if local {
                tracing::debug!(id = %resource.id(), "dropping local config");
            }
            !local
        });

        resources.try_for_each_mut(|resource| {
            resource.retain_annotations(|key| {
                !key.starts_with(annotation::INTERNAL_PREFIX)
                    && key != annotation::NEEDS_HASH
                    && key != annotation::BEHAVIOR
            });
            Ok(())
        })
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("CleanupTransformer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::testing::resources;

    #[tokio::test]
    async fn removes_local_config_and_internal_annotations() -> anyhow::Result<()> {
        let mut resources = resources(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: kept
  annotations:
    internal.config.kubernetes.io/path: base/cm.yaml
    owner: ops
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: values
  annotations:
    config.kubernetes.io/local-config: "true"
---
apiVersion: v1
kind: Service
metadata:
  name: svc
  annotations:
    internal.config.kubernetes.io/index: "0"
"#,
        );
        crate::transform::apply(&mut CleanupTransformer::default(), &mut resources).await?;

        assert_eq!(
            resources.iter().map(|r| r.name().as_str()).collect::<Vec<_>>(),
            ["kept", "svc"]
        );
        let mut iter = resources.iter();
        let kept = iter.next().unwrap();
        assert_eq!(kept.annotations().unwrap().iter().collect::<Vec<_>>(), [("owner", "ops")]);
        assert!(iter.next().unwrap().annotations().is_none());
        Ok(())
    }
}
