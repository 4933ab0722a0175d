use std::cmp::Ordering;

use compact_str::format_compact;
use indexmap::IndexMap;

use crate::{
    error::Result,
    manifest::{LegacySortOptions, SortOptions, SortOrder, Str},
    resmap::ResourceMap,
    resource::{ConfiguredBy, Gvk, ResId},
};

use super::{Context, Transformer};

/// Orders the output, either as loaded (`fifo`) or by kind priority (`legacy`).
#[derive(Debug, Clone)]
pub struct SortTransformer {
    order: SortOrder,
    /// Kind to rank: negative for `orderFirst` kinds, positive for `orderLast` kinds.
    ranks: IndexMap<Str, isize>,
}

impl SortTransformer {
    /// `defaults` supplies the kind lists when `options` has none of its own.
    pub fn new(options: &SortOptions, defaults: &LegacySortOptions) -> Self {
        let legacy = options.legacy_sort_options.as_ref().unwrap_or(defaults);
        let first = legacy.order_first.len() as isize;
        let ranks = legacy
            .order_first
            .iter()
            .enumerate()
            .map(|(i, kind)| (kind.clone(), i as isize - first))
            .chain(
                legacy
                    .order_last
                    .iter()
                    .enumerate()
                    .map(|(i, kind)| (kind.clone(), i as isize + 1)),
            )
            .collect();

        Self {
            order: options.order,
            ranks,
        }
    }

    fn rank(&self, kind: &str) -> isize {
        self.ranks.get(kind).copied().unwrap_or_default()
    }

    fn compare(&self, a: &ResId, b: &ResId) -> Ordering {
        if a.gvk != b.gvk {
            return self.compare_gvk(&a.gvk, &b.gvk);
        }
        id_sort_key(a).cmp(&id_sort_key(b))
    }

    fn compare_gvk(&self, a: &Gvk, b: &Gvk) -> Ordering {
        let rank = self.rank(&a.kind).cmp(&self.rank(&b.kind));
        if rank != Ordering::Equal {
            return rank;
        }

        // Core namespaces go before namespaces of other groups.
        if a.kind == "Namespace"
            && b.kind == "Namespace"
            && (a.group.is_empty() || b.group.is_empty())
        {
            return gvk_sort_key(b).cmp(&gvk_sort_key(a));
        }
        gvk_sort_key(a).cmp(&gvk_sort_key(b))
    }
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() { placeholder } else { value }
}

fn gvk_sort_key(gvk: &Gvk) -> Str {
    format_compact!(
        "{}_{}_{}",
        or_placeholder(&gvk.group, "~G"),
        or_placeholder(&gvk.version, "~V"),
        or_placeholder(&gvk.kind, "~K"),
    )
}

fn id_sort_key(id: &ResId) -> Str {
    format_compact!(
        "{}|{}|{}",
        gvk_sort_key(&id.gvk),
        or_placeholder(id.namespace.as_deref().unwrap_or_default(), "~X"),
        or_placeholder(&id.name, "~N"),
    )
}

#[async_trait::async_trait]
impl Transformer for SortTransformer {
    #[tracing::instrument(skip_all, name = "sort_transform", fields(order = ?self.order))]
    async fn transform(
        &mut self,
        resources: &mut ResourceMap,
        _cx: &mut Context<'_>,
    ) -> Result<()> {
        match self.order {
            SortOrder::Fifo => {}
            SortOrder::Legacy => resources.sort_by(|a, b| self.compare(a.id(), b.id())),
        }
        Ok(())
    }

    fn configured_by(&self) -> ConfiguredBy {
        ConfiguredBy::builtin("SortOrderTransformer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{defaults::Defaults, transform::testing::resources};

    const INPUT: &str = r#"
apiVersion: admissionregistration.k8s.io/v1
kind: ValidatingWebhookConfiguration
metadata:
  name: hook
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: b
---
apiVersion: example.com/v1
kind: Widget
metadata:
  name: w
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: a
  namespace: x
---
apiVersion: v1
kind: Service
metadata:
  name: svc
---
apiVersion: v1
kind: Namespace
metadata:
  name: x
"#;

    async fn sorted(options: &str) -> anyhow::Result<Vec<String>> {
        let options: SortOptions = serde_yaml::from_str(options)?;
        let mut resources = resources(INPUT);
        let mut sort = SortTransformer::new(&options, &Defaults::builtin().sort_order);
        crate::transform::apply(&mut sort, &mut resources).await?;
        Ok(resources.iter().map(|r| r.id().to_string()).collect())
    }

    #[tokio::test]
    async fn legacy_order_by_kind_then_id() -> anyhow::Result<()> {
        // Within one type an absent namespace sorts after every named one.
        assert_eq!(
            sorted("order: legacy").await?,
            [
                "Namespace.v1/x",
                "Service.v1/svc",
                "Deployment.v1.apps/a.x",
                "Deployment.v1.apps/b",
                "Widget.v1.example.com/w",
                "ValidatingWebhookConfiguration.v1.admissionregistration.k8s.io/hook",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn fifo_keeps_load_order() -> anyhow::Result<()> {
        let ids = sorted("order: fifo").await?;
        assert_eq!(
            ids.first().map(String::as_str),
            Some("ValidatingWebhookConfiguration.v1.admissionregistration.k8s.io/hook")
        );
        assert_eq!(ids.last().map(String::as_str), Some("Namespace.v1/x"));
        Ok(())
    }

    #[tokio::test]
    async fn custom_kind_lists_replace_the_defaults() -> anyhow::Result<()> {
        let ids = sorted(
            "order: legacy\nlegacySortOptions:\n  orderFirst: [Widget]\n  orderLast: [Namespace]\n",
        )
        .await?;
        assert_eq!(ids.first().map(String::as_str), Some("Widget.v1.example.com/w"));
        assert_eq!(ids.last().map(String::as_str), Some("Namespace.v1/x"));
        Ok(())
    }
}
