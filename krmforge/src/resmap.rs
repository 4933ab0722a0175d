use core::fmt;
use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};

use crate::{
    error::{Error, Result},
    manifest::{Behavior, Target},
    resource::{ResId, Resource},
    selector::Selector,
};

/// An ordered collection of resources with unique identities.
///
/// The order is the output order. Every mutation goes through this type so the identity
/// index always agrees with the resources it holds.
#[derive(Clone, Default)]
pub struct ResourceMap {
    resources: Vec<Resource>,
    index: IndexMap<ResId, usize>,
}

/// A snapshot of resource identities, used to scope lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet(IndexSet<ResId>);

impl IdSet {
    pub fn contains(&self, id: &ResId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResId> {
        self.0.iter()
    }
}

impl FromIterator<ResId> for IdSet {
    fn from_iter<T: IntoIterator<Item = ResId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.resources.iter().map(Resource::id)).finish()
    }
}

impl fmt::Display for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, resource) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f, "---")?;
            }
            let yaml = serde_yaml::to_string(resource).map_err(|_| fmt::Error)?;
            write!(f, "{yaml}")?;
        }

        Ok(())
    }
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Result<Self> {
        let mut map = Self::new();
        for resource in resources {
            map.append(resource)?;
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Resource> + DoubleEndedIterator {
        self.resources.iter()
    }

    /// Current identities in collection order.
    pub fn ids(&self) -> IdSet {
        self.resources.iter().map(|r| r.id().clone()).collect()
    }

    pub fn append(&mut self, resource: Resource) -> Result<()> {
        if self.index.contains_key(resource.id()) {
            return Err(Error::Conflict {
                id: Box::new(resource.id().clone()),
            });
        }
        self.index.insert(resource.id().clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    /// In-place merge of two `ResourceMap`s, any conflicting resources will be an error
    pub fn merge(&mut self, other: ResourceMap) -> Result<()> {
        for resource in other.resources {
            self.append(resource)?;
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &ResId) -> Option<Resource> {
        let position = self.index.get(id).copied()?;
        let resource = self.resources.remove(position);
        self.reindex_unchecked();
        Some(resource)
    }

    pub fn retain(&mut self, f: impl FnMut(&Resource) -> bool) {
        self.resources.retain(f);
        self.reindex_unchecked();
    }

    pub fn clear(&mut self) {
        self.resources.clear();
        self.index.clear();
    }

    /// Exact lookup by current identity.
    pub fn get(&self, id: &ResId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn get_by_current_id(&self, id: &ResId) -> Result<&Resource> {
        self.unique(id, |r| r.id().equivalent(id), None)
            .map(|i| &self.resources[i])
    }

    pub fn get_by_original_id(&self, id: &ResId) -> Result<&Resource> {
        self.unique(id, |r| r.original_id().equivalent(id), None)
            .map(|i| &self.resources[i])
    }

    /// Lookup by any identity a resource has had, optionally restricted to `scope`.
    pub fn get_by_any_id(&self, id: &ResId, scope: Option<&IdSet>) -> Result<&Resource> {
        self.unique(id, |r| r.any_id_matches(|prev| prev.equivalent(id)), scope)
            .map(|i| &self.resources[i])
    }

    fn unique(
        &self,
        id: &ResId,
        matches: impl Fn(&Resource) -> bool,
        scope: Option<&IdSet>,
    ) -> Result<usize> {
        let candidates = self
            .resources
            .iter()
            .enumerate()
            .filter(|(_, r)| scope.is_none_or(|scope| scope.contains(r.id())))
            .filter(|(_, r)| matches(r))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();

        match candidates[..] {
            [] => Err(Error::not_found(id)),
            [i] => Ok(i),
            _ => Err(Error::AmbiguousMatch {
                id: Box::new(id.clone()),
                candidates: candidates
                    .iter()
                    .map(|&i| self.resources[i].id().clone())
                    .collect(),
            }),
        }
    }

    /// The resources a patch target selects, in collection order.
    pub fn select<'a>(&'a self, target: &'a Target) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources.iter().filter(move |r| target.matches(r))
    }

    pub fn select_by_labels<'a>(
        &'a self,
        selector: &'a Selector,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| selector.matches(r.labels().as_ref()))
    }

    /// Mutate every resource in collection order.
    ///
    /// Identities are re-derived afterwards; two resources ending up with the same identity
    /// is a conflict.
    pub fn try_for_each_mut(
        &mut self,
        mut f: impl FnMut(&mut Resource) -> Result<()>,
    ) -> Result<()> {
        let res = self.resources.iter_mut().try_for_each(|resource| {
            f(resource)?;
            resource.sync_id()?;
            Ok(())
        });
        self.reindex()?;
        res
    }

    /// Mutate the resource with the current identity `id`.
    pub fn try_update(
        &mut self,
        id: &ResId,
        f: impl FnOnce(&mut Resource) -> Result<()>,
    ) -> Result<()> {
        let position = *self.index.get(id).ok_or_else(|| Error::not_found(id))?;
        let resource = &mut self.resources[position];
        let res = f(resource).and_then(|()| resource.sync_id().map(drop));
        self.reindex()?;
        res
    }

    pub fn sort_by(&mut self, compare: impl FnMut(&Resource, &Resource) -> Ordering) {
        self.resources.sort_by(compare);
        self.reindex_unchecked();
    }

    /// Add a generated resource according to its behavior: `create` appends, `merge` and
    /// `replace` modify the single existing resource that has, or once had, the same identity.
    pub fn absorb(&mut self, resource: Resource) -> Result<()> {
        let behavior = resource.provenance().behavior;
        if behavior == Behavior::Create {
            return self.append(resource);
        }

        let id = resource.id().clone();
        let position = self.unique(&id, |r| r.any_id_matches(|prev| prev.equivalent(&id)), None)?;
        let existing = &mut self.resources[position];
        crate::generator::absorb(existing, resource, behavior)?;
        existing.sync_id()?;
        self.reindex()
    }

    fn reindex(&mut self) -> Result<()> {
        self.index.clear();
        for (i, resource) in self.resources.iter().enumerate() {
            if self.index.insert(resource.id().clone(), i).is_some() {
                return Err(Error::Conflict {
                    id: Box::new(resource.id().clone()),
                });
            }
        }
        Ok(())
    }

    fn reindex_unchecked(&mut self) {
        self.index = self
            .resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id().clone(), i))
            .collect();
    }
}

impl IntoIterator for ResourceMap {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceMap {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Gvk;

    fn resource(kind: &str, name: &str, namespace: Option<&str>) -> Resource {
        let ns = namespace.map(|ns| format!("\n  namespace: {ns}")).unwrap_or_default();
        serde_yaml::from_str(&format!(
            "apiVersion: v1\nkind: {kind}\nmetadata:\n  name: {name}{ns}\n"
        ))
        .unwrap()
    }

    fn id(kind: &str, name: &str, namespace: Option<&str>) -> ResId {
        ResId::new(Gvk::new("", "v1", kind), name, namespace.map(Into::into))
    }

    #[test]
    fn append_rejects_duplicate_identity() {
        let mut map = ResourceMap::new();
        map.append(resource("Service", "a", None)).unwrap();
        let err = map.append(resource("Service", "a", None)).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }), "{err}");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn index_follows_removal_and_renames() -> anyhow::Result<()> {
        let mut map = ResourceMap::from_resources([
            resource("Service", "a", None),
            resource("Service", "b", None),
            resource("Service", "c", None),
        ])?;
        map.remove(&id("Service", "a", None)).unwrap();
        assert_eq!(map.get(&id("Service", "c", None)).unwrap().name(), "c");

        map.try_for_each_mut(|r| {
            let name = format!("x-{}", r.name());
            r.set_name(name)
        })?;
        assert!(map.get(&id("Service", "b", None)).is_none());
        assert_eq!(map.get_by_original_id(&id("Service", "b", None))?.name(), "x-b");
        assert_eq!(map.get_by_current_id(&id("Service", "x-c", None))?.name(), "x-c");
        Ok(())
    }

    #[test]
    fn mutation_into_collision_is_a_conflict() -> anyhow::Result<()> {
        let mut map = ResourceMap::from_resources([
            resource("Service", "a", None),
            resource("Service", "b", None),
        ])?;
        let err = map.try_for_each_mut(|r| r.set_name("same")).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }), "{err}");
        Ok(())
    }

    #[test]
    fn any_id_lookup_is_ambiguous_without_scope() -> anyhow::Result<()> {
        let mut map = ResourceMap::from_resources([
            resource("Service", "one", None),
            resource("Service", "two", None),
        ])?;
        // Both resources pass through the name `shared` at some point.
        map.try_update(&id("Service", "one", None), |r| r.set_name("shared"))?;
        map.try_update(&id("Service", "shared", None), |r| r.set_name("final-a"))?;
        map.try_update(&id("Service", "two", None), |r| r.set_name("shared"))?;
        map.try_update(&id("Service", "shared", None), |r| r.set_name("final-b"))?;

        let query = id("Service", "shared", None);
        let err = map.get_by_any_id(&query, None).unwrap_err();
        assert!(matches!(err, Error::AmbiguousMatch { .. }), "{err}");

        let scope = [id("Service", "final-a", None)].into_iter().collect::<IdSet>();
        assert_eq!(map.get_by_any_id(&query, Some(&scope))?.name(), "final-a");
        Ok(())
    }

    #[test]
    fn missing_id_is_not_found() {
        let map = ResourceMap::new();
        let err = map.get_by_current_id(&id("Service", "a", None)).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{err}");
    }

    #[test]
    fn absent_namespace_matches_default() -> anyhow::Result<()> {
        let map = ResourceMap::from_resources([resource("Service", "a", Some("default"))])?;
        assert_eq!(map.get_by_current_id(&id("Service", "a", None))?.name(), "a");
        Ok(())
    }

    #[test]
    fn display_is_multi_document_yaml() -> anyhow::Result<()> {
        let map = ResourceMap::from_resources([
            resource("Service", "a", None),
            resource("Service", "b", None),
        ])?;
        let out = map.to_string();
        assert_eq!(out.matches("---\n").count(), 1);
        assert!(out.starts_with("apiVersion: v1\n"));
        Ok(())
    }
}
