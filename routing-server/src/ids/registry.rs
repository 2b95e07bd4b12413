//! Sealed id registry.

use std::collections::HashMap;

use tracing::warn;

use super::{IdKind, IdStore};

#[derive(Debug, Default)]
struct KindIds {
    ids: Vec<String>,
    codes: HashMap<String, u32>,
}

/// Read-only mapping between compact codes and external ids.
///
/// A registry is built in one step from a fully loaded [`IdStore`] and
/// offers no way to add codes afterwards, so every code a request can
/// reference was registered before the first request is served. Share it
/// behind an `Arc`.
#[derive(Debug, Default)]
pub struct IdRegistry {
    kinds: HashMap<IdKind, KindIds>,
}

impl IdRegistry {
    /// A registry with no ids; every code lookup fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register every id of the store under its positional code.
    pub fn register(store: IdStore) -> Self {
        let mut kinds = HashMap::new();

        for (kind, ids) in store.iter() {
            let mut codes = HashMap::with_capacity(ids.len());
            for (idx, id) in ids.iter().enumerate() {
                let Ok(code) = u32::try_from(idx) else {
                    warn!(kind = %kind, "more ids than codes, truncating reverse index");
                    break;
                };
                if codes.contains_key(id) {
                    warn!(kind = %kind, id = %id, code, "duplicate external id");
                    continue;
                }
                codes.insert(id.clone(), code);
            }

            kinds.insert(
                kind,
                KindIds {
                    ids: ids.to_vec(),
                    codes,
                },
            );
        }

        Self { kinds }
    }

    /// The external id registered under `code`.
    pub fn resolve(&self, kind: IdKind, code: u32) -> Option<&str> {
        self.kinds
            .get(&kind)?
            .ids
            .get(code as usize)
            .map(String::as_str)
    }

    /// The code of an external id (its first occurrence).
    pub fn code_of(&self, kind: IdKind, id: &str) -> Option<u32> {
        self.kinds.get(&kind)?.codes.get(id).copied()
    }

    /// Number of codes registered for a kind.
    pub fn len(&self, kind: IdKind) -> usize {
        self.kinds.get(&kind).map_or(0, |k| k.ids.len())
    }

    /// Returns true if no ids are registered at all.
    pub fn is_empty(&self) -> bool {
        self.kinds.values().all(|k| k.ids.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> IdRegistry {
        let mut store = IdStore::new();
        store.insert(
            IdKind::Link,
            vec!["1112".into(), "1213".into(), "4142".into()],
        );
        store.insert(IdKind::String, vec!["pt".into(), "walk".into()]);
        IdRegistry::register(store)
    }

    #[test]
    fn resolve_by_code() {
        let registry = registry();
        assert_eq!(registry.resolve(IdKind::Link, 0), Some("1112"));
        assert_eq!(registry.resolve(IdKind::Link, 2), Some("4142"));
        assert_eq!(registry.resolve(IdKind::String, 1), Some("walk"));
    }

    #[test]
    fn unknown_codes_and_kinds() {
        let registry = registry();
        assert_eq!(registry.resolve(IdKind::Link, 3), None);
        assert_eq!(registry.resolve(IdKind::Node, 0), None);
        assert_eq!(registry.code_of(IdKind::Link, "9999"), None);
    }

    #[test]
    fn reverse_lookup() {
        let registry = registry();
        assert_eq!(registry.code_of(IdKind::Link, "1213"), Some(1));
        assert_eq!(registry.code_of(IdKind::String, "pt"), Some(0));
    }

    #[test]
    fn duplicate_ids_keep_first_code() {
        let mut store = IdStore::new();
        store.insert(IdKind::Node, vec!["a".into(), "b".into(), "a".into()]);
        let registry = IdRegistry::register(store);

        assert_eq!(registry.code_of(IdKind::Node, "a"), Some(0));
        assert_eq!(registry.resolve(IdKind::Node, 2), Some("a"));
        assert_eq!(registry.len(IdKind::Node), 3);
    }

    #[test]
    fn empty_registry() {
        let registry = IdRegistry::empty();
        assert!(registry.is_empty());
        assert_eq!(registry.len(IdKind::Link), 0);
        assert_eq!(registry.resolve(IdKind::Link, 0), None);
    }
}
