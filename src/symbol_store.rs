//! Workspace-wide indexed store of declared symbols.
//!
//! Three indexes are kept in lock-step: an exact-FQN map, a sorted
//! case-insensitive name index for prefix queries (searched with the
//! binary-range helper rather than a trie), and a per-URI list for fast
//! invalidation.  `remove_uri` drops a document's symbols from every
//! index, so no query can return a dangling reference afterwards.
//!
//! Member lookup walks a container's inheritance closure in method
//! resolution order: the container itself, its traits in declaration
//! order, the parent chain, then implemented interfaces.  Relations are
//! stored by FQN, so cycles in `extends`/`use` chains are detected with a
//! visited set and terminated with a logged warning instead of looping.

use std::collections::{HashMap, HashSet};

use crate::error::ServiceError;
use crate::search::binary_range;
use crate::symbol::{PhpSymbol, SymbolKind, SymbolModifier};
use crate::util::canonical_fqn;

/// One entry of the sorted prefix index.
#[derive(Debug, Clone)]
struct NameEntry {
    /// Lowercased short name, the sort key.
    key: String,
    /// Lowercased canonical FQN, the `by_fqn` key.
    fqn_key: String,
}

#[derive(Debug, Default)]
pub struct SymbolStore {
    /// Lowercased canonical FQN → symbol tree.
    by_fqn: HashMap<String, PhpSymbol>,
    /// Sorted by `(key, fqn_key)`.
    name_index: Vec<NameEntry>,
    /// URI → lowercased FQN keys declared in that document, in order.
    by_uri: HashMap<String, Vec<String>>,
    /// Set during `add`/`remove_uri`; queries observing it fail fast.
    mutating: bool,
}

fn fqn_key(fqn: &str) -> String {
    canonical_fqn(fqn).to_lowercase()
}

/// Recursive symbol count (the symbol plus all descendants).
fn symbol_count(symbol: &PhpSymbol) -> usize {
    1 + symbol.children.iter().map(symbol_count).sum::<usize>()
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail fast when the store is observed mid-mutation.
    pub fn ensure_ready(&self) -> Result<(), ServiceError> {
        if self.mutating {
            Err(ServiceError::StoreBusy)
        } else {
            Ok(())
        }
    }

    fn guard_query(&self, what: &str) -> bool {
        match self.ensure_ready() {
            Ok(()) => true,
            Err(error) => {
                log::error!("PHPilot: {error}; {what} returns empty");
                false
            }
        }
    }

    /// Index one top-level symbol tree.  Returns the number of symbols
    /// ingested (including members and parameters).
    pub fn add(&mut self, symbol: PhpSymbol) -> usize {
        self.mutating = true;
        let count = symbol_count(&symbol);
        let key = fqn_key(&symbol.name);
        let name_key = symbol.short_name().to_lowercase();
        let uri = symbol.uri.clone();

        // Re-declarations replace the previous entry for the same FQN.
        if let Some(previous) = self.by_fqn.insert(key.clone(), symbol) {
            self.drop_name_entry(&key);
            if let Some(keys) = self.by_uri.get_mut(&previous.uri) {
                keys.retain(|k| k != &key);
            }
        }

        let entry = NameEntry { key: name_key, fqn_key: key.clone() };
        let at = self.name_index.partition_point(|e| {
            (e.key.as_str(), e.fqn_key.as_str()) < (entry.key.as_str(), entry.fqn_key.as_str())
        });
        self.name_index.insert(at, entry);

        self.by_uri.entry(uri).or_default().push(key);
        self.mutating = false;
        count
    }

    fn drop_name_entry(&mut self, fqn_key: &str) {
        self.name_index.retain(|e| e.fqn_key != fqn_key);
    }

    /// Drop every symbol declared in `uri` from all indexes.  Returns the
    /// number of symbols removed.
    pub fn remove_uri(&mut self, uri: &str) -> usize {
        self.mutating = true;
        let mut removed = 0usize;
        if let Some(keys) = self.by_uri.remove(uri) {
            for key in keys {
                if let Some(symbol) = self.by_fqn.get(&key) {
                    // A later re-declaration from another file now owns
                    // this FQN; leave it alone.
                    if symbol.uri != uri {
                        continue;
                    }
                }
                if let Some(symbol) = self.by_fqn.remove(&key) {
                    removed += symbol_count(&symbol);
                    self.drop_name_entry(&key);
                }
            }
        }
        self.mutating = false;
        removed
    }

    /// Exact-FQN lookup filtered by kind mask.
    pub fn find(&self, fqn: &str, kinds: SymbolKind) -> Option<&PhpSymbol> {
        if !self.guard_query("find") {
            return None;
        }
        self.by_fqn
            .get(&fqn_key(fqn))
            .filter(|s| kinds.intersects(s.kind))
    }

    /// Case-insensitive short-name prefix query, ranked by name length
    /// ascending then FQN lexicographically ascending.
    pub fn match_prefix(&self, prefix: &str, kinds: SymbolKind) -> Vec<&PhpSymbol> {
        if !self.guard_query("match_prefix") {
            return Vec::new();
        }
        let needle = prefix.to_lowercase();
        let slice = binary_range(
            &self.name_index,
            |e| e.key.as_str().cmp(needle.as_str()),
            |e| {
                if e.key.starts_with(&needle) {
                    std::cmp::Ordering::Less
                } else {
                    e.key.as_str().cmp(needle.as_str())
                }
            },
        );
        let mut hits: Vec<&PhpSymbol> = slice
            .iter()
            .filter_map(|e| self.by_fqn.get(&e.fqn_key))
            .filter(|s| kinds.intersects(s.kind))
            .collect();
        hits.sort_by(|a, b| {
            a.short_name()
                .len()
                .cmp(&b.short_name().len())
                .then_with(|| a.name.cmp(&b.name))
        });
        hits
    }

    /// Top-level symbols declared in a document, in declaration order.
    pub fn symbols_for_document(&self, uri: &str) -> Vec<&PhpSymbol> {
        if !self.guard_query("symbols_for_document") {
            return Vec::new();
        }
        self.by_uri
            .get(uri)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.by_fqn.get(k))
                    .filter(|s| s.uri == uri)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of symbols in the store, members included.
    pub fn symbol_count(&self) -> usize {
        self.by_fqn.values().map(symbol_count).sum()
    }

    /// Members of `container_fqn` visible through its inheritance
    /// closure.
    ///
    /// With a `member_name`, the walk stops at the first level that
    /// produces a match (non-static dispatch); static lookups
    /// (`required` includes `STATIC`) and all-member queries collect
    /// across the whole closure.  `required` modifiers must all be
    /// present on a candidate; any `forbidden` modifier disqualifies it.
    /// Private members never survive past their declaring container.
    pub fn member_lookup(
        &self,
        container_fqn: &str,
        member_name: Option<&str>,
        kinds: SymbolKind,
        required: SymbolModifier,
        forbidden: SymbolModifier,
    ) -> Vec<PhpSymbol> {
        if !self.guard_query("member_lookup") {
            return Vec::new();
        }
        let query = MemberQuery {
            member_name,
            kinds,
            required,
            forbidden,
            collect_all: member_name.is_none() || required.contains(SymbolModifier::STATIC),
        };
        let mut visited = HashSet::new();
        let mut results = Vec::new();
        self.walk_members(container_fqn, &query, true, &mut visited, &mut results);
        results
    }

    fn walk_members(
        &self,
        container_fqn: &str,
        query: &MemberQuery<'_>,
        is_origin: bool,
        visited: &mut HashSet<String>,
        results: &mut Vec<PhpSymbol>,
    ) -> bool {
        let key = fqn_key(container_fqn);
        if !visited.insert(key.clone()) {
            log::warn!("PHPilot: inheritance cycle through {container_fqn}; lookup truncated");
            return false;
        }
        let Some(container) = self.by_fqn.get(&key) else {
            return false;
        };

        // 1. The container's own members.
        let before = results.len();
        for member in &container.children {
            if query.admits(member, is_origin) {
                push_override(results, member.clone());
            }
        }
        if !query.collect_all && results.len() > before {
            return true;
        }

        // 2. Traits, in declaration order.  When two traits provide the
        //    same member the later `use` wins; adaptations (`insteadof`,
        //    aliases) are not modelled.
        let mut trait_members: Vec<PhpSymbol> = Vec::new();
        for trait_fqn in &container.trait_fqns {
            let mut one_trait: Vec<PhpSymbol> = Vec::new();
            self.walk_members(trait_fqn, query, false, visited, &mut one_trait);
            for member in one_trait {
                if let Some(existing) = trait_members
                    .iter_mut()
                    .find(|m| m.name == member.name && m.kind == member.kind)
                {
                    log::warn!(
                        "PHPilot: trait member conflict on '{}' in {container_fqn}; later use wins",
                        member.name
                    );
                    *existing = member;
                } else {
                    trait_members.push(member);
                }
            }
        }
        for member in trait_members {
            push_override(results, member);
        }
        if !query.collect_all && results.len() > before {
            return true;
        }

        // 3. The parent chain.
        if let Some(parent_fqn) = &container.parent_fqn {
            let done = self.walk_members(parent_fqn, query, false, visited, results);
            if done && !query.collect_all {
                return true;
            }
        }
        if !query.collect_all && results.len() > before {
            return true;
        }

        // 4. Implemented interfaces.
        for interface_fqn in &container.interface_fqns {
            let done = self.walk_members(interface_fqn, query, false, visited, results);
            if done && !query.collect_all {
                return true;
            }
        }

        !query.collect_all && results.len() > before
    }
}

impl crate::Backend {
    /// Ingest a document's symbols without opening it.  Returns the
    /// number of symbols added.
    pub fn discover(&self, uri: &str, text: &str) -> usize {
        self.index_document(uri, text)
    }

    /// Evict every symbol declared by `uri`.  Returns the number
    /// removed.
    pub fn forget(&self, uri: &str) -> usize {
        self.symbols.lock().unwrap_or_else(|e| e.into_inner()).remove_uri(uri)
    }

    /// Prefix query across the store, ranked by name length ascending
    /// then FQN ascending.
    pub fn workspace_symbols(&self, query: &str) -> Vec<PhpSymbol> {
        let store = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        store
            .match_prefix(
                query,
                SymbolKind::CLASS_LIKE
                    | SymbolKind::FUNCTION
                    | SymbolKind::CONSTANT
                    | SymbolKind::NAMESPACE,
            )
            .into_iter()
            .cloned()
            .collect()
    }

    /// Flat symbol-information records for one document: every
    /// declaration with its container's FQN, parameters omitted.
    pub fn document_symbols(&self, uri: &str) -> Vec<(PhpSymbol, Option<String>)> {
        let store = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        let mut flat = Vec::new();
        for root in store.symbols_for_document(uri) {
            let container = root.name.clone();
            let mut shallow = root.clone();
            shallow.children.clear();
            flat.push((shallow, None));
            for child in &root.children {
                if child.kind.intersects(SymbolKind::PARAMETER) {
                    continue;
                }
                let mut shallow = child.clone();
                shallow.children.clear();
                flat.push((shallow, Some(container.clone())));
            }
        }
        flat
    }

    pub fn number_symbols_known(&self) -> usize {
        self.symbols.lock().unwrap_or_else(|e| e.into_inner()).symbol_count()
    }
}

struct MemberQuery<'q> {
    member_name: Option<&'q str>,
    kinds: SymbolKind,
    required: SymbolModifier,
    forbidden: SymbolModifier,
    collect_all: bool,
}

impl MemberQuery<'_> {
    fn admits(&self, member: &PhpSymbol, is_origin: bool) -> bool {
        if !self.kinds.intersects(member.kind) {
            return false;
        }
        if let Some(name) = self.member_name
            && member.name != name
        {
            return false;
        }
        let modifiers = member.modifiers | member.visibility();
        if !is_origin && modifiers.contains(SymbolModifier::PRIVATE) {
            return false;
        }
        if !modifiers.contains(self.required) {
            return false;
        }
        if modifiers.intersects(self.forbidden) {
            return false;
        }
        true
    }
}

/// Append unless a nearer level already provided the member (override:
/// first writer wins).
fn push_override(results: &mut Vec<PhpSymbol>, member: PhpSymbol) {
    if !results
        .iter()
        .any(|m| m.name == member.name && m.kind == member.kind)
    {
        results.push(member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(fqn: &str, uri: &str) -> PhpSymbol {
        PhpSymbol::new(SymbolKind::CLASS, fqn, uri)
    }

    fn method(name: &str, uri: &str, modifiers: SymbolModifier, ty: &str) -> PhpSymbol {
        let mut m = PhpSymbol::new(SymbolKind::METHOD, name, uri);
        m.modifiers = modifiers;
        m.type_expr = ty.to_string();
        m
    }

    #[test]
    fn find_is_case_insensitive_and_kind_filtered() {
        let mut store = SymbolStore::new();
        store.add(class("\\App\\User", "file:///u.php"));
        assert!(store.find("\\app\\user", SymbolKind::CLASS_LIKE).is_some());
        assert!(store.find("\\App\\User", SymbolKind::FUNCTION).is_none());
    }

    #[test]
    fn queries_fail_fast_mid_mutation() {
        let mut store = SymbolStore::new();
        store.add(class("\\App\\User", "file:///u.php"));

        store.mutating = true;
        assert_eq!(store.ensure_ready(), Err(ServiceError::StoreBusy));
        assert!(store.find("\\App\\User", SymbolKind::ANY).is_none());
        assert!(store.match_prefix("Us", SymbolKind::ANY).is_empty());

        store.mutating = false;
        assert!(store.find("\\App\\User", SymbolKind::ANY).is_some());
    }

    #[test]
    fn prefix_match_ranks_shorter_names_first() {
        let mut store = SymbolStore::new();
        store.add(class("\\FooBar", "file:///a.php"));
        store.add(class("\\Foo", "file:///a.php"));
        store.add(class("\\Baz", "file:///a.php"));

        let hits = store.match_prefix("Fo", SymbolKind::ANY);
        let names: Vec<&str> = hits.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["\\Foo", "\\FooBar"]);
    }

    #[test]
    fn remove_uri_is_complete() {
        let mut store = SymbolStore::new();
        let mut user = class("\\App\\User", "file:///u.php");
        user.children.push(method("name", "file:///u.php", SymbolModifier::PUBLIC, "string"));
        store.add(user);
        store.add(class("\\App\\Order", "file:///o.php"));

        let removed = store.remove_uri("file:///u.php");
        assert_eq!(removed, 2);
        assert!(store.find("\\App\\User", SymbolKind::ANY).is_none());
        assert!(store.match_prefix("Us", SymbolKind::ANY).is_empty());
        assert!(store.symbols_for_document("file:///u.php").is_empty());
        assert!(store.find("\\App\\Order", SymbolKind::ANY).is_some());
    }

    #[test]
    fn inherited_method_lookup_stops_at_first_match() {
        let mut store = SymbolStore::new();
        let mut base = class("\\A", "file:///a.php");
        base.children.push(method("m", "file:///a.php", SymbolModifier::PUBLIC, "int"));
        store.add(base);
        let mut child = class("\\B", "file:///b.php");
        child.parent_fqn = Some("\\A".to_string());
        store.add(child);

        let hits = store.member_lookup(
            "\\B",
            Some("m"),
            SymbolKind::METHOD,
            SymbolModifier::PUBLIC,
            SymbolModifier::STATIC,
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uri, "file:///a.php");
        assert_eq!(hits[0].type_expr, "int");
    }

    #[test]
    fn child_override_shadows_parent() {
        let mut store = SymbolStore::new();
        let mut base = class("\\A", "file:///a.php");
        base.children.push(method("m", "file:///a.php", SymbolModifier::PUBLIC, "int"));
        store.add(base);
        let mut child = class("\\B", "file:///b.php");
        child.parent_fqn = Some("\\A".to_string());
        child.children.push(method("m", "file:///b.php", SymbolModifier::PUBLIC, "string"));
        store.add(child);

        let hits = store.member_lookup(
            "\\B",
            None,
            SymbolKind::METHOD,
            SymbolModifier::NONE,
            SymbolModifier::NONE,
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].type_expr, "string");
    }

    #[test]
    fn private_members_do_not_inherit() {
        let mut store = SymbolStore::new();
        let mut base = class("\\A", "file:///a.php");
        base.children.push(method("secret", "file:///a.php", SymbolModifier::PRIVATE, "int"));
        store.add(base);
        let mut child = class("\\B", "file:///b.php");
        child.parent_fqn = Some("\\A".to_string());
        store.add(child);

        assert!(store
            .member_lookup("\\B", Some("secret"), SymbolKind::METHOD, SymbolModifier::NONE, SymbolModifier::NONE)
            .is_empty());
        assert_eq!(
            store
                .member_lookup("\\A", Some("secret"), SymbolKind::METHOD, SymbolModifier::NONE, SymbolModifier::NONE)
                .len(),
            1
        );
    }

    #[test]
    fn cyclic_inheritance_terminates() {
        let mut store = SymbolStore::new();
        let mut a = class("\\A", "file:///a.php");
        a.parent_fqn = Some("\\B".to_string());
        a.children.push(method("m", "file:///a.php", SymbolModifier::PUBLIC, "int"));
        store.add(a);
        let mut b = class("\\B", "file:///b.php");
        b.parent_fqn = Some("\\A".to_string());
        store.add(b);

        let hits = store.member_lookup(
            "\\B",
            None,
            SymbolKind::METHOD,
            SymbolModifier::NONE,
            SymbolModifier::NONE,
        );
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn trait_members_flatten_with_class_precedence() {
        let mut store = SymbolStore::new();
        let mut greets = PhpSymbol::new(SymbolKind::TRAIT, "\\Greets", "file:///t.php");
        greets.children.push(method("hello", "file:///t.php", SymbolModifier::PUBLIC, "string"));
        greets.children.push(method("bye", "file:///t.php", SymbolModifier::PUBLIC, "string"));
        store.add(greets);

        let mut user = class("\\User", "file:///u.php");
        user.trait_fqns.push("\\Greets".to_string());
        user.children.push(method("hello", "file:///u.php", SymbolModifier::PUBLIC, "void"));
        store.add(user);

        let hits = store.member_lookup(
            "\\User",
            None,
            SymbolKind::METHOD,
            SymbolModifier::NONE,
            SymbolModifier::NONE,
        );
        let hello = hits.iter().find(|m| m.name == "hello").unwrap();
        assert_eq!(hello.type_expr, "void", "class's own member wins over the trait's");
        assert!(hits.iter().any(|m| m.name == "bye"));
    }
}
