//! Scoped, branch-aware variable type tracking.
//!
//! The table is a stack of scopes; each scope holds a stack of *branch*
//! maps plus a pending-join set.  `setType` writes into the active
//! (topmost) branch.  Reads search the active scope's branches from the
//! top down, so a type narrowed inside a branch shadows the outer
//! binding while the branch is live.  Scopes isolate completely: reads
//! never cross a scope boundary.
//!
//! Control-flow joins work in two steps: `popBranch` folds the finished
//! arm into the scope's pending-join set (reads do not consult it), and
//! `pruneBranches` publishes the pending set into the surviving base
//! branch as per-name unions.  After an `if`/`else`, both arms therefore
//! contribute to the joined type.

use std::collections::HashMap;

use crate::error::ServiceError;
use crate::type_string::TypeString;

type VarMap = HashMap<String, TypeString>;

#[derive(Debug, Default)]
struct Scope {
    /// Always at least one entry; index 0 is the base branch.
    branches: Vec<VarMap>,
    /// Types folded out of popped branches, awaiting `prune_branches`.
    joined: VarMap,
}

impl Scope {
    fn new() -> Self {
        Self { branches: vec![VarMap::new()], joined: VarMap::new() }
    }
}

#[derive(Debug)]
pub struct VariableTable {
    scopes: Vec<Scope>,
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableTable {
    pub fn new() -> Self {
        Self { scopes: vec![Scope::new()] }
    }

    fn active_scope(&self) -> &Scope {
        self.scopes.last().expect("variable table always has a scope")
    }

    fn active_scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("variable table always has a scope")
    }

    /// Union `type_string` into the active branch's entry for `name`.
    pub fn set_type(&mut self, name: &str, type_string: TypeString) {
        if name.is_empty() || type_string.is_empty() {
            return;
        }
        let branch = self
            .active_scope_mut()
            .branches
            .last_mut()
            .expect("scope always has a branch");
        branch
            .entry(name.to_string())
            .and_modify(|existing| existing.merge(&type_string))
            .or_insert(type_string);
    }

    /// Bind several names to the same type (list destructuring).
    pub fn set_type_many(&mut self, names: &[String], type_string: TypeString) {
        for name in names {
            self.set_type(name, type_string.clone());
        }
    }

    /// Replace the active branch's entry for `name` outright.  Used by
    /// `instanceof` narrowing, where the narrowed type must not union
    /// with the broader one.
    pub fn replace_type(&mut self, name: &str, type_string: TypeString) {
        if name.is_empty() {
            return;
        }
        let branch = self
            .active_scope_mut()
            .branches
            .last_mut()
            .expect("scope always has a branch");
        branch.insert(name.to_string(), type_string);
    }

    /// Push a fresh scope.  Each name in `carry` has its currently
    /// resolved type copied into the new scope (closure `use` clauses,
    /// `$this` in method bodies).
    pub fn push_scope(&mut self, carry: &[String]) {
        let mut scope = Scope::new();
        for name in carry {
            let type_string = self.get_type(name, None);
            if !type_string.is_empty() {
                scope.branches[0].insert(name.clone(), type_string);
            }
        }
        self.scopes.push(scope);
    }

    /// Pop the current scope.  Popping the root scope is a structural
    /// contract violation: the error is returned and the table is left
    /// untouched.
    pub fn pop_scope(&mut self) -> Result<(), ServiceError> {
        if self.scopes.len() <= 1 {
            return Err(ServiceError::ScopeUnderflow);
        }
        self.scopes.pop();
        Ok(())
    }

    /// Push a fresh branch onto the active scope.
    pub fn push_branch(&mut self) {
        self.active_scope_mut().branches.push(VarMap::new());
    }

    /// Fold the top branch into the scope's pending-join set.  Popping
    /// the base branch is a structural contract violation: the error is
    /// returned and the table is left untouched.
    pub fn pop_branch(&mut self) -> Result<(), ServiceError> {
        let scope = self.active_scope_mut();
        if scope.branches.len() <= 1 {
            return Err(ServiceError::BranchUnderflow);
        }
        let finished = scope.branches.pop().expect("branch stack checked non-empty");
        for (name, type_string) in finished {
            scope
                .joined
                .entry(name)
                .and_modify(|existing| existing.merge(&type_string))
                .or_insert(type_string);
        }
        Ok(())
    }

    /// Consolidate every branch of the active scope (and the pending-join
    /// set) into a single base branch by per-name union.
    pub fn prune_branches(&mut self) {
        let scope = self.active_scope_mut();
        let mut branches = std::mem::take(&mut scope.branches).into_iter();
        let mut base = branches.next().unwrap_or_default();
        // Any still-open branches beyond the base fold in too, then the
        // pending set from popped branches.
        let pending = std::mem::take(&mut scope.joined);
        for source in branches.chain(std::iter::once(pending)) {
            for (name, type_string) in source {
                base.entry(name)
                    .and_modify(|existing| existing.merge(&type_string))
                    .or_insert(type_string);
            }
        }
        scope.branches = vec![base];
    }

    /// Read `name` from the active scope, searching branches top-down.
    ///
    /// `$this` and `static` substitute `class_name` when given.  Unbound
    /// names yield the empty type.
    pub fn get_type(&self, name: &str, class_name: Option<&str>) -> TypeString {
        if let Some(class) = class_name
            && (name == "$this" || name == "static")
        {
            return TypeString::atom(class);
        }
        let scope = self.active_scope();
        for branch in scope.branches.iter().rev() {
            if let Some(type_string) = branch.get(name) {
                return match class_name {
                    Some(class) => type_string.substitute_class(class),
                    None => type_string.clone(),
                };
            }
        }
        TypeString::empty()
    }

    /// Every name bound anywhere in the active scope, for carry-all
    /// captures (arrow functions) and variable-name completion.
    pub fn bound_names(&self) -> Vec<String> {
        let scope = self.active_scope();
        let mut names: Vec<String> = Vec::new();
        for branch in &scope.branches {
            for name in branch.keys() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(expr: &str) -> TypeString {
        TypeString::from_expr(expr)
    }

    #[test]
    fn set_type_unions_into_active_branch() {
        let mut table = VariableTable::new();
        table.set_type("$x", ts("int"));
        table.set_type("$x", ts("string"));
        assert_eq!(table.get_type("$x", None).to_string(), "int|string");
    }

    #[test]
    fn branch_join_unions_both_arms() {
        let mut table = VariableTable::new();
        table.push_branch();
        table.set_type("$x", ts("int"));
        table.pop_branch().unwrap();
        table.push_branch();
        table.set_type("$x", ts("string"));
        table.pop_branch().unwrap();
        table.prune_branches();

        let joined = table.get_type("$x", None);
        assert!(joined.contains("int") && joined.contains("string"));
    }

    #[test]
    fn popped_branch_is_invisible_until_prune() {
        let mut table = VariableTable::new();
        table.push_branch();
        table.set_type("$x", ts("int"));
        table.pop_branch().unwrap();
        // Before the join is published, $x is unbound in the base branch.
        assert!(table.get_type("$x", None).is_empty());
        table.prune_branches();
        assert_eq!(table.get_type("$x", None).to_string(), "int");
    }

    #[test]
    fn reads_fall_through_open_branches() {
        let mut table = VariableTable::new();
        table.set_type("$x", ts("int"));
        table.push_branch();
        // Inside the branch the outer binding is still visible …
        assert_eq!(table.get_type("$x", None).to_string(), "int");
        // … until the branch narrows it.
        table.replace_type("$x", ts("\\App\\User"));
        assert_eq!(table.get_type("$x", None).to_string(), "\\App\\User");
        table.pop_branch().unwrap();
        assert_eq!(table.get_type("$x", None).to_string(), "int");
    }

    #[test]
    fn scope_isolation() {
        let mut table = VariableTable::new();
        table.set_type("$x", ts("int"));
        table.push_scope(&[]);
        assert!(table.get_type("$x", None).is_empty());
        table.set_type("$x", ts("string"));
        table.pop_scope().unwrap();
        assert_eq!(table.get_type("$x", None).to_string(), "int");
    }

    #[test]
    fn scope_carry_copies_current_types() {
        let mut table = VariableTable::new();
        table.set_type("$user", ts("\\App\\User"));
        table.push_scope(&["$user".to_string()]);
        assert_eq!(table.get_type("$user", None).to_string(), "\\App\\User");
        table.pop_scope().unwrap();
    }

    #[test]
    fn this_substitutes_class_name() {
        let table = VariableTable::new();
        assert_eq!(
            table.get_type("$this", Some("\\App\\User")).to_string(),
            "\\App\\User"
        );
    }

    #[test]
    fn underflow_is_detected_and_state_preserved() {
        let mut table = VariableTable::new();
        table.set_type("$x", ts("int"));
        assert_eq!(table.pop_scope(), Err(ServiceError::ScopeUnderflow));
        assert_eq!(table.pop_branch(), Err(ServiceError::BranchUnderflow));
        assert_eq!(table.get_type("$x", None).to_string(), "int");
    }
}
