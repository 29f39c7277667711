//! Pipe-separated PHP type expressions.
//!
//! A [`TypeString`] is an ordered, de-duplicated set of type atoms joined
//! with `|`.  Atoms are PHP primitives (`int`, `string`, …), array-of
//! suffixes (`T[]`), or fully-qualified class names with a leading `\`.
//! The empty set renders as `""` and means "unknown".
//!
//! Atoms keep their insertion order so that inferred unions read the way
//! the code assigns them (`int|string` for an int-then-string join).

use std::fmt;

/// PHP primitive type names that are kept verbatim as atoms.
pub const PRIMITIVE_TYPES: &[&str] = &[
    "int", "string", "bool", "float", "array", "mixed", "null", "void", "object", "resource",
    "callable", "iterable", "static", "$this", "never", "false", "true",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeString {
    atoms: Vec<String>,
}

impl TypeString {
    /// The unknown type (no atoms).
    pub fn empty() -> Self {
        Self { atoms: Vec::new() }
    }

    /// Parse a `|`-separated type expression.  Whitespace around atoms is
    /// ignored; duplicates collapse to the first occurrence.
    pub fn from_expr(expr: &str) -> Self {
        let mut ts = Self::empty();
        for atom in expr.split('|') {
            let atom = atom.trim();
            if !atom.is_empty() {
                ts.push_atom(atom);
            }
        }
        ts
    }

    /// A single-atom type.
    pub fn atom(atom: &str) -> Self {
        let mut ts = Self::empty();
        ts.push_atom(atom);
        ts
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[String] {
        &self.atoms
    }

    pub fn contains(&self, atom: &str) -> bool {
        self.atoms.iter().any(|a| a == atom)
    }

    /// Add one atom, preserving insertion order and uniqueness.
    /// A leading `?` (nullable shorthand) expands to the atom plus `null`.
    pub fn push_atom(&mut self, atom: &str) {
        if let Some(inner) = atom.strip_prefix('?') {
            self.push_atom(inner);
            self.push_atom("null");
            return;
        }
        if !self.contains(atom) {
            self.atoms.push(atom.to_string());
        }
    }

    /// Union another type into this one.
    pub fn merge(&mut self, other: &TypeString) {
        for atom in &other.atoms {
            self.push_atom(atom);
        }
    }

    /// Union of two types.
    pub fn merged(mut self, other: &TypeString) -> TypeString {
        self.merge(other);
        self
    }

    /// Wrap every atom in an array-of suffix: `int` → `int[]`.
    pub fn array_of(&self) -> TypeString {
        let mut out = TypeString::empty();
        for atom in &self.atoms {
            out.push_atom(&format!("{}[]", atom));
        }
        out
    }

    /// The element type obtained by subscripting this type.
    ///
    /// `T[]` contributes `T`; `string` contributes `string` (PHP string
    /// offsets are one-character strings); bare `array` and `iterable`
    /// contribute `mixed`.  Atoms that cannot be subscripted contribute
    /// nothing.
    pub fn element_type(&self) -> TypeString {
        let mut out = TypeString::empty();
        for atom in &self.atoms {
            if let Some(element) = atom.strip_suffix("[]") {
                out.push_atom(element);
            } else if atom == "string" {
                out.push_atom("string");
            } else if atom == "array" || atom == "iterable" {
                out.push_atom("mixed");
            }
        }
        out
    }

    /// Replace `$this`, `static`, and `self` atoms with the given class
    /// FQN.  Used when reading types in the context of a class body.
    pub fn substitute_class(&self, class_fqn: &str) -> TypeString {
        let mut out = TypeString::empty();
        for atom in &self.atoms {
            if atom == "$this" || atom == "static" || atom == "self" {
                out.push_atom(class_fqn);
            } else {
                out.push_atom(atom);
            }
        }
        out
    }

    /// The class-like atoms (leading `\`), e.g. for member lookup.
    pub fn class_atoms(&self) -> impl Iterator<Item = &str> {
        self.atoms.iter().map(|a| a.as_str()).filter(|a| a.starts_with('\\'))
    }
}

impl fmt::Display for TypeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.atoms.join("|"))
    }
}

impl From<&str> for TypeString {
    fn from(expr: &str) -> Self {
        TypeString::from_expr(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dedupes_and_keeps_order() {
        let ts = TypeString::from_expr("int|string|int");
        assert_eq!(ts.to_string(), "int|string");
    }

    #[test]
    fn empty_means_unknown() {
        assert_eq!(TypeString::empty().to_string(), "");
        assert!(TypeString::from_expr("").is_empty());
    }

    #[test]
    fn nullable_shorthand_expands() {
        assert_eq!(TypeString::from_expr("?\\App\\User").to_string(), "\\App\\User|null");
    }

    #[test]
    fn merge_unions_atoms() {
        let a = TypeString::from_expr("int");
        let b = TypeString::from_expr("string|int");
        assert_eq!(a.merged(&b).to_string(), "int|string");
    }

    #[test]
    fn element_type_unwraps_arrays() {
        assert_eq!(TypeString::from_expr("int[]").element_type().to_string(), "int");
        assert_eq!(TypeString::from_expr("array").element_type().to_string(), "mixed");
        assert_eq!(TypeString::from_expr("string").element_type().to_string(), "string");
        assert!(TypeString::from_expr("\\Foo").element_type().is_empty());
    }

    #[test]
    fn substitute_class_rewrites_contextual_atoms() {
        let ts = TypeString::from_expr("static|int");
        assert_eq!(ts.substitute_class("\\App\\User").to_string(), "\\App\\User|int");
    }
}
