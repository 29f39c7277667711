//! The declared-symbol data model.
//!
//! A [`PhpSymbol`] represents one declared PHP identifier: class-likes,
//! functions, methods, properties, constants, parameters.  Top-level
//! symbols carry canonical fully-qualified names (leading `\`); members
//! carry their bare member name and live in their container's `children`.
//!
//! Class-like symbols record their parent class, implemented interfaces,
//! and used traits by FQN (index-by-name, never by owning reference) so
//! the store's member lookup can walk inheritance chains without cyclic
//! ownership.

use bitflags::bitflags;

use crate::type_string::TypeString;

bitflags! {
    /// Which kinds of symbol a query should match.
    ///
    /// Single-bit values double as the kind of an individual symbol, so
    /// queries can pass unions (`CLASS | INTERFACE | TRAIT`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolKind: u16 {
        const NAMESPACE      = 1 << 0;
        const CLASS          = 1 << 1;
        const INTERFACE      = 1 << 2;
        const TRAIT          = 1 << 3;
        const CONSTANT       = 1 << 4;
        const FUNCTION       = 1 << 5;
        const METHOD         = 1 << 6;
        const PROPERTY       = 1 << 7;
        const CLASS_CONSTANT = 1 << 8;
        const PARAMETER      = 1 << 9;
        const VARIABLE       = 1 << 10;

        const CLASS_LIKE = Self::CLASS.bits() | Self::INTERFACE.bits() | Self::TRAIT.bits();
        const MEMBER = Self::METHOD.bits() | Self::PROPERTY.bits() | Self::CLASS_CONSTANT.bits();
        const ANY = u16::MAX;
    }
}

bitflags! {
    /// PHP access and storage modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SymbolModifier: u16 {
        const PUBLIC    = 1 << 0;
        const PROTECTED = 1 << 1;
        const PRIVATE   = 1 << 2;
        const STATIC    = 1 << 3;
        const ABSTRACT  = 1 << 4;
        const FINAL     = 1 << 5;
        const MAGIC     = 1 << 6;
        const READONLY  = 1 << 7;

        const NONE = 0;
        const VISIBILITY = Self::PUBLIC.bits() | Self::PROTECTED.bits() | Self::PRIVATE.bits();
    }
}

#[derive(Debug, Clone)]
pub struct PhpSymbol {
    pub kind: SymbolKind,
    /// Canonical FQN for top-level symbols; bare member name otherwise.
    pub name: String,
    pub modifiers: SymbolModifier,
    /// Textual type expression: declared hint, docblock type, or both
    /// resolved into one string.  Empty when unknown.
    pub type_expr: String,
    /// Leading docblock text, when present.
    pub documentation: Option<String>,
    /// Declaring file.
    pub uri: String,
    /// Byte range of the whole declaration.
    pub range: (u32, u32),
    /// Byte range of the declared name (selection range).
    pub name_range: (u32, u32),
    /// Method parameters, class members.
    pub children: Vec<PhpSymbol>,
    /// `extends` target, as a canonical FQN.
    pub parent_fqn: Option<String>,
    /// `implements` targets in declaration order, canonical FQNs.
    pub interface_fqns: Vec<String>,
    /// `use`d traits in declaration order, canonical FQNs.
    pub trait_fqns: Vec<String>,
}

impl PhpSymbol {
    pub fn new(kind: SymbolKind, name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            modifiers: SymbolModifier::NONE,
            type_expr: String::new(),
            documentation: None,
            uri: uri.into(),
            range: (0, 0),
            name_range: (0, 0),
            children: Vec::new(),
            parent_fqn: None,
            interface_fqns: Vec::new(),
            trait_fqns: Vec::new(),
        }
    }

    pub fn is_class_like(&self) -> bool {
        self.kind.intersects(SymbolKind::CLASS_LIKE)
    }

    /// Effective visibility, defaulting to public the way PHP does when
    /// no modifier is written.
    pub fn visibility(&self) -> SymbolModifier {
        let vis = self.modifiers & SymbolModifier::VISIBILITY;
        if vis.is_empty() { SymbolModifier::PUBLIC } else { vis }
    }

    pub fn declared_type(&self) -> TypeString {
        TypeString::from_expr(&self.type_expr)
    }

    /// The short (unqualified) display name.
    pub fn short_name(&self) -> &str {
        crate::util::short_name(&self.name)
    }
}

/// Union of the declared type strings of a symbol set, atoms de-duplicated.
pub fn merge_types(symbols: &[PhpSymbol]) -> TypeString {
    let mut out = TypeString::empty();
    for symbol in symbols {
        out.merge(&symbol.declared_type());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_defaults_to_public() {
        let sym = PhpSymbol::new(SymbolKind::METHOD, "frob", "file:///a.php");
        assert_eq!(sym.visibility(), SymbolModifier::PUBLIC);

        let mut sym = sym;
        sym.modifiers = SymbolModifier::PRIVATE | SymbolModifier::STATIC;
        assert_eq!(sym.visibility(), SymbolModifier::PRIVATE);
    }

    #[test]
    fn merge_types_unions_and_dedupes() {
        let mut a = PhpSymbol::new(SymbolKind::PROPERTY, "x", "file:///a.php");
        a.type_expr = "int|null".into();
        let mut b = PhpSymbol::new(SymbolKind::PROPERTY, "x", "file:///b.php");
        b.type_expr = "string|int".into();
        assert_eq!(merge_types(&[a, b]).to_string(), "int|null|string");
    }
}
