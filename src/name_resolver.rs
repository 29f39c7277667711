//! PHP name resolution: namespaces, `use` imports, and class context.
//!
//! [`NameResolver`] holds the state needed to turn a name as written in
//! source into a canonical FQN: the current namespace, the ordered `use`
//! declarations (class, function, and constant kinds), and a stack of
//! class-context frames pushed at class-body entry.
//!
//! Per PHP's rules, unqualified function and constant names fall back to
//! the global namespace when the namespace-prefixed name is not declared.
//! That fallback requires consulting the symbol store, so it belongs to
//! the *caller*: the resolver itself only produces candidate FQNs.
//!
//! [`NameResolverVisitor`] feeds the resolver during a traversal and is
//! composed with other visitors through `MultiVisitor`, so a single pass
//! sees every name with the correct namespace and import context.

use std::cell::RefCell;
use std::rc::Rc;

use mago_syntax::ast::*;

use crate::node::Node;
use crate::traverse::TreeVisitor;
use crate::type_string::TypeString;
use crate::util::{canonical_fqn, join_fqn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    ClassLike,
    Function,
    Constant,
}

#[derive(Debug, Clone)]
pub struct ImportRule {
    pub kind: ImportKind,
    /// Canonical FQN of the imported symbol.
    pub fqn: String,
    /// The local alias: an explicit `as` name or the FQN's last segment.
    pub alias: String,
}

/// One class body the resolver is currently inside.
#[derive(Debug, Clone)]
pub struct ClassContext {
    /// Canonical FQN of the class.
    pub fqn: String,
    /// Canonical FQN of the `extends` target, when present.
    pub parent_fqn: Option<String>,
}

#[derive(Debug, Default)]
pub struct NameResolver {
    /// Current namespace without separators, `""` at the root.
    pub namespace: String,
    pub imports: Vec<ImportRule>,
    class_stack: Vec<ClassContext>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolution for a name that is known not to be declared locally:
    /// the namespace-prefixed FQN, which is where PHP would autoload it
    /// from.
    pub fn resolve_not_found_class_name(&self, text: &str) -> String {
        join_fqn(&self.namespace, text)
    }

    /// Resolve a `namespace\Sub\Name` relative reference.
    pub fn resolve_relative_name(&self, text: &str) -> String {
        let rest = text
            .strip_prefix("namespace\\")
            .or_else(|| text.strip_prefix("Namespace\\"))
            .unwrap_or(text);
        join_fqn(&self.namespace, rest)
    }

    /// Resolve a possibly aliased, possibly qualified name against the
    /// `use` table and the current namespace.
    ///
    /// Fully-qualified input (`\Foo\Bar`) is canonicalised and returned
    /// as-is.  Otherwise the first segment is matched against the import
    /// aliases of the requested kind; on a hit the alias expands to its
    /// FQN (plus any trailing segments).  With no matching import the
    /// name lives in the current namespace.
    pub fn resolve_qualified_name(&self, text: &str, kind: ImportKind) -> String {
        if text.is_empty() {
            return String::new();
        }
        if text.starts_with('\\') {
            return canonical_fqn(text);
        }
        if text.starts_with("namespace\\") || text.starts_with("Namespace\\") {
            return self.resolve_relative_name(text);
        }

        let (first, rest) = match text.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (text, None),
        };

        // A qualified name's leading segment may only be aliased by a
        // class-like import (`use A\B; new B\C();`); single-segment
        // names match imports of their own kind.
        let wanted = if rest.is_some() { ImportKind::ClassLike } else { kind };
        for import in &self.imports {
            if import.kind == wanted && import.alias == first {
                return match rest {
                    Some(rest) => format!("{}\\{}", import.fqn, rest),
                    None => import.fqn.clone(),
                };
            }
        }

        join_fqn(&self.namespace, text)
    }

    pub fn push_class(&mut self, context: ClassContext) {
        self.class_stack.push(context);
    }

    pub fn pop_class(&mut self) {
        self.class_stack.pop();
    }

    /// The innermost class context, when inside a class body.
    pub fn class_context(&self) -> Option<&ClassContext> {
        self.class_stack.last()
    }

    /// FQN of the current class.
    pub fn class_name(&self) -> Option<&str> {
        self.class_stack.last().map(|c| c.fqn.as_str())
    }

    /// FQN of the current class's parent.
    pub fn class_base_name(&self) -> Option<&str> {
        self.class_stack
            .last()
            .and_then(|c| c.parent_fqn.as_deref())
    }

    /// Resolve `self` / `static` / `parent` / a written class name to a
    /// canonical FQN in the current context.
    pub fn resolve_class_designator(&self, text: &str) -> Option<String> {
        match text {
            "self" | "static" | "Self" | "Static" => self.class_name().map(str::to_string),
            "parent" | "Parent" => self.class_base_name().map(str::to_string),
            _ => Some(self.resolve_qualified_name(text, ImportKind::ClassLike)),
        }
    }

    /// Resolve a written type expression (`User|int|null`, `?Foo`,
    /// `User[]`, `list<User>`) into a [`TypeString`] with canonical
    /// class atoms.
    ///
    /// Primitives are normalised to lowercase; class names go through
    /// import/namespace resolution; generic iterables collapse to their
    /// element type with an array-of suffix.
    pub fn resolve_type_expr(&self, expr: &str) -> TypeString {
        let mut out = TypeString::empty();
        for raw in expr.split('|') {
            let mut atom = raw.trim();
            if atom.is_empty() {
                continue;
            }
            let nullable = atom.starts_with('?');
            if nullable {
                atom = &atom[1..];
            }
            self.push_resolved_atom(&mut out, atom);
            if nullable {
                out.push_atom("null");
            }
        }
        out
    }

    fn push_resolved_atom(&self, out: &mut TypeString, atom: &str) {
        if let Some(element) = atom.strip_suffix("[]") {
            let inner = self.resolve_type_expr(element);
            for resolved in inner.atoms() {
                out.push_atom(&format!("{}[]", resolved));
            }
            return;
        }
        if atom.contains('<') {
            // Generic iterables carry their payload in the value slot;
            // `list<User>` behaves as `User[]` for element extraction.
            if let Some(value) = crate::docblock::generic_value_type(atom) {
                let inner = self.resolve_type_expr(&value);
                for resolved in inner.atoms() {
                    out.push_atom(&format!("{}[]", resolved));
                }
                return;
            }
        }
        let lowered = atom.to_lowercase();
        if crate::type_string::PRIMITIVE_TYPES.contains(&lowered.as_str()) {
            out.push_atom(&lowered);
            return;
        }
        match atom {
            "self" | "static" | "parent" => {
                match self.resolve_class_designator(&lowered) {
                    Some(fqn) => out.push_atom(&fqn),
                    None => out.push_atom(atom),
                }
            }
            _ => out.push_atom(&self.resolve_qualified_name(atom, ImportKind::ClassLike)),
        }
    }
}

/// Maintains a shared [`NameResolver`] in step with a traversal.
pub struct NameResolverVisitor {
    pub resolver: Rc<RefCell<NameResolver>>,
}

impl NameResolverVisitor {
    pub fn new(resolver: Rc<RefCell<NameResolver>>) -> Self {
        Self { resolver }
    }

    fn record_use_items(&self, items: &UseItems) {
        let mut resolver = self.resolver.borrow_mut();
        match items {
            UseItems::Sequence(seq) => {
                for item in seq.items.iter() {
                    push_import(&mut resolver, ImportKind::ClassLike, item, None);
                }
            }
            UseItems::TypedSequence(seq) => {
                let kind = if seq.r#type.is_function() {
                    ImportKind::Function
                } else if seq.r#type.is_const() {
                    ImportKind::Constant
                } else {
                    ImportKind::ClassLike
                };
                for item in seq.items.iter() {
                    push_import(&mut resolver, kind, item, None);
                }
            }
            UseItems::TypedList(list) => {
                let kind = if list.r#type.is_function() {
                    ImportKind::Function
                } else if list.r#type.is_const() {
                    ImportKind::Constant
                } else {
                    ImportKind::ClassLike
                };
                let prefix = crate::util::bstr(list.namespace.value());
                for item in list.items.iter() {
                    push_import(&mut resolver, kind, item, Some(prefix));
                }
            }
            UseItems::MixedList(list) => {
                let prefix = crate::util::bstr(list.namespace.value());
                for maybe_typed in list.items.iter() {
                    let kind = match &maybe_typed.r#type {
                        Some(t) if t.is_function() => ImportKind::Function,
                        Some(t) if t.is_const() => ImportKind::Constant,
                        _ => ImportKind::ClassLike,
                    };
                    push_import(&mut resolver, kind, &maybe_typed.item, Some(prefix));
                }
            }
        }
    }
}

fn push_import(
    resolver: &mut NameResolver,
    kind: ImportKind,
    item: &UseItem,
    group_prefix: Option<&str>,
) {
    let item_name = crate::util::bstr(item.name.value());
    let fqn = match group_prefix {
        Some(prefix) => canonical_fqn(&format!("{}\\{}", prefix, item_name)),
        None => canonical_fqn(item_name),
    };
    let alias = match &item.alias {
        Some(alias) => crate::util::bstr(alias.identifier.value).to_string(),
        None => crate::util::short_name(&fqn).to_string(),
    };
    resolver.imports.push(ImportRule { kind, fqn, alias });
}

impl<'a> TreeVisitor<Node<'a>> for NameResolverVisitor {
    fn preorder(&mut self, node: Node<'a>, _spine: &[Node<'a>]) -> bool {
        match node {
            Node::Statement(Statement::Namespace(ns)) => {
                let name = ns
                    .name
                    .as_ref()
                    .map(|ident| crate::util::bstr(ident.value()).to_string())
                    .unwrap_or_default();
                self.resolver.borrow_mut().namespace = name;
                true
            }
            Node::Statement(Statement::Use(use_stmt)) => {
                self.record_use_items(&use_stmt.items);
                false
            }
            Node::Statement(Statement::Class(class)) => {
                let fqn = {
                    let resolver = self.resolver.borrow();
                    resolver.resolve_not_found_class_name(crate::util::bstr(class.name.value))
                };
                let parent_fqn = class.extends.as_ref().and_then(|ext| {
                    ext.types.first().map(|ident| {
                        self.resolver
                            .borrow()
                            .resolve_qualified_name(crate::util::bstr(ident.value()), ImportKind::ClassLike)
                    })
                });
                self.resolver.borrow_mut().push_class(ClassContext { fqn, parent_fqn });
                true
            }
            Node::Statement(Statement::Interface(iface)) => {
                let fqn = self
                    .resolver
                    .borrow()
                    .resolve_not_found_class_name(crate::util::bstr(iface.name.value));
                let parent_fqn = iface.extends.as_ref().and_then(|ext| {
                    ext.types.first().map(|ident| {
                        self.resolver
                            .borrow()
                            .resolve_qualified_name(crate::util::bstr(ident.value()), ImportKind::ClassLike)
                    })
                });
                self.resolver.borrow_mut().push_class(ClassContext { fqn, parent_fqn });
                true
            }
            Node::Statement(Statement::Trait(trait_def)) => {
                let fqn = self
                    .resolver
                    .borrow()
                    .resolve_not_found_class_name(crate::util::bstr(trait_def.name.value));
                self.resolver
                    .borrow_mut()
                    .push_class(ClassContext { fqn, parent_fqn: None });
                true
            }
            Node::Statement(Statement::Enum(enum_def)) => {
                let fqn = self
                    .resolver
                    .borrow()
                    .resolve_not_found_class_name(crate::util::bstr(enum_def.name.value));
                self.resolver
                    .borrow_mut()
                    .push_class(ClassContext { fqn, parent_fqn: None });
                true
            }
            _ => true,
        }
    }

    fn postorder(&mut self, node: Node<'a>, _spine: &[Node<'a>]) {
        if let Node::Statement(stmt) = node
            && matches!(
                stmt,
                Statement::Class(_)
                    | Statement::Interface(_)
                    | Statement::Trait(_)
                    | Statement::Enum(_)
            )
        {
            self.resolver.borrow_mut().pop_class();
        }
    }
}

/// Run only the name-resolver visitor over a program, returning the final
/// resolver state.  Used when a caller needs the namespace and import
/// table but not a full analysis.
pub fn resolve_names(program: &Program<'_>) -> NameResolver {
    let resolver = Rc::new(RefCell::new(NameResolver::new()));
    let mut visitor = NameResolverVisitor::new(resolver.clone());
    crate::traverse::traverse(Node::Program(program), &mut visitor);
    drop(visitor);
    Rc::try_unwrap(resolver)
        .map(RefCell::into_inner)
        .unwrap_or_default()
}
