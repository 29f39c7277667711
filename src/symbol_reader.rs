//! Builds declared-symbol trees from a parsed document.
//!
//! [`SymbolReader`] is a traversal visitor composed with the
//! name-resolver visitor, so every declaration it reads already has the
//! correct namespace, import table, and class context.  It produces
//! owned [`PhpSymbol`] trees: class-likes with their members (including
//! promoted constructor properties and enum cases), standalone
//! functions, and constants from both `const` declarations and top-level
//! `define()` calls.

use std::cell::RefCell;
use std::rc::Rc;

use mago_span::HasSpan;
use mago_syntax::ast::*;

use crate::docblock;
use crate::name_resolver::{ImportKind, NameResolver, NameResolverVisitor};
use crate::node::Node;
use crate::parser::hint_string;
use crate::symbol::{PhpSymbol, SymbolKind, SymbolModifier};
use crate::traverse::{MultiVisitor, TreeVisitor, traverse};
use crate::util::{canonical_fqn, join_fqn};

pub struct SymbolReader<'a> {
    resolver: Rc<RefCell<NameResolver>>,
    uri: String,
    trivias: &'a [Trivia<'a>],
    content: &'a str,
    symbols: Rc<RefCell<Vec<PhpSymbol>>>,
}

/// Parse-tree → symbol trees for one document.
pub fn read_symbols(program: &Program<'_>, content: &str, uri: &str) -> Vec<PhpSymbol> {
    let resolver = Rc::new(RefCell::new(NameResolver::new()));
    let symbols = Rc::new(RefCell::new(Vec::new()));
    let names = NameResolverVisitor::new(resolver.clone());
    let reader = SymbolReader {
        resolver: resolver.clone(),
        uri: uri.to_string(),
        trivias: program.trivia.as_slice(),
        content,
        symbols: symbols.clone(),
    };

    let mut pass: MultiVisitor<'_, Node<'_>> =
        MultiVisitor::new(vec![Box::new(names), Box::new(reader)]);
    traverse(Node::Program(program), &mut pass);
    drop(pass);

    symbols.take()
}

impl<'a> SymbolReader<'a> {
    fn emit(&self, symbol: PhpSymbol) {
        self.symbols.borrow_mut().push(symbol);
    }

    fn range_of(&self, node: &impl HasSpan) -> (u32, u32) {
        let span = node.span();
        (span.start.offset, span.end.offset)
    }

    fn doc_for(&self, node: &impl HasSpan) -> Option<String> {
        docblock::docblock_before(self.trivias, self.content, node).map(str::to_string)
    }

    fn visibility_of<'m>(modifiers: impl Iterator<Item = &'m Modifier<'m>>) -> SymbolModifier {
        for modifier in modifiers {
            if modifier.is_private() {
                return SymbolModifier::PRIVATE;
            }
            if modifier.is_protected() {
                return SymbolModifier::PROTECTED;
            }
            if modifier.is_public() {
                return SymbolModifier::PUBLIC;
            }
        }
        SymbolModifier::PUBLIC
    }

    /// The effective type for a declaration with both a native hint and a
    /// possible docblock annotation: the docblock refines broad hints and
    /// supplies missing ones, but never overrides a concrete scalar.
    fn effective_type(native: Option<String>, doc: Option<String>) -> String {
        match (native, doc) {
            (None, Some(doc)) => doc,
            (Some(native), None) => native,
            (Some(native), Some(doc)) => {
                let broad = matches!(
                    native.trim_start_matches('?'),
                    "mixed" | "object" | "array" | "iterable" | "self" | "static" | "parent"
                );
                if broad { doc } else { native }
            }
            (None, None) => String::new(),
        }
    }

    fn read_parameters(
        &self,
        parameter_list: &FunctionLikeParameterList<'_>,
        docblock_text: Option<&str>,
    ) -> Vec<PhpSymbol> {
        parameter_list
            .parameters
            .iter()
            .map(|param| {
                let name = crate::util::bstr(param.variable.name).to_string();
                let native = param.hint.as_ref().map(|h| hint_string(h));
                let doc = docblock_text.and_then(|d| docblock::param_type(d, &name));
                let mut symbol = PhpSymbol::new(SymbolKind::PARAMETER, &name, &self.uri);
                symbol.type_expr = Self::effective_type(native, doc);
                symbol.range = self.range_of(&param.variable);
                symbol.name_range = symbol.range;
                symbol.modifiers = SymbolModifier::PUBLIC;
                symbol
            })
            .collect()
    }

    fn read_property(&self, member: &ClassLikeMember<'_>, property: &Property<'_>) -> Vec<PhpSymbol> {
        let is_static = property.modifiers().iter().any(|m| m.is_static());
        let visibility = Self::visibility_of(property.modifiers().iter());
        let native = property.hint().map(|h| hint_string(h));
        let docblock_text = self.doc_for(member);
        let doc = docblock_text
            .as_deref()
            .and_then(docblock::var_type)
            .map(|(ty, _)| ty);
        let type_expr = Self::effective_type(native, doc);

        property
            .variables()
            .iter()
            .map(|variable| {
                let raw_name = crate::util::bstr(variable.name).to_string();
                // Property names drop the `$`: access syntax is
                // `$this->name`, not `$this->$name`.
                let name = raw_name.strip_prefix('$').unwrap_or(&raw_name).to_string();
                let mut symbol = PhpSymbol::new(SymbolKind::PROPERTY, name, &self.uri);
                symbol.type_expr = type_expr.clone();
                symbol.modifiers = visibility;
                if is_static {
                    symbol.modifiers |= SymbolModifier::STATIC;
                }
                symbol.documentation = docblock_text.clone();
                symbol.range = self.range_of(variable);
                symbol.name_range = symbol.range;
                symbol
            })
            .collect()
    }

    fn read_members(&self, members: impl Iterator<Item = &'a ClassLikeMember<'a>>, class: &mut PhpSymbol) {
        for member in members {
            match member {
                ClassLikeMember::Method(method) => {
                    // Promoted constructor parameters double as
                    // properties of the class.
                    if crate::util::bstr(method.name.value) == "__construct" {
                        for param in method.parameter_list.parameters.iter() {
                            if !param.is_promoted_property() {
                                continue;
                            }
                            let raw_name = crate::util::bstr(param.variable.name).to_string();
                            let name =
                                raw_name.strip_prefix('$').unwrap_or(&raw_name).to_string();
                            let mut promoted =
                                PhpSymbol::new(SymbolKind::PROPERTY, name, &self.uri);
                            promoted.type_expr = param
                                .hint
                                .as_ref()
                                .map(|h| hint_string(h))
                                .unwrap_or_default();
                            promoted.modifiers = Self::visibility_of(param.modifiers.iter());
                            promoted.range = self.range_of(&param.variable);
                            promoted.name_range = promoted.range;
                            class.children.push(promoted);
                        }
                    }

                    let docblock_text = self.doc_for(method);
                    let mut symbol =
                        PhpSymbol::new(SymbolKind::METHOD, crate::util::bstr(method.name.value), &self.uri);
                    symbol.range = self.range_of(method);
                    symbol.name_range = self.range_of(&method.name);
                    symbol.documentation = docblock_text.clone();

                    let native = method
                        .return_type_hint
                        .as_ref()
                        .map(|rth| hint_string(&rth.hint));
                    let doc = docblock_text.as_deref().and_then(docblock::return_type);
                    symbol.type_expr = Self::effective_type(native, doc);

                    let is_static = method.modifiers.iter().any(|m| m.is_static());
                    symbol.modifiers = Self::visibility_of(method.modifiers.iter());
                    if is_static {
                        symbol.modifiers |= SymbolModifier::STATIC;
                    }
                    if crate::util::bstr(method.name.value).starts_with("__") {
                        symbol.modifiers |= SymbolModifier::MAGIC;
                    }

                    symbol.children =
                        self.read_parameters(&method.parameter_list, docblock_text.as_deref());
                    class.children.push(symbol);
                }
                ClassLikeMember::Property(property) => {
                    class.children.extend(self.read_property(member, property));
                }
                ClassLikeMember::Constant(constant) => {
                    let type_expr = constant
                        .hint
                        .as_ref()
                        .map(|h| hint_string(h))
                        .unwrap_or_default();
                    let visibility = Self::visibility_of(constant.modifiers.iter());
                    for item in constant.items.iter() {
                        let mut symbol =
                            PhpSymbol::new(SymbolKind::CLASS_CONSTANT, crate::util::bstr(item.name.value), &self.uri);
                        symbol.type_expr = type_expr.clone();
                        symbol.modifiers = visibility | SymbolModifier::STATIC;
                        symbol.range = self.range_of(&item.name);
                        symbol.name_range = symbol.range;
                        class.children.push(symbol);
                    }
                }
                ClassLikeMember::EnumCase(enum_case) => {
                    let case_name = enum_case.item.name();
                    let mut symbol =
                        PhpSymbol::new(SymbolKind::CLASS_CONSTANT, crate::util::bstr(case_name.value), &self.uri);
                    symbol.type_expr = class.name.clone();
                    symbol.modifiers = SymbolModifier::PUBLIC | SymbolModifier::STATIC;
                    symbol.range = self.range_of(case_name);
                    symbol.name_range = symbol.range;
                    class.children.push(symbol);
                }
                ClassLikeMember::TraitUse(trait_use) => {
                    let resolver = self.resolver.borrow();
                    for trait_name in trait_use.trait_names.iter() {
                        class
                            .trait_fqns
                            .push(resolver.resolve_qualified_name(crate::util::bstr(trait_name.value()), ImportKind::ClassLike));
                    }
                }
            }
        }
    }

    fn class_like_shell(&self, kind: SymbolKind, node: &impl HasSpan, name: &impl HasSpan) -> PhpSymbol {
        let fqn = self
            .resolver
            .borrow()
            .class_name()
            .map(str::to_string)
            .unwrap_or_default();
        let mut symbol = PhpSymbol::new(kind, fqn, &self.uri);
        symbol.range = self.range_of(node);
        symbol.name_range = self.range_of(name);
        symbol.documentation = self.doc_for(node);
        symbol
    }

    fn resolve_interface_list(&self, types: impl Iterator<Item = String>) -> Vec<String> {
        let resolver = self.resolver.borrow();
        types
            .map(|t| resolver.resolve_qualified_name(&t, ImportKind::ClassLike))
            .collect()
    }
}

impl<'a> TreeVisitor<Node<'a>> for SymbolReader<'a> {
    fn preorder(&mut self, node: Node<'a>, _spine: &[Node<'a>]) -> bool {
        match node {
            Node::Statement(Statement::Namespace(ns)) => {
                if let Some(ident) = &ns.name
                    && !ident.value().is_empty()
                {
                    let mut symbol = PhpSymbol::new(
                        SymbolKind::NAMESPACE,
                        canonical_fqn(crate::util::bstr(ident.value())),
                        &self.uri,
                    );
                    symbol.range = self.range_of(ns);
                    symbol.name_range = self.range_of(ident);
                    self.emit(symbol);
                }
                true
            }
            Node::Statement(Statement::Class(class)) => {
                let mut symbol = self.class_like_shell(SymbolKind::CLASS, class, &class.name);
                if class.modifiers.contains_final() {
                    symbol.modifiers |= SymbolModifier::FINAL;
                }
                symbol.parent_fqn = self.resolver.borrow().class_base_name().map(str::to_string);
                if let Some(implements) = &class.implements {
                    symbol.interface_fqns = self.resolve_interface_list(
                        implements.types.iter().map(|t| crate::util::bstr(t.value()).to_string()),
                    );
                }
                self.read_members(class.members.iter(), &mut symbol);
                self.emit(symbol);
                false
            }
            Node::Statement(Statement::Interface(iface)) => {
                let mut symbol = self.class_like_shell(SymbolKind::INTERFACE, iface, &iface.name);
                symbol.parent_fqn = self.resolver.borrow().class_base_name().map(str::to_string);
                // Additional extended interfaces beyond the first behave
                // like implemented interfaces for member lookup.
                if let Some(extends) = &iface.extends {
                    symbol.interface_fqns = self.resolve_interface_list(
                        extends.types.iter().skip(1).map(|t| crate::util::bstr(t.value()).to_string()),
                    );
                }
                self.read_members(iface.members.iter(), &mut symbol);
                self.emit(symbol);
                false
            }
            Node::Statement(Statement::Trait(trait_def)) => {
                let mut symbol = self.class_like_shell(SymbolKind::TRAIT, trait_def, &trait_def.name);
                self.read_members(trait_def.members.iter(), &mut symbol);
                self.emit(symbol);
                false
            }
            Node::Statement(Statement::Enum(enum_def)) => {
                let mut symbol = self.class_like_shell(SymbolKind::CLASS, enum_def, &enum_def.name);
                symbol.modifiers |= SymbolModifier::FINAL;
                // Enums implicitly implement UnitEnum or BackedEnum.
                let implicit = if enum_def.backing_type_hint.is_some() {
                    "\\BackedEnum"
                } else {
                    "\\UnitEnum"
                };
                symbol.interface_fqns.push(implicit.to_string());
                self.read_members(enum_def.members.iter(), &mut symbol);
                self.emit(symbol);
                false
            }
            Node::Statement(Statement::Function(func)) => {
                let docblock_text = self.doc_for(func);
                let fqn = join_fqn(&self.resolver.borrow().namespace, crate::util::bstr(func.name.value));
                let mut symbol = PhpSymbol::new(SymbolKind::FUNCTION, fqn, &self.uri);
                symbol.range = self.range_of(func);
                symbol.name_range = self.range_of(&func.name);
                symbol.documentation = docblock_text.clone();
                let native = func.return_type_hint.as_ref().map(|rth| hint_string(&rth.hint));
                let doc = docblock_text.as_deref().and_then(docblock::return_type);
                symbol.type_expr = Self::effective_type(native, doc);
                symbol.children =
                    self.read_parameters(&func.parameter_list, docblock_text.as_deref());
                self.emit(symbol);
                true
            }
            Node::Statement(Statement::Constant(const_decl)) => {
                let namespace = self.resolver.borrow().namespace.clone();
                for item in const_decl.items.iter() {
                    let mut symbol = PhpSymbol::new(
                        SymbolKind::CONSTANT,
                        join_fqn(&namespace, crate::util::bstr(item.name.value)),
                        &self.uri,
                    );
                    symbol.range = self.range_of(&item.name);
                    symbol.name_range = symbol.range;
                    self.emit(symbol);
                }
                false
            }
            // `define('NAME', …)` declares a global constant.
            Node::Expression(Expression::Call(Call::Function(func_call))) => {
                if let Expression::Identifier(ident) = func_call.function
                    && crate::util::bstr(ident.value()) == "define"
                {
                    let args: Vec<_> = func_call.argument_list.arguments.iter().collect();
                    if let Some(first) = args.first() {
                        let first_expr = match first {
                            Argument::Positional(pos) => pos.value,
                            Argument::Named(named) => named.value,
                        };
                        if let Expression::Literal(Literal::String(lit_str)) = first_expr
                            && let Some(value) = lit_str.value
                            && !value.is_empty()
                        {
                            let mut symbol = PhpSymbol::new(
                                SymbolKind::CONSTANT,
                                canonical_fqn(crate::util::bstr(value)),
                                &self.uri,
                            );
                            symbol.range = self.range_of(func_call);
                            symbol.name_range = symbol.range;
                            self.emit(symbol);
                        }
                    }
                }
                true
            }
            _ => true,
        }
    }
}

