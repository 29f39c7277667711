//! Expression-level type inference.
//!
//! [`ExpressionTypeResolver`] assigns a [`TypeString`] to an expression
//! node by structural recursion, consulting the ambient name resolver
//! (namespaces, class context), the symbol store (member and function
//! return types), and the variable table (local bindings).  It is pure:
//! resolution never mutates any of the three.
//!
//! Unresolvable expressions yield the empty type, never an error.

use mago_span::HasSpan;
use mago_syntax::ast::*;

use crate::name_resolver::{ImportKind, NameResolver};
use crate::symbol::{PhpSymbol, SymbolKind, SymbolModifier, merge_types};
use crate::symbol_store::SymbolStore;
use crate::type_string::TypeString;
use crate::util::join_fqn;
use crate::variable_table::VariableTable;

/// Built-in functions with fixed return types.
const KNOWN_RETURN_TYPES: &[(&str, &str)] = &[
    ("intval", "int"),
    ("floatval", "float"),
    ("doubleval", "float"),
    ("strval", "string"),
    ("boolval", "bool"),
    ("settype", "bool"),
    ("count", "int"),
    ("sizeof", "int"),
    ("strlen", "int"),
    ("strpos", "int|false"),
    ("time", "int"),
    ("rand", "int"),
    ("mt_rand", "int"),
    ("sprintf", "string"),
    ("implode", "string"),
    ("join", "string"),
    ("trim", "string"),
    ("ltrim", "string"),
    ("rtrim", "string"),
    ("strtolower", "string"),
    ("strtoupper", "string"),
    ("str_replace", "string"),
    ("substr", "string"),
    ("json_encode", "string|false"),
    ("json_decode", "mixed"),
    ("explode", "string[]"),
    ("str_split", "string[]"),
    ("array_keys", "int[]|string[]"),
    ("get_class", "string"),
    ("gettype", "string"),
    ("in_array", "bool"),
    ("array_key_exists", "bool"),
];

/// Array functions whose result keeps the first argument's array type.
const ARRAY_PRESERVING_FUNCS: &[&str] = &[
    "array_filter",
    "array_values",
    "array_unique",
    "array_reverse",
    "array_slice",
    "array_splice",
    "array_chunk",
    "array_diff",
    "array_intersect",
    "array_merge",
];

/// Array functions extracting a single element from the first argument.
const ARRAY_ELEMENT_FUNCS: &[&str] =
    &["array_pop", "array_shift", "current", "end", "reset", "next", "prev"];

pub struct ExpressionTypeResolver<'r> {
    pub resolver: &'r NameResolver,
    pub store: &'r SymbolStore,
    pub vars: &'r VariableTable,
    /// Full source text, for selector names that are only reachable
    /// textually (static property and class constant designators).
    pub content: &'r str,
}

impl<'r> ExpressionTypeResolver<'r> {
    pub fn new(
        resolver: &'r NameResolver,
        store: &'r SymbolStore,
        vars: &'r VariableTable,
        content: &'r str,
    ) -> Self {
        Self { resolver, store, vars, content }
    }

    pub fn resolve(&self, expr: &Expression<'_>) -> TypeString {
        match expr {
            Expression::Literal(literal) => self.resolve_literal(literal),
            Expression::Variable(variable) => self.resolve_variable(variable),
            Expression::Parenthesized(paren) => self.resolve(paren.expression),
            Expression::Assignment(assignment) => self.resolve(assignment.rhs),
            Expression::Instantiation(inst) => match self.class_designator(inst.class) {
                Some(fqn) => TypeString::atom(&fqn),
                None => TypeString::empty(),
            },
            Expression::Self_(_) | Expression::Static(_) => match self.resolver.class_name() {
                Some(class) => TypeString::atom(class),
                None => TypeString::empty(),
            },
            Expression::Parent(_) => match self.resolver.class_base_name() {
                Some(parent) => TypeString::atom(parent),
                None => TypeString::empty(),
            },
            Expression::Identifier(ident) => self.resolve_constant(crate::util::bstr(ident.value())),
            Expression::Call(call) => self.resolve_call(call),
            Expression::Access(access) => self.resolve_access(access, expr),
            Expression::ArrayAccess(access) => self.resolve(access.array).element_type(),
            Expression::Conditional(cond) => {
                let then_type = match cond.then {
                    Some(then_expr) => self.resolve(then_expr),
                    // Short ternary: the condition value is the result.
                    None => self.resolve(cond.condition),
                };
                then_type.merged(&self.resolve(cond.r#else))
            }
            Expression::Binary(binary) => {
                if binary.operator.is_null_coalesce() {
                    self.resolve(binary.lhs).merged(&self.resolve(binary.rhs))
                } else if binary.operator.is_instanceof() {
                    TypeString::atom("bool")
                } else {
                    TypeString::empty()
                }
            }
            Expression::UnaryPrefix(unary) => {
                if unary.operator.is_not() {
                    TypeString::atom("bool")
                } else {
                    self.resolve(unary.operand)
                }
            }
            Expression::Clone(clone_expr) => self.resolve(clone_expr.object),
            Expression::Match(match_expr) => {
                let mut merged = TypeString::empty();
                for arm in match_expr.arms.iter() {
                    merged.merge(&self.resolve(arm.expression()));
                }
                merged
            }
            Expression::Array(_) | Expression::List(_) | Expression::LegacyArray(_) => {
                TypeString::atom("array")
            }
            Expression::Closure(_) | Expression::ArrowFunction(_) => TypeString::atom("\\Closure"),
            Expression::Throw(_) => TypeString::atom("never"),
            _ => TypeString::empty(),
        }
    }

    fn resolve_literal(&self, literal: &Literal<'_>) -> TypeString {
        match literal {
            Literal::String(_) => TypeString::atom("string"),
            Literal::Integer(_) => TypeString::atom("int"),
            Literal::Float(_) => TypeString::atom("float"),
            Literal::True(_) | Literal::False(_) => TypeString::atom("bool"),
            Literal::Null(_) => TypeString::atom("null"),
            _ => TypeString::empty(),
        }
    }

    fn resolve_variable(&self, variable: &Variable<'_>) -> TypeString {
        match variable {
            Variable::Direct(dv) => self.vars.get_type(crate::util::bstr(dv.name), self.resolver.class_name()),
            // Variable-variables are undecidable without execution.
            _ => TypeString::atom("mixed"),
        }
    }

    /// Resolve a `new C` / `C::` class designator to a canonical FQN,
    /// honouring `self`, `static`, and `parent`.
    pub fn class_designator(&self, expr: &Expression<'_>) -> Option<String> {
        match expr {
            Expression::Identifier(ident) => Some(
                self.resolver
                    .resolve_qualified_name(crate::util::bstr(ident.value()), ImportKind::ClassLike),
            ),
            Expression::Self_(_) | Expression::Static(_) => {
                self.resolver.class_name().map(str::to_string)
            }
            Expression::Parent(_) => self.resolver.class_base_name().map(str::to_string),
            Expression::Parenthesized(paren) => self.class_designator(paren.expression),
            // `$var::method()` dispatches on the variable's class type.
            Expression::Variable(Variable::Direct(dv)) => self
                .vars
                .get_type(crate::util::bstr(dv.name), self.resolver.class_name())
                .class_atoms()
                .next()
                .map(str::to_string),
            _ => None,
        }
    }

    fn resolve_call(&self, call: &Call<'_>) -> TypeString {
        match call {
            Call::Function(func_call) => {
                let Expression::Identifier(ident) = func_call.function else {
                    // Closure invocation or dynamic callee.
                    return TypeString::empty();
                };
                self.function_return_type(crate::util::bstr(ident.value()), &func_call.argument_list)
            }
            Call::Method(method_call) => {
                self.member_call_type(self.resolve(method_call.object), &method_call.method)
            }
            Call::NullSafeMethod(method_call) => self
                .member_call_type(self.resolve(method_call.object), &method_call.method)
                .merged(&TypeString::atom("null")),
            Call::StaticMethod(static_call) => {
                let Some(class_fqn) = self.class_designator(static_call.class) else {
                    return TypeString::empty();
                };
                self.member_call_type(TypeString::atom(&class_fqn), &static_call.method)
            }
        }
    }

    /// Merge of the return types of `name` methods across the class atoms
    /// of `subject`.
    fn member_call_type(
        &self,
        subject: TypeString,
        selector: &ClassLikeMemberSelector<'_>,
    ) -> TypeString {
        let Some(method_name) = selector_name(selector) else {
            return TypeString::empty();
        };
        let mut merged = TypeString::empty();
        for class_fqn in subject.class_atoms() {
            let members = self.store.member_lookup(
                class_fqn,
                Some(&method_name),
                SymbolKind::METHOD,
                SymbolModifier::NONE,
                SymbolModifier::NONE,
            );
            merged.merge(&merge_types(&members).substitute_class(class_fqn));
        }
        merged
    }

    fn resolve_access(&self, access: &Access<'_>, whole: &Expression<'_>) -> TypeString {
        match access {
            Access::Property(pa) => self.property_type(self.resolve(pa.object), &pa.property),
            Access::NullSafeProperty(pa) => self
                .property_type(self.resolve(pa.object), &pa.property)
                .merged(&TypeString::atom("null")),
            Access::StaticProperty(pa) => {
                let Some(class_fqn) = self.class_designator(pa.class) else {
                    return TypeString::empty();
                };
                // The `$name` after `::`, reachable textually.
                let Some(member) = self.member_text_after_scope(whole) else {
                    return TypeString::empty();
                };
                let name = member.trim_start_matches('$');
                self.scoped_member_type(&class_fqn, name, SymbolKind::PROPERTY, SymbolModifier::STATIC)
            }
            Access::ClassConstant(pa) => {
                let Some(class_fqn) = self.class_designator(pa.class) else {
                    return TypeString::empty();
                };
                let Some(member) = self.member_text_after_scope(whole) else {
                    return TypeString::empty();
                };
                if member == "class" {
                    return TypeString::atom("string");
                }
                self.scoped_member_type(
                    &class_fqn,
                    &member,
                    SymbolKind::CLASS_CONSTANT,
                    SymbolModifier::NONE,
                )
            }
        }
    }

    fn property_type(
        &self,
        subject: TypeString,
        selector: &ClassLikeMemberSelector<'_>,
    ) -> TypeString {
        let Some(property_name) = selector_name(selector) else {
            return TypeString::empty();
        };
        let mut merged = TypeString::empty();
        for class_fqn in subject.class_atoms() {
            let members = self.store.member_lookup(
                class_fqn,
                Some(&property_name),
                SymbolKind::PROPERTY,
                SymbolModifier::NONE,
                SymbolModifier::STATIC,
            );
            merged.merge(&merge_types(&members).substitute_class(class_fqn));
        }
        merged
    }

    fn scoped_member_type(
        &self,
        class_fqn: &str,
        member_name: &str,
        kinds: SymbolKind,
        required: SymbolModifier,
    ) -> TypeString {
        let members = self.store.member_lookup(
            class_fqn,
            Some(member_name),
            kinds,
            required,
            SymbolModifier::NONE,
        );
        merge_types(&members).substitute_class(class_fqn)
    }

    /// The member text following the last `::` in the expression's
    /// source range.
    fn member_text_after_scope(&self, expr: &impl HasSpan) -> Option<String> {
        let span = expr.span();
        let text = self
            .content
            .get(span.start.offset as usize..span.end.offset as usize)?;
        let (_, member) = text.rsplit_once("::")?;
        let member: String = member
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            .collect();
        if member.is_empty() { None } else { Some(member) }
    }

    fn function_return_type(&self, written_name: &str, arguments: &ArgumentList<'_>) -> TypeString {
        let bare = written_name.trim_start_matches('\\').to_lowercase();

        for (known, result) in KNOWN_RETURN_TYPES {
            if *known == bare {
                return TypeString::from_expr(result);
            }
        }
        if bare.starts_with("is_") {
            return TypeString::atom("bool");
        }
        if ARRAY_PRESERVING_FUNCS.contains(&bare.as_str()) {
            return self.first_argument_type(arguments);
        }
        if ARRAY_ELEMENT_FUNCS.contains(&bare.as_str()) {
            return self.first_argument_type(arguments).element_type();
        }

        merge_types(&self.lookup_function(written_name))
    }

    /// Candidate order implements PHP's global fallback for unqualified
    /// function names: import table, namespace-local, then global.
    fn lookup_function(&self, written_name: &str) -> Vec<PhpSymbol> {
        let mut candidates = Vec::new();
        candidates.push(
            self.resolver
                .resolve_qualified_name(written_name, ImportKind::Function),
        );
        if !written_name.starts_with('\\') && !written_name.contains('\\') {
            candidates.push(join_fqn("", written_name));
        }
        for candidate in candidates {
            if let Some(symbol) = self.store.find(&candidate, SymbolKind::FUNCTION) {
                return vec![symbol.clone()];
            }
        }
        Vec::new()
    }

    /// Constant fetch, with the same global fallback as functions.
    fn resolve_constant(&self, written_name: &str) -> TypeString {
        let mut candidates = Vec::new();
        candidates.push(
            self.resolver
                .resolve_qualified_name(written_name, ImportKind::Constant),
        );
        if !written_name.starts_with('\\') && !written_name.contains('\\') {
            candidates.push(join_fqn("", written_name));
        }
        for candidate in candidates {
            if let Some(symbol) = self.store.find(&candidate, SymbolKind::CONSTANT) {
                return symbol.declared_type();
            }
        }
        TypeString::empty()
    }

    fn first_argument_type(&self, arguments: &ArgumentList<'_>) -> TypeString {
        let first = arguments.arguments.iter().next();
        match first {
            Some(Argument::Positional(pos)) => self.resolve(pos.value),
            Some(Argument::Named(named)) => self.resolve(named.value),
            None => TypeString::empty(),
        }
    }
}

/// The textual name of a `->member` / `::member` selector; dynamic
/// selectors (`->$name`, `->{expr}`) have none.
pub fn selector_name(selector: &ClassLikeMemberSelector<'_>) -> Option<String> {
    match selector {
        ClassLikeMemberSelector::Identifier(ident) => Some(crate::util::bstr(ident.value).to_string()),
        _ => None,
    }
}
