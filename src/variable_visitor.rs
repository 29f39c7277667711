//! Flow-sensitive variable type tracking across a document.
//!
//! [`VariableTypeVisitor`] walks the parse tree in one pass (composed
//! with the name-resolver visitor) and keeps a [`VariableTable`] in step
//! with the control flow it passes:
//!
//! - class bodies and function-likes push scopes (`$this` carried into
//!   instance contexts, closure `use` clauses copied by value);
//! - assignments, list destructuring, `foreach` bindings, and `catch`
//!   clauses write variable types, with inline `/** @var … */` overrides
//!   taking precedence over inferred right-hand sides;
//! - every control-flow arm is a branch: narrowing from an
//!   `instanceof` condition applies inside the arm, and arms union at
//!   the join when the construct completes.
//!
//! With a halt offset configured, the traversal stops as soon as it
//! passes the offset; the table then holds exactly the bindings live at
//! that position, which is what completion and hover queries need.

use std::cell::RefCell;
use std::rc::Rc;

use mago_syntax::ast::*;

use crate::docblock;
use crate::error::ServiceError;
use crate::name_resolver::{NameResolver, NameResolverVisitor};
use crate::node::{Branch, BranchKind, Node};
use crate::parser::hint_string;
use crate::symbol_store::SymbolStore;
use crate::traverse::{MultiVisitor, TreeVisitor, ancestor, traverse};
use crate::type_resolver::ExpressionTypeResolver;
use crate::type_string::TypeString;
use crate::variable_table::VariableTable;

pub struct VariableTypeVisitor<'a> {
    resolver: Rc<RefCell<NameResolver>>,
    vars: Rc<RefCell<VariableTable>>,
    store: &'a SymbolStore,
    trivias: &'a [Trivia<'a>],
    content: &'a str,
    halt_offset: Option<u32>,
    halted: bool,
    violation: Rc<RefCell<Option<ServiceError>>>,
}

impl<'a> VariableTypeVisitor<'a> {
    pub fn new(
        resolver: Rc<RefCell<NameResolver>>,
        vars: Rc<RefCell<VariableTable>>,
        store: &'a SymbolStore,
        program: &'a Program<'a>,
        content: &'a str,
        halt_offset: Option<u32>,
    ) -> Self {
        Self {
            resolver,
            vars,
            store,
            trivias: program.trivia.as_slice(),
            content,
            halt_offset,
            halted: false,
            violation: Rc::new(RefCell::new(None)),
        }
    }

    /// Shared slot holding the first structural violation the pass hit.
    /// Cloned before the visitor is boxed so the caller can read it
    /// after the traversal.
    pub fn violation_cell(&self) -> Rc<RefCell<Option<ServiceError>>> {
        self.violation.clone()
    }

    /// A scope or branch underflow means the walk and the table are out
    /// of step.  Record the violation and abort the request; the table
    /// itself was left untouched.
    fn record_violation(&mut self, result: Result<(), ServiceError>) {
        if let Err(error) = result {
            let mut slot = self.violation.borrow_mut();
            if slot.is_none() {
                *slot = Some(error);
            }
            self.halted = true;
        }
    }

    fn resolve_expression(&self, expr: &Expression<'_>) -> TypeString {
        let resolver = self.resolver.borrow();
        let vars = self.vars.borrow();
        ExpressionTypeResolver::new(&resolver, self.store, &vars, self.content).resolve(expr)
    }

    fn bind_this(&self) {
        let class = self.resolver.borrow().class_name().map(str::to_string);
        if let Some(class) = class {
            self.vars
                .borrow_mut()
                .replace_type("$this", TypeString::atom(&class));
        }
    }

    fn bind_parameters(&self, parameter_list: &FunctionLikeParameterList<'_>, doc: Option<&str>) {
        let resolver = self.resolver.borrow();
        let mut vars = self.vars.borrow_mut();
        for param in parameter_list.parameters.iter() {
            let name = param.variable.name.to_string();
            let written = param
                .hint
                .as_ref()
                .map(|h| hint_string(h))
                .or_else(|| doc.and_then(|d| docblock::param_type(d, &name)));
            let Some(written) = written else { continue };
            let mut resolved = resolver.resolve_type_expr(&written);
            if param.ellipsis.is_some() {
                resolved = resolved.array_of();
            }
            if !resolved.is_empty() {
                vars.replace_type(&name, resolved);
            }
        }
    }

    /// The docblock immediately preceding the statement that encloses
    /// this node, for inline `@var` overrides.
    fn enclosing_statement_docblock(&self, spine: &[Node<'a>]) -> Option<&'a str> {
        let stmt = ancestor(spine, |n| matches!(n, Node::Statement(Statement::Expression(_))))?;
        let (start, _) = stmt.offsets()?;
        docblock::docblock_before_offset(self.trivias, self.content, start)
    }

    fn handle_assignment(&self, assignment: &Assignment<'_>, spine: &[Node<'a>]) {
        if !assignment.operator.is_assign() {
            return;
        }

        // An inline `/** @var Type */` or `/** @var Type $x */` override
        // beats the inferred right-hand side.
        let override_type = self.enclosing_statement_docblock(spine).and_then(|doc| {
            let (ty, var) = docblock::var_type(doc)?;
            Some((ty, var))
        });

        match assignment.lhs {
            Expression::Variable(Variable::Direct(dv)) => {
                let var_name = dv.name;
                let assigned = match &override_type {
                    Some((ty, var))
                        if var.is_none() || var.as_deref() == Some(var_name) =>
                    {
                        self.resolver.borrow().resolve_type_expr(ty)
                    }
                    _ => self.resolve_expression(assignment.rhs),
                };
                if !assigned.is_empty() {
                    self.vars.borrow_mut().replace_type(var_name, assigned);
                }
            }
            Expression::List(list) => {
                self.bind_destructured(list.elements.iter(), assignment.rhs);
            }
            Expression::Array(array) => {
                self.bind_destructured(array.elements.iter(), assignment.rhs);
            }
            _ => {}
        }
    }

    /// `list($a, $b) = $rhs` / `[$a, $b] = $rhs`: every target gets the
    /// element type of the right-hand side, `mixed` when unknown.
    fn bind_destructured<'e>(
        &self,
        elements: impl Iterator<Item = &'e ArrayElement<'e>>,
        rhs: &Expression<'_>,
    ) {
        let mut names = Vec::new();
        for element in elements {
            let value = match element {
                ArrayElement::KeyValue(kv) => kv.value,
                ArrayElement::Value(v) => v.value,
                _ => continue,
            };
            if let Expression::Variable(Variable::Direct(dv)) = value {
                names.push(dv.name.to_string());
            }
        }
        if names.is_empty() {
            return;
        }
        let mut element_type = self.resolve_expression(rhs).element_type();
        if element_type.is_empty() {
            element_type = TypeString::atom("mixed");
        }
        self.vars.borrow_mut().set_type_many(&names, element_type);
    }

    fn handle_foreach(&self, foreach: &Foreach<'_>) {
        let mut element = self.resolve_expression(foreach.expression).element_type();
        if element.is_empty() {
            element = TypeString::atom("mixed");
        }

        if let Expression::Variable(Variable::Direct(dv)) = foreach.target.value() {
            self.vars.borrow_mut().replace_type(dv.name, element);
        }
        if let Some(Expression::Variable(Variable::Direct(dv))) = foreach.target.key() {
            self.vars
                .borrow_mut()
                .replace_type(dv.name, TypeString::from_expr("int|string"));
        }
    }

    fn handle_branch_entry(&self, branch: &Branch<'a>) {
        self.vars.borrow_mut().push_branch();

        if let Some(binding) = &branch.catch {
            let Some(var_name) = binding.variable else { return };
            let written = hint_string(binding.hint);
            let resolved = self.resolver.borrow().resolve_type_expr(&written);
            if !resolved.is_empty() {
                self.vars.borrow_mut().replace_type(var_name, resolved);
            }
            return;
        }

        // `if ($x instanceof C)` narrows $x to C inside the arm.
        if matches!(
            branch.kind,
            BranchKind::Then | BranchKind::ElseIf | BranchKind::TernaryThen
        ) && let Some(condition) = branch.condition
            && let Some((var_name, class_fqn)) = self.instanceof_condition(condition)
        {
            self.vars
                .borrow_mut()
                .replace_type(&var_name, TypeString::atom(&class_fqn));
        }
    }

    /// `$x instanceof C` (possibly parenthesised) → `($x, \Fqn\C)`.
    fn instanceof_condition(&self, condition: &Expression<'_>) -> Option<(String, String)> {
        match condition {
            Expression::Parenthesized(paren) => self.instanceof_condition(paren.expression),
            Expression::Binary(binary) if binary.operator.is_instanceof() => {
                let Expression::Variable(Variable::Direct(dv)) = binary.lhs else {
                    return None;
                };
                let class_fqn = {
                    let resolver = self.resolver.borrow();
                    let vars = self.vars.borrow();
                    ExpressionTypeResolver::new(&resolver, self.store, &vars, self.content)
                        .class_designator(binary.rhs)?
                };
                Some((dv.name.to_string(), class_fqn))
            }
            _ => None,
        }
    }

}

impl<'a> TreeVisitor<Node<'a>> for VariableTypeVisitor<'a> {
    fn preorder(&mut self, node: Node<'a>, spine: &[Node<'a>]) -> bool {
        // Once the traversal passes the configured offset, the table
        // holds the live state there; stop everything.
        if let Some(offset) = self.halt_offset
            && let Some((start, _)) = node.offsets()
            && start > offset
        {
            self.halted = true;
            return false;
        }

        match node {
            Node::Statement(stmt) => match stmt {
                Statement::Class(_)
                | Statement::Interface(_)
                | Statement::Trait(_)
                | Statement::Enum(_) => {
                    self.vars.borrow_mut().push_scope(&[]);
                    self.bind_this();
                    true
                }
                Statement::Function(func) => {
                    self.vars.borrow_mut().push_scope(&[]);
                    let doc =
                        docblock::docblock_before(self.trivias, self.content, func);
                    self.bind_parameters(&func.parameter_list, doc);
                    true
                }
                Statement::Foreach(foreach) => {
                    self.handle_foreach(foreach);
                    true
                }
                // An unconditional `unset($x)` erases the binding for
                // the rest of the scope.
                Statement::Unset(unset) => {
                    let mut vars = self.vars.borrow_mut();
                    for value in unset.values.iter() {
                        if let Expression::Variable(Variable::Direct(dv)) = value {
                            vars.replace_type(dv.name, TypeString::empty());
                        }
                    }
                    false
                }
                _ => true,
            },
            Node::Member(ClassLikeMember::Method(method)) => {
                let carry: Vec<String> = if method.modifiers.iter().any(|m| m.is_static()) {
                    Vec::new()
                } else {
                    vec!["$this".to_string()]
                };
                self.vars.borrow_mut().push_scope(&carry);
                let doc = docblock::docblock_before(self.trivias, self.content, method);
                self.bind_parameters(&method.parameter_list, doc);
                true
            }
            Node::Expression(expr) => match expr {
                Expression::Assignment(assignment) => {
                    self.handle_assignment(assignment, spine);
                    true
                }
                Expression::Closure(closure) => {
                    // Closures see only their `use (…)` captures plus the
                    // bound `$this`; by-reference captures copy the same
                    // way in a type-only table.
                    let mut carry = vec!["$this".to_string()];
                    if let Some(use_clause) = &closure.use_clause {
                        for use_var in use_clause.variables.iter() {
                            carry.push(use_var.variable.name.to_string());
                        }
                    }
                    self.vars.borrow_mut().push_scope(&carry);
                    self.bind_parameters(&closure.parameter_list, None);
                    true
                }
                Expression::ArrowFunction(arrow) => {
                    // Arrow functions capture the enclosing scope
                    // implicitly.
                    let carry = {
                        let vars = self.vars.borrow();
                        vars.bound_names()
                    };
                    self.vars.borrow_mut().push_scope(&carry);
                    self.bind_parameters(&arrow.parameter_list, None);
                    true
                }
                _ => true,
            },
            Node::Branch(branch) => {
                self.handle_branch_entry(&branch);
                true
            }
            _ => true,
        }
    }

    fn postorder(&mut self, node: Node<'a>, _spine: &[Node<'a>]) {
        if self.halted {
            return;
        }
        match node {
            Node::Statement(stmt) => match stmt {
                Statement::Class(_)
                | Statement::Interface(_)
                | Statement::Trait(_)
                | Statement::Enum(_)
                | Statement::Function(_) => {
                    let result = self.vars.borrow_mut().pop_scope();
                    self.record_violation(result);
                }
                Statement::If(_)
                | Statement::Switch(_)
                | Statement::Try(_)
                | Statement::Foreach(_)
                | Statement::While(_)
                | Statement::For(_)
                | Statement::DoWhile(_) => {
                    self.vars.borrow_mut().prune_branches();
                }
                _ => {}
            },
            Node::Member(ClassLikeMember::Method(_)) => {
                let result = self.vars.borrow_mut().pop_scope();
                self.record_violation(result);
            }
            Node::Expression(expr) => match expr {
                Expression::Closure(_) | Expression::ArrowFunction(_) => {
                    let result = self.vars.borrow_mut().pop_scope();
                    self.record_violation(result);
                }
                Expression::Conditional(_) => {
                    self.vars.borrow_mut().prune_branches();
                }
                _ => {}
            },
            Node::Branch(_) => {
                let result = self.vars.borrow_mut().pop_branch();
                self.record_violation(result);
            }
            _ => {}
        }
    }

    fn halt(&self) -> bool {
        self.halted
    }
}

/// The resolver and table state a flow pass ended with, plus the first
/// structural violation it hit (if any).  A violation means the request
/// the pass served must be aborted; the table state is still the last
/// consistent one.
#[derive(Default)]
pub struct FlowState {
    pub resolver: NameResolver,
    pub vars: VariableTable,
    pub violation: Option<ServiceError>,
}

/// Run the composed name-resolution + variable-type pass over a program,
/// optionally halting at `offset`.  Returns the state at the point the
/// traversal stopped.
pub fn run_flow_analysis(
    program: &Program<'_>,
    content: &str,
    store: &SymbolStore,
    halt_offset: Option<u32>,
) -> FlowState {
    let resolver = Rc::new(RefCell::new(NameResolver::new()));
    let vars = Rc::new(RefCell::new(VariableTable::new()));

    let names = NameResolverVisitor::new(resolver.clone());
    let types = VariableTypeVisitor::new(
        resolver.clone(),
        vars.clone(),
        store,
        program,
        content,
        halt_offset,
    );
    let violation = types.violation_cell();

    let mut pass: MultiVisitor<'_, Node<'_>> =
        MultiVisitor::new(vec![Box::new(names), Box::new(types)]);
    traverse(Node::Program(program), &mut pass);
    drop(pass);

    FlowState {
        resolver: Rc::try_unwrap(resolver)
            .map(RefCell::into_inner)
            .unwrap_or_default(),
        vars: Rc::try_unwrap(vars)
            .map(RefCell::into_inner)
            .unwrap_or_default(),
        violation: violation.borrow_mut().take(),
    }
}

impl crate::Backend {
    /// The inferred type of `name` (e.g. `"$v"`) at a byte offset,
    /// rendered as a pipe-separated type string.  Empty when unknown.
    pub fn variable_type_at(&self, uri: &str, offset: u32, name: &str) -> String {
        let Some(text) = ({
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.find(uri).map(|doc| doc.text.clone())
        }) else {
            return String::new();
        };

        let store = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        crate::parser::with_parsed_program(&text, "variable type at", |program, content| {
            let state = run_flow_analysis(program, content, &store, Some(offset));
            if let Some(error) = &state.violation {
                log::error!("PHPilot: {error}; aborting variable type query for {uri}");
                return String::new();
            }
            state
                .vars
                .get_type(name, state.resolver.class_name())
                .to_string()
        })
    }
}
