//! A uniform, ordered-children view over the typed PHP parse tree.
//!
//! The traversal engine is generic over [`crate::traverse::TreeNode`];
//! this module adapts mago's typed AST to that contract.  A [`Node`] is a
//! cheap copyable reference into the arena-allocated tree.
//!
//! Control-flow arms (if/elseif/else bodies, switch cases, catch blocks,
//! loop bodies, ternary arms) surface as synthetic [`Branch`] nodes so
//! that visitors can observe branch entry and exit as plain
//! preorder/postorder hooks — the variable table's branch stack is driven
//! entirely off these.

use mago_span::HasSpan;
use mago_syntax::ast::*;

use crate::traverse::TreeNode;

#[derive(Clone, Copy)]
pub enum Node<'a> {
    Program(&'a Program<'a>),
    Statement(&'a Statement<'a>),
    Expression(&'a Expression<'a>),
    Member(&'a ClassLikeMember<'a>),
    Branch(Branch<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Then,
    ElseIf,
    Else,
    SwitchArm,
    CatchArm,
    LoopBody,
    TryBody,
    FinallyBody,
    TernaryThen,
    TernaryElse,
}

/// The exception binding of a `catch (T1|T2 $e)` arm.
#[derive(Clone, Copy)]
pub struct CatchBinding<'a> {
    pub hint: &'a Hint<'a>,
    pub variable: Option<&'a str>,
}

#[derive(Clone, Copy)]
pub enum BranchBody<'a> {
    Empty,
    Stmt(&'a Statement<'a>),
    Stmts(&'a [Statement<'a>]),
    Expr(&'a Expression<'a>),
}

#[derive(Clone, Copy)]
pub struct Branch<'a> {
    pub kind: BranchKind,
    /// The guarding condition, when the arm has one (if/elseif, ternary
    /// then-arm).  `instanceof` narrowing reads this.
    pub condition: Option<&'a Expression<'a>>,
    pub catch: Option<CatchBinding<'a>>,
    pub body: BranchBody<'a>,
}

impl<'a> Branch<'a> {
    fn plain(kind: BranchKind, condition: Option<&'a Expression<'a>>, body: BranchBody<'a>) -> Self {
        Self { kind, condition, catch: None, body }
    }

    fn children(&self) -> Vec<Node<'a>> {
        match self.body {
            BranchBody::Empty => Vec::new(),
            BranchBody::Stmt(stmt) => vec![Node::Statement(stmt)],
            BranchBody::Stmts(stmts) => stmts.iter().map(Node::Statement).collect(),
            BranchBody::Expr(expr) => vec![Node::Expression(expr)],
        }
    }

    fn body_ptr(&self) -> *const u8 {
        match self.body {
            BranchBody::Empty => std::ptr::null(),
            BranchBody::Stmt(stmt) => stmt as *const Statement<'_> as *const u8,
            BranchBody::Stmts(stmts) => stmts.as_ptr() as *const u8,
            BranchBody::Expr(expr) => expr as *const Expression<'_> as *const u8,
        }
    }

    fn offsets(&self) -> Option<(u32, u32)> {
        let body = match self.body {
            BranchBody::Empty => None,
            BranchBody::Stmt(stmt) => Some(span_offsets(stmt)),
            BranchBody::Stmts(stmts) => match (stmts.first(), stmts.last()) {
                (Some(first), Some(last)) => {
                    Some((span_offsets(first).0, span_offsets(last).1))
                }
                _ => None,
            },
            BranchBody::Expr(expr) => Some(span_offsets(expr)),
        };
        match (body, self.condition) {
            (Some((start, end)), Some(cond)) => {
                let (cstart, _) = span_offsets(cond);
                Some((cstart.min(start), end))
            }
            (Some(range), None) => Some(range),
            (None, Some(cond)) => Some(span_offsets(cond)),
            (None, None) => None,
        }
    }
}

fn span_offsets(node: &impl HasSpan) -> (u32, u32) {
    let span = node.span();
    (span.start.offset, span.end.offset)
}

impl<'a> Node<'a> {
    /// Byte offsets of the node, when it has a span.
    pub fn offsets(&self) -> Option<(u32, u32)> {
        match self {
            Node::Program(_) => None,
            Node::Statement(stmt) => Some(span_offsets(*stmt)),
            Node::Expression(expr) => Some(span_offsets(*expr)),
            Node::Member(member) => Some(span_offsets(*member)),
            Node::Branch(branch) => branch.offsets(),
        }
    }

    pub fn contains_offset(&self, offset: u32) -> bool {
        match self.offsets() {
            Some((start, end)) => offset >= start && offset <= end,
            None => true,
        }
    }

    fn statement_children(stmt: &'a Statement<'a>) -> Vec<Node<'a>> {
        match stmt {
            Statement::Expression(expr_stmt) => vec![Node::Expression(expr_stmt.expression)],
            Statement::Block(block) => {
                block.statements.iter().map(Node::Statement).collect()
            }
            Statement::Namespace(ns) => {
                ns.statements().iter().map(Node::Statement).collect()
            }
            Statement::Class(class) => class.members.iter().map(Node::Member).collect(),
            Statement::Interface(iface) => iface.members.iter().map(Node::Member).collect(),
            Statement::Trait(trait_def) => {
                trait_def.members.iter().map(Node::Member).collect()
            }
            Statement::Enum(enum_def) => enum_def.members.iter().map(Node::Member).collect(),
            Statement::Function(func) => {
                func.body.statements.iter().map(Node::Statement).collect()
            }
            Statement::If(if_stmt) => {
                let mut children = vec![Node::Expression(if_stmt.condition)];
                match &if_stmt.body {
                    IfBody::Statement(body) => {
                        children.push(Node::Branch(Branch::plain(
                            BranchKind::Then,
                            Some(if_stmt.condition),
                            BranchBody::Stmt(body.statement),
                        )));
                        for else_if in body.else_if_clauses.iter() {
                            children.push(Node::Branch(Branch::plain(
                                BranchKind::ElseIf,
                                Some(else_if.condition),
                                BranchBody::Stmt(else_if.statement),
                            )));
                        }
                        if let Some(else_clause) = &body.else_clause {
                            children.push(Node::Branch(Branch::plain(
                                BranchKind::Else,
                                None,
                                BranchBody::Stmt(else_clause.statement),
                            )));
                        }
                    }
                    IfBody::ColonDelimited(body) => {
                        children.push(Node::Branch(Branch::plain(
                            BranchKind::Then,
                            Some(if_stmt.condition),
                            BranchBody::Stmts(body.statements.as_slice()),
                        )));
                        for else_if in body.else_if_clauses.iter() {
                            children.push(Node::Branch(Branch::plain(
                                BranchKind::ElseIf,
                                Some(else_if.condition),
                                BranchBody::Stmts(else_if.statements.as_slice()),
                            )));
                        }
                        if let Some(else_clause) = &body.else_clause {
                            children.push(Node::Branch(Branch::plain(
                                BranchKind::Else,
                                None,
                                BranchBody::Stmts(else_clause.statements.as_slice()),
                            )));
                        }
                    }
                }
                children
            }
            Statement::Switch(switch) => switch
                .body
                .cases()
                .iter()
                .map(|case| {
                    Node::Branch(Branch::plain(
                        BranchKind::SwitchArm,
                        None,
                        BranchBody::Stmts(case.statements()),
                    ))
                })
                .collect(),
            Statement::Foreach(foreach) => {
                let body = match &foreach.body {
                    ForeachBody::Statement(inner) => BranchBody::Stmt(*inner),
                    ForeachBody::ColonDelimited(body) => {
                        BranchBody::Stmts(body.statements.as_slice())
                    }
                };
                vec![
                    Node::Expression(foreach.expression),
                    Node::Branch(Branch::plain(BranchKind::LoopBody, None, body)),
                ]
            }
            Statement::While(while_stmt) => {
                let body = match &while_stmt.body {
                    WhileBody::Statement(inner) => BranchBody::Stmt(*inner),
                    WhileBody::ColonDelimited(body) => {
                        BranchBody::Stmts(body.statements.as_slice())
                    }
                };
                vec![Node::Branch(Branch::plain(BranchKind::LoopBody, None, body))]
            }
            Statement::For(for_stmt) => {
                let body = match &for_stmt.body {
                    ForBody::Statement(inner) => BranchBody::Stmt(*inner),
                    ForBody::ColonDelimited(body) => BranchBody::Stmts(body.statements.as_slice()),
                };
                vec![Node::Branch(Branch::plain(BranchKind::LoopBody, None, body))]
            }
            Statement::DoWhile(do_while) => vec![Node::Branch(Branch::plain(
                BranchKind::LoopBody,
                None,
                BranchBody::Stmt(do_while.statement),
            ))],
            Statement::Try(try_stmt) => {
                let mut children = vec![Node::Branch(Branch::plain(
                    BranchKind::TryBody,
                    None,
                    BranchBody::Stmts(try_stmt.block.statements.as_slice()),
                ))];
                for catch in try_stmt.catch_clauses.iter() {
                    children.push(Node::Branch(Branch {
                        kind: BranchKind::CatchArm,
                        condition: None,
                        catch: Some(CatchBinding {
                            hint: &catch.hint,
                            variable: catch.variable.as_ref().map(|v| crate::util::bstr(v.name)),
                        }),
                        body: BranchBody::Stmts(catch.block.statements.as_slice()),
                    }));
                }
                if let Some(finally) = &try_stmt.finally_clause {
                    children.push(Node::Branch(Branch::plain(
                        BranchKind::FinallyBody,
                        None,
                        BranchBody::Stmts(finally.block.statements.as_slice()),
                    )));
                }
                children
            }
            Statement::Return(ret) => match ret.value {
                Some(value) => vec![Node::Expression(value)],
                None => Vec::new(),
            },
            Statement::Echo(echo) => echo.values.iter().map(|e| Node::Expression(*e)).collect(),
            _ => Vec::new(),
        }
    }

    fn expression_children(expr: &'a Expression<'a>) -> Vec<Node<'a>> {
        match expr {
            Expression::Assignment(assignment) => vec![
                Node::Expression(assignment.lhs),
                Node::Expression(assignment.rhs),
            ],
            Expression::Parenthesized(paren) => vec![Node::Expression(paren.expression)],
            Expression::Binary(binary) => {
                vec![Node::Expression(binary.lhs), Node::Expression(binary.rhs)]
            }
            Expression::UnaryPrefix(unary) => vec![Node::Expression(unary.operand)],
            Expression::UnaryPostfix(unary) => vec![Node::Expression(unary.operand)],
            Expression::Conditional(cond) => {
                let then_body = match cond.then {
                    Some(then_expr) => BranchBody::Expr(then_expr),
                    // Short ternary `a ?: b`: the condition doubles as
                    // the then-value.
                    None => BranchBody::Empty,
                };
                vec![
                    Node::Expression(cond.condition),
                    Node::Branch(Branch::plain(
                        BranchKind::TernaryThen,
                        Some(cond.condition),
                        then_body,
                    )),
                    Node::Branch(Branch::plain(
                        BranchKind::TernaryElse,
                        None,
                        BranchBody::Expr(cond.r#else),
                    )),
                ]
            }
            Expression::Call(call) => {
                let (head, arguments) = match call {
                    Call::Function(fc) => (fc.function, &fc.argument_list),
                    Call::Method(mc) => (mc.object, &mc.argument_list),
                    Call::NullSafeMethod(mc) => (mc.object, &mc.argument_list),
                    Call::StaticMethod(sc) => (sc.class, &sc.argument_list),
                };
                let mut children = vec![Node::Expression(head)];
                children.extend(argument_children(arguments));
                children
            }
            Expression::Instantiation(inst) => {
                let mut children = vec![Node::Expression(inst.class)];
                if let Some(args) = &inst.argument_list {
                    children.extend(argument_children(args));
                }
                children
            }
            Expression::ArrayAccess(access) => vec![Node::Expression(access.array)],
            Expression::Access(access) => match access {
                Access::Property(pa) => vec![Node::Expression(pa.object)],
                Access::NullSafeProperty(pa) => vec![Node::Expression(pa.object)],
                Access::StaticProperty(pa) => vec![Node::Expression(pa.class)],
                Access::ClassConstant(pa) => vec![Node::Expression(pa.class)],
            },
            Expression::Closure(closure) => {
                closure.body.statements.iter().map(Node::Statement).collect()
            }
            Expression::ArrowFunction(arrow) => vec![Node::Expression(arrow.expression)],
            Expression::Array(array) => element_children(array.elements.iter()),
            Expression::List(list) => element_children(list.elements.iter()),
            Expression::Match(match_expr) => {
                let mut children = vec![Node::Expression(match_expr.expression)];
                for arm in match_expr.arms.iter() {
                    children.push(Node::Expression(arm.expression()));
                }
                children
            }
            Expression::Clone(clone_expr) => vec![Node::Expression(clone_expr.object)],
            Expression::Throw(throw) => vec![Node::Expression(throw.exception)],
            Expression::Pipe(pipe) => vec![Node::Expression(pipe.input)],
            _ => Vec::new(),
        }
    }

    fn member_children(member: &'a ClassLikeMember<'a>) -> Vec<Node<'a>> {
        match member {
            ClassLikeMember::Method(method) => match &method.body {
                MethodBody::Concrete(block) => {
                    block.statements.iter().map(Node::Statement).collect()
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

fn argument_children<'a>(arguments: &'a ArgumentList<'a>) -> Vec<Node<'a>> {
    arguments
        .arguments
        .iter()
        .map(|argument| match argument {
            Argument::Positional(pos) => Node::Expression(pos.value),
            Argument::Named(named) => Node::Expression(named.value),
        })
        .collect()
}

fn element_children<'a>(
    elements: impl Iterator<Item = &'a ArrayElement<'a>>,
) -> Vec<Node<'a>> {
    let mut children = Vec::new();
    for element in elements {
        match element {
            ArrayElement::KeyValue(kv) => {
                children.push(Node::Expression(kv.key));
                children.push(Node::Expression(kv.value));
            }
            ArrayElement::Value(value) => children.push(Node::Expression(value.value)),
            _ => {}
        }
    }
    children
}

impl<'a> TreeNode for Node<'a> {
    fn child_nodes(&self) -> Vec<Self> {
        match self {
            Node::Program(program) => {
                program.statements.iter().map(Node::Statement).collect()
            }
            Node::Statement(stmt) => Node::statement_children(stmt),
            Node::Expression(expr) => Node::expression_children(expr),
            Node::Member(member) => Node::member_children(member),
            Node::Branch(branch) => branch.children(),
        }
    }

    fn same_node(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Program(a), Node::Program(b)) => std::ptr::eq(*a, *b),
            (Node::Statement(a), Node::Statement(b)) => std::ptr::eq(*a, *b),
            (Node::Expression(a), Node::Expression(b)) => std::ptr::eq(*a, *b),
            (Node::Member(a), Node::Member(b)) => std::ptr::eq(*a, *b),
            (Node::Branch(a), Node::Branch(b)) => {
                a.kind == b.kind && std::ptr::eq(a.body_ptr(), b.body_ptr())
            }
            _ => false,
        }
    }
}
