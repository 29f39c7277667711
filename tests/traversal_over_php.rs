mod common;

use common::offset_of;
use phpilot_lsp::node::Node;
use phpilot_lsp::parser::with_parsed_program;
use phpilot_lsp::traverse::{TreeNode, TreeVisitor, ancestor, filter, find, traverse};

use mago_syntax::ast::{Expression, Statement};

const FIXTURE: &str = concat!(
    "<?php\n",
    "namespace App;\n",
    "class Greeter {\n",
    "    public function greet(string $name): string {\n",
    "        if ($name !== '') {\n",
    "            $prefix = 'Hello ';\n",
    "        }\n",
    "        return $prefix . $name;\n",
    "    }\n",
    "}\n",
);

#[test]
fn filter_reaches_assignments_nested_in_branches() {
    let count = with_parsed_program(FIXTURE, "test", |program, _| {
        filter(Node::Program(program), |node, _| {
            matches!(node, Node::Expression(Expression::Assignment(_)))
        })
        .len()
    });
    assert_eq!(count, 1, "the assignment inside the if-branch must be visited");
}

#[test]
fn spine_contains_the_enclosing_statements() {
    // When the walk reaches the assignment, its spine must contain the
    // enclosing if-statement, the class declaration, and the program
    // root, in root-first order.
    struct SpineCheck {
        seen: bool,
    }
    impl<'a> TreeVisitor<Node<'a>> for SpineCheck {
        fn preorder(&mut self, node: Node<'a>, spine: &[Node<'a>]) -> bool {
            if matches!(node, Node::Expression(Expression::Assignment(_))) {
                self.seen = true;
                assert!(matches!(spine.first(), Some(Node::Program(_))));
                assert!(
                    spine
                        .iter()
                        .any(|n| matches!(n, Node::Statement(Statement::If(_)))),
                    "assignment spine must include the if statement"
                );
                assert!(
                    spine
                        .iter()
                        .any(|n| matches!(n, Node::Statement(Statement::Class(_)))),
                    "assignment spine must include the class"
                );
                // The ancestor helper walks the same spine deepest-first.
                let nearest_stmt = ancestor(spine, |n| matches!(n, Node::Statement(_)));
                assert!(nearest_stmt.is_some());
            }
            true
        }
    }

    with_parsed_program(FIXTURE, "test", |program, _| {
        let mut visitor = SpineCheck { seen: false };
        traverse(Node::Program(program), &mut visitor);
        assert!(visitor.seen, "assignment node never visited");
    });
}

#[test]
fn spines_nest_by_source_range() {
    // Every spine entry with a span must contain its successor.
    struct Nesting;
    impl<'a> TreeVisitor<Node<'a>> for Nesting {
        fn preorder(&mut self, node: Node<'a>, spine: &[Node<'a>]) -> bool {
            if let (Some(parent), Some((start, end))) = (spine.last(), node.offsets())
                && let Some((pstart, pend)) = parent.offsets()
            {
                assert!(
                    pstart <= start && end <= pend,
                    "child range {start}..{end} escapes parent {pstart}..{pend}"
                );
            }
            true
        }
    }
    with_parsed_program(FIXTURE, "test", |program, _| {
        traverse(Node::Program(program), &mut Nesting);
    });
}

#[test]
fn halt_stops_before_nodes_past_the_offset() {
    let stop_at = offset_of(FIXTURE, "return");

    struct HaltAt {
        offset: u32,
        halted: bool,
        visited_after_halt: bool,
    }
    impl<'a> TreeVisitor<Node<'a>> for HaltAt {
        fn preorder(&mut self, node: Node<'a>, _spine: &[Node<'a>]) -> bool {
            if self.halted {
                self.visited_after_halt = true;
            }
            if let Some((start, _)) = node.offsets()
                && start > self.offset
            {
                self.halted = true;
            }
            true
        }
        fn halt(&self) -> bool {
            self.halted
        }
    }

    with_parsed_program(FIXTURE, "test", |program, _| {
        let mut visitor = HaltAt { offset: stop_at, halted: false, visited_after_halt: false };
        traverse(Node::Program(program), &mut visitor);
        assert!(visitor.halted, "fixture contains nodes past the offset");
        assert!(
            !visitor.visited_after_halt,
            "no hook may fire after halt is set"
        );
    });
}

#[test]
fn find_locates_the_first_class() {
    let found = with_parsed_program(FIXTURE, "test", |program, _| {
        find(Node::Program(program), |node, _| {
            matches!(node, Node::Statement(Statement::Class(_)))
        })
        .and_then(|node| node.offsets())
    });
    assert_eq!(found.map(|(start, _)| start), Some(offset_of(FIXTURE, "class Greeter")));
}

#[test]
fn child_nodes_are_stable_for_identity_checks() {
    with_parsed_program(FIXTURE, "test", |program, _| {
        let root = Node::Program(program);
        let first = root.child_nodes();
        let second = root.child_nodes();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(a.same_node(b), "children must keep their identity across calls");
        }
    });
}
