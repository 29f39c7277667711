//! Depth-first tree traversal with spine tracking and halt semantics.
//!
//! The engine is generic over any node type exposing an ordered children
//! sequence.  A [`TreeVisitor`] receives `preorder` and `postorder` hooks
//! together with the *spine* — the ordered ancestors from the root down
//! to (and excluding) the current node.  Returning `false` from
//! `preorder` skips the node's subtree; `postorder` still fires for the
//! node itself.
//!
//! The engine reads the visitor's `halt` flag after every hook and
//! between siblings, so a visitor (or an outside party sharing a flag
//! with it) can stop a traversal with latency bounded by a single node's
//! work.
//!
//! [`MultiVisitor`] composes several visitors into one pass.  Each inner
//! visitor that declines to descend is bookmarked at the declining node
//! and sleeps until that node's `postorder`, while the others continue;
//! the composite descends iff any inner visitor wants to.

/// A tree node the engine can walk.  Implementations are expected to be
/// cheap to copy (reference-like views).
pub trait TreeNode: Copy {
    fn child_nodes(&self) -> Vec<Self>;

    /// Identity, not structural equality: do the two views denote the
    /// same underlying node?
    fn same_node(&self, other: &Self) -> bool;
}

pub trait TreeVisitor<N: TreeNode> {
    /// Called before a node's children are visited.  Return `false` to
    /// skip the subtree (the node's own `postorder` still fires).
    fn preorder(&mut self, _node: N, _spine: &[N]) -> bool {
        true
    }

    /// Called after a node's children were visited (or skipped).
    fn postorder(&mut self, _node: N, _spine: &[N]) {}

    /// Checked by the engine after every hook and between siblings.
    fn halt(&self) -> bool {
        false
    }
}

/// Walk `root` depth-first, invoking the visitor's hooks.
pub fn traverse<N: TreeNode, V: TreeVisitor<N> + ?Sized>(root: N, visitor: &mut V) {
    let mut spine: Vec<N> = Vec::new();
    walk(root, &mut spine, visitor);
}

/// Returns `false` when the traversal was halted.
fn walk<N: TreeNode, V: TreeVisitor<N> + ?Sized>(node: N, spine: &mut Vec<N>, visitor: &mut V) -> bool {
    let descend = visitor.preorder(node, spine);
    if visitor.halt() {
        return false;
    }

    if descend {
        spine.push(node);
        for child in node.child_nodes() {
            if !walk(child, spine, visitor) {
                spine.pop();
                return false;
            }
            if visitor.halt() {
                spine.pop();
                return false;
            }
        }
        spine.pop();
    }

    visitor.postorder(node, spine);
    !visitor.halt()
}

/// Collect every node (preorder order) satisfying the predicate.
pub fn filter<N: TreeNode>(root: N, pred: impl Fn(&N, &[N]) -> bool) -> Vec<N> {
    struct Filter<N, P> {
        pred: P,
        hits: Vec<N>,
    }
    impl<N: TreeNode, P: Fn(&N, &[N]) -> bool> TreeVisitor<N> for Filter<N, P> {
        fn preorder(&mut self, node: N, spine: &[N]) -> bool {
            if (self.pred)(&node, spine) {
                self.hits.push(node);
            }
            true
        }
    }
    let mut v = Filter { pred, hits: Vec::new() };
    traverse(root, &mut v);
    v.hits
}

/// The first node (preorder order) satisfying the predicate.
pub fn find<N: TreeNode>(root: N, pred: impl Fn(&N, &[N]) -> bool) -> Option<N> {
    struct Find<N, P> {
        pred: P,
        hit: Option<N>,
    }
    impl<N: TreeNode, P: Fn(&N, &[N]) -> bool> TreeVisitor<N> for Find<N, P> {
        fn preorder(&mut self, node: N, spine: &[N]) -> bool {
            if self.hit.is_none() && (self.pred)(&node, spine) {
                self.hit = Some(node);
            }
            self.hit.is_none()
        }
        fn halt(&self) -> bool {
            self.hit.is_some()
        }
    }
    let mut v = Find { pred, hit: None };
    traverse(root, &mut v);
    v.hit
}

/// The nearest ancestor on `spine` (deepest first) satisfying the
/// predicate.
pub fn ancestor<N: TreeNode>(spine: &[N], pred: impl Fn(&N) -> bool) -> Option<N> {
    spine.iter().rev().find(|n| pred(n)).copied()
}

/// The sibling immediately before `node` among `parent`'s children.
pub fn prev_sibling<N: TreeNode>(parent: N, node: N) -> Option<N> {
    let children = parent.child_nodes();
    let idx = children.iter().position(|c| c.same_node(&node))?;
    if idx == 0 { None } else { Some(children[idx - 1]) }
}

/// The sibling immediately after `node` among `parent`'s children.
pub fn next_sibling<N: TreeNode>(parent: N, node: N) -> Option<N> {
    let children = parent.child_nodes();
    let idx = children.iter().position(|c| c.same_node(&node))?;
    children.get(idx + 1).copied()
}

/// Count the nodes satisfying the predicate.
pub fn count<N: TreeNode>(root: N, pred: impl Fn(&N, &[N]) -> bool) -> usize {
    filter(root, pred).len()
}

/// Composes several visitors into a single pass.
///
/// Per-visitor bookmarks record where a visitor declined to descend; the
/// visitor is skipped for the whole subtree and woken (bookmark cleared)
/// when the declining node's `postorder` is reached.  The composite
/// descends iff at least one inner visitor is awake and descended.
pub struct MultiVisitor<'v, N: TreeNode> {
    visitors: Vec<Box<dyn TreeVisitor<N> + 'v>>,
    skipped_at: Vec<Option<N>>,
}

impl<'v, N: TreeNode> MultiVisitor<'v, N> {
    pub fn new(visitors: Vec<Box<dyn TreeVisitor<N> + 'v>>) -> Self {
        let skipped_at = visitors.iter().map(|_| None).collect();
        Self { visitors, skipped_at }
    }
}

impl<'v, N: TreeNode> TreeVisitor<N> for MultiVisitor<'v, N> {
    fn preorder(&mut self, node: N, spine: &[N]) -> bool {
        let mut descend = false;
        for (visitor, skipped) in self.visitors.iter_mut().zip(self.skipped_at.iter_mut()) {
            if skipped.is_some() {
                continue;
            }
            if visitor.preorder(node, spine) {
                descend = true;
            } else {
                *skipped = Some(node);
            }
        }
        descend
    }

    fn postorder(&mut self, node: N, spine: &[N]) {
        for (visitor, skipped) in self.visitors.iter_mut().zip(self.skipped_at.iter_mut()) {
            match skipped {
                Some(mark) if mark.same_node(&node) => *skipped = None,
                Some(_) => {}
                None => visitor.postorder(node, spine),
            }
        }
    }

    fn halt(&self) -> bool {
        self.visitors.iter().any(|v| v.halt())
    }
}
