//! The syntax tree.
//!
//! Nodes live in one flat arena and refer to their children as a
//! contiguous range in an auxiliary buffer, so the whole tree is two
//! `Vec`s and drops in O(1) when the compile is done. Every node keeps its
//! source span; literal values are re-read from the source text on demand
//! rather than copied out.

use crate::token::{MacroKind, Span};

/// Index of a node in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// The closed set of node shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeTag {
    /// A top-level declaration. Children: optional name identifier, then
    /// the body node (object, or a single value for `#define`/`#import`).
    MacroDecl(MacroKind),
    /// `key=value`. Children: identifier, value.
    Property,
    /// `{ key=value … }`. Children: property nodes.
    Object,
    /// `[ v v v ]`. Children: value nodes.
    Array,
    LitInt,
    LitHex,
    LitFloat,
    LitStr,
    LitBool,
    Ident,
    /// `a.b` or `a.b.c`. Children: one identifier per segment.
    DottedRef,
}

/// One node of the tree.
#[derive(Clone, Copy, Debug)]
pub struct Node {
    pub tag: NodeTag,
    pub span: Span,
    children_start: u32,
    children_len: u32,
}

/// A parsed file: the node arena plus the ordered top-level declarations.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    children: Vec<NodeId>,
    roots: Vec<NodeId>,
}

impl Ast {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        let node = self.node(id);
        let start = node.children_start as usize;
        &self.children[start..start + node.children_len as usize]
    }

    /// Top-level macro declarations, in source order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Append a node whose children were already pushed.
    pub fn push(&mut self, tag: NodeTag, span: Span, children: &[NodeId]) -> NodeId {
        let children_start = self.children.len() as u32;
        self.children.extend_from_slice(children);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            tag,
            span,
            children_start,
            children_len: children.len() as u32,
        });
        id
    }

    pub fn push_root(&mut self, id: NodeId) {
        self.roots.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_are_contiguous_ranges() {
        let mut ast = Ast::default();
        let a = ast.push(NodeTag::LitInt, Span::new(0, 1), &[]);
        let b = ast.push(NodeTag::LitInt, Span::new(2, 3), &[]);
        let array = ast.push(NodeTag::Array, Span::new(0, 4), &[a, b]);
        assert_eq!(ast.children(array), &[a, b]);
        assert_eq!(ast.children(a), &[] as &[NodeId]);
        assert_eq!(ast.node(array).tag, NodeTag::Array);
    }
}
