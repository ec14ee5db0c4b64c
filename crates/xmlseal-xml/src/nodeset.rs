#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization and transforms.
//!
//! A `NodeSet` represents a subset of the nodes of a parsed document,
//! identified by their `roxmltree::NodeId`.  It is what the
//! enveloped-signature transform narrows and what C14N renders.

use roxmltree::{Document, Node, NodeId};
use std::collections::HashSet;

/// A set of XML document nodes identified by `NodeId`.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<NodeId>,
}

impl NodeSet {
    /// Create a node set containing all nodes in the document.
    pub fn all(doc: &Document<'_>) -> Self {
        Self {
            nodes: doc.descendants().map(|n| n.id()).collect(),
        }
    }

    /// Create a node set containing all nodes except comments.
    ///
    /// Per XML-DSig, `URI=""` selects the document without comments.
    pub fn all_without_comments(doc: &Document<'_>) -> Self {
        Self {
            nodes: doc
                .descendants()
                .filter(|n| !n.is_comment())
                .map(|n| n.id())
                .collect(),
        }
    }

    /// Create a node set for a subtree rooted at the given node (without comments).
    pub fn tree_without_comments(root: Node<'_, '_>) -> Self {
        Self {
            nodes: root
                .descendants()
                .filter(|n| !n.is_comment())
                .map(|n| n.id())
                .collect(),
        }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: &Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id())
    }

    /// Remove a node and all of its descendants from this set.
    pub fn remove_subtree(&mut self, node: Node<'_, '_>) {
        for n in node.descendants() {
            self.nodes.remove(&n.id());
        }
    }

}
