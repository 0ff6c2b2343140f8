//! Arena representation of the step signature.
//!
//! Nodes are stored in declaration (pre-)order and addressed by index, so the
//! same tree can be walked for status derivation and for timestamp calibration
//! while the step results live in a separate map keyed by reference.

use std::collections::HashMap;

use crate::model::Signature;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct SignatureNode {
    pub reference: String,
    pub optional: bool,
    pub negative: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl SignatureNode {
    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignatureTree {
    nodes: Vec<SignatureNode>,
    roots: Vec<NodeId>,
    index: HashMap<String, NodeId>,
}

impl SignatureTree {
    pub fn build(signatures: &[Signature]) -> Self {
        let mut tree = Self::default();
        for sig in signatures {
            let id = tree.push(sig, None);
            tree.roots.push(id);
        }
        tree
    }

    fn push(&mut self, sig: &Signature, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(SignatureNode {
            reference: sig.reference.clone(),
            optional: sig.optional,
            negative: sig.negative,
            parent,
            children: Vec::with_capacity(sig.children.len()),
        });
        self.index.entry(sig.reference.clone()).or_insert(id);
        for child in &sig.children {
            let child_id = self.push(child, Some(id));
            self.nodes[id].children.push(child_id);
        }
        id
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &SignatureNode {
        &self.nodes[id]
    }

    pub fn find(&self, reference: &str) -> Option<NodeId> {
        self.index.get(reference).copied()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Every node, children before their parents.
    pub fn post_order(&self) -> impl Iterator<Item = NodeId> {
        // Pre-order indices always place a parent before its descendants.
        (0..self.nodes.len()).rev()
    }

    /// Leaf steps in declaration order.
    pub fn leaves(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| !self.nodes[id].is_group())
            .collect()
    }

    /// Leaf steps below `id` in declaration order (the node itself when it is a leaf).
    pub fn descendant_leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if node.is_group() {
                stack.extend(node.children.iter().rev());
            } else {
                leaves.push(current);
            }
        }
        leaves
    }

    pub fn is_optional(&self, reference: &str) -> bool {
        self.find(reference)
            .map(|id| self.nodes[id].optional)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SignatureTree {
        SignatureTree::build(&[
            Signature::leaf("a"),
            Signature::group(
                "g",
                vec![
                    Signature::leaf("b"),
                    Signature::group("h", vec![Signature::leaf("c")]),
                ],
            ),
            Signature::leaf("d"),
        ])
    }

    #[test]
    fn test_leaves_in_declaration_order() {
        let tree = sample();
        let refs: Vec<&str> = tree
            .leaves()
            .into_iter()
            .map(|id| tree.node(id).reference.as_str())
            .collect();
        assert_eq!(refs, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_post_order_visits_children_first() {
        let tree = sample();
        let order: Vec<&str> = tree
            .post_order()
            .map(|id| tree.node(id).reference.as_str())
            .collect();
        let pos = |r: &str| order.iter().position(|x| *x == r).unwrap();
        assert!(pos("c") < pos("h"));
        assert!(pos("h") < pos("g"));
        assert!(pos("b") < pos("g"));
    }

    #[test]
    fn test_descendant_leaves() {
        let tree = sample();
        let g = tree.find("g").unwrap();
        let refs: Vec<&str> = tree
            .descendant_leaves(g)
            .into_iter()
            .map(|id| tree.node(id).reference.as_str())
            .collect();
        assert_eq!(refs, vec!["b", "c"]);
        assert_eq!(tree.node(tree.find("c").unwrap()).parent, tree.find("h"));
    }
}
