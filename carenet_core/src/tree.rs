//! Assembly of a thread's flat message list into a forest of reply trees.
//!
//! The forest is rebuilt from scratch whenever the underlying list changes.
//! Nodes are never patched in place, so callers must not hold on to node
//! identity across rebuilds.

use std::collections::HashMap;

use crate::ids::MessageId;
use crate::models::Message;

/// Depth at which replies stop and indentation flattens.
pub const MAX_REPLY_DEPTH: u32 = 5;

/// How deep reply chains may nest before interaction and indentation stop.
///
/// The forest itself keeps every node at its true depth; this policy only
/// decides what a renderer offers and how far it indents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthPolicy {
    max_depth: u32,
}

impl DepthPolicy {
    /// A limit of zero is treated as one, so roots are always shown flat.
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Whether a node at `depth` offers a reply action.
    pub fn can_reply(&self, depth: u32) -> bool {
        depth < self.max_depth
    }

    /// Whether the children of a node at `depth` are drawn one level further in.
    pub fn should_indent(&self, depth: u32) -> bool {
        depth < self.max_depth
    }

    /// Indentation level to draw a node at; anything deeper than the limit sits at the limit.
    pub fn display_depth(&self, depth: u32) -> u32 {
        depth.min(self.max_depth)
    }
}

impl Default for DepthPolicy {
    fn default() -> Self {
        Self::new(MAX_REPLY_DEPTH)
    }
}

pub fn can_reply(depth: u32) -> bool {
    DepthPolicy::default().can_reply(depth)
}

pub fn should_indent(depth: u32) -> bool {
    DepthPolicy::default().should_indent(depth)
}

/// A message together with its replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    message: Message,
    depth: u32,
    children: Vec<CommentNode>,
}

impl CommentNode {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn id(&self) -> MessageId {
        self.message.id
    }

    /// 1 for roots, parent depth + 1 otherwise.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn children(&self) -> &[CommentNode] {
        &self.children
    }

    /// Pre-order walk over this node and all of its descendants.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn subtree_len(&self) -> usize {
        self.iter().count()
    }
}

impl Drop for CommentNode {
    // Unlinks descendants one level at a time so a long reply chain cannot
    // overflow the stack through recursive drop glue.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Ordered roots of a thread, in the order the store returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forest {
    roots: Vec<CommentNode>,
    len: usize,
}

impl Forest {
    pub fn roots(&self) -> &[CommentNode] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<CommentNode> {
        self.roots
    }

    /// Total number of nodes across all trees. Always equals the input length.
    pub fn node_count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pre-order walk over every node, root by root.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: self.roots.iter().rev().collect(),
        }
    }

    pub fn find(&self, id: MessageId) -> Option<&CommentNode> {
        self.iter().find(|node| node.id() == id)
    }
}

pub struct Iter<'a> {
    stack: Vec<&'a CommentNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a CommentNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Builds the reply forest for one thread.
///
/// Total over any input. A message whose parent is missing, is itself, or
/// only leads back around a cycle becomes a root; every input message ends
/// up in exactly one node. Siblings and roots keep their input order.
pub fn build_forest(messages: Vec<Message>) -> Forest {
    let total = messages.len();

    let mut index: HashMap<MessageId, usize> = HashMap::with_capacity(total);
    for (pos, message) in messages.iter().enumerate() {
        index.entry(message.id).or_insert(pos);
    }

    let mut orphans = 0usize;
    let mut parents: Vec<Option<usize>> = messages
        .iter()
        .enumerate()
        .map(|(pos, message)| {
            let resolved = message
                .parent_id
                .and_then(|parent_id| index.get(&parent_id).copied())
                .filter(|&parent| parent != pos);
            if message.parent_id.is_some() && resolved.is_none() {
                orphans += 1;
            }
            resolved
        })
        .collect();

    let cycles = break_cycles(&mut parents);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); total];
    let mut root_positions = Vec::new();
    for (pos, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(pos),
            None => root_positions.push(pos),
        }
    }

    // Pre-order positions with their depth.
    let mut depths = vec![0u32; total];
    let mut order = Vec::with_capacity(total);
    let mut stack: Vec<(usize, u32)> = root_positions.iter().rev().map(|&pos| (pos, 1)).collect();
    while let Some((pos, depth)) = stack.pop() {
        depths[pos] = depth;
        order.push(pos);
        let child_depth = depth.saturating_add(1);
        stack.extend(children[pos].iter().rev().map(|&child| (child, child_depth)));
    }

    // Reverse pre-order visits every child before its parent.
    let mut slots: Vec<Option<Message>> = messages.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..total).map(|_| None).collect();
    for &pos in order.iter().rev() {
        let kids = children[pos]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        if let Some(message) = slots[pos].take() {
            built[pos] = Some(CommentNode {
                message,
                depth: depths[pos],
                children: kids,
            });
        }
    }

    let roots: Vec<CommentNode> = root_positions
        .iter()
        .filter_map(|&pos| built[pos].take())
        .collect();

    if orphans > 0 {
        tracing::debug!(orphans, "promoted replies with unknown parents to roots");
    }
    if cycles > 0 {
        tracing::warn!(cycles, "broke parent cycles while building comment forest");
    }
    tracing::debug!(messages = total, roots = roots.len(), "built comment forest");

    Forest {
        roots,
        len: order.len(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Settled,
}

/// Detaches one member of every parent cycle, returning how many were broken.
///
/// The member that appears first in the input becomes a root. Afterwards
/// every position reaches a root by following `parents`.
fn break_cycles(parents: &mut [Option<usize>]) -> usize {
    let mut marks = vec![Mark::Unvisited; parents.len()];
    let mut path = Vec::new();
    let mut broken = 0;

    for start in 0..parents.len() {
        let mut current = start;
        loop {
            match marks[current] {
                Mark::Settled => break,
                Mark::OnPath => {
                    if let Some(from) = path.iter().position(|&pos| pos == current) {
                        if let Some(&head) = path[from..].iter().min() {
                            parents[head] = None;
                            broken += 1;
                        }
                    }
                    break;
                }
                Mark::Unvisited => {
                    marks[current] = Mark::OnPath;
                    path.push(current);
                    match parents[current] {
                        Some(parent) => current = parent,
                        None => break,
                    }
                }
            }
        }
        for pos in path.drain(..) {
            marks[pos] = Mark::Settled;
        }
    }

    broken
}
