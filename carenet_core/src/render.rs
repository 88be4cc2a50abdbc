//! Flattening a forest into the rows a thread view draws.

use serde::Serialize;

use crate::ids::UserId;
use crate::models::Message;
use crate::reactions::{summarize_reactions, ReactionSummary};
use crate::store::{Relationship, RelationshipLookup};
use crate::tree::{CommentNode, DepthPolicy, Forest};

/// Everything about the viewer that rendering depends on.
pub struct RenderContext<'a> {
    pub viewer: UserId,
    pub policy: DepthPolicy,
    pub relationships: &'a dyn RelationshipLookup,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderRow<'a> {
    pub message: &'a Message,
    pub depth: u32,
    /// Indentation level; never exceeds the policy limit.
    pub display_depth: u32,
    pub indent_children: bool,
    pub can_reply: bool,
    /// Advisory only. The store decides whether an edit goes through.
    pub can_edit: bool,
    pub can_delete: bool,
    pub reactions: Vec<ReactionSummary>,
    pub author: Relationship,
}

/// Rows for every node in pre-order.
///
/// Nothing is dropped: nodes below the depth limit are drawn at the limit.
pub fn render_rows<'a>(forest: &'a Forest, ctx: &RenderContext<'_>) -> Vec<RenderRow<'a>> {
    let mut rows = Vec::with_capacity(forest.node_count());
    let mut stack: Vec<&CommentNode> = forest.roots().iter().rev().collect();

    while let Some(node) = stack.pop() {
        rows.push(row_for(node, ctx));
        stack.extend(node.children().iter().rev());
    }

    rows
}

fn row_for<'a>(node: &'a CommentNode, ctx: &RenderContext<'_>) -> RenderRow<'a> {
    let message = node.message();
    let depth = node.depth();
    let is_author = message.is_authored_by(ctx.viewer);

    RenderRow {
        message,
        depth,
        display_depth: ctx.policy.display_depth(depth),
        indent_children: ctx.policy.should_indent(depth),
        can_reply: ctx.policy.can_reply(depth),
        can_edit: is_author,
        can_delete: is_author,
        reactions: summarize_reactions(&message.reactions, ctx.viewer),
        author: ctx.relationships.relationship(ctx.viewer, message.author_id),
    }
}
