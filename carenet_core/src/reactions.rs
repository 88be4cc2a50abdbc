use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::models::Reaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionToggle {
    Added,
    Removed,
}

/// Flips `user`'s `emoji` on a reaction list. Calling it twice restores the list.
pub fn toggle_reaction(reactions: &mut Vec<Reaction>, user: UserId, emoji: &str) -> ReactionToggle {
    let before = reactions.len();
    reactions.retain(|r| !(r.user_id == user && r.emoji == emoji));

    if reactions.len() == before {
        reactions.push(Reaction::new(emoji, user));
        ReactionToggle::Added
    } else {
        ReactionToggle::Removed
    }
}

/// Per-emoji totals as shown under a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    /// Distinct users who reacted with this emoji.
    pub count: usize,
    pub reacted_by_viewer: bool,
}

/// Groups reactions by emoji in order of first appearance.
pub fn summarize_reactions(reactions: &[Reaction], viewer: UserId) -> Vec<ReactionSummary> {
    let mut groups: Vec<(&str, HashSet<UserId>)> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();

    for reaction in reactions {
        let idx = *slot.entry(reaction.emoji.as_str()).or_insert_with(|| {
            groups.push((reaction.emoji.as_str(), HashSet::new()));
            groups.len() - 1
        });
        groups[idx].1.insert(reaction.user_id);
    }

    groups
        .into_iter()
        .map(|(emoji, users)| ReactionSummary {
            emoji: emoji.to_string(),
            count: users.len(),
            reacted_by_viewer: users.contains(&viewer),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_twice_restores_membership() {
        let alice = UserId::new();
        let bob = UserId::new();
        let original = vec![Reaction::new("👍", bob), Reaction::new("🎉", alice)];

        let mut reactions = original.clone();
        assert_eq!(toggle_reaction(&mut reactions, alice, "👍"), ReactionToggle::Added);
        assert_eq!(reactions.len(), 3);
        assert_eq!(toggle_reaction(&mut reactions, alice, "👍"), ReactionToggle::Removed);
        assert_eq!(reactions, original);
    }

    #[test]
    fn test_toggle_only_touches_own_emoji() {
        let alice = UserId::new();
        let bob = UserId::new();
        let mut reactions = vec![Reaction::new("👍", bob), Reaction::new("🎉", alice)];

        toggle_reaction(&mut reactions, alice, "🎉");
        assert_eq!(reactions, vec![Reaction::new("👍", bob)]);
    }

    #[test]
    fn test_summary_groups_by_first_appearance() {
        let alice = UserId::new();
        let bob = UserId::new();
        let carol = UserId::new();
        let reactions = vec![
            Reaction::new("🎉", bob),
            Reaction::new("👍", alice),
            Reaction::new("🎉", carol),
            Reaction::new("👍", bob),
            Reaction::new("🎉", alice),
        ];

        let summary = summarize_reactions(&reactions, alice);
        assert_eq!(
            summary,
            vec![
                ReactionSummary {
                    emoji: "🎉".to_string(),
                    count: 3,
                    reacted_by_viewer: true,
                },
                ReactionSummary {
                    emoji: "👍".to_string(),
                    count: 2,
                    reacted_by_viewer: true,
                },
            ]
        );

        let summary = summarize_reactions(&reactions, UserId::new());
        assert!(summary.iter().all(|s| !s.reacted_by_viewer));
    }

    #[test]
    fn test_summary_counts_distinct_users() {
        let alice = UserId::new();
        let reactions = vec![Reaction::new("❤️", alice), Reaction::new("❤️", alice)];

        let summary = summarize_reactions(&reactions, alice);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 1);
    }
}
