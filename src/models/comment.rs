//! Comment model for issue discussions.
//!
//! An issue owns its comments: they are persisted as the issue's `comments`
//! field and always rewritten as a whole list.

use crate::error::AppError;
use crate::models::entity::Fields;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field of an issue entity holding its comment list.
pub const COMMENTS_FIELD: &str = "comments";

/// An emoji reaction and the users who applied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,

    /// Authors in the order they reacted. Never empty once persisted.
    pub users: IndexSet<String>,
}

/// Comment on an issue, optionally replying to a top-level comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,

    pub author: String,

    /// Comment content (Markdown).
    pub content: String,

    /// Creation timestamp (Unix).
    pub timestamp: i64,

    /// Parent comment ID for replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
}

impl Comment {
    /// Check if this is a reply to another comment.
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Find the reaction entry for an emoji.
    pub fn reaction(&self, emoji: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.emoji == emoji)
    }

    /// Add `user` to the emoji's author set, creating the entry if needed.
    ///
    /// Returns `false` when the user had already reacted with this emoji.
    pub fn add_reaction(&mut self, emoji: &str, user: &str) -> bool {
        match self.reactions.iter_mut().find(|r| r.emoji == emoji) {
            Some(reaction) => reaction.users.insert(user.to_string()),
            None => {
                self.reactions.push(Reaction {
                    emoji: emoji.to_string(),
                    users: IndexSet::from([user.to_string()]),
                });
                true
            }
        }
    }

    /// Remove `user` from the emoji's author set. An emptied entry is dropped.
    ///
    /// Returns `false` when there was nothing to remove.
    pub fn remove_reaction(&mut self, emoji: &str, user: &str) -> bool {
        let Some(idx) = self.reactions.iter().position(|r| r.emoji == emoji) else {
            return false;
        };
        let removed = self.reactions[idx].users.shift_remove(user);
        if self.reactions[idx].users.is_empty() {
            self.reactions.remove(idx);
        }
        removed
    }
}

/// The full comment list of one issue, in posting order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentThread {
    comments: Vec<Comment>,
}

impl CommentThread {
    /// Parse the comment list out of an issue's fields. A missing field is an
    /// empty thread; a malformed one is an error.
    pub fn parse(fields: &Fields) -> Result<Self, serde_json::Error> {
        match fields.get(COMMENTS_FIELD) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => Ok(Self {
                comments: serde_json::from_value(value.clone())?,
            }),
        }
    }

    /// Read-only view of an issue's comments. A malformed list is logged and
    /// shown as empty. Writers must use [`CommentThread::parse`] instead.
    pub fn from_fields(issue_id: &str, fields: &Fields) -> Self {
        Self::parse(fields).unwrap_or_else(|e| {
            log::warn!(
                "[comments] Malformed comments on issue {}, showing none: {}",
                issue_id,
                e
            );
            Self::default()
        })
    }

    /// Serialize into a patch that replaces the issue's comment list.
    pub fn to_patch(&self) -> Result<Fields, AppError> {
        let mut patch = Fields::new();
        patch.insert(
            COMMENTS_FIELD.to_string(),
            serde_json::to_value(&self.comments)?,
        );
        Ok(patch)
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn get(&self, comment_id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }

    pub fn get_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id == comment_id)
    }

    pub fn push(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Check that a reply may attach to `parent_id`.
    ///
    /// The parent must exist and must itself be top-level: replies are one level deep.
    pub fn validate_parent(&self, parent_id: &str) -> Result<(), AppError> {
        match self.get(parent_id) {
            None => Err(AppError::not_found_with_id("comment", parent_id)),
            Some(parent) if parent.is_reply() => Err(AppError::invalid_input_field(
                "Replies cannot be replied to",
                "parent_id",
            )),
            Some(_) => Ok(()),
        }
    }

    /// Top-level comments paired with their replies, both in posting order.
    pub fn grouped(&self) -> Vec<(&Comment, Vec<&Comment>)> {
        self.comments
            .iter()
            .filter(|c| !c.is_reply())
            .map(|root| {
                let replies = self
                    .comments
                    .iter()
                    .filter(|c| c.parent_id.as_deref() == Some(root.id.as_str()))
                    .collect();
                (root, replies)
            })
            .collect()
    }
}

/// Pull `@handle` mentions out of comment content, deduplicated in order.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut seen = IndexSet::new();
    for word in content.split_whitespace() {
        let Some(handle) = word.strip_prefix('@') else {
            continue;
        };
        let handle: String = handle
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
            .collect();
        let handle = handle.trim_end_matches('.');
        if !handle.is_empty() {
            seen.insert(handle.to_string());
        }
    }
    seen.into_iter().collect()
}
