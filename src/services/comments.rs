//! Comment and reaction operations on issues.
//!
//! Every operation reads the issue's whole comment list, changes it in
//! memory, and writes the full list back as one patch through the local
//! store, fallback included. A completed write publishes `Topic::Issues`.

use crate::error::AppError;
use crate::models::comment::extract_mentions;
use crate::models::{Comment, CommentThread, EntityKind};
use crate::services::entity_store::now;
use crate::services::invalidation::{InvalidationBus, Topic};
use crate::services::local_store::LocalStore;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct CommentService {
    store: LocalStore,
    bus: InvalidationBus,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Arc<Mutex<()>>,
}

impl CommentService {
    pub fn new(store: LocalStore, bus: InvalidationBus) -> Self {
        Self {
            store,
            bus,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The issue's comments, in posting order.
    pub async fn thread(&self, issue_id: &str) -> Result<CommentThread, AppError> {
        let issues = self.store.get(EntityKind::Issue).await?.value;
        let issue = issues
            .get(issue_id)
            .ok_or_else(|| AppError::not_found_with_id("issue", issue_id))?;
        Ok(CommentThread::from_fields(issue_id, &issue.fields))
    }

    /// The issue's comments for a read-modify-write. Unlike [`Self::thread`],
    /// a malformed stored list is an error so the write cannot replace it.
    async fn thread_for_write(&self, issue_id: &str) -> Result<CommentThread, AppError> {
        let issues = self.store.get(EntityKind::Issue).await?.value;
        let issue = issues
            .get(issue_id)
            .ok_or_else(|| AppError::not_found_with_id("issue", issue_id))?;
        CommentThread::parse(&issue.fields).map_err(|e| {
            log::error!(
                "[comments] Refusing to rewrite malformed comments on {}: {}",
                issue_id,
                e
            );
            AppError::mutation_failed_for(
                format!("Stored comments are malformed: {}", e),
                issue_id,
            )
        })
    }

    async fn save(&self, issue_id: &str, thread: &CommentThread) -> Result<(), AppError> {
        let patch = thread.to_patch()?;
        self.store
            .put(EntityKind::Issue, issue_id, &patch)
            .await
            .map_err(|e| {
                log::error!("[comments] Failed to save comments on {}: {}", issue_id, e);
                AppError::mutation_failed_for(e.to_string(), issue_id)
            })?;
        self.bus.publish(Topic::Issues);
        Ok(())
    }

    fn new_comment(
        author: &str,
        content: &str,
        parent_id: Option<&str>,
        mentions: Option<Vec<String>>,
    ) -> Result<Comment, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::invalid_input_field("Comment cannot be empty", "content"));
        }
        if author.trim().is_empty() {
            return Err(AppError::invalid_input_field("Author is required", "author"));
        }

        Ok(Comment {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.to_string(),
            content: content.to_string(),
            timestamp: now(),
            parent_id: parent_id.map(String::from),
            mentions: mentions.unwrap_or_else(|| extract_mentions(content)),
            reactions: Vec::new(),
        })
    }

    /// Append a top-level comment.
    ///
    /// When `mentions` is `None`, `@handle` tokens in the content are used.
    pub async fn add_comment(
        &self,
        issue_id: &str,
        author: &str,
        content: &str,
        mentions: Option<Vec<String>>,
    ) -> Result<Comment, AppError> {
        let comment = Self::new_comment(author, content, None, mentions)?;

        let _guard = self.write_lock.lock().await;
        let mut thread = self.thread_for_write(issue_id).await?;
        thread.push(comment.clone());
        self.save(issue_id, &thread).await?;

        log::info!("[comments] Added comment {} on {}", comment.id, issue_id);
        Ok(comment)
    }

    /// Append a reply to a top-level comment.
    pub async fn reply(
        &self,
        issue_id: &str,
        parent_id: &str,
        author: &str,
        content: &str,
        mentions: Option<Vec<String>>,
    ) -> Result<Comment, AppError> {
        let comment = Self::new_comment(author, content, Some(parent_id), mentions)?;

        let _guard = self.write_lock.lock().await;
        let mut thread = self.thread_for_write(issue_id).await?;
        thread.validate_parent(parent_id)?;
        thread.push(comment.clone());
        self.save(issue_id, &thread).await?;

        log::info!("[comments] Added reply {} to {} on {}", comment.id, parent_id, issue_id);
        Ok(comment)
    }

    /// Add `user` to the emoji's reactions. Adding twice changes nothing and
    /// writes nothing.
    pub async fn add_reaction(
        &self,
        issue_id: &str,
        comment_id: &str,
        emoji: &str,
        user: &str,
    ) -> Result<Comment, AppError> {
        if emoji.is_empty() {
            return Err(AppError::invalid_input_field("Emoji is required", "emoji"));
        }
        self.modify_reactions(issue_id, comment_id, |comment| comment.add_reaction(emoji, user))
            .await
    }

    /// Remove `user` from the emoji's reactions, dropping the entry once empty.
    pub async fn remove_reaction(
        &self,
        issue_id: &str,
        comment_id: &str,
        emoji: &str,
        user: &str,
    ) -> Result<Comment, AppError> {
        self.modify_reactions(issue_id, comment_id, |comment| {
            comment.remove_reaction(emoji, user)
        })
        .await
    }

    async fn modify_reactions(
        &self,
        issue_id: &str,
        comment_id: &str,
        change: impl FnOnce(&mut Comment) -> bool,
    ) -> Result<Comment, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut thread = self.thread_for_write(issue_id).await?;
        let comment = thread
            .get_mut(comment_id)
            .ok_or_else(|| AppError::not_found_with_id("comment", comment_id))?;

        if !change(comment) {
            return Ok(comment.clone());
        }
        let updated = comment.clone();
        self.save(issue_id, &thread).await?;
        Ok(updated)
    }
}
