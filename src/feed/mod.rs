//! Live timeline: a broadcast hub fed by every post mutation, plus the
//! cursor and list-state types the timeline views are built from.

pub mod cursor;
pub mod timeline;

use tokio::sync::broadcast;

use crate::db::models::Post;

pub use self::cursor::{Cursor, CursorError};
pub use self::timeline::Timeline;

/// A committed change to the posts collection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Created(Post),
    Updated(Post),
    Deleted { id: String },
}

impl FeedEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FeedEvent::Created(_) => "created",
            FeedEvent::Updated(_) => "updated",
            FeedEvent::Deleted { .. } => "deleted",
        }
    }

    pub fn post_id(&self) -> &str {
        match self {
            FeedEvent::Created(post) | FeedEvent::Updated(post) => &post.id,
            FeedEvent::Deleted { id } => id,
        }
    }
}

/// Fan-out of feed events to live subscribers.
///
/// Each subscriber buffers up to `capacity` events. A subscriber that falls
/// further behind observes a lag and must resync from the database.
#[derive(Clone)]
pub struct FeedHub {
    sender: broadcast::Sender<FeedEvent>,
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns how many subscribers will see it.
    pub fn publish(&self, event: FeedEvent) -> usize {
        let name = event.name();
        let id = event.post_id().to_string();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = name, post_id = %id, receivers, "Published feed event");
                receivers
            }
            Err(_) => {
                tracing::debug!(event = name, post_id = %id, "No live subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
pub(crate) fn sample_post(id: &str, author_id: &str) -> Post {
    Post {
        id: id.to_string(),
        author_id: author_id.to_string(),
        content: format!("post {}", id),
        media_urls: Vec::new(),
        created_at: chrono::Utc::now(),
        likes: 0,
        author_display_name: "Author".to_string(),
        author_username: "author".to_string(),
        author_photo_url: None,
    }
}
