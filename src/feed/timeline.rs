use crate::db::models::Post;
use crate::feed::{Cursor, FeedEvent};

/// An ordered list of posts as a viewer sees it, newest first, plus the
/// cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    posts: Vec<Post>,
    next: Option<Cursor>,
}

impl Timeline {
    pub fn new(posts: Vec<Post>, next: Option<Cursor>) -> Self {
        Self { posts, next }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }

    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next.as_ref()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Replace everything with a fresh head page.
    pub fn apply_snapshot(&mut self, posts: Vec<Post>, next: Option<Cursor>) {
        self.posts = posts;
        self.next = next;
    }

    /// Append a "load more" page. Posts already present are skipped.
    pub fn append_page(&mut self, posts: Vec<Post>, next: Option<Cursor>) {
        for post in posts {
            if !self.contains(&post.id) {
                self.posts.push(post);
            }
        }
        self.next = next;
    }

    pub fn apply(&mut self, event: &FeedEvent) {
        match event {
            FeedEvent::Created(post) => {
                if !self.contains(&post.id) {
                    self.posts.insert(0, post.clone());
                }
            }
            FeedEvent::Updated(post) => self.replace(post.clone()),
            FeedEvent::Deleted { id } => self.remove(id),
        }
    }

    /// Swap in a newer copy of a post. Unknown posts are ignored.
    pub fn replace(&mut self, updated: Post) {
        if let Some(slot) = self.posts.iter_mut().find(|p| p.id == updated.id) {
            *slot = updated;
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.posts.retain(|p| p.id != id);
    }

    /// Show `photo_url` on every post by `author_id` whose stored author
    /// avatar differs. Only the in-memory copies change.
    pub fn patch_author_photo(&mut self, author_id: &str, photo_url: Option<&str>) -> usize {
        let mut patched = 0;
        for post in self.posts.iter_mut().filter(|p| p.author_id == author_id) {
            if post.author_photo_url.as_deref() != photo_url {
                post.author_photo_url = photo_url.map(str::to_string);
                patched += 1;
            }
        }
        patched
    }

    fn contains(&self, id: &str) -> bool {
        self.posts.iter().any(|p| p.id == id)
    }
}
