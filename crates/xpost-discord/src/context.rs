use xpost_store::{ImageStore, PostStore};

/// Shared state the Discord handlers work against.
pub struct BotState {
    pub store: PostStore,
    pub images: ImageStore,
    pub max_attachments: usize,
}
