pub mod feed;
pub mod follow;
pub mod forms;
pub mod posts;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use feed::{FeedScope, FeedSettings, Page, PostCard};
pub use forms::FormErrors;
