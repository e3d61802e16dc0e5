pub mod bookmark;
pub mod errors;

pub use bookmark::{Bookmark, BookmarkId, BookmarkPatch, LocalId, NewBookmark, OwnerId, ServerId};
