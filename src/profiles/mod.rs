//! Channel profile overlays.
//!
//! A channel's creation record is never rewritten by profile edits. Edits go
//! to a separate overlay document with the same ID, and reads merge the two.

mod merger;

pub use merger::{merge, ChannelProfileMerger, ChannelView};
