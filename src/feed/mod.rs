//! Realtime channel message feeds.
//!
//! # Example
//!
//! ```ignore
//! use futures_util::StreamExt;
//!
//! let mut feed = service.feed().subscribe(&channel_id).await?;
//! while let Some(snapshot) = feed.next().await {
//!     let messages = snapshot?;
//!     println!("{} messages", messages.len());
//! }
//! ```

mod adapter;

pub use adapter::{MessageFeed, RealtimeFeed};
