//! Channel lifecycle: create, edit, delete with dependents.

mod manager;

pub use manager::{CascadeSummary, ChannelLifecycle};
