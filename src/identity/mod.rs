//! Identity resolution.

mod resolver;

pub use resolver::{IdentityResolver, ResolvedIdentity};
