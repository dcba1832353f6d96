//! Small helpers shared across the build.

pub mod hash;
pub mod minify;
pub mod slug;
