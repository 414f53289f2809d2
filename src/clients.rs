//! Clients for the systems `git-automation` drives.
//!
//! - [`git`]: repository operations (fetch, push, merge, commit lookup,
//!   configuration) on top of libgit2

pub mod git;
