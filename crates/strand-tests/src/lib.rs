//! Cross-crate integration tests for Strand.
//!
//! Exercises the framing, handshake, and chain store together through their
//! public APIs. Shared fixtures live in [`helpers`].

pub mod helpers;
