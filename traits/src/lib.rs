//! # Traits
//!
//! This crate contains the traits that sit between the command dispatcher
//! and whatever speaks the remote display protocol.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

/// re-export anyhow
pub use anyhow;
/// re-export anyhow::Result
pub use anyhow::Result;
/// re-export the async_trait
pub use async_trait::async_trait;
/// export the remote display interface
pub mod display;
