//! Foundation types for the replicated key-value store.
//!
//! This crate provides the core identity and ordering types used throughout
//! the node runtime. Every other kvstore crate depends on `kvstore-types`.
//!
//! # Key Types
//!
//! - [`NodeId`] — small integer identity for a cluster member
//! - [`Term`] — monotone election epoch
//! - [`Seq`] — monotone WAL sequence number
//! - [`Role`] — replication role (primary/follower/candidate)

pub mod error;
pub mod identity;
pub mod kv;

pub use error::TypeError;
pub use identity::{NodeId, Role, Term};
pub use kv::{Key, Seq, Value};
