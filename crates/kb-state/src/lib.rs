//! kb-state — embedded resource store for kube-bundler.
//!
//! Backed by [redb](https://docs.rs/redb), implements the
//! [`ResourceStore`](kb_cluster::ResourceStore) capability for local use
//! and for tests.
//!
//! # Architecture
//!
//! Each resource kind has its own table. Keys are `{namespace}/{name}`, so
//! listing a namespace is a range scan. Values are JSON
//! [`StoredRecord`](kb_cluster::StoredRecord)s carrying a
//! `resource_version` that every write increments.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
