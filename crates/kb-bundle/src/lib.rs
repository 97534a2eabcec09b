//! kb-bundle — bundle archives and the sources they are fetched from.
//!
//! # Components
//!
//! - **`bundle`** — `BundleRef` and `BundleFile` (zip with `app.yaml` and
//!   an optional `images.tar`)
//! - **`source`** — the `Source` trait, latest-version side-files, and
//!   `new_source` for building a source from a stored record
//! - **`directory`** / **`http`** — local directory and HTTP object storage
//! - **`multi`** — ordered fallback across sources, and explicit file lists
//! - **`transfer`** — publish and copy

pub mod bundle;
pub mod directory;
pub mod error;
pub mod http;
pub mod multi;
pub mod source;
pub mod transfer;

pub use bundle::{BundleFile, BundleRef};
pub use directory::DirectorySource;
pub use error::{BundleError, BundleResult};
pub use http::HttpSource;
pub use multi::{MultiFileSource, MultiSource};
pub use source::{BundleMetadata, Source, new_source};
pub use transfer::{copy, publish};
