//! TierCache - generic tiered persistent cache
//!
//! Stores namespaced key-value entries on the filesystem, with every entry
//! carrying the content fingerprint and modification time that produced it.
//! Callers use those two values to decide whether a cached payload may be
//! reused for the current state of its source.
//!
//! # Architecture
//!
//! ```text
//! .tiercache/
//! ├── raw/
//! │   ├── 3f2a9c...e1.json     # one entry per key, filename = key hash
//! │   └── ...
//! ├── augmented/
//! │   └── ...
//! └── meta/
//!     ├── filter-suppressed-inline.json
//!     └── ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tiercache::{TierStore, fingerprint};
//!
//! let store = TierStore::open(".tiercache")?;
//! let fp = fingerprint(content.as_bytes());
//! store.store("raw", "notes/todo.md", &tasks, fp, mtime_ms)?;
//! if let Some(entry) = store.load::<Vec<Task>>("raw", "notes/todo.md")? {
//!     assert_eq!(entry.fingerprint, fp);
//! }
//! ```

mod store;

pub use store::{Entry, TierStore, fingerprint, now_ms};
