//! An embeddable, ordered key-value B+tree storage engine: pages and a
//! device abstraction, a page cache, a page manager arbitrating the two
//! against a freelist, the btree node framing and its key/record slot
//! indexes, a blob manager for oversized payloads, and an `Environment`
//! tying a file header and per-database slot table to all of the above.

pub mod cache;
pub mod changeset;
pub mod config;
pub mod device;
pub mod environment;
pub mod error;
pub mod freelist;
pub mod log_init;
pub mod page;
pub mod page_manager;
pub mod types;
pub mod util;

pub mod btree;

pub use btree::comparator::Comparator;
pub use btree::cursor::{CursorFlags, CursorPosition};
pub use btree::operations::InsertFlags;
pub use config::{Compressor, DatabaseConfig, EngineConfig, EnvFlags, KeyType};
pub use environment::{DatabaseHandle, Environment};
pub use error::{Error, Result};
