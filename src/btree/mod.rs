//! B+tree-specific modules: per-page node framing, the slot-index
//! variants it dispatches to, the blob manager for oversized keys and
//! records, and the driver functions (`operations`, `cursor`) that tie
//! them into find/insert/erase/traversal.

pub mod blob;
pub mod comparator;
pub mod cursor;
pub mod keylist;
pub mod node;
pub mod operations;
pub mod recordlist;
pub mod upfront_index;
