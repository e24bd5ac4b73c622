/// A 64-bit page address: an absolute byte offset into the environment
/// file, always a multiple of the page size. The top bit is reserved as
/// an in-memory-only marker for pages that were never flushed.
pub type PageAddress = u64;

/// A 64-bit blob id, encoding the blob's page address and intra-page
/// offset (see `btree::blob`).
pub type BlobId = u64;
