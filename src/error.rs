use std::fmt;

/// Error taxonomy for the storage engine core.
///
/// Leaf components (`KeyList`/`RecordList`/`UpfrontIndex`) return
/// `Error::LimitsReached` instead of attempting I/O of their own; the
/// btree driver interprets it and decides whether to split a node or
/// shift the KeyList/RecordList boundary. No variant here ever panics
/// or unwinds the stack to signal capacity.
#[derive(Debug)]
pub enum Error {
    /// Detectable on-disk or in-memory corruption: overlapping chunks,
    /// slot-count mismatch, a missing extended-key blob, and so on.
    IntegrityViolated(String),
    /// A KeyList/RecordList/UpfrontIndex has no room for the requested
    /// operation; the caller should split or rebalance and retry.
    LimitsReached,
    KeyNotFound,
    BlobNotFound,
    /// Insert without the `Overwrite` flag on an existing key.
    DuplicateKey,
    IoError(String),
    ShortRead,
    ShortWrite,
    FileNotFound(String),
    WouldBlock,
    InvParameter(&'static str),
    InvKeySize,
    InvPageSize,
    InvFileHeader,
    InvFileVersion,
    NotImplemented(&'static str),
    NotReady,
    DbReadOnly,
    EnvNotEmpty,
    CursorIsNil,
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IntegrityViolated(msg) => write!(f, "integrity violated: {}", msg),
            Error::LimitsReached => write!(f, "limits reached, split required"),
            Error::KeyNotFound => write!(f, "key not found"),
            Error::BlobNotFound => write!(f, "blob not found"),
            Error::DuplicateKey => write!(f, "duplicate key"),
            Error::IoError(msg) => write!(f, "i/o error: {}", msg),
            Error::ShortRead => write!(f, "short read"),
            Error::ShortWrite => write!(f, "short write"),
            Error::FileNotFound(path) => write!(f, "file not found: {}", path),
            Error::WouldBlock => write!(f, "operation would block"),
            Error::InvParameter(p) => write!(f, "invalid parameter: {}", p),
            Error::InvKeySize => write!(f, "invalid key size"),
            Error::InvPageSize => write!(f, "invalid page size"),
            Error::InvFileHeader => write!(f, "invalid file header"),
            Error::InvFileVersion => write!(f, "invalid file version"),
            Error::NotImplemented(what) => write!(f, "not implemented: {}", what),
            Error::NotReady => write!(f, "environment not ready"),
            Error::DbReadOnly => write!(f, "database is read-only"),
            Error::EnvNotEmpty => write!(f, "environment still has open databases"),
            Error::CursorIsNil => write!(f, "cursor is nil"),
            Error::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(e.to_string()),
            std::io::ErrorKind::WouldBlock => Error::WouldBlock,
            std::io::ErrorKind::UnexpectedEof => Error::ShortRead,
            _ => Error::IoError(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
