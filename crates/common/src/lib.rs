
use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Size of a disk page in bytes. Fixed at file-format level; every on-disk
/// structure in the engine is laid out against this constant.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel page number: "no page". Terminates the free-page list and marks
/// an exhausted scan cursor.
pub const NO_PAGE: i32 = -1;

/// Sentinel slot number: "no slot".
pub const NO_SLOT: i32 = -1;

/// First page of a heap file that holds records; page 0 is the file header.
pub const FIRST_RECORD_PAGE: i32 = 1;

/// Descriptor token handed out by the disk manager for an open file.
/// Examples:
/// - `let fd = disk.open_file(&path)?;`
/// - `cache.fetch_page(fd, 1)?;`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd#{}", self.0)
    }
}

/// Identifier of a record within a heap file: (page_no, slot_no).
///
/// `page_no == NO_PAGE` marks end-of-scan; `slot_no == NO_SLOT` marks a
/// cursor positioned before the first slot of a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_no: i32,
    pub slot_no: i32,
}

impl Rid {
    pub const INVALID: Rid = Rid {
        page_no: NO_PAGE,
        slot_no: NO_SLOT,
    };

    pub fn new(page_no: i32, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }

    /// True when both components point at an actual slot.
    pub fn is_valid(&self) -> bool {
        self.page_no >= FIRST_RECORD_PAGE && self.slot_no >= 0
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_no, self.slot_no)
    }
}

/// An independently owned record payload, copied out of a pinned page.
/// Outlives the pin it was read under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The bytes of one fixed-width field.
    pub fn field(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }
}

/// Canonical error type shared across the engine's subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("database '{0}' already exists")]
    DatabaseExists(String),
    #[error("database '{0}' not found")]
    DatabaseNotFound(String),
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("index '{0}' already exists")]
    IndexExists(String),
    #[error("index '{0}' not found")]
    IndexNotFound(String),
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
    #[error("incompatible types: {lhs} vs {rhs}")]
    IncompatibleType { lhs: String, rhs: String },
    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("{0} is not open")]
    FileNotOpen(FileId),
    #[error("file still open: {}", .0.display())]
    FileStillOpen(PathBuf),
    #[error("page {page_no} does not exist in {fd}")]
    PageNotExist { fd: FileId, page_no: i32 },
    #[error("record not found at {0}")]
    RecordNotFound(Rid),
    #[error("slot already occupied at {0}")]
    SlotOccupied(Rid),
    #[error("no space left on device")]
    NoSpace,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("transaction aborted")]
    TransactionAborted,
    #[error("internal: {0}")]
    Internal(String),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .base_dir(PathBuf::from("./my_data"))
///     .cache_pages(512)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory under which database directories are created. Threaded
    /// through the engine as an absolute base; the working directory is
    /// never changed.
    #[builder(default = PathBuf::from("./db_data"))]
    pub base_dir: PathBuf,
    /// Number of pages the page cache keeps resident.
    #[builder(default = 256)]
    pub cache_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./db_data"),
            cache_pages: 256,
        }
    }
}
