//! Page-granular file I/O and the shared append-only log.
//!
//! The disk manager owns the mapping between paths and open descriptors and
//! performs all reads and writes positionally (`read_at`/`write_at`), so no
//! shared file-position state exists between concurrent callers.


use common::{DbError, DbResult, FileId, PAGE_SIZE};
use hashbrown::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

/// Pages preallocated at file creation: the header page plus headroom.
const PREALLOC_PAGES: u64 = 4;

struct OpenFile {
    path: PathBuf,
    file: Arc<File>,
    next_page: Arc<AtomicI32>,
}

#[derive(Default)]
struct Registry {
    by_path: HashMap<PathBuf, FileId>,
    by_fd: HashMap<FileId, OpenFile>,
    next_fd: u32,
}

/// Named-file persistence at page granularity, plus one append-only log.
pub struct DiskManager {
    registry: Mutex<Registry>,
    log: Mutex<Option<File>>,
}

impl DiskManager {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            log: Mutex::new(None),
        }
    }

    /// Create a new file, preallocating `PREALLOC_PAGES` pages of zeroes.
    /// Parent directories are created as needed. A partially created file is
    /// removed again on any error after creation.
    pub fn create_file(&self, path: &Path) -> DbResult<()> {
        if path.exists() {
            return Err(DbError::FileExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = File::create_new(path)?;
        if let Err(e) = file.set_len(PREALLOC_PAGES * PAGE_SIZE as u64) {
            let _ = fs::remove_file(path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove a file from disk. The file must exist and must not be open.
    pub fn destroy_file(&self, path: &Path) -> DbResult<()> {
        if !path.exists() {
            return Err(DbError::FileNotFound(path.to_path_buf()));
        }
        let registry = self.lock_registry();
        if registry.by_path.contains_key(path) {
            return Err(DbError::FileStillOpen(path.to_path_buf()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Open a file read-write and register it. Idempotent per path: opening
    /// an already-open path returns the existing descriptor. The per-fd page
    /// counter starts at 0.
    pub fn open_file(&self, path: &Path) -> DbResult<FileId> {
        let mut registry = self.lock_registry();
        if let Some(&fd) = registry.by_path.get(path) {
            return Ok(fd);
        }
        if !path.exists() {
            return Err(DbError::FileNotFound(path.to_path_buf()));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let fd = FileId(registry.next_fd);
        registry.next_fd += 1;
        registry.by_path.insert(path.to_path_buf(), fd);
        registry.by_fd.insert(
            fd,
            OpenFile {
                path: path.to_path_buf(),
                file: Arc::new(file),
                next_page: Arc::new(AtomicI32::new(0)),
            },
        );
        log::debug!("opened {} as {fd}", path.display());
        Ok(fd)
    }

    /// Deregister an open descriptor.
    pub fn close_file(&self, fd: FileId) -> DbResult<()> {
        let mut registry = self.lock_registry();
        let open = registry.by_fd.remove(&fd).ok_or(DbError::FileNotOpen(fd))?;
        registry.by_path.remove(&open.path);
        Ok(())
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.lock_registry().by_path.contains_key(path)
    }

    /// Read one page into `buf`. A read that lands entirely past EOF
    /// zero-fills the buffer and succeeds; any other short read is an error.
    pub fn read_page(&self, fd: FileId, page_no: i32, buf: &mut [u8]) -> DbResult<()> {
        let file = self.handle(fd)?;
        let n = file.read_at(buf, page_offset(page_no))?;
        if n == 0 {
            buf.fill(0);
            return Ok(());
        }
        if n < buf.len() {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read of page {page_no}: {n} of {} bytes", buf.len()),
            )));
        }
        Ok(())
    }

    /// Write one page from `buf` at its positional offset.
    pub fn write_page(&self, fd: FileId, page_no: i32, buf: &[u8]) -> DbResult<()> {
        let file = self.handle(fd)?;
        match file.write_at(buf, page_offset(page_no)) {
            Ok(n) if n == buf.len() => Ok(()),
            Ok(n) => Err(DbError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write of page {page_no}: {n} of {} bytes", buf.len()),
            ))),
            Err(e) if is_out_of_space(&e) => Err(DbError::NoSpace),
            Err(e) => Err(e.into()),
        }
    }

    /// Hand out the next logical page number for `fd`. Fetch-and-add, safe
    /// under concurrent callers.
    pub fn allocate_page(&self, fd: FileId) -> DbResult<i32> {
        let counter = {
            let registry = self.lock_registry();
            registry
                .by_fd
                .get(&fd)
                .ok_or(DbError::FileNotOpen(fd))?
                .next_page
                .clone()
        };
        Ok(counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Pages are never reclaimed; deallocation is a logical no-op and the
    /// file does not shrink.
    pub fn deallocate_page(&self, _page_no: i32) {}

    /// Create an empty log file.
    pub fn create_log(&self, path: &Path) -> DbResult<()> {
        if path.exists() {
            return Err(DbError::FileExists(path.to_path_buf()));
        }
        File::create_new(path)?;
        Ok(())
    }

    /// Open the shared log file in append mode.
    pub fn open_log(&self, path: &Path) -> DbResult<()> {
        if !path.exists() {
            return Err(DbError::FileNotFound(path.to_path_buf()));
        }
        let file = OpenOptions::new().read(true).append(true).open(path)?;
        *self.lock_log() = Some(file);
        Ok(())
    }

    pub fn close_log(&self) {
        *self.lock_log() = None;
    }

    /// Append `buf` at the current end of the log. The file is opened with
    /// O_APPEND, so the write lands atomically at the tail.
    pub fn write_log(&self, buf: &[u8]) -> DbResult<()> {
        let guard = self.lock_log();
        let mut file = guard
            .as_ref()
            .ok_or_else(|| DbError::Internal("log file not open".into()))?;
        file.write_all(buf)?;
        Ok(())
    }

    /// Read up to `buf.len()` bytes of the log starting at `offset`.
    /// Returns the bytes read, or `None` when `offset` lies past the end of
    /// the file.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> DbResult<Option<usize>> {
        let guard = self.lock_log();
        let file = guard
            .as_ref()
            .ok_or_else(|| DbError::Internal("log file not open".into()))?;
        let size = file.metadata()?.len();
        if offset > size {
            return Ok(None);
        }
        let want = buf.len().min((size - offset) as usize);
        file.read_exact_at(&mut buf[..want], offset)?;
        Ok(Some(want))
    }

    fn handle(&self, fd: FileId) -> DbResult<Arc<File>> {
        let registry = self.lock_registry();
        Ok(registry
            .by_fd
            .get(&fd)
            .ok_or(DbError::FileNotOpen(fd))?
            .file
            .clone())
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().expect("disk registry lock poisoned")
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Option<File>> {
        self.log.lock().expect("log lock poisoned")
    }
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}

fn page_offset(page_no: i32) -> u64 {
    page_no as u64 * PAGE_SIZE as u64
}

fn is_out_of_space(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded
    )
}
