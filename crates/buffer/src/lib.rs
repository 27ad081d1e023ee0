//! Page cache between the record layer and the disk manager.
//!
//! Frames are pinned by [`PageCache::fetch_page`]/[`PageCache::new_page`] and
//! unpinned when the returned [`PageGuard`] drops, so a pin is released on
//! every exit path. Unpinned frames are eviction candidates in LRU order;
//! dirty frames are written back before their frame is reused.

#[cfg(test)]
mod tests;

use common::{DbError, DbResult, FileId, PAGE_SIZE};
use disk::DiskManager;
use hashbrown::HashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// (file, page) pair identifying a cached frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub fd: FileId,
    pub page_no: i32,
}

struct FrameInner {
    data: RwLock<Box<[u8]>>,
    dirty: AtomicBool,
}

struct FrameSlot {
    frame: Arc<FrameInner>,
    pins: usize,
}

struct Inner {
    frames: HashMap<PageKey, FrameSlot>,
    /// Eviction order over frames with zero pins.
    replacer: LruCache<PageKey, ()>,
}

/// Fixed-capacity page cache with pin counting and LRU eviction.
pub struct PageCache {
    disk: Arc<DiskManager>,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl PageCache {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(disk: Arc<DiskManager>, capacity: usize) -> Self {
        assert!(capacity > 0, "page cache capacity must be > 0");
        Self {
            disk,
            capacity,
            inner: Mutex::new(Inner {
                frames: HashMap::new(),
                replacer: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
            }),
        }
    }

    /// Pin the page, loading it from disk on a miss. The caller relinquishes
    /// the pin by dropping the guard.
    pub fn fetch_page(self: &Arc<Self>, fd: FileId, page_no: i32) -> DbResult<PageGuard> {
        let key = PageKey { fd, page_no };
        let mut inner = self.lock_inner();

        if let Some(slot) = inner.frames.get_mut(&key) {
            slot.pins += 1;
            let frame = slot.frame.clone();
            if slot.pins == 1 {
                inner.replacer.pop(&key);
            }
            return Ok(self.guard(key, frame));
        }

        self.evict_if_full(&mut inner)?;

        let mut data = vec![0u8; PAGE_SIZE].into_boxed_slice();
        self.disk.read_page(fd, page_no, &mut data)?;
        let frame = Arc::new(FrameInner {
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
        });
        inner.frames.insert(
            key,
            FrameSlot {
                frame: frame.clone(),
                pins: 1,
            },
        );
        Ok(self.guard(key, frame))
    }

    /// Pin a fresh zero-filled frame for a page the caller is about to
    /// initialize. The frame starts dirty so it reaches disk even if the
    /// caller writes nothing else.
    pub fn new_page(self: &Arc<Self>, fd: FileId, page_no: i32) -> DbResult<PageGuard> {
        let key = PageKey { fd, page_no };
        let mut inner = self.lock_inner();

        if inner.frames.contains_key(&key) {
            return Err(DbError::Internal(format!(
                "new_page over a cached frame: {fd} page {page_no}"
            )));
        }
        self.evict_if_full(&mut inner)?;

        let frame = Arc::new(FrameInner {
            data: RwLock::new(vec![0u8; PAGE_SIZE].into_boxed_slice()),
            dirty: AtomicBool::new(true),
        });
        inner.frames.insert(
            key,
            FrameSlot {
                frame: frame.clone(),
                pins: 1,
            },
        );
        Ok(self.guard(key, frame))
    }

    /// Write back every dirty frame of `fd`.
    pub fn flush_file(&self, fd: FileId) -> DbResult<()> {
        let inner = self.lock_inner();
        for (key, slot) in inner.frames.iter().filter(|(key, _)| key.fd == fd) {
            self.write_back(*key, &slot.frame)?;
        }
        Ok(())
    }

    /// Write back every dirty frame in the cache.
    pub fn flush_all(&self) -> DbResult<()> {
        let inner = self.lock_inner();
        for (key, slot) in inner.frames.iter() {
            self.write_back(*key, &slot.frame)?;
        }
        Ok(())
    }

    /// Drop every frame of `fd` without write-back. For files being closed
    /// (already flushed) or destroyed (contents no longer wanted).
    pub fn evict_file(&self, fd: FileId) {
        let mut inner = self.lock_inner();
        let keys: Vec<PageKey> = inner
            .frames
            .keys()
            .filter(|key| key.fd == fd)
            .copied()
            .collect();
        for key in keys {
            inner.frames.remove(&key);
            inner.replacer.pop(&key);
        }
    }

    fn guard(self: &Arc<Self>, key: PageKey, frame: Arc<FrameInner>) -> PageGuard {
        PageGuard {
            cache: self.clone(),
            key,
            frame,
            dirty: false,
        }
    }

    fn unpin(&self, key: PageKey, dirty: bool) {
        let mut inner = self.lock_inner();
        if let Some(slot) = inner.frames.get_mut(&key) {
            if dirty {
                slot.frame.dirty.store(true, Ordering::Release);
            }
            slot.pins = slot.pins.saturating_sub(1);
            if slot.pins == 0 {
                inner.replacer.push(key, ());
            }
        }
    }

    fn evict_if_full(&self, inner: &mut Inner) -> DbResult<()> {
        if inner.frames.len() < self.capacity {
            return Ok(());
        }
        let Some((victim, ())) = inner.replacer.pop_lru() else {
            return Err(DbError::Internal(
                "page cache exhausted: every frame is pinned".into(),
            ));
        };
        if let Some(slot) = inner.frames.get(&victim) {
            self.write_back(victim, &slot.frame)?;
        }
        inner.frames.remove(&victim);
        Ok(())
    }

    fn write_back(&self, key: PageKey, frame: &Arc<FrameInner>) -> DbResult<()> {
        if !frame.dirty.load(Ordering::Acquire) {
            return Ok(());
        }
        let data = frame.data.read().expect("page frame lock poisoned");
        self.disk.write_page(key.fd, key.page_no, &data)?;
        frame.dirty.store(false, Ordering::Release);
        Ok(())
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("page cache lock poisoned")
    }
}

/// A pinned page. Byte access goes through the per-frame lock, serializing
/// readers and writers while the page is pinned; dropping the guard unpins
/// and publishes the dirty flag.
pub struct PageGuard {
    cache: Arc<PageCache>,
    key: PageKey,
    frame: Arc<FrameInner>,
    dirty: bool,
}

impl std::fmt::Debug for PageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("key", &self.key)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl PageGuard {
    pub fn page_no(&self) -> i32 {
        self.key.page_no
    }

    /// Read access to the page bytes.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.frame.data.read().expect("page frame lock poisoned");
        f(&data)
    }

    /// Write access to the page bytes; marks the page dirty.
    pub fn write<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.dirty = true;
        let mut data = self.frame.data.write().expect("page frame lock poisoned");
        f(&mut data)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.cache.unpin(self.key, self.dirty);
    }
}
