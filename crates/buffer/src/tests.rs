use super::*;
use std::path::PathBuf;
use tempfile::{TempDir, tempdir};

fn setup(capacity: usize) -> (Arc<DiskManager>, Arc<PageCache>, FileId, PathBuf, TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t");
    let disk = Arc::new(DiskManager::new());
    disk.create_file(&path).unwrap();
    let fd = disk.open_file(&path).unwrap();
    let cache = Arc::new(PageCache::new(disk.clone(), capacity));
    (disk, cache, fd, path, dir)
}

#[test]
fn fetch_miss_loads_from_disk() {
    let (disk, cache, fd, _path, _dir) = setup(4);

    let mut page = vec![0u8; PAGE_SIZE];
    page[17] = 0x5a;
    disk.write_page(fd, 1, &page).unwrap();

    let guard = cache.fetch_page(fd, 1).unwrap();
    assert_eq!(guard.read(|data| data[17]), 0x5a);
}

#[test]
fn writes_survive_unpin_and_refetch() {
    let (_disk, cache, fd, _path, _dir) = setup(4);

    {
        let mut guard = cache.new_page(fd, 1).unwrap();
        guard.write(|data| data[0] = 0x77);
    }
    let guard = cache.fetch_page(fd, 1).unwrap();
    assert_eq!(guard.read(|data| data[0]), 0x77);
}

#[test]
fn eviction_writes_dirty_frame_back() {
    let (disk, cache, fd, _path, _dir) = setup(1);

    {
        let mut guard = cache.new_page(fd, 1).unwrap();
        guard.write(|data| data[3] = 0x42);
    }
    // Capacity 1: pinning another page forces page 1 out.
    let _other = cache.fetch_page(fd, 2).unwrap();

    let mut back = vec![0u8; PAGE_SIZE];
    disk.read_page(fd, 1, &mut back).unwrap();
    assert_eq!(back[3], 0x42);
}

#[test]
fn pinned_frames_are_not_evictable() {
    let (_disk, cache, fd, _path, _dir) = setup(1);

    let _pinned = cache.fetch_page(fd, 1).unwrap();
    let err = cache.fetch_page(fd, 2).unwrap_err();
    assert!(matches!(err, DbError::Internal(_)));
}

#[test]
fn pin_counts_nest() {
    let (_disk, cache, fd, _path, _dir) = setup(1);

    let a = cache.fetch_page(fd, 1).unwrap();
    let b = cache.fetch_page(fd, 1).unwrap();
    drop(a);
    // One pin remains, so the frame still cannot be evicted.
    assert!(cache.fetch_page(fd, 2).is_err());

    drop(b);
    cache.fetch_page(fd, 2).unwrap();
}

#[test]
fn flush_file_persists_without_eviction() {
    let (disk, cache, fd, _path, _dir) = setup(4);

    {
        let mut guard = cache.new_page(fd, 1).unwrap();
        guard.write(|data| data[9] = 0x11);
    }
    cache.flush_file(fd).unwrap();

    let mut back = vec![0u8; PAGE_SIZE];
    disk.read_page(fd, 1, &mut back).unwrap();
    assert_eq!(back[9], 0x11);
}

#[test]
fn evict_file_discards_unflushed_frames() {
    let (disk, cache, fd, _path, _dir) = setup(4);

    {
        let mut guard = cache.new_page(fd, 1).unwrap();
        guard.write(|data| data[0] = 0xee);
    }
    cache.evict_file(fd);

    let mut back = vec![0u8; PAGE_SIZE];
    disk.read_page(fd, 1, &mut back).unwrap();
    assert_eq!(back[0], 0, "discarded frame must not reach disk");
}
