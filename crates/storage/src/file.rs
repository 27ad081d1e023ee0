use crate::{FileHeader, PAGE_HEADER_BYTES, PageHeader, PageLayout, bitmap};
use buffer::{PageCache, PageGuard};
use common::{
    DbError, DbResult, FIRST_RECORD_PAGE, FileId, NO_PAGE, NO_SLOT, PAGE_SIZE, Record, Rid,
};
use disk::DiskManager;
use std::path::Path;
use std::sync::Arc;
use txn::Context;

/// Handle over one open heap file. Owns the in-memory copy of the file
/// header; the on-disk copy on page 0 is refreshed by [`RecordFile::flush`]
/// and [`RecordFile::close`]. Mutating operations take `&mut self`, which is
/// what serializes free-list and header updates under the single-writer-per-
/// table convention.
pub struct RecordFile {
    fd: FileId,
    disk: Arc<DiskManager>,
    cache: Arc<PageCache>,
    header: FileHeader,
    layout: PageLayout,
    header_dirty: bool,
}

impl RecordFile {
    /// Create a heap file for records of `record_size` bytes: the file is
    /// preallocated and its header page written. The partial file is removed
    /// if initialization fails.
    pub fn create(disk: &Arc<DiskManager>, path: &Path, record_size: usize) -> DbResult<()> {
        let header = FileHeader::for_record_size(record_size)?;
        disk.create_file(path)?;
        let result = (|| {
            let fd = disk.open_file(path)?;
            let mut page0 = vec![0u8; PAGE_SIZE];
            header.encode_into(&mut page0)?;
            let written = disk.write_page(fd, 0, &page0);
            disk.close_file(fd)?;
            written
        })();
        if result.is_err() {
            let _ = disk.destroy_file(path);
        }
        result
    }

    pub fn open(disk: Arc<DiskManager>, cache: Arc<PageCache>, path: &Path) -> DbResult<Self> {
        let fd = disk.open_file(path)?;
        let mut page0 = vec![0u8; PAGE_SIZE];
        disk.read_page(fd, 0, &mut page0)?;
        let header = FileHeader::decode(&page0)?;
        log::debug!(
            "opened heap {} ({} B/record, {} slots/page, {} pages)",
            path.display(),
            header.record_size,
            header.slots_per_page,
            header.num_pages
        );
        Ok(Self {
            fd,
            disk,
            cache,
            layout: PageLayout::from(&header),
            header,
            header_dirty: false,
        })
    }

    /// Flush the header and every dirty page, then release the descriptor.
    pub fn close(mut self) -> DbResult<()> {
        self.flush()?;
        self.cache.evict_file(self.fd);
        self.disk.close_file(self.fd)
    }

    /// Mirror the in-memory header to page 0 and write back dirty pages.
    pub fn flush(&mut self) -> DbResult<()> {
        if self.header_dirty {
            let mut page0 = vec![0u8; PAGE_SIZE];
            self.header.encode_into(&mut page0)?;
            self.disk.write_page(self.fd, 0, &page0)?;
            self.header_dirty = false;
        }
        self.cache.flush_file(self.fd)
    }

    pub fn fd(&self) -> FileId {
        self.fd
    }

    pub fn record_size(&self) -> usize {
        self.layout.record_size
    }

    pub fn slots_per_page(&self) -> usize {
        self.layout.slots_per_page
    }

    pub fn num_pages(&self) -> u32 {
        self.header.num_pages
    }

    pub fn first_free_page(&self) -> i32 {
        self.header.first_free_page
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    /// Pin an existing record page. Page 0 is the header and is never pinned
    /// through here.
    pub fn fetch_page(&self, page_no: i32) -> DbResult<PageGuard> {
        if page_no < FIRST_RECORD_PAGE || page_no as u32 >= self.header.num_pages {
            return Err(DbError::PageNotExist {
                fd: self.fd,
                page_no,
            });
        }
        self.cache.fetch_page(self.fd, page_no)
    }

    /// Append a fresh record page and push it onto the free list before any
    /// record lands in it.
    fn create_new_page(&mut self) -> DbResult<PageGuard> {
        let page_no = self.header.num_pages as i32;
        let mut guard = self.cache.new_page(self.fd, page_no)?;
        let layout = self.layout;
        let header = PageHeader {
            next_free_page: self.header.first_free_page,
            num_records: 0,
        };
        // The frame is zero-filled, so the bitmap starts all-clear.
        guard.write(|page| layout.write_header(page, &header))?;
        self.header.num_pages += 1;
        self.header.first_free_page = page_no;
        self.header_dirty = true;
        log::debug!("{}: allocated record page {page_no}", self.fd);
        Ok(guard)
    }

    /// A pinned page with at least one clear slot: the free-list head, or a
    /// newly created page when the list is empty.
    fn acquire_free_page(&mut self) -> DbResult<PageGuard> {
        match self.header.first_free_page {
            NO_PAGE => self.create_new_page(),
            page_no => self.fetch_page(page_no),
        }
    }

    /// Insert a record wherever a slot is free, returning its new identity.
    /// Takes an exclusive table lock when a context is supplied.
    pub fn insert_record(&mut self, buf: &[u8], ctx: Option<&Context>) -> DbResult<Rid> {
        self.check_record_size(buf)?;
        if let Some(ctx) = ctx {
            ctx.lock_mgr.lock_exclusive_on_table(ctx.txn, self.fd)?;
        }
        let mut guard = self.acquire_free_page()?;
        let page_no = guard.page_no();
        let layout = self.layout;
        let (slot, now_full, next_free) = guard.write(|page| -> DbResult<(usize, bool, i32)> {
            let mut header = layout.header(page)?;
            let slot = bitmap::first_clear(layout.bitmap(page), layout.slots_per_page)
                .ok_or_else(|| {
                    DbError::Internal(format!("free-list page {page_no} has no clear slot"))
                })?;
            layout.slot_mut(page, slot).copy_from_slice(buf);
            bitmap::set(layout.bitmap_mut(page), slot);
            header.num_records += 1;
            let now_full = header.num_records as usize == layout.slots_per_page;
            let next_free = header.next_free_page;
            layout.write_header(page, &header)?;
            Ok((slot, now_full, next_free))
        })?;
        drop(guard);
        if now_full {
            // The page just filled; it was the list head, so the head moves on.
            self.header.first_free_page = next_free;
            self.header_dirty = true;
        }
        Ok(Rid::new(page_no, slot as i32))
    }

    /// Insert a record at a caller-chosen identity (replay and undo paths).
    /// No locking; the slot must currently be vacant.
    pub fn insert_record_at(&mut self, rid: Rid, buf: &[u8]) -> DbResult<()> {
        self.check_record_size(buf)?;
        self.check_slot(rid)?;
        let mut guard = self.fetch_page(rid.page_no)?;
        let layout = self.layout;
        let slot = rid.slot_no as usize;
        let (now_full, next_free) = guard.write(|page| -> DbResult<(bool, i32)> {
            if bitmap::test(layout.bitmap(page), slot) {
                return Err(DbError::SlotOccupied(rid));
            }
            let mut header = layout.header(page)?;
            layout.slot_mut(page, slot).copy_from_slice(buf);
            bitmap::set(layout.bitmap_mut(page), slot);
            header.num_records += 1;
            let now_full = header.num_records as usize == layout.slots_per_page;
            let next_free = header.next_free_page;
            layout.write_header(page, &header)?;
            Ok((now_full, next_free))
        })?;
        drop(guard);
        if now_full {
            self.unlink_free_page(rid.page_no, next_free)?;
        }
        Ok(())
    }

    /// Copy the record out of its slot. Takes a shared row lock when a
    /// context is supplied.
    pub fn get_record(&self, rid: Rid, ctx: Option<&Context>) -> DbResult<Record> {
        if let Some(ctx) = ctx {
            ctx.lock_mgr.lock_shared_on_record(ctx.txn, rid, self.fd)?;
        }
        self.check_slot(rid)?;
        let guard = self.fetch_page(rid.page_no)?;
        let layout = self.layout;
        let slot = rid.slot_no as usize;
        guard.read(|page| {
            if !bitmap::test(layout.bitmap(page), slot) {
                return Err(DbError::RecordNotFound(rid));
            }
            Ok(Record::from(layout.slot(page, slot)))
        })
    }

    /// Overwrite a live record in place. Record size is invariant under
    /// update. Takes an exclusive row lock when a context is supplied.
    pub fn update_record(&mut self, rid: Rid, buf: &[u8], ctx: Option<&Context>) -> DbResult<()> {
        self.check_record_size(buf)?;
        if let Some(ctx) = ctx {
            ctx.lock_mgr.lock_exclusive_on_record(ctx.txn, rid, self.fd)?;
        }
        self.check_slot(rid)?;
        let mut guard = self.fetch_page(rid.page_no)?;
        let layout = self.layout;
        let slot = rid.slot_no as usize;
        guard.write(|page| {
            if !bitmap::test(layout.bitmap(page), slot) {
                return Err(DbError::RecordNotFound(rid));
            }
            layout.slot_mut(page, slot).copy_from_slice(buf);
            Ok(())
        })
    }

    /// Clear a live record's slot. A page leaving the full state rejoins the
    /// free list. Takes an exclusive row lock when a context is supplied.
    pub fn delete_record(&mut self, rid: Rid, ctx: Option<&Context>) -> DbResult<()> {
        if let Some(ctx) = ctx {
            ctx.lock_mgr.lock_exclusive_on_record(ctx.txn, rid, self.fd)?;
        }
        self.check_slot(rid)?;
        let mut guard = self.fetch_page(rid.page_no)?;
        let layout = self.layout;
        let slot = rid.slot_no as usize;
        let old_head = self.header.first_free_page;
        let was_full = guard.write(|page| -> DbResult<bool> {
            if !bitmap::test(layout.bitmap(page), slot) {
                return Err(DbError::RecordNotFound(rid));
            }
            let mut header = layout.header(page)?;
            bitmap::clear(layout.bitmap_mut(page), slot);
            let was_full = header.num_records as usize == layout.slots_per_page;
            header.num_records -= 1;
            if was_full {
                header.next_free_page = old_head;
            }
            layout.write_header(page, &header)?;
            Ok(was_full)
        })?;
        drop(guard);
        if was_full {
            self.header.first_free_page = rid.page_no;
            self.header_dirty = true;
        }
        Ok(())
    }

    /// The next live record strictly after `from` in (page, slot) order, or
    /// `Rid::INVALID` when the file is exhausted. Each probed page is pinned
    /// only while its bitmap is inspected.
    pub fn next_live_rid(&self, from: Rid) -> DbResult<Rid> {
        let slots = self.layout.slots_per_page;
        let mut page_no = from.page_no.max(FIRST_RECORD_PAGE);
        let mut after = if from.page_no < FIRST_RECORD_PAGE || from.slot_no == NO_SLOT {
            None
        } else {
            Some(from.slot_no as usize)
        };
        while (page_no as u32) < self.header.num_pages {
            let guard = self.fetch_page(page_no)?;
            let layout = self.layout;
            let found = guard.read(|page| bitmap::next_set(layout.bitmap(page), slots, after));
            if let Some(slot) = found {
                return Ok(Rid::new(page_no, slot as i32));
            }
            page_no += 1;
            after = None;
        }
        Ok(Rid::INVALID)
    }

    fn check_record_size(&self, buf: &[u8]) -> DbResult<()> {
        if buf.len() != self.layout.record_size {
            return Err(DbError::Internal(format!(
                "record payload is {} bytes, file stores {}",
                buf.len(),
                self.layout.record_size
            )));
        }
        Ok(())
    }

    fn check_slot(&self, rid: Rid) -> DbResult<()> {
        if rid.slot_no < 0 || rid.slot_no as usize >= self.layout.slots_per_page {
            return Err(DbError::RecordNotFound(rid));
        }
        Ok(())
    }

    /// Splice a page that just became full out of the free list. The common
    /// insert path always fills the list head; an insert at a chosen rid can
    /// fill a page deeper in the list, which needs the walk.
    fn unlink_free_page(&mut self, page_no: i32, next_free: i32) -> DbResult<()> {
        if self.header.first_free_page == page_no {
            self.header.first_free_page = next_free;
            self.header_dirty = true;
            return Ok(());
        }
        let mut cursor = self.header.first_free_page;
        while cursor != NO_PAGE {
            let mut guard = self.fetch_page(cursor)?;
            let layout = self.layout;
            let mut header = guard.read(|page| layout.header(page))?;
            if header.next_free_page == page_no {
                header.next_free_page = next_free;
                guard.write(|page| layout.write_header(page, &header))?;
                return Ok(());
            }
            cursor = header.next_free_page;
        }
        Err(DbError::Internal(format!(
            "page {page_no} filled but was not on the free list"
        )))
    }

    /// Audit helper: the page header and bitmap agree on the live count.
    #[doc(hidden)]
    pub fn page_live_counts(&self, page_no: i32) -> DbResult<(u32, u32)> {
        let guard = self.fetch_page(page_no)?;
        let layout = self.layout;
        guard.read(|page| {
            let header = layout.header(page)?;
            let counted = bitmap::count_set(layout.bitmap(page), layout.slots_per_page);
            Ok((header.num_records, counted))
        })
    }

    /// Audit helper: pages reachable from the free-list head, in order.
    #[doc(hidden)]
    pub fn free_list_pages(&self) -> DbResult<Vec<i32>> {
        let mut pages = Vec::new();
        let mut cursor = self.header.first_free_page;
        while cursor != NO_PAGE {
            pages.push(cursor);
            let guard = self.fetch_page(cursor)?;
            let layout = self.layout;
            cursor = guard.read(|page| layout.header(page))?.next_free_page;
        }
        Ok(pages)
    }
}

// PAGE_HEADER_BYTES is part of the layout contract checked by tests.
const _: () = assert!(PAGE_HEADER_BYTES == 8);
