use crate::RecordFile;
use common::{DbResult, FIRST_RECORD_PAGE, NO_PAGE, NO_SLOT, Record, Rid};
use txn::Context;

/// Cursor over the live records of a heap file, in (page, slot) order.
///
/// The cursor observes each page as it is pinned: deletes behind the cursor
/// and inserts ahead of it are visible or invisible accordingly, and no
/// stability beyond that is promised. Every live record present for the
/// whole scan is visited exactly once.
pub struct RecordScan<'f> {
    file: &'f RecordFile,
    rid: Rid,
}

impl<'f> RecordScan<'f> {
    /// Open a scan positioned on the first live record, or at end for an
    /// empty file.
    pub fn new(file: &'f RecordFile) -> DbResult<Self> {
        let start = Rid::new(FIRST_RECORD_PAGE, NO_SLOT);
        Ok(Self {
            file,
            rid: file.next_live_rid(start)?,
        })
    }

    /// Step to the next live record; past the last one the scan is at end.
    pub fn advance(&mut self) -> DbResult<()> {
        if !self.is_end() {
            self.rid = self.file.next_live_rid(self.rid)?;
        }
        Ok(())
    }

    pub fn is_end(&self) -> bool {
        self.rid.page_no == NO_PAGE
    }

    /// Identity of the record under the cursor.
    pub fn rid(&self) -> Rid {
        self.rid
    }

    /// Copy out the record under the cursor.
    pub fn record(&self, ctx: Option<&Context>) -> DbResult<Record> {
        self.file.get_record(self.rid, ctx)
    }
}
