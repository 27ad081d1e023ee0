use crate::{ColDef, ColMeta, DbMeta, IndexMeta, Map, TabMeta};
use buffer::PageCache;
use common::{Config, DbError, DbResult};
use disk::DiskManager;
use index::{Index, MemIndex};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{RecordFile, RecordScan};
use tabled::builder::Builder;
use tabled::settings::Style;
use txn::Context;

/// File inside a database directory holding the serialized catalog.
pub const DB_META_FILE: &str = "DB_META";
/// The database's shared append-only log.
pub const LOG_FILE: &str = "LOG";

struct OpenDb {
    meta: DbMeta,
    root: PathBuf,
    tables: Map<String, RecordFile>,
    indexes: Map<String, MemIndex>,
}

/// Owner of the current database: its directory, catalog, and every open
/// table and index handle. All paths are resolved against the configured
/// base directory; the process working directory is never touched.
pub struct StorageEngine {
    base_dir: PathBuf,
    disk: Arc<DiskManager>,
    cache: Arc<PageCache>,
    db: Option<OpenDb>,
}

impl StorageEngine {
    pub fn new(config: Config) -> Self {
        let disk = Arc::new(DiskManager::new());
        let cache = Arc::new(PageCache::new(disk.clone(), config.cache_pages));
        Self {
            base_dir: config.base_dir,
            disk,
            cache,
            db: None,
        }
    }

    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Name of the open database, if any.
    pub fn db_name(&self) -> Option<&str> {
        self.db.as_ref().map(|db| db.meta.name.as_str())
    }

    /// Create a database directory with a fresh catalog and empty log.
    pub fn create_db(&self, name: &str) -> DbResult<()> {
        let root = self.base_dir.join(name);
        if root.exists() {
            return Err(DbError::DatabaseExists(name.into()));
        }
        fs::create_dir_all(&root)?;
        let meta = DbMeta {
            name: name.into(),
            tables: Map::default(),
        };
        write_meta(&root, &meta)?;
        self.disk.create_log(&root.join(LOG_FILE))?;
        log::info!("created database '{name}' at {}", root.display());
        Ok(())
    }

    /// Remove a database directory recursively. The database must not be
    /// the one currently open.
    pub fn drop_db(&mut self, name: &str) -> DbResult<()> {
        let root = self.base_dir.join(name);
        if !root.exists() {
            return Err(DbError::DatabaseNotFound(name.into()));
        }
        if self.db.as_ref().is_some_and(|db| db.meta.name == name) {
            return Err(DbError::Internal(format!(
                "database '{name}' is open; close it before dropping"
            )));
        }
        fs::remove_dir_all(&root)?;
        log::info!("dropped database '{name}'");
        Ok(())
    }

    /// Load the catalog and open every table's record file and every
    /// declared index. At most one database is open per engine.
    pub fn open_db(&mut self, name: &str) -> DbResult<()> {
        if self.db.is_some() {
            return Err(DbError::Internal("a database is already open".into()));
        }
        let root = self.base_dir.join(name);
        if !root.exists() {
            return Err(DbError::DatabaseNotFound(name.into()));
        }
        let meta = read_meta(&root)?;
        self.disk.open_log(&root.join(LOG_FILE))?;

        let mut tables: Map<String, RecordFile> = Map::default();
        let mut indexes: Map<String, MemIndex> = Map::default();
        let opened = (|| -> DbResult<()> {
            for (table_name, tab) in meta.tables.iter() {
                let file = RecordFile::open(
                    self.disk.clone(),
                    self.cache.clone(),
                    &root.join(table_name),
                )?;
                for ix in &tab.indexes {
                    indexes.insert(ix.name(), build_index(&file, tab, &ix.cols)?);
                }
                tables.insert(table_name.clone(), file);
            }
            Ok(())
        })();
        if let Err(e) = opened {
            for (_, file) in tables.drain() {
                let _ = file.close();
            }
            self.disk.close_log();
            return Err(e);
        }

        log::info!("opened database '{name}' ({} tables)", tables.len());
        self.db = Some(OpenDb {
            meta,
            root,
            tables,
            indexes,
        });
        Ok(())
    }

    /// Flush the catalog, close every handle, and forget all in-memory
    /// state for the open database.
    pub fn close_db(&mut self) -> DbResult<()> {
        let mut db = self.db.take().ok_or_else(no_open_db)?;
        write_meta(&db.root, &db.meta)?;
        for (_, file) in db.tables.drain() {
            file.close()?;
        }
        db.indexes.clear();
        self.disk.close_log();
        log::info!("closed database '{}'", db.meta.name);
        Ok(())
    }

    /// Create a table: assign contiguous column offsets, create its record
    /// file, and persist the catalog.
    pub fn create_table(&mut self, name: &str, col_defs: &[ColDef]) -> DbResult<()> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        if db.meta.tables.contains_key(name) {
            return Err(DbError::TableExists(name.into()));
        }
        if col_defs.is_empty() {
            return Err(DbError::Internal(format!(
                "table '{name}' needs at least one column"
            )));
        }
        let mut cols = Vec::with_capacity(col_defs.len());
        let mut offset = 0;
        for def in col_defs {
            if cols.iter().any(|c: &ColMeta| c.name == def.name) {
                return Err(DbError::Internal(format!(
                    "duplicate column '{}' in table '{name}'",
                    def.name
                )));
            }
            let len = def.col_type.byte_len();
            cols.push(ColMeta {
                table: name.into(),
                name: def.name.clone(),
                col_type: def.col_type,
                len,
                offset,
                indexed: false,
            });
            offset += len;
        }

        let path = db.root.join(name);
        RecordFile::create(&self.disk, &path, offset)?;
        let file = RecordFile::open(self.disk.clone(), self.cache.clone(), &path)?;

        db.meta.tables.insert(
            name.into(),
            TabMeta {
                name: name.into(),
                cols,
                indexes: Vec::new(),
            },
        );
        db.tables.insert(name.into(), file);
        write_meta(&db.root, &db.meta)?;
        log::info!("created table '{name}' ({offset} bytes/record)");
        Ok(())
    }

    /// Drop a table: its indexes, its open handle, and its file. Takes an
    /// exclusive table lock when a context is supplied.
    pub fn drop_table(&mut self, name: &str, ctx: Option<&Context>) -> DbResult<()> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        let tab = db
            .meta
            .tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.into()))?;
        if let Some(ctx) = ctx {
            let file = db
                .tables
                .get(name)
                .ok_or_else(|| DbError::TableNotFound(name.into()))?;
            ctx.lock_mgr.lock_exclusive_on_table(ctx.txn, file.fd())?;
        }
        for ix in &tab.indexes {
            db.indexes.remove(&ix.name());
        }
        if let Some(file) = db.tables.remove(name) {
            file.close()?;
        }
        self.disk.destroy_file(&db.root.join(name))?;
        db.meta.tables.remove(name);
        write_meta(&db.root, &db.meta)?;
        log::info!("dropped table '{name}'");
        Ok(())
    }

    /// Declare a secondary index over `cols` and build it from the heap.
    pub fn create_index(&mut self, table: &str, cols: &[&str]) -> DbResult<()> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        let tab = db
            .meta
            .tables
            .get_mut(table)
            .ok_or_else(|| DbError::TableNotFound(table.into()))?;
        let cols: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
        if tab.has_index(&cols) {
            return Err(DbError::IndexExists(
                IndexMeta {
                    table: table.into(),
                    cols,
                }
                .name(),
            ));
        }
        for name in &cols {
            tab.col(name)?;
        }

        let meta = IndexMeta {
            table: table.into(),
            cols: cols.clone(),
        };
        let file = db
            .tables
            .get(table)
            .ok_or_else(|| DbError::TableNotFound(table.into()))?;
        let built = build_index(file, tab, &cols)?;

        for col in tab.cols.iter_mut().filter(|c| cols.contains(&c.name)) {
            col.indexed = true;
        }
        let index_name = meta.name();
        tab.indexes.push(meta);
        db.indexes.insert(index_name.clone(), built);
        write_meta(&db.root, &db.meta)?;
        log::info!("created index '{index_name}'");
        Ok(())
    }

    /// Unregister a secondary index.
    pub fn drop_index(&mut self, table: &str, cols: &[&str]) -> DbResult<()> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        let tab = db
            .meta
            .tables
            .get_mut(table)
            .ok_or_else(|| DbError::TableNotFound(table.into()))?;
        let cols: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
        let pos = tab
            .indexes
            .iter()
            .position(|ix| ix.cols == cols)
            .ok_or_else(|| {
                DbError::IndexNotFound(
                    IndexMeta {
                        table: table.into(),
                        cols: cols.clone(),
                    }
                    .name(),
                )
            })?;
        let removed = tab.indexes.remove(pos);
        db.indexes.remove(&removed.name());
        for col in tab.cols.iter_mut() {
            col.indexed = tab
                .indexes
                .iter()
                .any(|ix| ix.cols.contains(&col.name));
        }
        write_meta(&db.root, &db.meta)?;
        log::info!("dropped index '{}'", removed.name());
        Ok(())
    }

    /// One-column listing of the tables in the open database.
    pub fn show_tables(&self) -> DbResult<String> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        let mut names: Vec<&String> = db.meta.tables.keys().collect();
        names.sort();

        let mut builder = Builder::default();
        builder.push_record(["Tables"]);
        for name in names {
            builder.push_record([name.as_str()]);
        }
        let mut table = builder.build();
        table.with(Style::ascii());
        Ok(table.to_string())
    }

    /// Column-by-column description of one table.
    pub fn desc_table(&self, name: &str) -> DbResult<String> {
        let tab = self.table_meta(name)?;
        let mut builder = Builder::default();
        builder.push_record(["Field", "Type", "Offset", "Index"]);
        for col in &tab.cols {
            builder.push_record([
                col.name.clone(),
                col.col_type.to_string(),
                col.offset.to_string(),
                if col.indexed { "YES" } else { "NO" }.to_string(),
            ]);
        }
        let mut table = builder.build();
        table.with(Style::ascii());
        Ok(table.to_string())
    }

    pub fn table_meta(&self, name: &str) -> DbResult<&TabMeta> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        db.meta
            .tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.into()))
    }

    pub fn record_file(&self, name: &str) -> DbResult<&RecordFile> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        db.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.into()))
    }

    pub fn record_file_mut(&mut self, name: &str) -> DbResult<&mut RecordFile> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        db.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.into()))
    }

    /// The open handle of the index over `cols` of `table`.
    pub fn index_handle_mut(&mut self, table: &str, cols: &[String]) -> DbResult<&mut MemIndex> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        let name = IndexMeta {
            table: table.into(),
            cols: cols.to_vec(),
        }
        .name();
        db.indexes
            .get_mut(&name)
            .ok_or(DbError::IndexNotFound(name))
    }

    pub fn index_handle(&self, table: &str, cols: &[String]) -> DbResult<&MemIndex> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        let name = IndexMeta {
            table: table.into(),
            cols: cols.to_vec(),
        }
        .name();
        db.indexes.get(&name).ok_or(DbError::IndexNotFound(name))
    }
}

fn no_open_db() -> DbError {
    DbError::Internal("no database is open".into())
}

fn meta_path(root: &Path) -> PathBuf {
    root.join(DB_META_FILE)
}

/// Rewrite the catalog snapshot in full (truncate and write).
fn write_meta(root: &Path, meta: &DbMeta) -> DbResult<()> {
    let data = serde_json::to_string_pretty(meta)
        .map_err(|e| DbError::Internal(format!("serialize catalog failed: {e}")))?;
    fs::write(meta_path(root), data)?;
    Ok(())
}

fn read_meta(root: &Path) -> DbResult<DbMeta> {
    let data = fs::read_to_string(meta_path(root))?;
    serde_json::from_str(&data).map_err(|e| DbError::Internal(format!("invalid catalog file: {e}")))
}

/// Build an index over `cols` by scanning every live record of the heap.
fn build_index(file: &RecordFile, tab: &TabMeta, cols: &[String]) -> DbResult<MemIndex> {
    let mut ix = MemIndex::new();
    let mut scan = RecordScan::new(file)?;
    while !scan.is_end() {
        let record = scan.record(None)?;
        ix.insert_entry(&tab.index_key(cols, &record.data)?, scan.rid(), None)?;
        scan.advance()?;
    }
    Ok(ix)
}
