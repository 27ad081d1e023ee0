//! Shared fixtures for operator tests.

use crate::{ExecContext, Operator, execute, tuple};
use catalog::{ColDef, ColMeta, StorageEngine};
use common::{Config, DbResult, Record, Rid};
use tempfile::TempDir;
use types::{ColType, Value};

/// Engine with an open database holding `people(id INT, name CHAR(8),
/// score FLOAT)`.
pub fn setup_people() -> (StorageEngine, TempDir) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = StorageEngine::new(
        Config::builder()
            .base_dir(dir.path().to_path_buf())
            .cache_pages(32)
            .build(),
    );
    engine.create_db("testdb").unwrap();
    engine.open_db("testdb").unwrap();
    engine
        .create_table(
            "people",
            &[
                ColDef::new("id", ColType::Int),
                ColDef::new("name", ColType::Str(8)),
                ColDef::new("score", ColType::Float),
            ],
        )
        .unwrap();
    (engine, dir)
}

/// Insert one row given as values, returning where it landed.
pub fn insert_values(engine: &mut StorageEngine, table: &str, values: &[Value]) -> Rid {
    let tab = engine.table_meta(table).unwrap().clone();
    let record = tuple::encode_record(&tab, values).unwrap();
    engine
        .record_file_mut(table)
        .unwrap()
        .insert_record(&record.data, None)
        .unwrap()
}

/// Run an operator tree to completion, panicking on error.
pub fn drain(op: &mut dyn Operator, ctx: &mut ExecContext) -> Vec<Record> {
    execute(op, ctx).unwrap()
}

pub fn col_meta(table: &str, name: &str, col_type: ColType, offset: usize) -> ColMeta {
    ColMeta {
        table: table.into(),
        name: name.into(),
        col_type,
        len: col_type.byte_len(),
        offset,
        indexed: false,
    }
}

/// A record of consecutive INT fields.
pub fn int_record(values: &[i32]) -> Record {
    let mut data = Vec::with_capacity(values.len() * 4);
    for v in values {
        data.extend_from_slice(&Value::Int(*v).encode(ColType::Int).unwrap());
    }
    Record::new(data)
}

/// In-memory operator for exercising join, sort, and projection in
/// isolation. Restartable, like any well-behaved child.
pub struct MockOperator {
    cols: Vec<ColMeta>,
    rows: Vec<Record>,
    cursor: usize,
}

impl MockOperator {
    pub fn new(cols: Vec<ColMeta>, rows: Vec<Record>) -> Self {
        Self {
            cols,
            rows,
            cursor: 0,
        }
    }
}

impl Operator for MockOperator {
    fn begin(&mut self, _ctx: &mut ExecContext) -> DbResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn advance(&mut self, _ctx: &mut ExecContext) -> DbResult<()> {
        if self.cursor < self.rows.len() {
            self.cursor += 1;
        }
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.cursor >= self.rows.len()
    }

    fn next_record(&mut self, _ctx: &mut ExecContext) -> DbResult<Option<Record>> {
        Ok(self.rows.get(self.cursor).cloned())
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.cols.iter().map(|c| c.len).sum()
    }

    fn rid(&self) -> Rid {
        Rid::INVALID
    }
}
