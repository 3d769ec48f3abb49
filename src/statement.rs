use std::path::{Path, PathBuf};

use crate::types::{ColumnType, Value};

/// An on-disk table: an ordered schema plus the path of its backing heap
/// file. Immutable once built; the execution pipeline shares it by
/// reference so operators can resolve column names to positions.
#[derive(PartialEq, Clone, Debug)]
pub struct Table {
    schema: Vec<(String, ColumnType)>,
    path: PathBuf,
}

impl Table {
    pub fn new<P: Into<PathBuf>>(schema: Vec<(String, ColumnType)>, path: P) -> Table {
        Table {
            schema,
            path: path.into(),
        }
    }

    pub fn schema(&self) -> &[(String, ColumnType)] {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position of a named column in the schema, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|(col, _)| col == name)
    }
}

/// A selection filter: the columns the predicate wants, in the order it
/// wants them, plus the predicate itself.
pub struct Filter {
    pub column_args: Vec<String>,
    pub predicate: Box<dyn Fn(&[Value]) -> bool>,
}

/// One sort key of an order-by clause.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct SortColumn {
    pub column: String,
    pub asc: bool,
}

impl SortColumn {
    pub fn asc(column: &str) -> SortColumn {
        SortColumn {
            column: column.to_owned(),
            asc: true,
        }
    }

    pub fn desc(column: &str) -> SortColumn {
        SortColumn {
            column: column.to_owned(),
            asc: false,
        }
    }
}

/// A pre-parsed read query. Optional clauses are skipped when absent.
pub struct Query<'a> {
    pub from: &'a Table,
    pub select: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub order_by: Option<Vec<SortColumn>>,
    pub limit: Option<usize>,
}

impl<'a> Query<'a> {
    /// A bare scan of `table`: no selection, no ordering, no limit.
    pub fn scan(table: &'a Table) -> Query<'a> {
        Query {
            from: table,
            select: None,
            filter: None,
            order_by: None,
            limit: None,
        }
    }
}

/// A pre-parsed insert. Exactly one of `values` and `from_query` must be
/// set; the executor rejects anything else as malformed.
pub struct Insert<'a> {
    pub into: &'a Table,
    pub values: Option<Vec<Vec<String>>>,
    pub from_query: Option<Query<'a>>,
}

/// A statement as submitted to the executor, already parsed into
/// structured form.
pub enum Statement<'a> {
    CreateTable { table: &'a Table },
    Query(Query<'a>),
    Insert(Insert<'a>),
}
