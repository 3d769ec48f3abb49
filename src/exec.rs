use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::page::HeapPage;
use crate::statement::{Filter, Insert, Query, SortColumn, Statement, Table};
use crate::storage::PagedFile;
use crate::types::{Row, Value};

/// A pull-based plan operator.
///
/// Every node is a single-pass stream: pulling after the stream has
/// ended keeps yielding `None`. The `table` accessor exposes the
/// effective input table so downstream nodes can resolve column names
/// to positions at construction time, never per row.
pub trait PlanNode {
    fn table(&self) -> &Table;

    fn next_row(&mut self) -> Result<Option<Row>>;
}

fn resolve_column(table: &Table, name: &str) -> Result<usize> {
    table
        .column_index(name)
        .ok_or_else(|| Error::UnknownColumn(name.to_owned()))
}

/// Scans a table's heap file page by page, yielding rows in physical
/// order: page order on disk, insertion order within a page.
pub struct FileScanNode<'a> {
    table: &'a Table,
    file: PagedFile,
    page_size: usize,
    next_page_no: u64,
    page: Option<(HeapPage<'a>, u16)>,
    done: bool,
}

impl<'a> FileScanNode<'a> {
    pub fn new(table: &'a Table, page_size: usize) -> Result<FileScanNode<'a>> {
        let file = PagedFile::open_read(table.path(), page_size)?;
        Ok(FileScanNode {
            table,
            file,
            page_size,
            next_page_no: 0,
            page: None,
            done: false,
        })
    }
}

impl PlanNode for FileScanNode<'_> {
    fn table(&self) -> &Table {
        self.table
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        loop {
            if let Some((page, idx)) = self.page.as_mut() {
                if *idx < page.num_records() {
                    let row = page.decode_record(*idx)?;
                    *idx += 1;
                    return Ok(Some(row));
                }
                self.page = None;
            }
            let mut buf = vec![0; self.page_size];
            if !self.file.read_page(self.next_page_no, &mut buf)? {
                self.done = true;
                return Ok(None);
            }
            trace!(page_no = self.next_page_no, "scanning page");
            self.next_page_no += 1;
            self.page = Some((HeapPage::from_buffer(self.table.schema(), buf)?, 0));
        }
    }
}

/// Yields literal rows, parsing each string through the destination
/// schema's `from_str` lazily, one row per pull.
pub struct ValuesNode<'a> {
    table: &'a Table,
    rows: std::vec::IntoIter<Vec<String>>,
}

impl<'a> ValuesNode<'a> {
    pub fn new(table: &'a Table, rows: Vec<Vec<String>>) -> ValuesNode<'a> {
        ValuesNode {
            table,
            rows: rows.into_iter(),
        }
    }
}

impl PlanNode for ValuesNode<'_> {
    fn table(&self) -> &Table {
        self.table
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let literals = match self.rows.next() {
            Some(literals) => literals,
            None => return Ok(None),
        };
        let schema = self.table.schema();
        if literals.len() != schema.len() {
            return Err(Error::SchemaMismatch {
                want: schema.len(),
                got: literals.len(),
            });
        }
        let row = schema
            .iter()
            .zip(&literals)
            .map(|((_, dtype), literal)| dtype.from_str(literal))
            .collect::<Result<Row>>()?;
        Ok(Some(row))
    }
}

/// Single-shot sink: drains its child into the destination heap file,
/// then yields one row holding the number of rows inserted.
///
/// Appends go to the file's last page; when a record does not fit, the
/// page is written back and a fresh page takes its place at the next
/// position. Only one file position is ever being overwritten, and the
/// file grows in whole pages. There is no atomicity: a failure mid-way
/// can leave the file extended or its last page rewritten.
pub struct InsertNode<'a> {
    child: Box<dyn PlanNode + 'a>,
    table: &'a Table,
    page_size: usize,
    done: bool,
}

impl<'a> InsertNode<'a> {
    pub fn new(child: Box<dyn PlanNode + 'a>, table: &'a Table, page_size: usize) -> InsertNode<'a> {
        InsertNode {
            child,
            table,
            page_size,
            done: false,
        }
    }

    fn run(&mut self) -> Result<u32> {
        let table = self.table;
        let mut file = PagedFile::open_rw(table.path(), self.page_size)?;
        let mut page_no = file.page_count()? - 1;
        let mut buf = vec![0; self.page_size];
        if !file.read_page(page_no, &mut buf)? {
            return Err(Error::CorruptedStorage(String::from(
                "heap file lost its last page",
            )));
        }
        let mut page = HeapPage::from_buffer(table.schema(), buf)?;

        let mut inserted = 0u32;
        while let Some(row) = self.child.next_row()? {
            match page.insert_record(&row) {
                Ok(()) => {}
                Err(Error::InsufficientSpace { .. }) => {
                    file.write_page(page_no, &page.marshall())?;
                    debug!(page_no, "page full, rotating to a fresh page");
                    page_no += 1;
                    page = HeapPage::new(table.schema(), self.page_size);
                    // a record larger than an empty page is fatal
                    page.insert_record(&row)?;
                }
                Err(e) => return Err(e),
            }
            inserted += 1;
        }
        if page.num_records() > 0 {
            file.write_page(page_no, &page.marshall())?;
        }
        Ok(inserted)
    }
}

impl PlanNode for InsertNode<'_> {
    fn table(&self) -> &Table {
        self.table
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let inserted = self.run()?;
        debug!(inserted, "insert finished");
        Ok(Some(vec![Value::UInt32(inserted)]))
    }
}

/// Narrows each child row to the requested columns, in request order.
pub struct ProjectionNode<'a> {
    child: Box<dyn PlanNode + 'a>,
    indices: Vec<usize>,
}

impl<'a> ProjectionNode<'a> {
    pub fn new(child: Box<dyn PlanNode + 'a>, columns: &[String]) -> Result<ProjectionNode<'a>> {
        let indices = columns
            .iter()
            .map(|name| resolve_column(child.table(), name))
            .collect::<Result<Vec<usize>>>()?;
        Ok(ProjectionNode { child, indices })
    }
}

impl PlanNode for ProjectionNode<'_> {
    fn table(&self) -> &Table {
        self.child.table()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let row = match self.child.next_row()? {
            Some(row) => row,
            None => return Ok(None),
        };
        Ok(Some(self.indices.iter().map(|&i| row[i].clone()).collect()))
    }
}

/// Pulls the child until the filter predicate accepts a row, then
/// yields that row unchanged.
pub struct SelectionNode<'a> {
    child: Box<dyn PlanNode + 'a>,
    filter: Filter,
    arg_indices: Vec<usize>,
}

impl<'a> SelectionNode<'a> {
    pub fn new(child: Box<dyn PlanNode + 'a>, filter: Filter) -> Result<SelectionNode<'a>> {
        let arg_indices = filter
            .column_args
            .iter()
            .map(|name| resolve_column(child.table(), name))
            .collect::<Result<Vec<usize>>>()?;
        Ok(SelectionNode {
            child,
            filter,
            arg_indices,
        })
    }
}

impl PlanNode for SelectionNode<'_> {
    fn table(&self) -> &Table {
        self.child.table()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            let row = match self.child.next_row()? {
                Some(row) => row,
                None => return Ok(None),
            };
            let args: Vec<Value> = self.arg_indices.iter().map(|&i| row[i].clone()).collect();
            if (self.filter.predicate)(&args) {
                return Ok(Some(row));
            }
        }
    }
}

/// Ends the stream after a fixed number of rows. Once the count runs
/// out the child is never pulled again.
pub struct LimitNode<'a> {
    child: Box<dyn PlanNode + 'a>,
    remaining: usize,
}

impl<'a> LimitNode<'a> {
    pub fn new(child: Box<dyn PlanNode + 'a>, limit: usize) -> LimitNode<'a> {
        LimitNode {
            child,
            remaining: limit,
        }
    }
}

impl PlanNode for LimitNode<'_> {
    fn table(&self) -> &Table {
        self.child.table()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.child.next_row()
    }
}

/// Blocking sort. The child is drained on the first pull, then sorted
/// once per key, last key first; each pass is stable, so earlier keys
/// take precedence over later ones.
pub struct SortNode<'a> {
    child: Box<dyn PlanNode + 'a>,
    // (column index, ascending) per sort key
    keys: Vec<(usize, bool)>,
    sorted: Option<std::vec::IntoIter<Row>>,
}

impl<'a> SortNode<'a> {
    pub fn new(child: Box<dyn PlanNode + 'a>, order_by: &[SortColumn]) -> Result<SortNode<'a>> {
        let keys = order_by
            .iter()
            .map(|sc| Ok((resolve_column(child.table(), &sc.column)?, sc.asc)))
            .collect::<Result<Vec<(usize, bool)>>>()?;
        Ok(SortNode {
            child,
            keys,
            sorted: None,
        })
    }
}

impl PlanNode for SortNode<'_> {
    fn table(&self) -> &Table {
        self.child.table()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.sorted.is_none() {
            let mut rows = Vec::new();
            while let Some(row) = self.child.next_row()? {
                rows.push(row);
            }
            for &(idx, asc) in self.keys.iter().rev() {
                rows.sort_by(|a, b| {
                    let ord = a[idx].cmp(&b[idx]);
                    if asc {
                        ord
                    } else {
                        ord.reverse()
                    }
                });
            }
            self.sorted = Some(rows.into_iter());
        }
        match self.sorted.as_mut() {
            Some(rows) => Ok(rows.next()),
            None => Ok(None),
        }
    }
}

/// Compiles statements into operator trees and drains them.
pub struct Executor {
    page_size: usize,
}

impl Executor {
    pub fn new() -> Executor {
        Executor {
            page_size: crate::PAGE_SIZE,
        }
    }

    pub fn with_page_size(page_size: usize) -> Executor {
        Executor { page_size }
    }

    /// Run one statement to completion and materialize its result.
    /// Queries yield their rows, inserts a single one-cell row holding
    /// the insert count, DDL nothing.
    pub fn execute(&self, statement: Statement<'_>) -> Result<Vec<Row>> {
        match statement {
            Statement::CreateTable { table } => {
                self.create_table(table)?;
                Ok(Vec::new())
            }
            Statement::Query(query) => {
                debug!(table = %query.from.path().display(), "executing query");
                let mut root = self.build_query(query)?;
                drain(root.as_mut())
            }
            Statement::Insert(insert) => {
                debug!(table = %insert.into.path().display(), "executing insert");
                let mut root = self.build_insert(insert)?;
                drain(root.as_mut())
            }
        }
    }

    fn create_table(&self, table: &Table) -> Result<()> {
        debug!(table = %table.path().display(), "creating table");
        let mut file = PagedFile::create(table.path(), self.page_size)?;
        let page = HeapPage::new(table.schema(), self.page_size);
        file.write_page(0, &page.marshall())
    }

    /// Fixed composition order: scan, selection, sort, limit,
    /// projection. Selection shrinks the input early; sort may use keys
    /// the projection drops; projection runs last so every other node
    /// can name any column.
    fn build_query<'a>(&self, query: Query<'a>) -> Result<Box<dyn PlanNode + 'a>> {
        let Query {
            from,
            select,
            filter,
            order_by,
            limit,
        } = query;
        let mut node: Box<dyn PlanNode + 'a> = Box::new(FileScanNode::new(from, self.page_size)?);
        if let Some(filter) = filter {
            node = Box::new(SelectionNode::new(node, filter)?);
        }
        if let Some(order_by) = order_by {
            node = Box::new(SortNode::new(node, &order_by)?);
        }
        if let Some(limit) = limit {
            node = Box::new(LimitNode::new(node, limit));
        }
        if let Some(select) = select {
            node = Box::new(ProjectionNode::new(node, &select)?);
        }
        Ok(node)
    }

    fn build_insert<'a>(&self, insert: Insert<'a>) -> Result<Box<dyn PlanNode + 'a>> {
        let Insert {
            into,
            values,
            from_query,
        } = insert;
        let child: Box<dyn PlanNode + 'a> = match (values, from_query) {
            (Some(rows), None) => Box::new(ValuesNode::new(into, rows)),
            (None, Some(query)) => self.build_query(query)?,
            _ => {
                return Err(Error::MalformedStatement(
                    "insert requires exactly one of values or from_query",
                ))
            }
        };
        Ok(Box::new(InsertNode::new(child, into, self.page_size)))
    }
}

impl Default for Executor {
    fn default() -> Executor {
        Executor::new()
    }
}

fn drain(root: &mut dyn PlanNode) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = root.next_row()? {
        rows.push(row);
    }
    Ok(rows)
}
