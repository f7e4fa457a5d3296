//! Tabular source parsing.
//!
//! Turns a raw CSV payload into a header-indexed [`Table`]:
//! - Line endings (`\r\n`, `\r`, `\n`) are normalized to `\n` first
//! - Standard CSV quoting applies (quoted commas, newlines, `""` escapes)
//! - Rows whose cells are all blank are dropped
//! - The first remaining row is the header; column names are trimmed and
//!   lower-cased, empty names are skipped, and for duplicate names the
//!   last occurrence wins

use std::collections::HashMap;

use sheetsync_shared::{Result, SheetSyncError};

/// Parse CSV text into rows of cells, dropping all-blank rows.
pub fn parse_rows(text: &str) -> Result<Vec<Vec<String>>> {
    let normalized = text
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(normalized.as_bytes());

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            SheetSyncError::source_format(format!("malformed CSV at record {}: {e}", i + 1))
        })?;

        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(rows)
}

/// Build the column-name → index map from a header row.
pub fn header_map(header: &[String]) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (i, name) in header.iter().enumerate() {
        let key = name.trim().to_lowercase();
        if !key.is_empty() {
            map.insert(key, i);
        }
    }
    map
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A parsed sheet: header row plus data rows.
#[derive(Debug, Clone)]
pub struct Table {
    header: Vec<String>,
    columns: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

/// One named column of a [`Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column<'a> {
    /// Header text as written (trimmed).
    pub name: &'a str,
    /// Normalized lookup key (trimmed, lower-cased).
    pub key: &'a str,
    /// Zero-based column position.
    pub index: usize,
}

impl Table {
    /// Parse CSV text into a table.
    ///
    /// Fails with a source format error when fewer than two non-blank rows
    /// remain (no header, or a header without data rows).
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_rows(parse_rows(text)?)
    }

    /// Build a table from already-split rows; the first row is the header.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Result<Self> {
        if rows.len() < 2 {
            return Err(SheetSyncError::source_format(
                "sheet must have a header row plus at least one data row",
            ));
        }

        let header = rows.remove(0);
        let columns = header_map(&header);

        Ok(Self {
            header,
            columns,
            rows,
        })
    }

    /// Column index for a case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.get(&name.trim().to_lowercase()).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Names from `required` that the header does not provide.
    pub fn missing_columns<'r>(&self, required: &[&'r str]) -> Vec<&'r str> {
        required
            .iter()
            .copied()
            .filter(|name| !self.has_column(name))
            .collect()
    }

    /// Named columns in positional order, one per distinct key.
    pub fn columns(&self) -> Vec<Column<'_>> {
        let mut columns: Vec<Column<'_>> = self
            .columns
            .iter()
            .map(|(key, &index)| Column {
                name: self.header[index].trim(),
                key: key.as_str(),
                index,
            })
            .collect();
        columns.sort_by_key(|c| c.index);
        columns
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Data row at a 1-based position.
    pub fn row(&self, position: usize) -> Option<Row<'_>> {
        let cells = self.rows.get(position.checked_sub(1)?)?;
        Some(Row {
            table: self,
            cells,
            position,
        })
    }

    /// Iterate data rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().enumerate().map(|(i, cells)| Row {
            table: self,
            cells,
            position: i + 1,
        })
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// A borrowed view of one data row with name-based cell access.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a [String],
    position: usize,
}

impl<'a> Row<'a> {
    /// 1-based position among data rows.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Trimmed cell value by case-insensitive column name.
    ///
    /// Returns `""` when the column is absent or the row is too short.
    pub fn cell(&self, name: &str) -> &'a str {
        self.raw(name).trim()
    }

    /// Untrimmed cell value by case-insensitive column name.
    pub fn raw(&self, name: &str) -> &'a str {
        self.table
            .column_index(name)
            .map(|idx| self.value_at(idx))
            .unwrap_or("")
    }

    /// Untrimmed cell value by position; `""` past the end of a short row.
    pub fn value_at(&self, index: usize) -> &'a str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    /// The table this row belongs to.
    pub fn table(&self) -> &'a Table {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_fields() {
        let text = "title,content\n\"Hello, world\",\"Line one\nLine two\"\n\"Say \"\"hi\"\"\",x\n";
        let rows = parse_rows(text).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["Hello, world", "Line one\nLine two"]);
        assert_eq!(rows[2][0], "Say \"hi\"");
    }

    #[test]
    fn normalizes_line_endings() {
        let crlf = parse_rows("a,b\r\n1,2\r\n").unwrap();
        let cr = parse_rows("a,b\r1,2\r").unwrap();
        let lf = parse_rows("a,b\n1,2\n").unwrap();
        assert_eq!(crlf, lf);
        assert_eq!(cr, lf);

        let quoted = parse_rows("a\r\n\"x\r\ny\"\r\n").unwrap();
        assert_eq!(quoted[1][0], "x\ny");
    }

    #[test]
    fn drops_blank_rows() {
        let rows = parse_rows("title,content\n,,\n  ,  \nA,B\n\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["A", "B"]);
    }

    #[test]
    fn strips_byte_order_mark() {
        let table = Table::parse("\u{feff}Title,Content\nA,B\n").unwrap();
        assert!(table.has_column("title"));
    }

    #[test]
    fn header_map_normalizes_names() {
        let header: Vec<String> = [" Title ", "", "CONTENT", "title"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let map = header_map(&header);
        assert_eq!(map.len(), 2);
        // Last duplicate wins.
        assert_eq!(map["title"], 3);
        assert_eq!(map["content"], 2);
    }

    #[test]
    fn insufficient_rows_is_an_error() {
        let err = Table::parse("title,content\n").unwrap_err();
        assert!(matches!(err, SheetSyncError::SourceFormat { .. }));
        assert!(Table::parse("").is_err());
        assert!(Table::parse("title\n,\n").is_err());
    }

    #[test]
    fn cell_lookup_tolerates_short_rows() {
        let table = Table::parse("Title,Content,Tags\n  A  ,B\n").unwrap();
        let row = table.row(1).unwrap();
        assert_eq!(row.cell("TITLE"), "A");
        assert_eq!(row.raw("title"), "  A  ");
        assert_eq!(row.cell("tags"), "");
        assert_eq!(row.cell("missing"), "");
        assert_eq!(row.position(), 1);
    }

    #[test]
    fn rows_are_one_based() {
        let table = Table::parse("title\na\nb\nc\n").unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.row(0).is_none());
        assert_eq!(table.row(3).unwrap().cell("title"), "c");
        assert!(table.row(4).is_none());
        let titles: Vec<&str> = table.rows().map(|r| r.cell("title")).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn columns_keep_header_case_and_order() {
        let table = Table::parse("Price,title,,Title\n1,a,x,b\n").unwrap();
        let columns = table.columns();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "Price");
        assert_eq!(columns[0].key, "price");
        assert_eq!(columns[1].name, "Title");
        assert_eq!(columns[1].index, 3);
    }

    #[test]
    fn missing_columns_reported() {
        let table = Table::parse("title,category\nA,B\n").unwrap();
        assert_eq!(table.missing_columns(&["title", "content"]), vec!["content"]);
        assert!(table.missing_columns(&["Title"]).is_empty());
    }
}
