//! A minimal columnar table file format.
//!
//! A `coltab` file stores a fixed schema of typed columns followed by one
//! contiguous block per column. A column directory (offset + length per
//! column) sits in the header, so readers can project a subset of columns
//! without touching the blocks of the others.
//!
//! Writes are whole-file replacements: the encoded table is written to a
//! temporary file in the destination directory, fsynced, and renamed over
//! the target. A crash mid-write leaves either the old file or the new one,
//! never a truncated mix.
//!
//! ## Layout
//!
//! ```text
//! magic "CTB1"
//! u16   column count
//! per column: u16 name length, name bytes (UTF-8), u8 type tag
//! u64   row count
//! per column: u64 block offset (from file start), u64 block length
//! column blocks
//! ```
//!
//! Block encodings: `Str` rows are `u32` length + bytes, `OptStr` rows add
//! a leading presence byte, `I64` rows are raw little-endian `i64`.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"CTB1";

/// Upper bound on the declared column count; anything larger is treated as
/// a corrupt header rather than an allocation request.
const MAX_COLUMNS: usize = 4096;

const TAG_STR: u8 = 0;
const TAG_OPT_STR: u8 = 1;
const TAG_I64: u8 = 2;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt table file: {reason}")]
    Corrupt { reason: String },

    #[error("unknown column: {name}")]
    UnknownColumn { name: String },

    #[error("value does not match column type for {column}")]
    TypeMismatch { column: String },

    #[error("row has {got} values, schema has {expected} columns")]
    RowShape { expected: usize, got: usize },
}

impl Error {
    fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }
}

/// Scalar column types supported by the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Str,
    OptStr,
    I64,
}

impl ColumnType {
    fn tag(self) -> u8 {
        match self {
            Self::Str => TAG_STR,
            Self::OptStr => TAG_OPT_STR,
            Self::I64 => TAG_I64,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            TAG_STR => Ok(Self::Str),
            TAG_OPT_STR => Ok(Self::OptStr),
            TAG_I64 => Ok(Self::I64),
            other => Err(Error::corrupt(format!("unknown column type tag {other}"))),
        }
    }
}

/// A named, typed column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: ColumnType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An ordered set of fields describing a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single cell value, paired with `ColumnType` on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    OptStr(Option<String>),
    I64(i64),
}

/// Decoded column data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Str(Vec<String>),
    OptStr(Vec<Option<String>>),
    I64(Vec<i64>),
}

impl Column {
    fn empty(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Str => Self::Str(Vec::new()),
            ColumnType::OptStr => Self::OptStr(Vec::new()),
            ColumnType::I64 => Self::I64(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Str(v) => v.len(),
            Self::OptStr(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as a `Str` column.
    pub fn as_str(&self) -> Option<&[String]> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow as an `OptStr` column.
    pub fn as_opt_str(&self) -> Option<&[Option<String>]> {
        match self {
            Self::OptStr(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow as an `I64` column.
    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            Self::I64(v) => Some(v),
            _ => None,
        }
    }
}

/// An in-memory table: a schema plus one column of values per field.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Schema,
    columns: Vec<Column>,
}

impl Table {
    /// Create an empty table with the given schema.
    pub fn empty(schema: Schema) -> Self {
        let columns = schema.fields().iter().map(|f| Column::empty(f.ty)).collect();
        Self { schema, columns }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Column data by field name.
    pub fn column(&self, name: &str) -> Result<&Column> {
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::UnknownColumn {
                name: name.to_string(),
            })?;
        Ok(&self.columns[idx])
    }

    /// Append one row; values must match the schema in order and type.
    pub fn push_row(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.schema.fields().len() {
            return Err(Error::RowShape {
                expected: self.schema.fields().len(),
                got: values.len(),
            });
        }
        // Validate the full row before mutating any column.
        for (field, value) in self.schema.fields().iter().zip(&values) {
            let ok = matches!(
                (field.ty, value),
                (ColumnType::Str, Value::Str(_))
                    | (ColumnType::OptStr, Value::OptStr(_))
                    | (ColumnType::I64, Value::I64(_))
            );
            if !ok {
                return Err(Error::TypeMismatch {
                    column: field.name.clone(),
                });
            }
        }
        for (column, value) in self.columns.iter_mut().zip(values) {
            match (column, value) {
                (Column::Str(v), Value::Str(s)) => v.push(s),
                (Column::OptStr(v), Value::OptStr(s)) => v.push(s),
                (Column::I64(v), Value::I64(n)) => v.push(n),
                _ => unreachable!("row validated above"),
            }
        }
        Ok(())
    }

    /// Read every column of the file.
    pub fn read(path: &Path) -> Result<Self> {
        Self::read_impl(path, None)
    }

    /// Read only the named columns; the returned table's schema contains
    /// exactly those fields, in the order given. Blocks of other columns
    /// are never read from disk.
    pub fn read_columns(path: &Path, names: &[&str]) -> Result<Self> {
        Self::read_impl(path, Some(names))
    }

    fn read_impl(path: &Path, projection: Option<&[&str]>) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .map_err(|_| Error::corrupt("file too short for magic"))?;
        if &magic != MAGIC {
            return Err(Error::corrupt("bad magic"));
        }

        let column_count = file.read_u16::<LittleEndian>().map_err(short_header)? as usize;
        if column_count > MAX_COLUMNS {
            return Err(Error::corrupt(format!(
                "implausible column count {column_count}"
            )));
        }

        let mut fields = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let name_len = file.read_u16::<LittleEndian>().map_err(short_header)? as usize;
            let mut name_buf = vec![0u8; name_len];
            file.read_exact(&mut name_buf).map_err(short_header)?;
            let name = String::from_utf8(name_buf)
                .map_err(|_| Error::corrupt("column name is not UTF-8"))?;
            let tag = file.read_u8().map_err(short_header)?;
            fields.push(Field::new(name, ColumnType::from_tag(tag)?));
        }

        let row_count = file.read_u64::<LittleEndian>().map_err(short_header)?;
        if row_count > file_len {
            // Every row costs at least one byte in every non-empty layout.
            return Err(Error::corrupt(format!("implausible row count {row_count}")));
        }
        let row_count = row_count as usize;

        let mut directory = Vec::with_capacity(column_count);
        for field in &fields {
            let offset = file.read_u64::<LittleEndian>().map_err(short_header)?;
            let len = file.read_u64::<LittleEndian>().map_err(short_header)?;
            if offset.checked_add(len).is_none_or(|end| end > file_len) {
                return Err(Error::corrupt(format!(
                    "column {} block out of bounds",
                    field.name
                )));
            }
            directory.push((offset, len));
        }

        // Resolve the projection against the on-disk schema.
        let selected: Vec<usize> = match projection {
            None => (0..fields.len()).collect(),
            Some(names) => names
                .iter()
                .map(|n| {
                    fields
                        .iter()
                        .position(|f| f.name == *n)
                        .ok_or_else(|| Error::UnknownColumn {
                            name: n.to_string(),
                        })
                })
                .collect::<Result<_>>()?,
        };

        let mut out_fields = Vec::with_capacity(selected.len());
        let mut out_columns = Vec::with_capacity(selected.len());
        for &idx in &selected {
            let field = &fields[idx];
            let (offset, len) = directory[idx];
            file.seek(SeekFrom::Start(offset))?;
            let mut block = vec![0u8; len as usize];
            file.read_exact(&mut block)
                .map_err(|_| Error::corrupt(format!("column {} block truncated", field.name)))?;
            out_columns.push(decode_block(&field.name, field.ty, &block, row_count)?);
            out_fields.push(field.clone());
        }

        Ok(Self {
            schema: Schema::new(out_fields),
            columns: out_columns,
        })
    }

    /// Encode the table and atomically replace `path` with it.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        self.encode(tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn encode(&self, out: &mut File) -> Result<()> {
        let blocks: Vec<Vec<u8>> = self.columns.iter().map(encode_block).collect();

        // Header size: magic + column count + per-column headers + row count
        // + directory.
        let mut header_len = 4 + 2 + 8;
        for field in self.schema.fields() {
            header_len += 2 + field.name.len() + 1;
        }
        header_len += self.columns.len() * 16;

        out.write_all(MAGIC)?;
        out.write_u16::<LittleEndian>(self.schema.fields().len() as u16)?;
        for field in self.schema.fields() {
            out.write_u16::<LittleEndian>(field.name.len() as u16)?;
            out.write_all(field.name.as_bytes())?;
            out.write_u8(field.ty.tag())?;
        }
        out.write_u64::<LittleEndian>(self.rows() as u64)?;

        let mut offset = header_len as u64;
        for block in &blocks {
            out.write_u64::<LittleEndian>(offset)?;
            out.write_u64::<LittleEndian>(block.len() as u64)?;
            offset += block.len() as u64;
        }
        for block in &blocks {
            out.write_all(block)?;
        }
        out.flush()?;
        Ok(())
    }
}

fn short_header(_: io::Error) -> Error {
    Error::corrupt("truncated header")
}

fn encode_block(column: &Column) -> Vec<u8> {
    let mut buf = Vec::new();
    match column {
        Column::Str(values) => {
            for v in values {
                buf.write_u32::<LittleEndian>(v.len() as u32).unwrap();
                buf.extend_from_slice(v.as_bytes());
            }
        }
        Column::OptStr(values) => {
            for v in values {
                match v {
                    Some(s) => {
                        buf.push(1);
                        buf.write_u32::<LittleEndian>(s.len() as u32).unwrap();
                        buf.extend_from_slice(s.as_bytes());
                    }
                    None => buf.push(0),
                }
            }
        }
        Column::I64(values) => {
            for v in values {
                buf.write_i64::<LittleEndian>(*v).unwrap();
            }
        }
    }
    buf
}

fn decode_block(name: &str, ty: ColumnType, block: &[u8], rows: usize) -> Result<Column> {
    let mut cursor = io::Cursor::new(block);
    let truncated = || Error::corrupt(format!("column {name} block truncated"));

    let column = match ty {
        ColumnType::Str => {
            let mut values = Vec::with_capacity(rows);
            for _ in 0..rows {
                values.push(read_string(&mut cursor, name)?);
            }
            Column::Str(values)
        }
        ColumnType::OptStr => {
            let mut values = Vec::with_capacity(rows);
            for _ in 0..rows {
                match cursor.read_u8().map_err(|_| truncated())? {
                    0 => values.push(None),
                    1 => values.push(Some(read_string(&mut cursor, name)?)),
                    other => {
                        return Err(Error::corrupt(format!(
                            "column {name} has invalid presence byte {other}"
                        )));
                    }
                }
            }
            Column::OptStr(values)
        }
        ColumnType::I64 => {
            let mut values = Vec::with_capacity(rows);
            for _ in 0..rows {
                values.push(cursor.read_i64::<LittleEndian>().map_err(|_| truncated())?);
            }
            Column::I64(values)
        }
    };

    if cursor.position() != block.len() as u64 {
        return Err(Error::corrupt(format!(
            "column {name} block has trailing bytes"
        )));
    }
    Ok(column)
}

fn read_string(cursor: &mut io::Cursor<&[u8]>, name: &str) -> Result<String> {
    let len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::corrupt(format!("column {name} block truncated")))?
        as usize;
    let start = cursor.position() as usize;
    let block = *cursor.get_ref();
    let end = start
        .checked_add(len)
        .filter(|&end| end <= block.len())
        .ok_or_else(|| Error::corrupt(format!("column {name} string out of bounds")))?;
    let value = std::str::from_utf8(&block[start..end])
        .map_err(|_| Error::corrupt(format!("column {name} holds invalid UTF-8")))?
        .to_string();
    cursor.set_position(end as u64);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", ColumnType::Str),
            Field::new("note", ColumnType::OptStr),
            Field::new("count", ColumnType::I64),
        ])
    }

    fn sample_table() -> Table {
        let mut table = Table::empty(sample_schema());
        table
            .push_row(vec![
                Value::Str("a".into()),
                Value::OptStr(Some("first".into())),
                Value::I64(1),
            ])
            .unwrap();
        table
            .push_row(vec![
                Value::Str("b".into()),
                Value::OptStr(None),
                Value::I64(-2),
            ])
            .unwrap();
        table
    }

    #[test]
    fn roundtrip_all_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.ctb");
        sample_table().write_atomic(&path).unwrap();

        let read = Table::read(&path).unwrap();
        assert_eq!(read.rows(), 2);
        assert_eq!(read.schema(), &sample_schema());
        assert_eq!(
            read.column("id").unwrap().as_str().unwrap(),
            &["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            read.column("note").unwrap().as_opt_str().unwrap(),
            &[Some("first".to_string()), None]
        );
        assert_eq!(read.column("count").unwrap().as_i64().unwrap(), &[1, -2]);
    }

    #[test]
    fn empty_table_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.ctb");
        Table::empty(sample_schema()).write_atomic(&path).unwrap();

        let read = Table::read(&path).unwrap();
        assert_eq!(read.rows(), 0);
        assert_eq!(read.schema(), &sample_schema());
    }

    #[test]
    fn projection_reads_only_named_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.ctb");
        sample_table().write_atomic(&path).unwrap();

        let read = Table::read_columns(&path, &["count", "id"]).unwrap();
        assert_eq!(read.schema().fields().len(), 2);
        assert_eq!(read.schema().fields()[0].name, "count");
        assert_eq!(read.column("count").unwrap().as_i64().unwrap(), &[1, -2]);
        assert!(matches!(
            read.column("note"),
            Err(Error::UnknownColumn { .. })
        ));
    }

    #[test]
    fn projection_rejects_unknown_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.ctb");
        sample_table().write_atomic(&path).unwrap();

        assert!(matches!(
            Table::read_columns(&path, &["missing"]),
            Err(Error::UnknownColumn { .. })
        ));
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.ctb");
        std::fs::write(&path, b"NOPE____________").unwrap();

        assert!(matches!(Table::read(&path), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.ctb");
        sample_table().write_atomic(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        assert!(matches!(Table::read(&path), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn write_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.ctb");
        sample_table().write_atomic(&path).unwrap();

        let mut bigger = sample_table();
        bigger
            .push_row(vec![
                Value::Str("c".into()),
                Value::OptStr(None),
                Value::I64(3),
            ])
            .unwrap();
        bigger.write_atomic(&path).unwrap();

        assert_eq!(Table::read(&path).unwrap().rows(), 3);
    }

    #[test]
    fn push_row_validates_shape_and_types() {
        let mut table = Table::empty(sample_schema());
        assert!(matches!(
            table.push_row(vec![Value::Str("a".into())]),
            Err(Error::RowShape { .. })
        ));
        assert!(matches!(
            table.push_row(vec![
                Value::I64(1),
                Value::OptStr(None),
                Value::Str("a".into()),
            ]),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(table.rows(), 0);
    }
}
