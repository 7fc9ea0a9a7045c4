//! CSV → `Table`. The header row names the fields; each column's type is the
//! type of its first non-null cell.

use std::io::Read;
use std::path::Path;

use qjoin_core::error::{Error, Result};
use qjoin_core::schema::{DataType, Field, Schema};
use qjoin_core::store::Table;
use qjoin_core::types::{Row, Scalar};

pub fn read_csv_path(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Storage(format!("open {}: {e}", path.display())))?;
    read_csv_reader(file)
}

pub fn read_csv_reader<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| Error::Storage(format!("csv header: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() {
        return Err(Error::Schema("csv input has no header row".into()));
    }

    let mut rows: Vec<Row> = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| Error::Storage(format!("csv record {line}: {e}")))?;
        if record.len() != headers.len() {
            return Err(Error::Schema(format!(
                "csv record {line} has {} cells, expected {}",
                record.len(),
                headers.len()
            )));
        }
        rows.push(record.iter().map(Scalar::parse).collect());
    }

    let fields = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let data_type = rows
                .iter()
                .find_map(|r| r[i].data_type())
                .unwrap_or(DataType::Utf8);
            let nullable = rows.iter().any(|r| !r[i].is_join_key());
            Field::new(name.clone(), data_type, nullable)
        })
        .collect();

    Ok(Table::new(Schema::new(fields), rows))
}
