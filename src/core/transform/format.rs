//! Line serialization
//!
//! Records are stored and delivered one per line. JSON lines carry the field
//! object plus a `crud` key; CSV lines carry the declared fields in order
//! followed by the crud marker, with SQL-null written as `\N`. Text cells
//! starting with a backslash get one more so they never read back as null.

use crate::domain::{Crud, FieldDef, FieldKind, HarvestError, OutputRecord, Result, SerializationFormat};
use serde_json::{Map, Value};

/// CSV spelling of a null value
pub const CSV_NULL: &str = "\\N";

/// Key / trailing column holding the change marker
pub const CRUD_FIELD: &str = "crud";

/// Encodes one record as a line without trailing newline
pub fn encode(record: &OutputRecord, fields: &[FieldDef], format: SerializationFormat) -> Result<String> {
    match format {
        SerializationFormat::Json => encode_json(record),
        SerializationFormat::Csv => encode_csv(record, fields),
    }
}

/// Decodes one line back into `(values, crud)`
pub fn decode(line: &str, fields: &[FieldDef], format: SerializationFormat) -> Result<(Map<String, Value>, Crud)> {
    match format {
        SerializationFormat::Json => decode_json(line),
        SerializationFormat::Csv => decode_csv(line, fields),
    }
}

/// CSV header row: declared field names followed by `crud`
pub fn csv_header(fields: &[FieldDef]) -> Result<String> {
    let mut columns: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    columns.push(CRUD_FIELD);
    write_csv_line(&columns)
}

fn encode_json(record: &OutputRecord) -> Result<String> {
    let mut object = record.values.clone();
    object.insert(CRUD_FIELD.to_string(), Value::from(record.crud.as_str()));
    Ok(serde_json::to_string(&Value::Object(object))?)
}

fn decode_json(line: &str) -> Result<(Map<String, Value>, Crud)> {
    let mut object = match serde_json::from_str::<Value>(line)? {
        Value::Object(object) => object,
        other => {
            return Err(HarvestError::Serialization(format!(
                "expected JSON object, got {other}"
            )))
        }
    };
    let crud = object
        .remove(CRUD_FIELD)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| HarvestError::Serialization("record has no crud marker".to_string()))?;
    let crud = crud.parse::<Crud>().map_err(HarvestError::Serialization)?;
    Ok((object, crud))
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => CSV_NULL.to_string(),
        Some(Value::String(s)) if s.starts_with('\\') => format!("\\{s}"),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => if *b { "1" } else { "0" }.to_string(),
        Some(other) => other.to_string(),
    }
}

fn encode_csv(record: &OutputRecord, fields: &[FieldDef]) -> Result<String> {
    let mut cells: Vec<String> = fields
        .iter()
        .map(|field| csv_cell(record.values.get(&field.name)))
        .collect();
    cells.push(record.crud.as_str().to_string());
    write_csv_line(&cells)
}

fn write_csv_line<T: AsRef<[u8]>>(cells: &[T]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(cells)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| HarvestError::Serialization(format!("CSV flush failed: {e}")))?;
    let line = String::from_utf8(bytes)
        .map_err(|e| HarvestError::Serialization(format!("CSV output is not UTF-8: {e}")))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn decode_csv(line: &str, fields: &[FieldDef]) -> Result<(Map<String, Value>, Crud)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    let record = reader
        .records()
        .next()
        .ok_or_else(|| HarvestError::Serialization("empty CSV line".to_string()))??;

    if record.len() != fields.len() + 1 {
        return Err(HarvestError::Serialization(format!(
            "expected {} CSV columns, got {}",
            fields.len() + 1,
            record.len()
        )));
    }

    let mut values = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(record.iter()) {
        values.insert(field.name.clone(), parse_cell(cell, field.kind)?);
    }

    let crud = record
        .get(fields.len())
        .unwrap_or_default()
        .parse::<Crud>()
        .map_err(HarvestError::Serialization)?;
    Ok((values, crud))
}

fn parse_cell(cell: &str, kind: FieldKind) -> Result<Value> {
    if cell == CSV_NULL {
        return Ok(Value::Null);
    }
    let invalid = || HarvestError::Serialization(format!("cannot read '{cell}' as {kind:?}"));
    match kind {
        FieldKind::Text => Ok(Value::from(cell.strip_prefix('\\').unwrap_or(cell))),
        FieldKind::Integer => cell.parse::<i64>().map(Value::from).map_err(|_| invalid()),
        FieldKind::Number => cell
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        FieldKind::Boolean => match cell {
            "1" | "true" => Ok(Value::from(true)),
            "0" | "false" => Ok(Value::from(false)),
            _ => Err(invalid()),
        },
    }
}
