//! Flat table interchange format for exported traces
//!
//! One row per record, sorted by time. Rows can be written as JSON Lines
//! (one object per line) or as a single bincode blob.

use crate::core::record::{EventKind, FieldKey, Record};
use crate::core::temporal::LogicalTime;
use crate::core::value::{EntityId, Value};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};

/// One exported record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub entity_id: EntityId,
    pub field: FieldKey,
    pub event_kind: EventKind,
    pub record_id: u64,
    pub value_type: String,
    pub value: Value,
    pub expression: String,
    pub source_line: u32,
    pub time: LogicalTime,
    pub extra: String,
}

impl From<&Record> for TableRow {
    fn from(record: &Record) -> Self {
        Self {
            entity_id: record.entity,
            field: record.field.clone(),
            event_kind: record.kind,
            record_id: record.record_id,
            value_type: record.value_type.clone(),
            value: record.value.clone(),
            expression: record.expression.clone(),
            source_line: record.line,
            time: record.time,
            extra: record.extra.clone(),
        }
    }
}

impl From<TableRow> for Record {
    fn from(row: TableRow) -> Self {
        Record {
            entity: row.entity_id,
            field: row.field,
            kind: row.event_kind,
            value_type: row.value_type,
            value: row.value,
            expression: row.expression,
            line: row.source_line,
            time: row.time,
            extra: row.extra,
            record_id: row.record_id,
        }
    }
}

/// Column names in table order
pub const COLUMNS: [&str; 10] = [
    "entityId",
    "field",
    "eventKind",
    "recordId",
    "valueType",
    "value",
    "expression",
    "sourceLine",
    "time",
    "extra",
];

/// Write rows as JSON Lines
pub fn write_jsonl<W: Write>(rows: &[TableRow], mut writer: W) -> Result<()> {
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read rows from JSON Lines; blank lines are skipped
pub fn read_jsonl<R: Read>(reader: R) -> Result<Vec<TableRow>> {
    let mut rows = Vec::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: TableRow = serde_json::from_str(&line).map_err(|e| {
            Error::Serialization(format!("table line {}: {}", lineno + 1, e))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Write rows as one bincode blob
pub fn write_bincode<W: Write>(rows: &[TableRow], mut writer: W) -> Result<()> {
    bincode::serialize_into(&mut writer, rows)?;
    writer.flush()?;
    Ok(())
}

/// Read rows written by [`write_bincode`]
pub fn read_bincode<R: Read>(reader: R) -> Result<Vec<TableRow>> {
    Ok(bincode::deserialize_from(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<TableRow> {
        let records = [
            Record::builder(1, FieldKey::name("x"), EventKind::Var)
                .value(1)
                .expression("x = 1")
                .line(2)
                .into_record(0, 0),
            Record::builder(5, FieldKey::Index(0), EventKind::ListItem)
                .value(Value::Float(2.5))
                .line(3)
                .into_record(1, 0),
            Record::builder(6, FieldKey::Key(Value::str("k")), EventKind::DictItem)
                .value(Value::Ref(5))
                .value_type("list")
                .line(4)
                .into_record(2, 0),
        ];
        records.iter().map(TableRow::from).collect()
    }

    #[test]
    fn test_jsonl_round_trip() {
        let rows = sample_rows();
        let mut buf = Vec::new();
        write_jsonl(&rows, &mut buf).unwrap();
        assert_eq!(buf.iter().filter(|&&b| b == b'\n').count(), 3);
        let back = read_jsonl(buf.as_slice()).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_non_finite_floats_survive_jsonl() {
        let rows: Vec<TableRow> = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.5]
            .into_iter()
            .enumerate()
            .map(|(t, x)| {
                let record = Record::builder(1, FieldKey::name("f"), EventKind::Var)
                    .value(Value::Float(x))
                    .into_record(t as LogicalTime, 0);
                TableRow::from(&record)
            })
            .collect();
        let mut buf = Vec::new();
        write_jsonl(&rows, &mut buf).unwrap();
        assert!(String::from_utf8_lossy(&buf).contains("\"Float\":\"-inf\""));
        assert_eq!(read_jsonl(buf.as_slice()).unwrap(), rows);

        let mut bin = Vec::new();
        write_bincode(&rows, &mut bin).unwrap();
        assert_eq!(read_bincode(bin.as_slice()).unwrap(), rows);
    }

    #[test]
    fn test_bincode_round_trip() {
        let rows = sample_rows();
        let mut buf = Vec::new();
        write_bincode(&rows, &mut buf).unwrap();
        assert_eq!(read_bincode(buf.as_slice()).unwrap(), rows);
    }

    #[test]
    fn test_columns_match_serialized_names() {
        let row = &sample_rows()[0];
        let json = serde_json::to_value(row).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, COLUMNS);
    }

    #[test]
    fn test_bad_line_reports_position() {
        let err = read_jsonl("{}\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("table line 1"));
    }
}
