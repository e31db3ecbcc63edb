// Result Sanitizer
// Turns driver cell values into JSON scalars the response encoder can always handle

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::db::traits::CellValue;

/// One result row keyed by column name, in column order
pub type JsonRow = Map<String, Value>;

/// ISO-8601 in UTC with milliseconds, e.g. `2024-01-02T03:04:05.000Z`
fn iso_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn naive_timestamp(dt: &NaiveDateTime) -> String {
    iso_timestamp(dt.and_utc())
}

/// Convert a single cell; never fails
pub fn cell_to_json(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Bool(b) => Value::Bool(*b),
        CellValue::Int(i) => Value::Number((*i).into()),
        CellValue::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            // NaN and the infinities have no JSON number form
            None => Value::String(f.to_string()),
        },
        CellValue::String(s) => Value::String(s.clone()),
        CellValue::DateTime(dt) => Value::String(naive_timestamp(dt)),
        CellValue::TimestampTz(dt) => Value::String(iso_timestamp(dt.with_timezone(&Utc))),
        CellValue::Binary(bytes) => Value::String(BASE64.encode(bytes)),
        CellValue::Opaque { type_name, text } => match text {
            Some(text) => Value::String(text.clone()),
            None => Value::String(format!("[{}]", type_name)),
        },
    }
}

/// Build a row object; missing cells become null and extra cells are dropped
pub fn sanitize_row(columns: &[String], row: &[CellValue]) -> JsonRow {
    let mut obj = Map::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let value = row.get(idx).map(cell_to_json).unwrap_or(Value::Null);
        obj.insert(column.clone(), value);
    }
    obj
}

pub fn sanitize_rows(columns: &[String], rows: &[Vec<CellValue>]) -> Vec<JsonRow> {
    rows.iter().map(|row| sanitize_row(columns, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_primitives_pass_through() {
        let row = sanitize_row(
            &columns(&["ID", "NAME", "ACTIVE", "NOTE", "RATIO"]),
            &[
                CellValue::Int(1),
                CellValue::String("Alice".to_string()),
                CellValue::Bool(true),
                CellValue::Null,
                CellValue::Float(0.25),
            ],
        );

        assert_eq!(row["ID"], 1);
        assert_eq!(row["NAME"], "Alice");
        assert_eq!(row["ACTIVE"], true);
        assert!(row["NOTE"].is_null());
        assert_eq!(row["RATIO"], 0.25);
    }

    #[test]
    fn test_dates_become_iso_8601() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 6)
            .unwrap();
        assert_eq!(cell_to_json(&CellValue::DateTime(naive)), "2024-01-02T03:04:05.006Z");

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let aware = offset.with_ymd_and_hms(2024, 1, 2, 5, 4, 5).unwrap();
        assert_eq!(cell_to_json(&CellValue::TimestampTz(aware)), "2024-01-02T03:04:05.000Z");
    }

    #[test]
    fn test_binary_becomes_base64() {
        assert_eq!(cell_to_json(&CellValue::Binary(b"Hello".to_vec())), "SGVsbG8=");
        assert_eq!(cell_to_json(&CellValue::Binary(Vec::new())), "");
    }

    #[test]
    fn test_non_finite_floats_become_strings() {
        assert_eq!(cell_to_json(&CellValue::Float(f64::NAN)), "NaN");
        assert_eq!(cell_to_json(&CellValue::Float(f64::INFINITY)), "inf");
    }

    #[test]
    fn test_opaque_values_use_text_or_placeholder() {
        let with_text = CellValue::Opaque {
            type_name: "INTERVAL DAY(2) TO SECOND(6)".to_string(),
            text: Some("+01 02:03:04.000000".to_string()),
        };
        assert_eq!(cell_to_json(&with_text), "+01 02:03:04.000000");

        let without_text = CellValue::Opaque {
            type_name: "BFILE".to_string(),
            text: None,
        };
        assert_eq!(cell_to_json(&without_text), "[BFILE]");
    }

    #[test]
    fn test_row_shape_mismatch_never_panics() {
        let cols = columns(&["A", "B"]);
        let short = sanitize_row(&cols, &[CellValue::Int(1)]);
        assert_eq!(short["A"], 1);
        assert!(short["B"].is_null());

        let long = sanitize_row(&cols, &[CellValue::Int(1), CellValue::Int(2), CellValue::Int(3)]);
        assert_eq!(long.len(), 2);

        assert!(sanitize_row(&cols, &[]).values().all(Value::is_null));
    }

    #[test]
    fn test_rows_keep_column_order() {
        let rows = sanitize_rows(
            &columns(&["Z", "A", "M"]),
            &[vec![CellValue::Int(1), CellValue::Int(2), CellValue::Int(3)]],
        );
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["Z", "A", "M"]);
    }
}
