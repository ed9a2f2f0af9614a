//! In-memory DuckDB execution of rewritten dumps

use duckdb::Connection;
use duckdb::types::Value as DbValue;
use serde_json::{Map, Number, Value};

/// Rows read back from every table the script created
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub tables: usize,
    /// One object per row, `_table` first
    pub rows: Vec<Value>,
}

/// Execute `script` in a fresh in-memory database and dump all base tables
///
/// Blocking; callers run it on the blocking pool.
pub fn load_rows(script: &str) -> Result<EngineOutput, duckdb::Error> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(script)?;

    let tables: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT table_name FROM duckdb_tables() \
             WHERE schema_name = 'main' AND NOT internal ORDER BY table_oid",
        )?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        names.collect::<Result<_, _>>()?
    };

    let mut output = EngineOutput {
        tables: tables.len(),
        rows: Vec::new(),
    };
    for table in &tables {
        let sql = format!("SELECT * FROM \"{}\"", table.replace('"', "\"\""));
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let column_count = rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let column_names: Vec<String> = (0..column_count)
            .map(|i| {
                rows.as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("column_{}", i))
            })
            .collect();

        while let Some(row) = rows.next()? {
            let mut record = Map::new();
            record.insert("_table".to_string(), Value::String(table.clone()));
            for (i, name) in column_names.iter().enumerate() {
                let value: DbValue = row.get(i)?;
                record.insert(name.clone(), to_json(value));
            }
            output.rows.push(Value::Object(record));
        }
    }

    Ok(output)
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn to_json(value: DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Boolean(b) => Value::Bool(b),
        DbValue::TinyInt(n) => Value::Number(n.into()),
        DbValue::SmallInt(n) => Value::Number(n.into()),
        DbValue::Int(n) => Value::Number(n.into()),
        DbValue::BigInt(n) => Value::Number(n.into()),
        DbValue::UTinyInt(n) => Value::Number(n.into()),
        DbValue::USmallInt(n) => Value::Number(n.into()),
        DbValue::UInt(n) => Value::Number(n.into()),
        DbValue::UBigInt(n) => Value::Number(n.into()),
        DbValue::HugeInt(n) => i64::try_from(n)
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(n.to_string())),
        DbValue::Float(f) => float(f as f64),
        DbValue::Double(f) => float(f),
        DbValue::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(float)
            .unwrap_or_else(|_| Value::String(d.to_string())),
        DbValue::Text(s) => Value::String(s),
        other => Value::String(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_in_creation_order() {
        let output = load_rows(
            "CREATE TABLE people (id INTEGER, name VARCHAR);\n\
             CREATE TABLE empty_one (x INTEGER);\n\
             INSERT INTO people VALUES (1, 'Ana');\n\
             INSERT INTO people VALUES (2, NULL);",
        )
        .unwrap();

        assert_eq!(output.tables, 2);
        assert_eq!(
            output.rows,
            vec![
                json!({"_table": "people", "id": 1, "name": "Ana"}),
                json!({"_table": "people", "id": 2, "name": null}),
            ]
        );
    }

    #[test]
    fn test_invalid_script() {
        assert!(load_rows("CREATE TABLE (;").is_err());
    }

    #[test]
    fn test_no_tables() {
        let output = load_rows("SELECT 1;").unwrap();
        assert_eq!(output.tables, 0);
        assert!(output.rows.is_empty());
    }
}
