//! Pattern-based extraction for dumps the engine rejects

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value, json};
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::debug;

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"\[]?(\w+)[`"\]]?\s*\((.*?)\);"#,
    )
    .unwrap()
});
static COLUMN_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[`"\[]?(\w+)[`"\]]?\s+([^,)]+)"#).unwrap());
static INSERT_INTO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)INSERT\s+INTO\s+[`"\[]?(\w+)[`"\]]?\s*(?:\((.*?)\))?\s*VALUES\s*\((.*?)\);"#,
    )
    .unwrap()
});

/// Column declared in a `CREATE TABLE` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// First word of the declared type, upper-cased
    pub data_type: String,
}

/// Table declared in a `CREATE TABLE` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

fn strip_quotes(name: &str) -> String {
    name.trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '[' | ']'))
        .to_string()
}

/// Tables and columns declared in the script, in declaration order
pub fn parse_create_tables(script: &str) -> Vec<TableDef> {
    CREATE_TABLE
        .captures_iter(script)
        .map(|caps| {
            let columns = COLUMN_DEF
                .captures_iter(&caps[2])
                .map(|col| ColumnDef {
                    name: strip_quotes(&col[1]),
                    data_type: col[2]
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_uppercase(),
                })
                .collect();
            TableDef {
                name: strip_quotes(&caps[1]),
                columns,
            }
        })
        .collect()
}

/// Rows from `INSERT INTO ... VALUES (...)`, grouped by table in first-seen order
///
/// Without a column list the keys are `column_0`, `column_1`, ...
pub fn parse_inserts(script: &str) -> Vec<(String, Vec<Map<String, Value>>)> {
    let mut tables: Vec<(String, Vec<Map<String, Value>>)> = Vec::new();

    for caps in INSERT_INTO.captures_iter(script) {
        let table = strip_quotes(&caps[1]);
        let columns: Vec<String> = caps
            .get(2)
            .map(|m| m.as_str().split(',').map(strip_quotes).collect())
            .unwrap_or_default();
        let values = parse_values(&caps[3]);

        let mut row = Map::new();
        if columns.is_empty() {
            for (i, value) in values.into_iter().enumerate() {
                row.insert(format!("column_{}", i), value);
            }
        } else {
            for (i, column) in columns.into_iter().enumerate() {
                row.insert(column, values.get(i).cloned().unwrap_or(Value::Null));
            }
        }

        match tables.iter_mut().find(|(name, _)| *name == table) {
            Some((_, rows)) => rows.push(row),
            None => tables.push((table, vec![row])),
        }
    }

    tables
}

/// Split a `VALUES` list into typed literals
///
/// Quoted strings keep their unescaped text, `NULL` becomes null and numeric
/// literals become numbers. Anything else is kept as its source text.
pub fn parse_values(values: &str) -> Vec<Value> {
    let tokens = match Tokenizer::new(&GenericDialect {}, values).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!(error = %e, "Tokenizer rejected value list, splitting on commas");
            return values
                .split(',')
                .map(|part| literal(part.trim().trim_matches(|c| c == '\'' || c == '"')))
                .collect();
        }
    };

    let mut groups: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::Whitespace(_) => {}
            Token::Comma if depth == 0 => groups.push(Vec::new()),
            other => {
                match other {
                    Token::LParen => depth += 1,
                    Token::RParen => depth = depth.saturating_sub(1),
                    _ => {}
                }
                if let Some(group) = groups.last_mut() {
                    group.push(other);
                }
            }
        }
    }

    if groups.len() == 1 && groups[0].is_empty() {
        return Vec::new();
    }
    groups.into_iter().map(group_value).collect()
}

fn group_value(group: Vec<Token>) -> Value {
    if let [single] = group.as_slice() {
        match single {
            Token::SingleQuotedString(s)
            | Token::DoubleQuotedString(s)
            | Token::NationalStringLiteral(s)
            | Token::EscapedStringLiteral(s) => return Value::String(s.clone()),
            Token::Word(w) if w.quote_style.is_some() => return Value::String(w.value.clone()),
            _ => {}
        }
    }
    let text: String = group.iter().map(|t| t.to_string()).collect();
    literal(&text)
}

fn literal(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// Records for the pattern-based path, after the leading `_meta` record
///
/// Emits `_schema` when tables were declared, then data rows tagged with
/// `_table`. With no rows at all, one `_table_structure` record per table.
pub fn extract_records(script: &str) -> Vec<Value> {
    let tables = parse_create_tables(script);
    let inserts = parse_inserts(script);
    let mut records = Vec::new();

    if !tables.is_empty() {
        let schema: Vec<Value> = tables
            .iter()
            .map(|t| {
                json!({
                    "table": t.name,
                    "columns": t.columns.iter()
                        .map(|c| json!({"name": c.name, "type": c.data_type}))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        records.push(json!({ "_schema": schema }));
    }

    if inserts.is_empty() {
        for table in &tables {
            let columns: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
            records.push(json!({"_table_structure": table.name, "columns": columns}));
        }
        return records;
    }

    for (table, rows) in inserts {
        for row in rows {
            let mut record = Map::with_capacity(row.len() + 1);
            record.insert("_table".to_string(), Value::String(table.clone()));
            record.extend(row);
            records.push(Value::Object(record));
        }
    }
    records
}
