//! Dialect detection and rewriting for the embedded engine

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Source dialect of a relational dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Mysql,
    Postgresql,
    Sqlserver,
    Oracle,
    Generic,
}

static MYSQL_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bDELIMITER\b|\bBEGIN\s+TRANSACTION\b").unwrap());
static POSTGRES_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bPLPGSQL\b|\bRETURN\s+SETOF\b|\bCREATE\s+SEQUENCE\b").unwrap()
});
static SQLSERVER_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bEXEC\b|\bGO\b|\bDECLARE\s+@\w+\b").unwrap());
static ORACLE_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bBEGIN\s+EXECUTE\s+IMMEDIATE\b|\bPACKAGE\b|\bPL/SQL\b").unwrap()
});

static TRANSACTION_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bBEGIN\s+TRANSACTION\b|\bCOMMIT\b|\bROLLBACK\b").unwrap());
static AUTOINCREMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bAUTOINCREMENT\b").unwrap());

static MYSQL_AUTO_INCREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bAUTO_INCREMENT\b(\s*=\s*\d+)?").unwrap());
static MYSQL_ENGINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bENGINE\s*=\s*\w+").unwrap());
static MYSQL_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\bDEFAULT\s+)?\bCHARSET\s*=\s*\w+").unwrap());
static MYSQL_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bDELIMITER\s*;?\s*").unwrap());

static PG_SERIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(BIG|SMALL)?SERIAL\b").unwrap());
static PG_BYTEA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bBYTEA\b").unwrap());
static PG_TEXT_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bTEXT\[\]").unwrap());

static MSSQL_IDENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bIDENTITY\s*\(\s*\d+\s*,\s*\d+\s*\)").unwrap());
static MSSQL_NVARCHAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bNVARCHAR\s*\((\w+)\)").unwrap());
static MSSQL_GO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bGO\b").unwrap());
static MSSQL_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\w+)\]").unwrap());

static ORACLE_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bNUMBER\s*\(\s*\d+\s*,\s*\d+\s*\)").unwrap());
static ORACLE_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bNUMBER\b(\s*\(\s*\d+\s*\))?").unwrap());
static ORACLE_VARCHAR2: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bVARCHAR2\b").unwrap());

static CREATE_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)CREATE\s+TABLE\s+[^;]+;").unwrap());
static INSERT_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)INSERT\s+INTO\s+[^;]+;").unwrap());

impl SqlDialect {
    /// Guess the dialect from marker keywords; first match wins
    pub fn detect(script: &str) -> SqlDialect {
        if MYSQL_MARKERS.is_match(script) {
            SqlDialect::Mysql
        } else if POSTGRES_MARKERS.is_match(script) {
            SqlDialect::Postgresql
        } else if SQLSERVER_MARKERS.is_match(script) {
            SqlDialect::Sqlserver
        } else if ORACLE_MARKERS.is_match(script) {
            SqlDialect::Oracle
        } else {
            SqlDialect::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::Mysql => "mysql",
            SqlDialect::Postgresql => "postgresql",
            SqlDialect::Sqlserver => "sqlserver",
            SqlDialect::Oracle => "oracle",
            SqlDialect::Generic => "generic",
        }
    }

    /// Rewrite a script into something the embedded engine accepts
    ///
    /// Non-generic scripts are reduced to their `CREATE TABLE` statements
    /// followed by their `INSERT INTO` statements when any are found.
    pub fn rewrite(&self, script: &str) -> String {
        if *self == SqlDialect::Generic {
            return AUTOINCREMENT.replace_all(script, "").into_owned();
        }

        let mut converted = TRANSACTION_MARKERS.replace_all(script, "").into_owned();

        match self {
            SqlDialect::Mysql => {
                converted = MYSQL_AUTO_INCREMENT.replace_all(&converted, "").into_owned();
                converted = MYSQL_ENGINE.replace_all(&converted, "").into_owned();
                converted = MYSQL_CHARSET.replace_all(&converted, "").into_owned();
                converted = MYSQL_DELIMITER.replace_all(&converted, "").into_owned();
                converted = converted.replace('`', "\"");
            }
            SqlDialect::Postgresql => {
                converted = PG_SERIAL.replace_all(&converted, "INTEGER").into_owned();
                converted = PG_BYTEA.replace_all(&converted, "BLOB").into_owned();
                converted = PG_TEXT_ARRAY.replace_all(&converted, "TEXT").into_owned();
            }
            SqlDialect::Sqlserver => {
                converted = MSSQL_IDENTITY.replace_all(&converted, "").into_owned();
                converted = MSSQL_NVARCHAR
                    .replace_all(&converted, "VARCHAR($1)")
                    .into_owned();
                converted = MSSQL_GO.replace_all(&converted, "").into_owned();
                converted = MSSQL_BRACKETS.replace_all(&converted, "\"$1\"").into_owned();
            }
            SqlDialect::Oracle => {
                converted = ORACLE_DECIMAL.replace_all(&converted, "DOUBLE").into_owned();
                converted = ORACLE_INTEGER.replace_all(&converted, "BIGINT").into_owned();
                converted = ORACLE_VARCHAR2.replace_all(&converted, "VARCHAR").into_owned();
            }
            SqlDialect::Generic => {}
        }

        let statements: Vec<&str> = CREATE_STATEMENT
            .find_iter(&converted)
            .chain(INSERT_STATEMENT.find_iter(&converted))
            .map(|m| m.as_str())
            .collect();

        if statements.is_empty() {
            converted
        } else {
            statements.join("\n")
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
