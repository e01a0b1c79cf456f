//! Parameter handling for statements.
//!
//! Callers name their parameters (`WHERE id = :id`). Before a statement reaches
//! a driver, [`prepare`] rewrites the named placeholders to positional `?` and
//! lines the values up in order. The `bind_*` helpers then attach those values
//! to database-specific query objects.

use crate::error::{DbError, DbResult};
use crate::models::{Params, QueryParam, Statement};
use sqlx::mysql::MySqlArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Sqlite};
use std::iter::Peekable;
use std::str::Chars;

/// Rewrite `:name` placeholders into positional `?` placeholders.
///
/// Placeholders inside quoted strings, quoted identifiers and comments are left
/// alone, as is a `::` cast. A placeholder without a value is an error;
/// parameters the SQL never mentions are ignored. With no parameters the SQL is
/// passed through untouched.
pub fn prepare(sql: &str, params: &Params) -> DbResult<Statement> {
    if params.is_empty() {
        return Ok(Statement::raw(sql));
    }

    let mut out = String::with_capacity(sql.len());
    let mut args = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                out.push(c);
                copy_quoted(&mut chars, &mut out, c);
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push_str("--");
                chars.next();
                copy_until(&mut chars, &mut out, "\n");
            }
            '#' => {
                out.push(c);
                copy_until(&mut chars, &mut out, "\n");
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push_str("/*");
                chars.next();
                copy_until(&mut chars, &mut out, "*/");
            }
            ':' => match chars.peek() {
                Some(':') => {
                    out.push_str("::");
                    chars.next();
                }
                Some(n) if n.is_ascii_alphabetic() || *n == '_' => {
                    let mut name = String::new();
                    while let Some(&n) = chars.peek() {
                        if n.is_ascii_alphanumeric() || n == '_' {
                            name.push(n);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let value = params.get(&name).ok_or_else(|| {
                        DbError::invalid_input(format!("Missing value for parameter ':{}'", name))
                    })?;
                    args.push(value.clone());
                    out.push('?');
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }

    Ok(Statement { sql: out, args })
}

fn copy_quoted(chars: &mut Peekable<Chars<'_>>, out: &mut String, quote: char) {
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\\' && quote != '`' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else if c == quote {
            return;
        }
    }
}

fn copy_until(chars: &mut Peekable<Chars<'_>>, out: &mut String, terminator: &str) {
    let start = out.len();
    for c in chars.by_ref() {
        out.push(c);
        if out[start..].ends_with(terminator) {
            return;
        }
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}
