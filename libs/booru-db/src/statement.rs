//! Statement builder and placeholder substitution.
//!
//! Statements are produced as text with `:property` placeholders. Values are
//! then inlined client-side by [`substitute_params`]: each placeholder becomes
//! the `MySQL` literal of the matching record value, rendered by `sea-query`'s
//! `MySQL` backend (quotes, backslashes and control characters escaped), or
//! `NULL` when the value is absent.
//!
//! Table and column names come from a verified [`EntitySchema`] and are
//! backtick-quoted.

use std::sync::LazyLock;

use regex::Regex;
use sea_query::{MysqlQueryBuilder, QueryBuilder};
use serde_json::Value;

use crate::record::Record;
use crate::schema::EntitySchema;
use crate::{DbError, Result};

/// Placeholder name used by [`build_select_by_id`].
pub const PRIMARY_KEY_PARAM: &str = "primaryKey";

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\w+)").expect("static regex should not panic"));

fn quote(ident: &str) -> String {
    format!("`{ident}`")
}

/// `INSERT INTO <table> (<columns>) VALUES (:<properties>)` over every
/// non-primary-key column, in declared order.
///
/// # Errors
/// Returns `DbError::Configuration` when the schema is invalid or has no
/// writable column.
pub fn build_insert(schema: &EntitySchema) -> Result<String> {
    schema.verify(false)?;
    let (columns, params): (Vec<_>, Vec<_>) = schema
        .writable_columns()
        .map(|c| (quote(c.def.name), format!(":{}", c.property)))
        .unzip();
    if columns.is_empty() {
        return Err(DbError::config(format!(
            "`{}` has no insertable columns",
            schema.table()
        )));
    }
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(schema.table()),
        columns.join(", "),
        params.join(", ")
    ))
}

/// `UPDATE <table> SET <col> = :<prop>, ... WHERE <pk col> = :<pk prop>`.
///
/// # Errors
/// Returns `DbError::Configuration` when the schema is invalid, declares no
/// primary key, or has nothing to update.
pub fn build_update(schema: &EntitySchema) -> Result<String> {
    schema.verify(true)?;
    let pk = primary_key(schema)?;
    let assignments: Vec<_> = schema
        .writable_columns()
        .map(|c| format!("{} = :{}", quote(c.def.name), c.property))
        .collect();
    if assignments.is_empty() {
        return Err(DbError::config(format!(
            "`{}` has no updatable columns",
            schema.table()
        )));
    }
    Ok(format!(
        "UPDATE {} SET {} WHERE {} = :{}",
        quote(schema.table()),
        assignments.join(", "),
        quote(pk.def.name),
        pk.property
    ))
}

/// `SELECT * FROM <table>`.
///
/// # Errors
/// Returns `DbError::Configuration` when the schema is invalid.
pub fn build_select_all(schema: &EntitySchema) -> Result<String> {
    schema.verify(false)?;
    Ok(format!("SELECT * FROM {}", quote(schema.table())))
}

/// `SELECT * FROM <table> WHERE <pk col> = :primaryKey LIMIT 1`.
///
/// # Errors
/// Returns `DbError::Configuration` when the schema is invalid or declares no
/// primary key.
pub fn build_select_by_id(schema: &EntitySchema) -> Result<String> {
    schema.verify(true)?;
    let pk = primary_key(schema)?;
    Ok(format!(
        "SELECT * FROM {} WHERE {} = :{PRIMARY_KEY_PARAM} LIMIT 1",
        quote(schema.table()),
        quote(pk.def.name)
    ))
}

/// `SELECT * FROM <table> WHERE <col> = :<property>` for one declared property.
///
/// # Errors
/// Returns `DbError::Configuration` when the schema is invalid or does not
/// declare `property`.
pub fn build_select_where(schema: &EntitySchema, property: &str) -> Result<String> {
    schema.verify(false)?;
    let column = schema.column(property).ok_or_else(|| {
        DbError::config(format!(
            "`{}` has no property `{property}`",
            schema.table()
        ))
    })?;
    Ok(format!(
        "SELECT * FROM {} WHERE {} = :{}",
        quote(schema.table()),
        quote(column.def.name),
        column.property
    ))
}

/// ``CALL `<procedure>`(:arg, ...)``.
///
/// # Errors
/// Returns `DbError::Configuration` when the procedure or an argument name is
/// not a plain identifier.
pub fn build_call(procedure: &str, args: &[&str]) -> Result<String> {
    let plain = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !plain(procedure) || !args.iter().all(|a| plain(a)) {
        return Err(DbError::config(format!(
            "procedure call `{procedure}({})` uses a non-identifier name",
            args.join(", ")
        )));
    }
    let params: Vec<_> = args.iter().map(|a| format!(":{a}")).collect();
    Ok(format!("CALL {}({})", quote(procedure), params.join(", ")))
}

fn primary_key(schema: &EntitySchema) -> Result<&'static crate::schema::Column> {
    schema.primary_key().ok_or_else(|| {
        DbError::config(format!(
            "primary key is not set for `{}`",
            schema.table()
        ))
    })
}

/// Replace every `:identifier` token with the escaped literal of
/// `params[identifier]`, or `NULL` when the parameter is absent.
///
/// The scan is single-pass: text produced by a substitution is never
/// rescanned, so values containing `:word` are inlined verbatim.
///
/// # Errors
/// Returns `DbError::InvalidParameter` when a referenced value is an array or
/// an object.
pub fn substitute_params(template: &str, params: &Record) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(token), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..token.start()]);
        match params.get(name.as_str()) {
            Some(value) => out.push_str(&sql_literal(name.as_str(), value)?),
            None => out.push_str("NULL"),
        }
        last = token.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Render one scalar as a `MySQL` literal.
///
/// # Errors
/// Returns `DbError::InvalidParameter` for arrays, objects, and numbers that
/// fit neither `i64`, `u64` nor `f64`.
pub fn sql_literal(name: &str, value: &Value) -> Result<String> {
    let invalid = |message: &str| DbError::InvalidParameter {
        name: name.to_owned(),
        message: message.to_owned(),
    };
    let value: sea_query::Value = match value {
        Value::Null => return Ok("NULL".to_owned()),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else if let Some(u) = n.as_u64() {
                u.into()
            } else if let Some(f) = n.as_f64() {
                f.into()
            } else {
                return Err(invalid("number is out of range"));
            }
        }
        Value::String(s) => s.as_str().into(),
        Value::Array(_) | Value::Object(_) => {
            return Err(invalid("only scalar values can be inlined"));
        }
    };
    Ok(MysqlQueryBuilder.value_to_string(&value))
}
