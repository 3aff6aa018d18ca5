//! Static column metadata for one entity kind.
//!
//! Schemas are plain `static` tables built with `const fn` constructors and
//! associated with a type through [`crate::Entity::schema`]:
//!
//! ```rust
//! use booru_db::schema::{Column, ColumnDef, EntitySchema};
//!
//! static SOURCES: EntitySchema = EntitySchema::new(
//!     "sources",
//!     &[
//!         Column::new("id", ColumnDef::number("source_id").primary_key()),
//!         Column::new("name", ColumnDef::string("source_name")),
//!         Column::new("enabled", ColumnDef::boolean("source_enabled")),
//!         Column::new("subdomain", ColumnDef::string("source_subdomain").nullable()),
//!     ],
//! );
//!
//! assert_eq!(SOURCES.primary_key().map(|c| c.property), Some("id"));
//! assert!(SOURCES.verify(true).is_ok());
//! ```
//!
//! Invariants are checked by [`EntitySchema::verify`], which every statement
//! builder calls before producing SQL.

use std::collections::HashSet;
use std::fmt;

use crate::{DbError, Result};

/// Primitive type of a column as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Number,
    String,
    Boolean,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnType::Number => "number",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
        })
    }
}

/// Storage-side description of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Storage column name.
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDef {
    #[must_use]
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            primary_key: false,
        }
    }

    #[must_use]
    pub const fn number(name: &'static str) -> Self {
        Self::new(name, ColumnType::Number)
    }

    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, ColumnType::String)
    }

    #[must_use]
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Property name bound to its column descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub property: &'static str,
    pub def: ColumnDef,
}

impl Column {
    #[must_use]
    pub const fn new(property: &'static str, def: ColumnDef) -> Self {
        Self { property, def }
    }
}

/// Table name plus ordered property → column mapping.
#[derive(Debug, PartialEq, Eq)]
pub struct EntitySchema {
    table: &'static str,
    columns: &'static [Column],
}

impl EntitySchema {
    #[must_use]
    pub const fn new(table: &'static str, columns: &'static [Column]) -> Self {
        Self { table, columns }
    }

    #[must_use]
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &'static [Column] {
        self.columns
    }

    #[must_use]
    pub fn column(&self, property: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// The primary-key column, if one is declared.
    #[must_use]
    pub fn primary_key(&self) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.def.primary_key)
    }

    /// Columns written by INSERT and UPDATE: everything but the primary key.
    #[must_use]
    pub fn writable_columns(&self) -> impl Iterator<Item = &'static Column> {
        self.columns.iter().filter(|c| !c.def.primary_key)
    }

    /// Check the schema invariants.
    ///
    /// With `primary_key_required` the schema must also declare a primary key
    /// (UPDATE and select-by-id need one).
    ///
    /// # Errors
    /// Returns `DbError::Configuration` when the table name or column map is
    /// empty, an identifier is not `[A-Za-z0-9_]+`, a property is declared
    /// twice, more than one primary key is declared, or a required primary key
    /// is missing.
    pub fn verify(&self, primary_key_required: bool) -> Result<()> {
        if self.table.is_empty() {
            return Err(DbError::config("table name is not set"));
        }
        if !is_identifier(self.table) {
            return Err(DbError::config(format!(
                "table name `{}` is not a plain identifier",
                self.table
            )));
        }
        if self.columns.is_empty() {
            return Err(DbError::config(format!(
                "field map is not set for `{}`",
                self.table
            )));
        }

        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in self.columns {
            if !is_identifier(column.property) || !is_identifier(column.def.name) {
                return Err(DbError::config(format!(
                    "`{}.{}` ({}) is not a plain identifier",
                    self.table, column.def.name, column.property
                )));
            }
            if !seen.insert(column.property) {
                return Err(DbError::config(format!(
                    "property `{}` is declared twice in `{}`",
                    column.property, self.table
                )));
            }
        }

        let keys = self.columns.iter().filter(|c| c.def.primary_key).count();
        if keys > 1 {
            return Err(DbError::config(format!(
                "`{}` declares {keys} primary keys",
                self.table
            )));
        }
        if primary_key_required && keys == 0 {
            return Err(DbError::config(format!(
                "primary key is not set for `{}` and is required for this operation",
                self.table
            )));
        }
        Ok(())
    }
}

/// Verify a set of schemas at startup so configuration errors surface before
/// the first request.
///
/// # Errors
/// Returns the first `DbError::Configuration` found.
pub fn verify_all<'a>(schemas: impl IntoIterator<Item = &'a EntitySchema>) -> Result<()> {
    schemas.into_iter().try_for_each(|schema| schema.verify(false))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    static POSTS: EntitySchema = EntitySchema::new(
        "posts",
        &[
            Column::new("id", ColumnDef::number("post_id").primary_key()),
            Column::new("title", ColumnDef::string("post_title")),
            Column::new("visible", ColumnDef::boolean("post_visible")),
        ],
    );

    static LINKS: EntitySchema = EntitySchema::new(
        "post_images",
        &[
            Column::new("postId", ColumnDef::number("post_id")),
            Column::new("imageId", ColumnDef::number("image_id")),
        ],
    );

    #[test]
    fn primary_key_and_writable_columns() {
        assert_eq!(POSTS.primary_key().map(|c| c.def.name), Some("post_id"));
        let writable: Vec<_> = POSTS.writable_columns().map(|c| c.property).collect();
        assert_eq!(writable, ["title", "visible"]);
        assert!(LINKS.primary_key().is_none());
    }

    #[test]
    fn verify_accepts_valid_schemas() {
        assert!(POSTS.verify(true).is_ok());
        assert!(LINKS.verify(false).is_ok());
        assert!(verify_all([&POSTS, &LINKS]).is_ok());
    }

    #[test]
    fn verify_requires_primary_key_when_asked() {
        let err = LINKS.verify(true).unwrap_err();
        assert!(matches!(err, DbError::Configuration(_)));
        assert!(err.to_string().contains("primary key is not set"));
    }

    #[test]
    fn verify_rejects_empty_table_and_columns() {
        static NO_TABLE: EntitySchema =
            EntitySchema::new("", &[Column::new("id", ColumnDef::number("id"))]);
        static NO_COLUMNS: EntitySchema = EntitySchema::new("things", &[]);

        assert!(NO_TABLE.verify(false).unwrap_err().to_string().contains("table name"));
        assert!(NO_COLUMNS.verify(false).unwrap_err().to_string().contains("field map"));
    }

    #[test]
    fn verify_rejects_two_primary_keys() {
        static TWO_KEYS: EntitySchema = EntitySchema::new(
            "things",
            &[
                Column::new("a", ColumnDef::number("a").primary_key()),
                Column::new("b", ColumnDef::number("b").primary_key()),
            ],
        );
        assert!(TWO_KEYS.verify(false).unwrap_err().to_string().contains("2 primary keys"));
    }

    #[test]
    fn verify_rejects_quoted_identifiers() {
        static BAD: EntitySchema = EntitySchema::new(
            "things",
            &[Column::new("name", ColumnDef::string("name`; DROP TABLE x; --"))],
        );
        assert!(matches!(BAD.verify(false), Err(DbError::Configuration(_))));
    }

    #[test]
    fn verify_rejects_duplicate_properties() {
        static DUP: EntitySchema = EntitySchema::new(
            "things",
            &[
                Column::new("name", ColumnDef::string("name_a")),
                Column::new("name", ColumnDef::string("name_b")),
            ],
        );
        assert!(DUP.verify(false).unwrap_err().to_string().contains("declared twice"));
    }
}
