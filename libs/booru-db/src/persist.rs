//! Persistence engine: records in, statements out.
//!
//! Every function takes a `&mut R: DbRunner`, so the same call runs on a
//! pooled connection or inside a transaction.

use serde_json::Value;
use tracing::debug;

use crate::mapper;
use crate::record::{self, Record, Row};
use crate::runner::{DbRunner, ExecOutcome};
use crate::schema::EntitySchema;
use crate::statement::{self, PRIMARY_KEY_PARAM};
use crate::Result;

/// Insert when the record has no primary key yet, update otherwise.
///
/// "No primary key yet" means absent, `null`, `0`, `""` or `false`. A schema
/// without a primary key always inserts. A caller-assigned key therefore
/// takes the update path; use [`insert`] to force an insert.
///
/// # Errors
/// Propagates the errors of [`insert`] and [`update`].
pub async fn sync<R>(runner: &mut R, schema: &EntitySchema, record: &mut Record) -> Result<()>
where
    R: DbRunner + ?Sized,
{
    let has_key = schema
        .primary_key()
        .and_then(|pk| record.get(pk.property))
        .is_some_and(record::is_set);
    if has_key {
        update(runner, schema, record).await.map(|_| ())
    } else {
        insert(runner, schema, record).await.map(|_| ())
    }
}

/// INSERT the record, then store the generated id under the primary-key
/// property when the schema declares one.
///
/// # Errors
/// `DbError::Configuration` for an invalid schema, `DbError::InvalidParameter`
/// for a non-scalar value, `DbError::Sqlx` when the statement fails.
pub async fn insert<R>(runner: &mut R, schema: &EntitySchema, record: &mut Record) -> Result<ExecOutcome>
where
    R: DbRunner + ?Sized,
{
    let sql = statement::substitute_params(&statement::build_insert(schema)?, record)?;
    let outcome = runner.execute(&sql).await?;
    if let Some(pk) = schema.primary_key() {
        record.set(pk.property, outcome.last_insert_id);
    }
    debug!(table = schema.table(), id = outcome.last_insert_id, "inserted");
    Ok(outcome)
}

/// UPDATE every writable column by primary key.
///
/// A key matching no row is a silent no-op; the returned outcome carries
/// `rows_affected` for callers that care.
///
/// # Errors
/// `DbError::Configuration` when the schema has no primary key, otherwise as
/// for [`insert`].
pub async fn update<R>(runner: &mut R, schema: &EntitySchema, record: &Record) -> Result<ExecOutcome>
where
    R: DbRunner + ?Sized,
{
    let sql = statement::substitute_params(&statement::build_update(schema)?, record)?;
    let outcome = runner.execute(&sql).await?;
    debug!(table = schema.table(), rows = outcome.rows_affected, "updated");
    Ok(outcome)
}

/// Every row of the table, mapped to records. Empty table → empty `Vec`.
///
/// # Errors
/// `DbError::Configuration` for an invalid schema, `DbError::Sqlx` when the
/// query fails.
pub async fn select_all<R>(runner: &mut R, schema: &EntitySchema) -> Result<Vec<Record>>
where
    R: DbRunner + ?Sized,
{
    let sql = statement::build_select_all(schema)?;
    let rows = runner.fetch_all(&sql).await?;
    debug!(table = schema.table(), rows = rows.len(), "selected all");
    Ok(map_rows(schema, &rows))
}

/// The row whose primary key equals `id`, or `None`.
///
/// # Errors
/// `DbError::Configuration` when the schema has no primary key, otherwise as
/// for [`select_all`].
pub async fn select_by_id<R>(
    runner: &mut R,
    schema: &EntitySchema,
    id: impl Into<Value>,
) -> Result<Option<Record>>
where
    R: DbRunner + ?Sized,
{
    let params = Record::new().with(PRIMARY_KEY_PARAM, id);
    let sql = statement::substitute_params(&statement::build_select_by_id(schema)?, &params)?;
    let rows = runner.fetch_all(&sql).await?;
    Ok(rows.first().map(|row| mapper::from_row(schema, row)))
}

/// Rows where one declared property equals `value`.
///
/// # Errors
/// `DbError::Configuration` when `property` is not declared, otherwise as for
/// [`select_all`].
pub async fn select_where<R>(
    runner: &mut R,
    schema: &EntitySchema,
    property: &str,
    value: impl Into<Value>,
) -> Result<Vec<Record>>
where
    R: DbRunner + ?Sized,
{
    let params = Record::new().with(property, value);
    let sql = statement::substitute_params(&statement::build_select_where(schema, property)?, &params)?;
    let rows = runner.fetch_all(&sql).await?;
    Ok(map_rows(schema, &rows))
}

/// Run a raw query template; `:name` placeholders are filled from `params`.
///
/// # Errors
/// `DbError::InvalidParameter` for a non-scalar value, `DbError::Sqlx` when
/// the query fails.
pub async fn query<R>(runner: &mut R, template: &str, params: &Record) -> Result<Vec<Row>>
where
    R: DbRunner + ?Sized,
{
    let sql = statement::substitute_params(template, params)?;
    runner.fetch_all(&sql).await
}

/// Run a raw write template; `:name` placeholders are filled from `params`.
///
/// # Errors
/// As for [`query`].
pub async fn execute<R>(runner: &mut R, template: &str, params: &Record) -> Result<ExecOutcome>
where
    R: DbRunner + ?Sized,
{
    let sql = statement::substitute_params(template, params)?;
    runner.execute(&sql).await
}

/// ``CALL `name`(:arg, ...)`` with `args` looked up in `params`.
///
/// Rows produced by the procedure are returned.
///
/// # Errors
/// `DbError::Configuration` when a name is not a plain identifier, otherwise
/// as for [`query`].
pub async fn call_procedure<R>(
    runner: &mut R,
    name: &str,
    args: &[&str],
    params: &Record,
) -> Result<Vec<Row>>
where
    R: DbRunner + ?Sized,
{
    let sql = statement::substitute_params(&statement::build_call(name, args)?, params)?;
    debug!(procedure = name, "calling stored procedure");
    runner.fetch_all(&sql).await
}

fn map_rows(schema: &EntitySchema, rows: &[Row]) -> Vec<Record> {
    rows.iter().map(|row| mapper::from_row(schema, row)).collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::DbError;
    use crate::runner::DbSource;
    use crate::schema::{Column, ColumnDef};
    use crate::testing::ScriptedDb;
    use serde_json::json;

    static SOURCES: EntitySchema = EntitySchema::new(
        "sources",
        &[
            Column::new("id", ColumnDef::number("source_id").primary_key()),
            Column::new("name", ColumnDef::string("source_name")),
            Column::new("enabled", ColumnDef::boolean("source_enabled")),
        ],
    );

    static LINKS: EntitySchema = EntitySchema::new(
        "post_images",
        &[
            Column::new("postId", ColumnDef::number("post_id")),
            Column::new("imageId", ColumnDef::number("image_id")),
        ],
    );

    #[tokio::test]
    async fn sync_without_key_inserts_and_reconciles_id() {
        let db = ScriptedDb::new().starting_after(41);
        let mut conn = db.conn();
        let mut source = Record::new().with("name", "gelbooru").with("enabled", true);

        sync(&mut conn, &SOURCES, &mut source).await.unwrap();

        assert_eq!(source.get("id"), Some(&json!(42)));
        assert_eq!(
            db.applied(),
            ["INSERT INTO `sources` (`source_name`, `source_enabled`) VALUES ('gelbooru', TRUE)"]
        );
    }

    #[tokio::test]
    async fn sync_with_falsy_key_inserts() {
        for id in [json!(0), json!(""), json!(false), Value::Null] {
            let db = ScriptedDb::new();
            let mut record = Record::new()
                .with("id", id)
                .with("name", "x")
                .with("enabled", false);
            sync(&mut db.conn(), &SOURCES, &mut record).await.unwrap();
            assert!(db.applied()[0].starts_with("INSERT"));
            assert_eq!(record.get("id"), Some(&json!(1)));
        }
    }

    #[tokio::test]
    async fn sync_with_key_updates() {
        let db = ScriptedDb::new();
        let mut source = Record::new()
            .with("id", 7)
            .with("name", "O'Brien")
            .with("enabled", false);

        sync(&mut db.conn(), &SOURCES, &mut source).await.unwrap();

        assert_eq!(
            db.applied(),
            [r"UPDATE `sources` SET `source_name` = 'O\'Brien', `source_enabled` = FALSE WHERE `source_id` = 7"]
        );
        assert_eq!(source.get("id"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn schema_without_key_always_inserts() {
        let db = ScriptedDb::new();
        let mut link = Record::new().with("postId", 1).with("imageId", 2);
        sync(&mut db.conn(), &LINKS, &mut link).await.unwrap();
        assert!(!link.contains("id"));
        assert_eq!(
            db.applied(),
            ["INSERT INTO `post_images` (`post_id`, `image_id`) VALUES (1, 2)"]
        );
    }

    #[tokio::test]
    async fn update_without_key_is_configuration_error() {
        let db = ScriptedDb::new();
        let link = Record::new().with("postId", 1).with("imageId", 2);
        let err = update(&mut db.conn(), &LINKS, &link).await.unwrap_err();
        assert!(matches!(err, DbError::Configuration(_)));
        assert!(db.log().is_empty());
    }

    #[tokio::test]
    async fn select_by_id_maps_row_or_none() {
        let db = ScriptedDb::new();
        db.push_rows(vec![
            Row::new()
                .with("source_id", 3)
                .with("source_name", "safebooru")
                .with("source_enabled", true),
        ]);
        let mut conn = db.conn();

        let found = select_by_id(&mut conn, &SOURCES, 3).await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&json!("safebooru")));

        let missing = select_by_id(&mut conn, &SOURCES, 4).await.unwrap();
        assert!(missing.is_none());

        assert_eq!(
            db.log(),
            [
                "SELECT * FROM `sources` WHERE `source_id` = 3 LIMIT 1",
                "SELECT * FROM `sources` WHERE `source_id` = 4 LIMIT 1"
            ]
        );
    }

    #[tokio::test]
    async fn select_all_empty_table() {
        let db = ScriptedDb::new();
        let all = select_all(&mut db.conn(), &SOURCES).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn select_where_filters_on_one_column() {
        let db = ScriptedDb::new();
        db.push_rows(vec![
            Row::new().with("post_id", 5).with("image_id", 1),
            Row::new().with("post_id", 5).with("image_id", 2),
        ]);
        let links = select_where(&mut db.conn(), &LINKS, "postId", 5).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].get("imageId"), Some(&json!(2)));
        assert_eq!(
            db.log(),
            ["SELECT * FROM `post_images` WHERE `post_id` = 5"]
        );
    }

    #[tokio::test]
    async fn call_procedure_substitutes_arguments() {
        let db = ScriptedDb::new();
        let params = Record::new().with("postId", 12);
        call_procedure(&mut db.conn(), "proc_UpdateDenormalizedPostData", &["postId"], &params)
            .await
            .unwrap();
        assert_eq!(db.log(), ["CALL `proc_UpdateDenormalizedPostData`(12)"]);
    }

    #[tokio::test]
    async fn raw_templates() {
        let db = ScriptedDb::new();
        let params = Record::new().with("name", "a'b");
        execute(&mut db.conn(), "UPDATE `t` SET `n` = :name", &params)
            .await
            .unwrap();
        query(&mut db.conn(), "SELECT * FROM `t` WHERE `n` = :name OR `n` = :other", &params)
            .await
            .unwrap();
        assert_eq!(
            db.log(),
            [
                r"UPDATE `t` SET `n` = 'a\'b'",
                r"SELECT * FROM `t` WHERE `n` = 'a\'b' OR `n` = NULL"
            ]
        );
    }
}
