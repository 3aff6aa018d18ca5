//! Typed entities on top of the record layer.
//!
//! A struct binds itself to a static [`EntitySchema`] and converts to and from
//! [`Record`] through `serde`. Property names in the schema are the serialized
//! field names, so structs use `#[serde(rename_all = "camelCase")]` to match.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ValidationError, ValidationErrors};
use crate::mapper;
use crate::persist;
use crate::record::Record;
use crate::runner::DbRunner;
use crate::schema::EntitySchema;
use crate::{DbError, Result};

pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    fn schema() -> &'static EntitySchema;

    /// # Errors
    /// Returns `DbError::Serde` when the struct does not serialize to an object.
    fn to_record(&self) -> Result<Record> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(Record::from(map)),
            other => Err(DbError::config(format!(
                "`{}` entity serialized to a non-object: {other}",
                Self::schema().table()
            ))),
        }
    }

    /// # Errors
    /// Returns `DbError::Serde` when the record does not fit the struct.
    fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(Value::from(record))?)
    }

    /// Validating constructor for untrusted input.
    ///
    /// # Errors
    /// Returns every schema violation found in `raw`.
    fn create(raw: &Value) -> std::result::Result<Self, ValidationErrors> {
        let record = mapper::from_validated_object(Self::schema(), raw)?;
        Self::from_record(record).map_err(|e| ValidationError::new("$", e.to_string()).into())
    }
}

/// Insert or update `entity`, writing a generated id back into it.
///
/// # Errors
/// As for [`persist::sync`].
pub async fn sync<E, R>(runner: &mut R, entity: &mut E) -> Result<()>
where
    E: Entity,
    R: DbRunner + ?Sized,
{
    let mut record = entity.to_record()?;
    persist::sync(runner, E::schema(), &mut record).await?;
    *entity = E::from_record(record)?;
    Ok(())
}

/// # Errors
/// As for [`persist::select_all`], plus `DbError::Serde` for a row that does
/// not fit `E`.
pub async fn select_all<E, R>(runner: &mut R) -> Result<Vec<E>>
where
    E: Entity,
    R: DbRunner + ?Sized,
{
    persist::select_all(runner, E::schema())
        .await?
        .into_iter()
        .map(E::from_record)
        .collect()
}

/// # Errors
/// As for [`persist::select_by_id`], plus `DbError::Serde`.
pub async fn select_by_id<E, R>(runner: &mut R, id: impl Into<Value>) -> Result<Option<E>>
where
    E: Entity,
    R: DbRunner + ?Sized,
{
    persist::select_by_id(runner, E::schema(), id)
        .await?
        .map(E::from_record)
        .transpose()
}

/// # Errors
/// As for [`persist::select_where`], plus `DbError::Serde`.
pub async fn select_where<E, R>(
    runner: &mut R,
    property: &str,
    value: impl Into<Value>,
) -> Result<Vec<E>>
where
    E: Entity,
    R: DbRunner + ?Sized,
{
    persist::select_where(runner, E::schema(), property, value)
        .await?
        .into_iter()
        .map(E::from_record)
        .collect()
}
