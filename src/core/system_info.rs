//! Durable update bookkeeping
//!
//! Reads and writes the `system_info` key/value table. Writes are upserts: a
//! key has at most one row, created on first write and updated afterwards.
//! Rows are never deleted.

use crate::{
    entities::{SystemInfo, system_info},
    errors::Result,
};
use chrono::{SecondsFormat, Utc};
use sea_orm::{Set, prelude::*};
use tracing::{debug, instrument};

/// Timestamp (ISO-8601) of the last successful update
pub const LAST_UPDATE_AT_KEY: &str = "last_update_at";
/// Remote revision whose apply previously failed
pub const FAILED_REMOTE_SHA_KEY: &str = "failed_remote_sha";

/// Retrieves the value stored under `key`, or `None` if the key was never written.
#[instrument(skip(db))]
pub async fn get_value<C>(db: &C, key: &str) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    let value = SystemInfo::find_by_id(key.to_string())
        .one(db)
        .await?
        .map(|record| record.value);
    debug!("System info for key '{}': {:?}", key, value);
    Ok(value)
}

/// Sets or updates the value stored under `key`.
#[instrument(skip(db))]
pub async fn set_value<C>(db: &C, key: &str, value: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();

    if let Some(record) = SystemInfo::find_by_id(key.to_string()).one(db).await? {
        let mut active_model: system_info::ActiveModel = record.into();
        active_model.value = Set(value.to_string());
        active_model.updated_at = Set(now);
        active_model.update(db).await?;
    } else {
        let new_record = system_info::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(now),
        };
        SystemInfo::insert(new_record).exec_without_returning(db).await?;
    }

    debug!("Set system info: {} = {}", key, value);
    Ok(())
}

/// Timestamp of the last successful update, as stored.
pub async fn last_update_at<C>(db: &C) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    get_value(db, LAST_UPDATE_AT_KEY).await
}

/// Records `now` as the last successful update and returns the stored string.
pub async fn record_update_now<C>(db: &C) -> Result<String>
where
    C: ConnectionTrait,
{
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    set_value(db, LAST_UPDATE_AT_KEY, &now).await?;
    Ok(now)
}

/// The remote revision that previously failed to apply, if any.
pub async fn failed_remote_revision<C>(db: &C) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    get_value(db, FAILED_REMOTE_SHA_KEY).await
}

/// Marks `revision` as known-bad so the checker skips it.
pub async fn record_failed_remote_revision<C>(db: &C, revision: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    set_value(db, FAILED_REMOTE_SHA_KEY, revision).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;
    use chrono::DateTime;

    #[tokio::test]
    async fn test_set_and_get_new_key() -> Result<()> {
        let db = setup_test_db().await?;

        set_value(&db, "test_key_1", "test_value_1").await?;
        let retrieved = get_value(&db, "test_key_1").await?;

        assert_eq!(retrieved, Some("test_value_1".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_updates_existing_key() -> Result<()> {
        let db = setup_test_db().await?;

        set_value(&db, "key", "initial").await?;
        set_value(&db, "key", "updated").await?;

        assert_eq!(get_value(&db, "key").await?, Some("updated".to_string()));

        // Verify only one record exists
        let count = SystemInfo::find()
            .filter(system_info::Column::Key.eq("key"))
            .count(&db)
            .await?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_non_existent_key() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(get_value(&db, "this_key_does_not_exist").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_record_update_now_is_iso8601() -> Result<()> {
        let db = setup_test_db().await?;

        let stored = record_update_now(&db).await?;
        assert_eq!(last_update_at(&db).await?, Some(stored.clone()));
        assert!(DateTime::parse_from_rfc3339(&stored).is_ok());
        assert!(stored.ends_with('Z'));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_remote_revision_roundtrip() -> Result<()> {
        let db = setup_test_db().await?;

        assert!(failed_remote_revision(&db).await?.is_none());
        record_failed_remote_revision(&db, "def456").await?;
        record_failed_remote_revision(&db, "fedcba").await?;
        assert_eq!(failed_remote_revision(&db).await?, Some("fedcba".to_string()));
        Ok(())
    }
}
