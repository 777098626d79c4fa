use std::path::Path;

use anyhow::anyhow;
use chrono::{DateTime, Local, Utc};
use rusqlite::Connection;

use crate::{
    config::Database,
    storage::{error::StorageError, schema},
};

pub type SecondsSinceUnix = i64;

fn open_in_memory() -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open_in_memory()
}

fn open_from_file(path: &Path) -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open(path)
}

pub fn open(config: &Database) -> Result<rusqlite::Connection, StorageError> {
    let db = match (config.in_memory, &config.path) {
        (true, _) => open_in_memory()?,
        (false, Some(path)) => open_from_file(path)?,
        (false, None) => {
            return Err(StorageError::Internal(anyhow!(
                "database.path is required unless database.in_memory is set"
            )));
        }
    };
    schema::init(&db)?;
    Ok(db)
}

pub fn now_secs() -> SecondsSinceUnix {
    Utc::now().timestamp()
}

/// converts number of seconds since unix epoch to local date time
pub fn i64_seconds_to_local_time(since_unix: i64) -> anyhow::Result<DateTime<Local>> {
    let datetime = DateTime::from_timestamp_secs(since_unix).ok_or(anyhow!(
        "failed to convert {since_unix} s timestamp to datetime"
    ))?;

    Ok(DateTime::from(datetime))
}
