mod friendships;
mod notifications;
mod posts;
mod uploads;
mod users;

use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use crate::{DbError, Result};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 50;

/// Cursor paging input: page size plus the ID of the last row already seen.
///
/// Every list query orders by `(created_at, id)` descending and returns the
/// rows strictly after the cursor row, so the cursor itself is never repeated.
/// An unknown cursor ID matches nothing and yields an empty page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub limit: u32,
    pub cursor: Option<String>,
}

impl PageParams {
    pub fn new(limit: Option<u32>, cursor: Option<String>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            cursor: cursor.filter(|c| !c.is_empty()),
        }
    }

    pub fn first(limit: u32) -> Self {
        Self::new(Some(limit), None)
    }

    pub fn after(limit: u32, cursor: &str) -> Self {
        Self::new(Some(limit), Some(cursor.to_string()))
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Current time in the same format as the column defaults.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a TEXT column into a type with a `FromStr` impl (status/type tags).
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::Sqlite(e)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use uuid::Uuid;

    use crate::Database;

    /// Fresh in-memory database seeded with one user per name. Returns the user IDs in order.
    pub fn db_with_users(names: &[&str]) -> (Database, Vec<String>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|name| {
                let id = Uuid::new_v4().to_string();
                db.create_user(&id, name, &format!("{}@example.com", name), "hash")
                    .unwrap();
                id
            })
            .collect();
        (db, ids)
    }

    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}
