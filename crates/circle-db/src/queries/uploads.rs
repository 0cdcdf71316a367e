use super::OptionalExt;
use crate::{Database, Result};

impl Database {
    // -- Uploads --

    /// Remember who stored `bucket/path`.
    pub fn record_upload(&self, bucket: &str, path: &str, owner_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO uploads (bucket, path, owner_id) VALUES (?1, ?2, ?3)",
                (bucket, path, owner_id),
            )?;
            Ok(())
        })
    }

    /// The user that stored `bucket/path`, if it was uploaded through the API.
    pub fn upload_owner(&self, bucket: &str, path: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT owner_id FROM uploads WHERE bucket = ?1 AND path = ?2",
                (bucket, path),
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn forget_upload(&self, bucket: &str, path: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM uploads WHERE bucket = ?1 AND path = ?2", (bucket, path))?;
            Ok(())
        })
    }
}
