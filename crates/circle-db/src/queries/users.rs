use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::models::UserRow;
use crate::{Database, DbError, Result};

/// Column list matching [`user_from_row`]. Expects the users table aliased as `u`.
pub(crate) const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.password, u.display_name, u.bio, u.avatar_url, u.last_seen, u.created_at";

pub(crate) fn user_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(base)?,
        username: row.get(base + 1)?,
        email: row.get(base + 2)?,
        password: row.get(base + 3)?,
        display_name: row.get(base + 4)?,
        bio: row.get(base + 5)?,
        avatar_url: row.get(base + 6)?,
        last_seen: row.get(base + 7)?,
        created_at: row.get(base + 8)?,
    })
}

impl Database {
    // -- Users --

    /// Insert a new user. Username and email are checked first so the caller
    /// gets a descriptive conflict instead of a bare constraint failure.
    pub fn create_user(&self, id: &str, username: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_tx(|tx| {
            if query_user_by_username(tx, username)?.is_some() {
                return Err(DbError::Conflict(format!(
                    "User with username '{}' already exists",
                    username
                )));
            }

            let email_taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            if email_taken {
                return Err(DbError::Conflict(format!(
                    "User with email '{}' already exists",
                    email
                )));
            }

            tx.execute(
                "INSERT INTO users (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                (id, username, email, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Update profile fields. `None` leaves the stored value unchanged.
    pub fn update_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<UserRow> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    display_name = COALESCE(?2, display_name),
                    bio = COALESCE(?3, bio),
                    avatar_url = COALESCE(?4, avatar_url)
                 WHERE id = ?1",
                rusqlite::params![id, display_name, bio, avatar_url],
            )?;
            if changed == 0 {
                return Err(DbError::not_found("User", id));
            }
            query_user_by_id(conn, id)?.ok_or_else(|| DbError::not_found("User", id))
        })
    }

    pub fn set_last_seen(&self, id: &str, last_seen: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_seen = ?2 WHERE id = ?1",
                (id, last_seen),
            )?;
            if changed == 0 {
                return Err(DbError::not_found("User", id));
            }
            Ok(())
        })
    }

    /// Delete a user. Posts, likes, comments, friendships and notifications
    /// referencing the user go with it (ON DELETE CASCADE).
    pub fn delete_user(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(DbError::not_found("User", id));
            }
            Ok(())
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE u.username = ?1", USER_COLUMNS);
    conn.query_row(&sql, [username], |row| user_from_row(row, 0))
        .optional()
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id], |row| user_from_row(row, 0))
        .optional()
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db_with_users, new_id};
    use crate::DbError;

    #[test]
    fn duplicate_username_is_rejected_before_insert() {
        let (db, _) = db_with_users(&["ana"]);

        let err = db
            .create_user(&new_id(), "ana", "other@example.com", "hash")
            .unwrap_err();
        match err {
            DbError::Conflict(msg) => assert!(msg.contains("username 'ana'")),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_email_is_rejected_before_insert() {
        let (db, _) = db_with_users(&["ana"]);

        let err = db
            .create_user(&new_id(), "bea", "ana@example.com", "hash")
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(ref msg) if msg.contains("email")));
        assert!(db.get_user_by_username("bea").unwrap().is_none());
    }

    #[test]
    fn update_profile_keeps_absent_fields() {
        let (db, ids) = db_with_users(&["ana"]);

        db.update_profile(&ids[0], Some("Ana"), Some("hello"), None).unwrap();
        let user = db.update_profile(&ids[0], None, Some("bye"), None).unwrap();

        assert_eq!(user.display_name.as_deref(), Some("Ana"));
        assert_eq!(user.bio.as_deref(), Some("bye"));
        assert_eq!(user.avatar_url, None);
    }

    #[test]
    fn update_profile_of_missing_user_is_not_found() {
        let (db, _) = db_with_users(&[]);
        let err = db.update_profile("nope", Some("x"), None, None).unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity: "User", .. }));
    }

    #[test]
    fn delete_user_cascades() {
        let (db, ids) = db_with_users(&["ana", "bea"]);
        let post_id = new_id();
        db.create_post(&post_id, &ids[0], Some("hi"), None).unwrap();
        db.like_post(&post_id, &ids[1]).unwrap();
        db.send_friend_request(&new_id(), &ids[0], &ids[1]).unwrap();

        db.delete_user(&ids[0]).unwrap();

        assert!(db.get_user_by_id(&ids[0]).unwrap().is_none());
        assert!(db.get_post(&post_id, &ids[1]).unwrap().is_none());
        assert!(db.friendship_between(&ids[0], &ids[1]).unwrap().is_none());
        assert!(matches!(db.delete_user(&ids[0]), Err(DbError::NotFound { .. })));
    }

    #[test]
    fn last_seen_is_persisted() {
        let (db, ids) = db_with_users(&["ana"]);
        db.set_last_seen(&ids[0], "2026-01-01T00:00:00.000Z").unwrap();
        let user = db.get_user_by_id(&ids[0]).unwrap().unwrap();
        assert_eq!(user.last_seen.as_deref(), Some("2026-01-01T00:00:00.000Z"));
    }
}
