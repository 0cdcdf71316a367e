use rusqlite::{Connection, Row};
use uuid::Uuid;

use circle_types::models::NotificationType;

use super::{OptionalExt, PageParams, parse_column};
use crate::models::{NewNotification, NotificationRow};
use crate::{Database, DbError, Result};

const NOTIFICATION_SELECT: &str = "SELECT n.id, n.user_id, n.actor_id, u.username, n.type,
        n.post_id, n.comment_id, n.friendship_id, n.read, n.created_at
     FROM notifications n
     JOIN users u ON u.id = n.actor_id";

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        actor_id: row.get(2)?,
        actor_username: row.get(3)?,
        kind: parse_column(row, 4)?,
        post_id: row.get(5)?,
        comment_id: row.get(6)?,
        friendship_id: row.get(7)?,
        read: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl Database {
    // -- Notifications --

    /// Write one notification per reference set on `new`: `post_id` → LIKE,
    /// `comment_id` → COMMENT, `friendship_id` → FRIENDREQUEST.
    /// Nothing is written when the actor is the recipient.
    pub fn create_notification(&self, new: &NewNotification<'_>) -> Result<Vec<NotificationRow>> {
        if new.user_id == new.actor_id {
            return Ok(vec![]);
        }

        let refs = [
            (NotificationType::Like, new.post_id),
            (NotificationType::Comment, new.comment_id),
            (NotificationType::FriendRequest, new.friendship_id),
        ];

        self.with_tx(|tx| {
            let mut rows = Vec::new();
            for (kind, reference) in refs {
                let Some(reference) = reference else { continue };
                let id = Uuid::new_v4().to_string();
                let (post_id, comment_id, friendship_id) = match kind {
                    NotificationType::Like => (Some(reference), None, None),
                    NotificationType::Comment => (None, Some(reference), None),
                    NotificationType::FriendRequest => (None, None, Some(reference)),
                };

                tx.execute(
                    "INSERT INTO notifications (id, user_id, actor_id, type, post_id, comment_id, friendship_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        id,
                        new.user_id,
                        new.actor_id,
                        kind.as_str(),
                        post_id,
                        comment_id,
                        friendship_id,
                    ],
                )?;

                let row = query_notification(tx, &id)?
                    .ok_or_else(|| DbError::not_found("Notification", id.as_str()))?;
                rows.push(row);
            }
            Ok(rows)
        })
    }

    /// A page of the user's notifications, newest first, plus the unread
    /// count, both read in one transaction.
    pub fn list_notifications(&self, user_id: &str, page: &PageParams) -> Result<(Vec<NotificationRow>, i64)> {
        self.with_tx(|tx| {
            let sql = format!(
                "{}
                 WHERE n.user_id = ?1
                   AND (?2 IS NULL OR (n.created_at, n.id) < (SELECT created_at, id FROM notifications WHERE id = ?2))
                 ORDER BY n.created_at DESC, n.id DESC
                 LIMIT ?3",
                NOTIFICATION_SELECT
            );
            let rows = {
                let mut stmt = tx.prepare(&sql)?;
                stmt.query_map(rusqlite::params![user_id, page.cursor, page.limit], notification_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let unread = count_unread(tx, user_id)?;
            Ok((rows, unread))
        })
    }

    /// Mark one of the user's notifications read. Rows owned by other users are not found.
    pub fn mark_notification_read(&self, user_id: &str, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            if changed == 0 {
                return Err(DbError::not_found("Notification", id));
            }
            Ok(())
        })
    }

    /// Returns the number of notifications that changed.
    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                [user_id],
            )?)
        })
    }
}

fn query_notification(conn: &Connection, id: &str) -> Result<Option<NotificationRow>> {
    let sql = format!("{} WHERE n.id = ?1", NOTIFICATION_SELECT);
    conn.query_row(&sql, [id], notification_from_row)
        .optional()
}

fn count_unread(conn: &Connection, user_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
        [user_id],
        |row| row.get(0),
    )?)
}
