use rusqlite::{Connection, Row};

use circle_types::models::FriendshipStatus;

use super::users::{USER_COLUMNS, user_from_row};
use super::{OptionalExt, PageParams, now_timestamp, parse_column};
use crate::models::{FriendLinkRow, FriendshipRow, UserRow};
use crate::{Database, DbError, Result};

const FRIENDSHIP_COLUMNS: &str = "id, requester_id, receiver_id, status, created_at";

fn friendship_from_row(row: &Row<'_>) -> rusqlite::Result<FriendshipRow> {
    Ok(FriendshipRow {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: parse_column(row, 3)?,
        created_at: row.get(4)?,
    })
}

/// `f.id, f.status, f.created_at` followed by the other party's user columns.
fn link_from_row(row: &Row<'_>) -> rusqlite::Result<FriendLinkRow> {
    Ok(FriendLinkRow {
        friendship_id: row.get(0)?,
        status: parse_column(row, 1)?,
        created_at: row.get(2)?,
        user: user_from_row(row, 3)?,
    })
}

impl Database {
    // -- Friendship state machine --

    /// Send a friend request. A rejected or unfriended row for the same pair
    /// (either direction) is reset to PENDING with the new direction and
    /// timestamp; otherwise a new PENDING row is inserted with `id`.
    /// Returns the ID of the row that now holds the request.
    ///
    /// Existing PENDING/ACCEPTED rows are not checked here; see
    /// [`Database::request_friendship`].
    pub fn send_friend_request(&self, id: &str, requester_id: &str, receiver_id: &str) -> Result<String> {
        self.with_tx(|tx| write_request(tx, id, requester_id, receiver_id))
    }

    /// Like `send_friend_request`, but refuses with `Conflict` when the pair
    /// already has a PENDING or ACCEPTED row. The check and the write share
    /// one transaction.
    pub fn request_friendship(&self, id: &str, requester_id: &str, receiver_id: &str) -> Result<String> {
        self.with_tx(|tx| {
            let live = pair_record(tx, requester_id, receiver_id)?
                .filter(|existing| !existing.status.is_terminal());
            match live.map(|existing| existing.status) {
                Some(FriendshipStatus::Accepted) => Err(DbError::Conflict("Already friends".into())),
                Some(_) => Err(DbError::Conflict("A friend request is already pending".into())),
                None => write_request(tx, id, requester_id, receiver_id),
            }
        })
    }

    /// PENDING → ACCEPTED for the request `requester_id` sent to `receiver_id`.
    pub fn accept_friend_request(&self, receiver_id: &str, requester_id: &str) -> Result<FriendshipRow> {
        self.with_conn(|conn| {
            transition_pending(conn, requester_id, receiver_id, FriendshipStatus::Accepted)
        })
    }

    /// PENDING → REJECTED for the request `requester_id` sent to `receiver_id`.
    pub fn reject_friend_request(&self, receiver_id: &str, requester_id: &str) -> Result<FriendshipRow> {
        self.with_conn(|conn| {
            transition_pending(conn, requester_id, receiver_id, FriendshipStatus::Rejected)
        })
    }

    /// The requester withdraws its own PENDING request. Stored as REJECTED so
    /// a later request reuses the row.
    pub fn cancel_friend_request(&self, requester_id: &str, receiver_id: &str) -> Result<FriendshipRow> {
        self.with_conn(|conn| {
            transition_pending(conn, requester_id, receiver_id, FriendshipStatus::Rejected)
        })
    }

    /// ACCEPTED → UNFRIENDED, whichever side originally sent the request.
    pub fn remove_friend(&self, user_a: &str, user_b: &str) -> Result<FriendshipRow> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE friendships SET status = ?3
                 WHERE id = (
                     SELECT id FROM friendships
                     WHERE ((requester_id = ?1 AND receiver_id = ?2)
                         OR (requester_id = ?2 AND receiver_id = ?1))
                       AND status = ?4
                     LIMIT 1
                 )
                 RETURNING {}",
                FRIENDSHIP_COLUMNS
            );
            conn.query_row(
                &sql,
                rusqlite::params![
                    user_a,
                    user_b,
                    FriendshipStatus::Unfriended.as_str(),
                    FriendshipStatus::Accepted.as_str(),
                ],
                friendship_from_row,
            )
            .optional()?
            .ok_or_else(|| DbError::not_found("Friendship", format!("{}/{}", user_a, user_b)))
        })
    }

    /// The record for the unordered pair, preferring ACCEPTED over PENDING
    /// over terminal rows.
    pub fn friendship_between(&self, user_a: &str, user_b: &str) -> Result<Option<FriendshipRow>> {
        self.with_conn(|conn| pair_record(conn, user_a, user_b))
    }

    // -- Counts --

    pub fn count_friends(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM friendships
                 WHERE status = 'ACCEPTED' AND (requester_id = ?1 OR receiver_id = ?1)",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn count_received_requests(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM friendships WHERE status = 'PENDING' AND receiver_id = ?1",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn count_sent_requests(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM friendships WHERE status = 'PENDING' AND requester_id = ?1",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    // -- Lists --

    /// ACCEPTED friendships of `user_id`, joined with the other party.
    pub fn list_friends(&self, user_id: &str, page: &PageParams) -> Result<Vec<FriendLinkRow>> {
        self.with_conn(|conn| {
            query_links(
                conn,
                "f.status = 'ACCEPTED' AND (f.requester_id = ?1 OR f.receiver_id = ?1)",
                "CASE WHEN f.requester_id = ?1 THEN f.receiver_id ELSE f.requester_id END",
                user_id,
                page,
            )
        })
    }

    /// PENDING requests addressed to `user_id`, joined with the requester.
    pub fn list_received_requests(&self, user_id: &str, page: &PageParams) -> Result<Vec<FriendLinkRow>> {
        self.with_conn(|conn| {
            query_links(
                conn,
                "f.status = 'PENDING' AND f.receiver_id = ?1",
                "f.requester_id",
                user_id,
                page,
            )
        })
    }

    /// PENDING requests sent by `user_id`, joined with the receiver.
    pub fn list_sent_requests(&self, user_id: &str, page: &PageParams) -> Result<Vec<FriendLinkRow>> {
        self.with_conn(|conn| {
            query_links(
                conn,
                "f.status = 'PENDING' AND f.requester_id = ?1",
                "f.receiver_id",
                user_id,
                page,
            )
        })
    }

    /// Users with no PENDING or ACCEPTED friendship with `user_id`, newest accounts first.
    pub fn list_suggestions(&self, user_id: &str, page: &PageParams) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users u
                 WHERE u.id != ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM friendships f
                       WHERE f.status IN ('PENDING', 'ACCEPTED')
                         AND ((f.requester_id = ?1 AND f.receiver_id = u.id)
                           OR (f.requester_id = u.id AND f.receiver_id = ?1))
                   )
                   AND (?2 IS NULL OR (u.created_at, u.id) < (SELECT created_at, id FROM users WHERE id = ?2))
                 ORDER BY u.created_at DESC, u.id DESC
                 LIMIT ?3",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, page.cursor, page.limit],
                    |row| user_from_row(row, 0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Reset a terminal row for the pair to PENDING, or insert a new one.
fn write_request(conn: &Connection, id: &str, requester_id: &str, receiver_id: &str) -> Result<String> {
    let terminal: Option<String> = conn
        .query_row(
            "SELECT id FROM friendships
             WHERE ((requester_id = ?1 AND receiver_id = ?2)
                 OR (requester_id = ?2 AND receiver_id = ?1))
               AND status IN ('REJECTED', 'UNFRIENDED')
             ORDER BY created_at DESC
             LIMIT 1",
            (requester_id, receiver_id),
            |row| row.get(0),
        )
        .optional()?;

    match terminal {
        Some(existing_id) => {
            conn.execute(
                "UPDATE friendships
                 SET requester_id = ?2, receiver_id = ?3, status = ?4, created_at = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    existing_id,
                    requester_id,
                    receiver_id,
                    FriendshipStatus::Pending.as_str(),
                    now_timestamp(),
                ],
            )?;
            Ok(existing_id)
        }
        None => {
            conn.execute(
                "INSERT INTO friendships (id, requester_id, receiver_id, status) VALUES (?1, ?2, ?3, ?4)",
                (id, requester_id, receiver_id, FriendshipStatus::Pending.as_str()),
            )?;
            Ok(id.to_string())
        }
    }
}

/// The record for the unordered pair, preferring ACCEPTED over PENDING
/// over terminal rows.
fn pair_record(conn: &Connection, user_a: &str, user_b: &str) -> Result<Option<FriendshipRow>> {
    let sql = format!(
        "SELECT {} FROM friendships
         WHERE (requester_id = ?1 AND receiver_id = ?2)
            OR (requester_id = ?2 AND receiver_id = ?1)
         ORDER BY CASE status
             WHEN 'ACCEPTED' THEN 0
             WHEN 'PENDING' THEN 1
             ELSE 2
         END, created_at DESC
         LIMIT 1",
        FRIENDSHIP_COLUMNS
    );
    conn.query_row(&sql, (user_a, user_b), friendship_from_row)
        .optional()
}

/// Move the exact-direction PENDING row to `next`.
fn transition_pending(
    conn: &Connection,
    requester_id: &str,
    receiver_id: &str,
    next: FriendshipStatus,
) -> Result<FriendshipRow> {
    let sql = format!(
        "UPDATE friendships SET status = ?3
         WHERE id = (
             SELECT id FROM friendships
             WHERE requester_id = ?1 AND receiver_id = ?2 AND status = ?4
             LIMIT 1
         )
         RETURNING {}",
        FRIENDSHIP_COLUMNS
    );
    conn.query_row(
        &sql,
        rusqlite::params![
            requester_id,
            receiver_id,
            next.as_str(),
            FriendshipStatus::Pending.as_str(),
        ],
        friendship_from_row,
    )
    .optional()?
    .ok_or_else(|| {
        DbError::not_found("Friend request", format!("{}->{}", requester_id, receiver_id))
    })
}

/// Shared paged query for friend and request lists. `filter` may reference
/// `?1` (the viewing user); `other_party` selects the user to join.
fn query_links(
    conn: &Connection,
    filter: &str,
    other_party: &str,
    user_id: &str,
    page: &PageParams,
) -> Result<Vec<FriendLinkRow>> {
    let sql = format!(
        "SELECT f.id, f.status, f.created_at, {}
         FROM friendships f
         JOIN users u ON u.id = {}
         WHERE {}
           AND (?2 IS NULL OR (f.created_at, f.id) < (SELECT created_at, id FROM friendships WHERE id = ?2))
         ORDER BY f.created_at DESC, f.id DESC
         LIMIT ?3",
        USER_COLUMNS, other_party, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![user_id, page.cursor, page.limit], link_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
