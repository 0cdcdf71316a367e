use rusqlite::{Connection, Row};

use super::{OptionalExt, PageParams, now_timestamp};
use crate::models::{CommentRow, PostRow};
use crate::{Database, DbError, Result};

/// `?1` is always the viewing user, used for `liked_by_viewer`.
const POST_SELECT: &str = "SELECT p.id, p.author_id, u.username, p.content, p.image_url,
        p.likes_count, p.comments_count,
        EXISTS(SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1),
        p.created_at, p.updated_at
     FROM posts p
     JOIN users u ON u.id = p.author_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, u.username, c.content, c.created_at
     FROM comments c
     JOIN users u ON u.id = c.author_id";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_username: row.get(2)?,
        content: row.get(3)?,
        image_url: row.get(4)?,
        likes_count: row.get(5)?,
        comments_count: row.get(6)?,
        liked_by_viewer: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Database {
    // -- Posts --

    pub fn create_post(
        &self,
        id: &str,
        author_id: &str,
        content: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<PostRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_id, content, image_url) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, author_id, content, image_url],
            )?;
            query_post(conn, id, author_id)?.ok_or_else(|| DbError::not_found("Post", id))
        })
    }

    pub fn get_post(&self, id: &str, viewer_id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, id, viewer_id))
    }

    /// Update content and/or image. `None` leaves the stored value unchanged.
    pub fn update_post(
        &self,
        id: &str,
        viewer_id: &str,
        content: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<PostRow> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET
                    content = COALESCE(?2, content),
                    image_url = COALESCE(?3, image_url),
                    updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![id, content, image_url, now_timestamp()],
            )?;
            if changed == 0 {
                return Err(DbError::not_found("Post", id));
            }
            query_post(conn, id, viewer_id)?.ok_or_else(|| DbError::not_found("Post", id))
        })
    }

    pub fn delete_post(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(DbError::not_found("Post", id));
            }
            Ok(())
        })
    }

    /// Posts by the viewer and by the viewer's accepted friends, newest first.
    pub fn list_feed(&self, viewer_id: &str, page: &PageParams) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 WHERE (p.author_id = ?1 OR p.author_id IN (
                     SELECT CASE WHEN f.requester_id = ?1 THEN f.receiver_id ELSE f.requester_id END
                     FROM friendships f
                     WHERE f.status = 'ACCEPTED' AND (f.requester_id = ?1 OR f.receiver_id = ?1)
                 ))
                   AND (?2 IS NULL OR (p.created_at, p.id) < (SELECT created_at, id FROM posts WHERE id = ?2))
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?3",
                POST_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![viewer_id, page.cursor, page.limit], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Posts written by `author_id`, newest first.
    pub fn list_user_posts(&self, author_id: &str, viewer_id: &str, page: &PageParams) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 WHERE p.author_id = ?4
                   AND (?2 IS NULL OR (p.created_at, p.id) < (SELECT created_at, id FROM posts WHERE id = ?2))
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?3",
                POST_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![viewer_id, page.cursor, page.limit, author_id],
                    post_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Likes --

    /// Insert the like and bump `likes_count` in one transaction.
    /// Returns the new count. Liking twice fails with the UNIQUE violation.
    pub fn like_post(&self, post_id: &str, user_id: &str) -> Result<i64> {
        self.with_tx(|tx| {
            let count: i64 = tx
                .query_row(
                    "UPDATE posts SET likes_count = likes_count + 1 WHERE id = ?1 RETURNING likes_count",
                    [post_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| DbError::not_found("Post", post_id))?;

            tx.execute(
                "INSERT INTO likes (post_id, user_id) VALUES (?1, ?2)",
                (post_id, user_id),
            )?;
            Ok(count)
        })
    }

    /// Delete the like and drop `likes_count` in one transaction.
    /// Returns the new count.
    pub fn unlike_post(&self, post_id: &str, user_id: &str) -> Result<i64> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
                (post_id, user_id),
            )?;
            if removed == 0 {
                return Err(DbError::not_found("Like", format!("{}/{}", post_id, user_id)));
            }

            let count: i64 = tx.query_row(
                "UPDATE posts SET likes_count = likes_count - 1 WHERE id = ?1 RETURNING likes_count",
                [post_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Comments --

    /// Insert a comment and bump `comments_count` in one transaction.
    pub fn create_comment(&self, id: &str, post_id: &str, author_id: &str, content: &str) -> Result<CommentRow> {
        self.with_tx(|tx| {
            let bumped = tx.execute(
                "UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?1",
                [post_id],
            )?;
            if bumped == 0 {
                return Err(DbError::not_found("Post", post_id));
            }

            tx.execute(
                "INSERT INTO comments (id, post_id, author_id, content) VALUES (?1, ?2, ?3, ?4)",
                (id, post_id, author_id, content),
            )?;
            query_comment(tx, id)?.ok_or_else(|| DbError::not_found("Comment", id))
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    /// Delete a comment and drop its post's `comments_count` in one transaction.
    pub fn delete_comment(&self, id: &str) -> Result<()> {
        self.with_tx(|tx| {
            let post_id: String = tx
                .query_row(
                    "DELETE FROM comments WHERE id = ?1 RETURNING post_id",
                    [id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| DbError::not_found("Comment", id))?;

            tx.execute(
                "UPDATE posts SET comments_count = comments_count - 1 WHERE id = ?1",
                [&post_id],
            )?;
            Ok(())
        })
    }

    /// Comments on a post, newest first.
    pub fn list_comments(&self, post_id: &str, page: &PageParams) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 WHERE c.post_id = ?1
                   AND (?2 IS NULL OR (c.created_at, c.id) < (SELECT created_at, id FROM comments WHERE id = ?2))
                 ORDER BY c.created_at DESC, c.id DESC
                 LIMIT ?3",
                COMMENT_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![post_id, page.cursor, page.limit], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_post(conn: &Connection, id: &str, viewer_id: &str) -> Result<Option<PostRow>> {
    let sql = format!("{} WHERE p.id = ?2", POST_SELECT);
    conn.query_row(&sql, (viewer_id, id), post_from_row)
        .optional()
}

fn query_comment(conn: &Connection, id: &str) -> Result<Option<CommentRow>> {
    let sql = format!("{} WHERE c.id = ?1", COMMENT_SELECT);
    conn.query_row(&sql, [id], comment_from_row)
        .optional()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::queries::PageParams;
    use crate::queries::test_support::{db_with_users, new_id};
    use crate::{Database, DbError};

    fn like_rows(db: &Database, post_id: &str) -> Vec<String> {
        db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM likes WHERE post_id = ?1 ORDER BY user_id")?;
            let rows = stmt
                .query_map([post_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap()
    }

    #[test]
    fn like_then_unlike_restores_counter_and_rows() {
        let (db, ids) = db_with_users(&["ana", "bea", "cid"]);
        let post_id = new_id();
        db.create_post(&post_id, &ids[0], Some("hello"), None).unwrap();
        db.like_post(&post_id, &ids[2]).unwrap();

        let before_count = db.get_post(&post_id, &ids[1]).unwrap().unwrap().likes_count;
        let before_rows = like_rows(&db, &post_id);

        assert_eq!(db.like_post(&post_id, &ids[1]).unwrap(), before_count + 1);
        assert!(db.get_post(&post_id, &ids[1]).unwrap().unwrap().liked_by_viewer);
        assert_eq!(db.unlike_post(&post_id, &ids[1]).unwrap(), before_count);

        let after = db.get_post(&post_id, &ids[1]).unwrap().unwrap();
        assert_eq!(after.likes_count, before_count);
        assert!(!after.liked_by_viewer);
        assert_eq!(like_rows(&db, &post_id), before_rows);
    }

    #[test]
    fn double_like_is_a_constraint_error_and_rolls_back() {
        let (db, ids) = db_with_users(&["ana", "bea"]);
        let post_id = new_id();
        db.create_post(&post_id, &ids[0], Some("hello"), None).unwrap();
        db.like_post(&post_id, &ids[1]).unwrap();

        let err = db.like_post(&post_id, &ids[1]).unwrap_err();
        assert!(err.is_unique_violation());

        let post = db.get_post(&post_id, &ids[1]).unwrap().unwrap();
        assert_eq!(post.likes_count, 1);
        assert!(post.liked_by_viewer);
    }

    #[test]
    fn unlike_without_like_is_not_found() {
        let (db, ids) = db_with_users(&["ana"]);
        let post_id = new_id();
        db.create_post(&post_id, &ids[0], Some("hello"), None).unwrap();

        assert!(matches!(
            db.unlike_post(&post_id, &ids[0]),
            Err(DbError::NotFound { entity: "Like", .. })
        ));
        assert_eq!(db.get_post(&post_id, &ids[0]).unwrap().unwrap().likes_count, 0);
    }

    #[test]
    fn like_missing_post_is_not_found() {
        let (db, ids) = db_with_users(&["ana"]);
        assert!(matches!(
            db.like_post("missing", &ids[0]),
            Err(DbError::NotFound { entity: "Post", .. })
        ));
    }

    #[test]
    fn comments_keep_counter_in_sync() {
        let (db, ids) = db_with_users(&["ana", "bea"]);
        let post_id = new_id();
        db.create_post(&post_id, &ids[0], Some("hello"), None).unwrap();

        let comment = db.create_comment(&new_id(), &post_id, &ids[1], "nice").unwrap();
        assert_eq!(comment.author_username, "bea");
        assert_eq!(db.get_post(&post_id, &ids[0]).unwrap().unwrap().comments_count, 1);

        db.delete_comment(&comment.id).unwrap();
        assert_eq!(db.get_post(&post_id, &ids[0]).unwrap().unwrap().comments_count, 0);
        assert!(db.get_comment(&comment.id).unwrap().is_none());
    }

    #[test]
    fn update_post_keeps_absent_fields() {
        let (db, ids) = db_with_users(&["ana"]);
        let post_id = new_id();
        db.create_post(&post_id, &ids[0], Some("first"), Some("http://img/1.png")).unwrap();

        let post = db.update_post(&post_id, &ids[0], Some("second"), None).unwrap();
        assert_eq!(post.content.as_deref(), Some("second"));
        assert_eq!(post.image_url.as_deref(), Some("http://img/1.png"));
    }

    #[test]
    fn feed_includes_friends_only() {
        let (db, ids) = db_with_users(&["ana", "bea", "cid"]);
        let (a, b, c) = (&ids[0], &ids[1], &ids[2]);
        db.send_friend_request(&new_id(), a, b).unwrap();
        db.accept_friend_request(b, a).unwrap();

        db.create_post(&new_id(), a, Some("mine"), None).unwrap();
        db.create_post(&new_id(), b, Some("friend"), None).unwrap();
        db.create_post(&new_id(), c, Some("stranger"), None).unwrap();

        let feed: HashSet<String> = db
            .list_feed(a, &PageParams::default())
            .unwrap()
            .into_iter()
            .filter_map(|p| p.content)
            .collect();
        assert_eq!(feed, HashSet::from(["mine".to_string(), "friend".to_string()]));
    }

    #[test]
    fn post_pages_do_not_overlap() {
        let (db, ids) = db_with_users(&["ana"]);
        for i in 0..9 {
            db.create_post(&new_id(), &ids[0], Some(format!("post {}", i).as_str()), None).unwrap();
        }

        let first = db.list_user_posts(&ids[0], &ids[0], &PageParams::first(5)).unwrap();
        assert_eq!(first.len(), 5);
        let cursor = first.last().unwrap().id.clone();
        let second = db
            .list_user_posts(&ids[0], &ids[0], &PageParams::after(5, &cursor))
            .unwrap();
        assert_eq!(second.len(), 4);

        let first_ids: HashSet<_> = first.iter().map(|p| p.id.clone()).collect();
        assert!(second.iter().all(|p| !first_ids.contains(&p.id)));
        assert!(!second.iter().any(|p| p.id == cursor));
    }

    #[test]
    fn unknown_cursor_yields_empty_page() {
        let (db, ids) = db_with_users(&["ana"]);
        db.create_post(&new_id(), &ids[0], Some("x"), None).unwrap();

        let page = db.list_feed(&ids[0], &PageParams::after(5, "no-such-id")).unwrap();
        assert!(page.is_empty());
    }
}
