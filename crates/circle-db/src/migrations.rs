use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                username      TEXT NOT NULL UNIQUE,
                email         TEXT NOT NULL UNIQUE,
                password      TEXT NOT NULL,
                display_name  TEXT,
                bio           TEXT,
                avatar_url    TEXT,
                last_seen     TEXT,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE friendships (
                id            TEXT PRIMARY KEY,
                requester_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status        TEXT NOT NULL DEFAULT 'PENDING',
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_friendships_requester ON friendships(requester_id, status);
            CREATE INDEX idx_friendships_receiver ON friendships(receiver_id, status);

            CREATE TABLE posts (
                id              TEXT PRIMARY KEY,
                author_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT,
                image_url       TEXT,
                likes_count     INTEGER NOT NULL DEFAULT 0,
                comments_count  INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_posts_author ON posts(author_id, created_at);
            CREATE INDEX idx_posts_created ON posts(created_at, id);

            CREATE TABLE likes (
                post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (post_id, user_id)
            );

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);

            CREATE TABLE notifications (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                actor_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                type           TEXT NOT NULL,
                post_id        TEXT REFERENCES posts(id) ON DELETE CASCADE,
                comment_id     TEXT REFERENCES comments(id) ON DELETE CASCADE,
                friendship_id  TEXT REFERENCES friendships(id) ON DELETE CASCADE,
                read           INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (upload ownership)");
        conn.execute_batch(
            "
            CREATE TABLE uploads (
                bucket      TEXT NOT NULL,
                path        TEXT NOT NULL,
                owner_id    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (bucket, path)
            );

            INSERT INTO schema_version (version) VALUES (2);
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn timestamps_default_to_rfc3339_millis() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (id, username, email, password) VALUES ('u1', 'ana', 'ana@x.io', 'h')",
            [],
        )
        .unwrap();

        let created_at: String = conn
            .query_row("SELECT created_at FROM users WHERE id = 'u1'", [], |r| r.get(0))
            .unwrap();
        assert!(created_at.parse::<chrono::DateTime<chrono::Utc>>().is_ok());
        assert!(created_at.ends_with('Z'));
    }
}
