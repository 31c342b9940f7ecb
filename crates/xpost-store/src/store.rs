use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use xpost_core::{
    ApprovalCounts, ApprovalKind, ExternalRefs, NewPost, PostId, PostImage, SavedImage,
    ScheduledPost,
};

use crate::db::{format_ts, init_db, parse_ts};
use crate::error::{Result, StoreError};

const POST_COLUMNS: &str = "id, content, scheduled_time, created_at, posted_at, is_posted,
                            has_images, discord_message_id, guild_id, channel_id";

/// Durable store for scheduled posts, their images and approval votes.
///
/// Cloning is cheap and shares the same connection. Components that run
/// concurrently (the scheduler and the chat UI) should each open their own
/// store on the same database file; SQLite serialises the writes.
#[derive(Clone)]
pub struct PostStore {
    conn: Arc<Mutex<Connection>>,
}

impl PostStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open (or create) the database file at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // --- posts --------------------------------------------------------------

    /// Insert a new unpublished post. Does not check `scheduled_time` against now.
    pub fn create_post(&self, post: &NewPost) -> Result<PostId> {
        let conn = self.lock()?;
        let id = insert_post(&conn, post)?;
        info!(post_id = id, scheduled_time = %post.scheduled_time, has_images = post.has_images, "post created");
        Ok(id)
    }

    /// Insert a post and its image rows in one transaction.
    ///
    /// `has_images` is derived from `images` and overrides the input flag.
    pub fn create_post_with_images(&self, post: &NewPost, images: &[SavedImage]) -> Result<PostId> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let post = NewPost {
            has_images: !images.is_empty(),
            ..post.clone()
        };
        let id = insert_post(&tx, &post)?;
        for img in images {
            insert_image(&tx, id, &img.file_path, &img.original_filename, img.file_size)?;
        }
        tx.commit()?;
        info!(post_id = id, images = images.len(), "post created with images");
        Ok(id)
    }

    pub fn add_image(
        &self,
        post_id: PostId,
        file_path: &str,
        original_filename: &str,
        file_size: u64,
    ) -> Result<i64> {
        let conn = self.lock()?;
        let id = insert_image(&conn, post_id, file_path, original_filename, file_size)?;
        // Keep the flag in step with the rows.
        conn.execute(
            "UPDATE scheduled_posts SET has_images = 1 WHERE id = ?1",
            [post_id],
        )?;
        debug!(post_id, image_id = id, file_path, file_size, "image added");
        Ok(id)
    }

    pub fn get_post(&self, id: PostId) -> Result<Option<ScheduledPost>> {
        let conn = self.lock()?;
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM scheduled_posts WHERE id = ?1"),
                [id],
                row_to_post,
            )
            .optional()?;
        Ok(post)
    }

    /// Find the post whose confirmation message is `message_id`.
    pub fn get_post_by_message_id(&self, message_id: &str) -> Result<Option<ScheduledPost>> {
        let conn = self.lock()?;
        let post = conn
            .query_row(
                &format!(
                    "SELECT {POST_COLUMNS} FROM scheduled_posts
                     WHERE discord_message_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                [message_id],
                row_to_post,
            )
            .optional()?;
        Ok(post)
    }

    /// Attach the chat message id once the confirmation message exists.
    pub fn set_message_ref(&self, post_id: PostId, message_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE scheduled_posts SET discord_message_id = ?1 WHERE id = ?2",
            params![message_id, post_id],
        )?;
        if n == 0 {
            return Err(StoreError::PostNotFound { id: post_id });
        }
        Ok(())
    }

    /// Every unpublished post with `scheduled_time <= now`,
    /// ordered by scheduled time then id.
    pub fn get_pending_posts(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledPost>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {POST_COLUMNS} FROM scheduled_posts
             WHERE is_posted = 0 AND scheduled_time <= ?1
             ORDER BY scheduled_time, id"
        ))?;
        let posts = stmt
            .query_map([format_ts(now)], row_to_post)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    pub fn count_pending(&self, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM scheduled_posts WHERE is_posted = 0 AND scheduled_time <= ?1",
            [format_ts(now)],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Flip `is_posted` and set `posted_at` in one statement.
    ///
    /// Returns `true` when this call performed the transition and `false`
    /// when the post was already published (the original `posted_at` is kept).
    pub fn mark_posted(&self, post_id: PostId, posted_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE scheduled_posts SET is_posted = 1, posted_at = ?1
             WHERE id = ?2 AND is_posted = 0",
            params![format_ts(posted_at), post_id],
        )?;
        if n == 1 {
            info!(post_id, "post marked posted");
            return Ok(true);
        }
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM scheduled_posts WHERE id = ?1)",
            [post_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::PostNotFound { id: post_id });
        }
        debug!(post_id, "mark_posted: already posted, no-op");
        Ok(false)
    }

    pub fn get_images(&self, post_id: PostId) -> Result<Vec<PostImage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, post_id, file_path, original_filename, file_size
             FROM post_images WHERE post_id = ?1 ORDER BY id",
        )?;
        let images = stmt
            .query_map([post_id], |row| {
                Ok(PostImage {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    file_path: row.get(2)?,
                    original_filename: row.get(3)?,
                    file_size: u64::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    // --- approvals ----------------------------------------------------------

    /// Record `user_id`'s vote, replacing any earlier vote on the same post.
    pub fn upsert_approval(&self, post_id: PostId, user_id: &str, kind: ApprovalKind) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO post_approvals (post_id, user_id, approval_type, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (post_id, user_id)
             DO UPDATE SET approval_type = excluded.approval_type,
                           created_at    = excluded.created_at",
            params![post_id, user_id, kind.to_string(), format_ts(Utc::now())],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::PostNotFound { id: post_id }
            }
            other => StoreError::Database(other),
        })?;
        debug!(post_id, user_id, %kind, "approval recorded");
        Ok(())
    }

    /// Withdraw a vote. Returns `false` if the user had not voted.
    pub fn remove_approval(&self, post_id: PostId, user_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM post_approvals WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
        )?;
        Ok(n > 0)
    }

    pub fn get_approval_counts(&self, post_id: PostId) -> Result<ApprovalCounts> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT approval_type, COUNT(*) FROM post_approvals
             WHERE post_id = ?1 GROUP BY approval_type",
        )?;
        let rows = stmt
            .query_map([post_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = ApprovalCounts::default();
        for (kind, n) in rows {
            let n = u32::try_from(n).unwrap_or(u32::MAX);
            match kind.parse::<ApprovalKind>() {
                Ok(ApprovalKind::Good) => counts.good = n,
                Ok(ApprovalKind::Bad) => counts.bad = n,
                Err(e) => return Err(StoreError::Corrupt(e)),
            }
        }
        Ok(counts)
    }
}

fn insert_post(conn: &Connection, post: &NewPost) -> Result<PostId> {
    conn.execute(
        "INSERT INTO scheduled_posts
         (content, scheduled_time, created_at, posted_at, is_posted, has_images,
          discord_message_id, guild_id, channel_id)
         VALUES (?1, ?2, ?3, NULL, 0, ?4, ?5, ?6, ?7)",
        params![
            post.content,
            format_ts(post.scheduled_time),
            format_ts(Utc::now()),
            post.has_images,
            post.refs.discord_message_id,
            post.refs.guild_id,
            post.refs.channel_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_image(
    conn: &Connection,
    post_id: PostId,
    file_path: &str,
    original_filename: &str,
    file_size: u64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO post_images (post_id, file_path, original_filename, file_size, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            post_id,
            file_path,
            original_filename,
            i64::try_from(file_size).unwrap_or(i64::MAX),
            format_ts(Utc::now()),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::PostNotFound { id: post_id }
        }
        other => StoreError::Database(other),
    })?;
    Ok(conn.last_insert_rowid())
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<ScheduledPost> {
    let posted_at = match row.get::<_, Option<String>>(4)? {
        Some(_) => Some(ts_column(row, 4)?),
        None => None,
    };
    Ok(ScheduledPost {
        id: row.get(0)?,
        content: row.get(1)?,
        scheduled_time: ts_column(row, 2)?,
        created_at: ts_column(row, 3)?,
        posted_at,
        is_posted: row.get(5)?,
        has_images: row.get(6)?,
        refs: ExternalRefs {
            discord_message_id: row.get(7)?,
            guild_id: row.get(8)?,
            channel_id: row.get(9)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn new_post(content: &str, at: DateTime<Utc>) -> NewPost {
        NewPost {
            content: content.to_string(),
            scheduled_time: at,
            refs: ExternalRefs {
                discord_message_id: Some("m-1".into()),
                guild_id: Some("g-1".into()),
                channel_id: Some("c-1".into()),
            },
            has_images: false,
        }
    }

    #[test]
    fn ids_are_monotonic() {
        let store = PostStore::open_in_memory().unwrap();
        let a = store.create_post(&new_post("a", t0())).unwrap();
        let b = store.create_post(&new_post("b", t0())).unwrap();
        assert!(b > a);
    }

    #[test]
    fn pending_respects_time_and_posted_flag() {
        let store = PostStore::open_in_memory().unwrap();
        let past = store
            .create_post(&new_post("past", t0() - Duration::minutes(5)))
            .unwrap();
        let exact = store.create_post(&new_post("exact", t0())).unwrap();
        let future = store
            .create_post(&new_post("future", t0() + Duration::seconds(1)))
            .unwrap();
        let done = store
            .create_post(&new_post("done", t0() - Duration::days(1)))
            .unwrap();
        store.mark_posted(done, t0()).unwrap();

        let ids: Vec<PostId> = store
            .get_pending_posts(t0())
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![past, exact]);
        assert!(!ids.contains(&future));
        assert_eq!(store.count_pending(t0()).unwrap(), 2);
    }

    #[test]
    fn schedule_then_query_round_trip() {
        let store = PostStore::open_in_memory().unwrap();
        store.create_post(&new_post("Hello", t0())).unwrap();

        assert!(store
            .get_pending_posts(t0() - Duration::seconds(1))
            .unwrap()
            .is_empty());

        let due = store.get_pending_posts(t0()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].content, "Hello");
        assert_eq!(due[0].scheduled_time, t0());
        assert_eq!(due[0].refs.guild_id.as_deref(), Some("g-1"));
        assert!(!due[0].is_posted);
        assert!(due[0].posted_at.is_none());
    }

    #[test]
    fn mark_posted_is_idempotent_and_keeps_first_timestamp() {
        let store = PostStore::open_in_memory().unwrap();
        let id = store.create_post(&new_post("x", t0())).unwrap();
        let first = t0() + Duration::seconds(3);
        let second = t0() + Duration::seconds(60);

        assert!(store.mark_posted(id, first).unwrap());
        assert!(!store.mark_posted(id, second).unwrap());

        let post = store.get_post(id).unwrap().unwrap();
        assert!(post.is_posted);
        assert_eq!(post.posted_at, Some(first));
        assert!(store.get_pending_posts(t0() + Duration::days(365)).unwrap().is_empty());
    }

    #[test]
    fn mark_posted_unknown_post_is_an_error() {
        let store = PostStore::open_in_memory().unwrap();
        assert!(matches!(
            store.mark_posted(99, t0()),
            Err(StoreError::PostNotFound { id: 99 })
        ));
    }

    #[test]
    fn images_are_returned_in_insertion_order() {
        let store = PostStore::open_in_memory().unwrap();
        let id = store.create_post(&new_post("pics", t0())).unwrap();
        store.add_image(id, "/tmp/a.png", "a.png", 10).unwrap();
        store.add_image(id, "/tmp/b.jpg", "b.jpg", 20).unwrap();

        let images = store.get_images(id).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].file_path, "/tmp/a.png");
        assert_eq!(images[1].original_filename, "b.jpg");
        assert_eq!(images[1].file_size, 20);
        assert!(store.get_post(id).unwrap().unwrap().has_images);
    }

    #[test]
    fn image_for_unknown_post_is_rejected() {
        let store = PostStore::open_in_memory().unwrap();
        assert!(matches!(
            store.add_image(404, "/tmp/x.png", "x.png", 1),
            Err(StoreError::PostNotFound { id: 404 })
        ));
    }

    #[test]
    fn create_with_images_sets_flag_from_rows() {
        let store = PostStore::open_in_memory().unwrap();
        let images = vec![SavedImage {
            file_path: "/tmp/1.webp".into(),
            original_filename: "1.webp".into(),
            file_size: 5,
        }];
        let id = store
            .create_post_with_images(&new_post("with", t0()), &images)
            .unwrap();
        assert!(store.get_post(id).unwrap().unwrap().has_images);
        assert_eq!(store.get_images(id).unwrap().len(), 1);

        let bare = store.create_post_with_images(&new_post("bare", t0()), &[]).unwrap();
        assert!(!store.get_post(bare).unwrap().unwrap().has_images);
    }

    #[test]
    fn second_vote_replaces_first() {
        let store = PostStore::open_in_memory().unwrap();
        let id = store.create_post(&new_post("vote", t0())).unwrap();

        store.upsert_approval(id, "alice", ApprovalKind::Good).unwrap();
        store.upsert_approval(id, "alice", ApprovalKind::Bad).unwrap();
        assert_eq!(
            store.get_approval_counts(id).unwrap(),
            ApprovalCounts { good: 0, bad: 1 }
        );

        store.upsert_approval(id, "bob", ApprovalKind::Good).unwrap();
        store.upsert_approval(id, "bob", ApprovalKind::Good).unwrap();
        assert_eq!(
            store.get_approval_counts(id).unwrap(),
            ApprovalCounts { good: 1, bad: 1 }
        );
    }

    #[test]
    fn counts_default_to_zero_and_removal_works() {
        let store = PostStore::open_in_memory().unwrap();
        let id = store.create_post(&new_post("v", t0())).unwrap();
        assert_eq!(store.get_approval_counts(id).unwrap(), ApprovalCounts::default());

        store.upsert_approval(id, "carol", ApprovalKind::Good).unwrap();
        assert!(store.remove_approval(id, "carol").unwrap());
        assert!(!store.remove_approval(id, "carol").unwrap());
        assert_eq!(store.get_approval_counts(id).unwrap().good, 0);
    }

    #[test]
    fn lookup_by_message_id() {
        let store = PostStore::open_in_memory().unwrap();
        let mut post = new_post("lookup", t0());
        post.refs.discord_message_id = None;
        let id = store.create_post(&post).unwrap();
        assert!(store.get_post_by_message_id("msg-9").unwrap().is_none());

        store.set_message_ref(id, "msg-9").unwrap();
        let found = store.get_post_by_message_id("msg-9").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(matches!(
            store.set_message_ref(12345, "msg-x"),
            Err(StoreError::PostNotFound { .. })
        ));
    }

    #[test]
    fn separate_connections_share_a_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.db");
        let ui = PostStore::open(&path).unwrap();
        let scheduler = PostStore::open(&path).unwrap();

        let id = ui.create_post(&new_post("shared", t0())).unwrap();
        let due = scheduler.get_pending_posts(t0()).unwrap();
        assert_eq!(due.len(), 1);
        assert!(scheduler.mark_posted(id, t0()).unwrap());
        assert!(ui.get_post(id).unwrap().unwrap().is_posted);
    }
}
