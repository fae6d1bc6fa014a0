// src/database/mod.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A display receiver as recorded by the admin interface
#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    pub id: i64,
    /// Unique name, matched against discovered receiver names
    pub name: String,
    /// Physical address, uppercase colon-separated hex
    pub device_id: Option<String>,
    pub password: Option<String>,
    pub slideshow_id: Option<i64>,
}

/// An ordered list of slides; order is playback order
#[derive(Clone, Debug, PartialEq)]
pub struct Slideshow {
    pub id: i64,
    pub name: String,
    pub slides: Vec<Slide>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Slide {
    pub id: i64,
    pub name: String,
    pub media_kind: MediaKind,
    pub url: String,
    pub transition: Transition,
    /// Stored display time. Only image, feed and URL slides use it.
    pub display_time: Option<Duration>,
}

impl Slide {
    /// Display time for fixed-duration slides, falling back to `default` when unset
    pub fn display_time_or(&self, default: Duration) -> Duration {
        self.display_time.unwrap_or(default)
    }
}

/// Media kind of a slide; decides how it is fetched, transmitted and timed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Feed,
    Url,
}

impl MediaKind {
    /// Anything that is not a known kind is rendered as a web page.
    pub fn from_db(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            "image" => MediaKind::Image,
            "feed" => MediaKind::Feed,
            _ => MediaKind::Url,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Feed => "feed",
            MediaKind::Url => "url",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image transition understood by receivers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transition {
    #[default]
    None,
    Dissolve,
    SlideLeft,
    SlideRight,
}

impl Transition {
    /// Accepts `dissolve`, `slide_left`, `SlideLeft`, `slide-left`... Unknown values fall back to `None`.
    pub fn from_db(value: &str) -> Self {
        let normalized: String = value
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "dissolve" => Transition::Dissolve,
            "slideleft" => Transition::SlideLeft,
            "slideright" => Transition::SlideRight,
            _ => Transition::None,
        }
    }

    /// Header value sent to the receiver
    pub fn as_header_value(&self) -> &'static str {
        match self {
            Transition::None => "None",
            Transition::Dissolve => "Dissolve",
            Transition::SlideLeft => "SlideLeft",
            Transition::SlideRight => "SlideRight",
        }
    }
}

/// Uppercase a physical address and use colons between byte pairs.
pub fn normalize_device_id(raw: &str) -> String {
    raw.trim().replace('-', ":").to_ascii_uppercase()
}

impl Device {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let device_id: Option<String> = row.try_get("deviceid")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            device_id: device_id.as_deref().map(normalize_device_id),
            password: row.try_get("password")?,
            slideshow_id: row.try_get("slideshow_id")?,
        })
    }
}

impl Slide {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let media_type: Option<String> = row.try_get("media_type")?;
        let transition: Option<String> = row.try_get("transition")?;
        let display_time: Option<i64> = row.try_get("display_time")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            media_kind: MediaKind::from_db(media_type.as_deref().unwrap_or_default()),
            url: row.try_get("url")?,
            transition: Transition::from_db(transition.as_deref().unwrap_or_default()),
            // Only NULL means unset; negative values clamp to zero
            display_time: display_time.map(|secs| Duration::from_secs(secs.max(0) as u64)),
        })
    }
}

/// Read-only view of the slideshow database.
///
/// Implementations must return fresh data on every call. Device workers rely
/// on this to pick up reassignment and slide edits between passes, so no
/// caching is allowed behind this trait.
#[async_trait]
pub trait SlideshowStore: Send + Sync {
    /// Look up a device by its unique name
    async fn find_device_by_name(&self, name: &str) -> Result<Option<Device>>;

    /// Re-read a device; `None` if it was deleted
    async fn reload_device(&self, device: &Device) -> Result<Option<Device>>;

    /// Resolve the device's current slideshow with its slides in playback order
    async fn slideshow_for(&self, device: &Device) -> Result<Option<Slideshow>>;
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite implementation of SlideshowStore
pub struct SqliteStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open an existing slideshow database for reading.
    ///
    /// The admin interface owns the file. A missing file is an error and the
    /// connection never writes, so the journal mode and schema stay as found.
    pub async fn open_read_only(db_path: PathBuf) -> Result<Self> {
        if !db_path.is_file() {
            bail!("Slideshow database {} does not exist", db_path.display());
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open {} read-only", db_path.display()))?;

        Ok(Self { pool, db_path })
    }

    /// Create the database file and schema if missing. Setup only; never writes rows.
    pub async fn create(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool, db_path };
        store.create_tables().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS slideshows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                deviceid TEXT UNIQUE,
                password TEXT,
                slideshow_id INTEGER REFERENCES slideshows(id) ON DELETE SET NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS slides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                media_type TEXT,
                url TEXT NOT NULL,
                transition TEXT,
                display_time INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS slideshow_slides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slideshow_id INTEGER NOT NULL REFERENCES slideshows(id) ON DELETE CASCADE,
                slide_id INTEGER NOT NULL REFERENCES slides(id) ON DELETE CASCADE,
                position INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_slideshow_slides_slideshow ON slideshow_slides(slideshow_id, position)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_slides(&self, slideshow_id: i64) -> Result<Vec<Slide>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name, s.media_type, s.url, s.transition, s.display_time
            FROM slideshow_slides ss
            JOIN slides s ON s.id = ss.slide_id
            WHERE ss.slideshow_id = ?
            ORDER BY ss.position, ss.id
            "#,
        )
        .bind(slideshow_id)
        .fetch_all(&self.pool)
        .await?;

        let mut slides = Vec::with_capacity(rows.len());
        for row in rows {
            slides.push(Slide::from_row(&row)?);
        }

        Ok(slides)
    }
}

#[async_trait]
impl SlideshowStore for SqliteStore {
    async fn find_device_by_name(&self, name: &str) -> Result<Option<Device>> {
        let row = sqlx::query(
            "SELECT id, name, deviceid, password, slideshow_id FROM devices WHERE name = ? LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Device::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn reload_device(&self, device: &Device) -> Result<Option<Device>> {
        let row = sqlx::query(
            "SELECT id, name, deviceid, password, slideshow_id FROM devices WHERE id = ?",
        )
        .bind(device.id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Device::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn slideshow_for(&self, device: &Device) -> Result<Option<Slideshow>> {
        let Some(slideshow_id) = device.slideshow_id else {
            return Ok(None);
        };

        let row = sqlx::query("SELECT id, name FROM slideshows WHERE id = ?")
            .bind(slideshow_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let slides = self.load_slides(id).await?;

        Ok(Some(Slideshow { id, name, slides }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn seeded_store(dir: &Path) -> SqliteStore {
        let store = SqliteStore::create(dir.join("test.db")).await.unwrap();

        for statement in [
            "INSERT INTO slideshows (id, name) VALUES (1, 'Promo'), (2, 'Empty')",
            "INSERT INTO slides (id, name, media_type, url, transition, display_time) VALUES \
                (10, 'A', 'image', 'http://img/a.png', 'dissolve', 5), \
                (11, 'B', 'feed', 'http://graphite/dash/b', NULL, 7), \
                (12, 'C', 'video', 'http://media/c.mp4', NULL, NULL), \
                (13, 'D', 'webpage', 'http://example.com', 'slide_left', 0)",
            // inserted out of order on purpose
            "INSERT INTO slideshow_slides (slideshow_id, slide_id, position) VALUES \
                (1, 13, 3), (1, 10, 0), (1, 12, 2), (1, 11, 1)",
            "INSERT INTO devices (id, name, deviceid, password, slideshow_id) VALUES \
                (1, 'Lobby', 'ab:cd:ef:00:22:33', 'secret', 1), \
                (2, 'Kitchen', NULL, NULL, NULL)",
        ] {
            sqlx::query(statement).execute(&store.pool).await.unwrap();
        }

        store
    }

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("fresh.db");
        SqliteStore::create(path.clone()).await.unwrap();
        // Idempotent
        let store = SqliteStore::create(path).await.unwrap();

        assert!(store.path().exists());
        assert!(store.find_device_by_name("Lobby").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_read_only_requires_existing_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("typo.db");

        let err = SqliteStore::open_read_only(path.clone()).await.err().unwrap();
        assert!(err.to_string().contains("does not exist"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_read_only_store_leaves_database_untouched() {
        let temp_dir = tempdir().unwrap();
        let writer = seeded_store(temp_dir.path()).await;
        let mode_before: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&writer.pool)
            .await
            .unwrap();

        let store = SqliteStore::open_read_only(writer.path().to_path_buf())
            .await
            .unwrap();
        let device = store.find_device_by_name("Lobby").await.unwrap().unwrap();
        assert_eq!(device.name, "Lobby");

        assert!(sqlx::query("DELETE FROM devices")
            .execute(&store.pool)
            .await
            .is_err());
        assert!(sqlx::query("CREATE TABLE scratch (id INTEGER)")
            .execute(&store.pool)
            .await
            .is_err());

        let mode_after: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&writer.pool)
            .await
            .unwrap();
        assert_eq!(mode_before, mode_after);
        assert!(store.find_device_by_name("Kitchen").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_device_normalizes_address() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;

        let device = store.find_device_by_name("Lobby").await.unwrap().unwrap();
        assert_eq!(device.device_id.as_deref(), Some("AB:CD:EF:00:22:33"));
        assert_eq!(device.password.as_deref(), Some("secret"));
        assert_eq!(device.slideshow_id, Some(1));

        assert!(store.find_device_by_name("Nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_slides_come_back_in_position_order() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;

        let device = store.find_device_by_name("Lobby").await.unwrap().unwrap();
        let slideshow = store.slideshow_for(&device).await.unwrap().unwrap();

        assert_eq!(slideshow.name, "Promo");
        let names: Vec<_> = slideshow.slides.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);

        let kinds: Vec<_> = slideshow.slides.iter().map(|s| s.media_kind).collect();
        assert_eq!(
            kinds,
            vec![MediaKind::Image, MediaKind::Feed, MediaKind::Video, MediaKind::Url]
        );
        assert_eq!(slideshow.slides[0].transition, Transition::Dissolve);
        assert_eq!(slideshow.slides[3].transition, Transition::SlideLeft);
        assert_eq!(slideshow.slides[1].display_time, Some(Duration::from_secs(7)));
        // Zero is a real display time; only NULL falls back to the default
        assert_eq!(slideshow.slides[3].display_time, Some(Duration::ZERO));
        assert_eq!(slideshow.slides[2].display_time, None);
    }

    #[tokio::test]
    async fn test_unassigned_device_has_no_slideshow() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;

        let device = store.find_device_by_name("Kitchen").await.unwrap().unwrap();
        assert!(store.slideshow_for(&device).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reload_sees_reassignment_and_deletion() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;

        let device = store.find_device_by_name("Lobby").await.unwrap().unwrap();

        sqlx::query("UPDATE devices SET slideshow_id = 2 WHERE id = 1")
            .execute(&store.pool)
            .await
            .unwrap();
        let reloaded = store.reload_device(&device).await.unwrap().unwrap();
        assert_eq!(reloaded.slideshow_id, Some(2));

        let slideshow = store.slideshow_for(&reloaded).await.unwrap().unwrap();
        assert_eq!(slideshow.name, "Empty");
        assert!(slideshow.slides.is_empty());

        sqlx::query("DELETE FROM devices WHERE id = 1")
            .execute(&store.pool)
            .await
            .unwrap();
        assert!(store.reload_device(&device).await.unwrap().is_none());
    }

    #[test]
    fn test_media_kind_mapping() {
        assert_eq!(MediaKind::from_db("video"), MediaKind::Video);
        assert_eq!(MediaKind::from_db("Audio"), MediaKind::Audio);
        assert_eq!(MediaKind::from_db(" image "), MediaKind::Image);
        assert_eq!(MediaKind::from_db("feed"), MediaKind::Feed);
        assert_eq!(MediaKind::from_db("html"), MediaKind::Url);
        assert_eq!(MediaKind::from_db(""), MediaKind::Url);
    }

    #[test]
    fn test_transition_mapping() {
        assert_eq!(Transition::from_db("slide_right"), Transition::SlideRight);
        assert_eq!(Transition::from_db("SlideLeft"), Transition::SlideLeft);
        assert_eq!(Transition::from_db("DISSOLVE"), Transition::Dissolve);
        assert_eq!(Transition::from_db("wipe"), Transition::None);
        assert_eq!(Transition::SlideRight.as_header_value(), "SlideRight");
    }

    #[test]
    fn test_normalize_device_id() {
        assert_eq!(normalize_device_id("ab:cd:ef:00:22:33"), "AB:CD:EF:00:22:33");
        assert_eq!(normalize_device_id(" ab-cd-ef-00-22-33 "), "AB:CD:EF:00:22:33");
    }
}
