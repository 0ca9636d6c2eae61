use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::files::{media_type_for, sanitize_file_name};

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
    pub upload_dir: PathBuf,
}

/// Uploaded bytes live as plain files under `upload_dir`; SQLite keeps one
/// row per stored file.
#[derive(Debug, Clone)]
pub struct UploadStore {
    pool: SqlitePool,
    upload_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct UploadRecord {
    pub upload_id: String,
    pub file_name: String,
    pub stored_name: String,
    pub size_bytes: i64,
    pub media_type: String,
    pub uploaded_at: String,
}

impl UploadStore {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| format!("failed to create upload dir {}", config.upload_dir.display()))?;

        let uri = normalize_sqlite_uri(&config.sqlite_path);
        let options = SqliteConnectOptions::from_str(&uri)
            .with_context(|| format!("invalid sqlite URI: {}", uri))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect sqlite pool")?;

        let store = Self {
            pool,
            upload_dir: config.upload_dir.clone(),
        };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration failed for statement: {sql}"))?;
        }
        info!("iachat sqlite schema ready");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping")?;
        Ok(())
    }

    pub async fn save_upload(&self, original_name: &str, bytes: &[u8]) -> Result<UploadRecord> {
        let upload_id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let file_name = sanitize_file_name(original_name);
        let media_type = media_type_for(&file_name).to_string();

        // Same name within the same second falls back to the id tail.
        let tail = &upload_id[upload_id.len() - 8..];
        let candidates = [
            format!("{}_{}", now.timestamp(), file_name),
            format!("{}_{}_{}", now.timestamp(), tail, file_name),
        ];
        let (stored_name, mut file) = self.create_stored_file(&candidates).await?;

        let path = self.upload_dir.join(&stored_name);
        file.write_all(bytes)
            .await
            .with_context(|| format!("write upload {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flush upload {}", path.display()))?;
        info!(path = %path.display(), size = bytes.len(), "saved uploaded file");

        sqlx::query(
            "INSERT INTO uploads(upload_id, file_name, stored_name, size_bytes, media_type, uploaded_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&upload_id)
        .bind(&file_name)
        .bind(&stored_name)
        .bind(bytes.len() as i64)
        .bind(&media_type)
        .bind(now.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await
        .context("insert upload")?;

        self.get_upload(&upload_id)
            .await?
            .context("upload missing after insert")
    }

    /// Claims the first candidate name that does not exist yet. The file is
    /// created exclusively, so concurrent saves never share a path.
    async fn create_stored_file(&self, candidates: &[String]) -> Result<(String, File)> {
        for name in candidates {
            let path = self.upload_dir.join(name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((name.clone(), file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("create upload {}", path.display()))
                }
            }
        }
        bail!("no free stored name among {candidates:?}")
    }

    pub async fn get_upload(&self, upload_id: &str) -> Result<Option<UploadRecord>> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT upload_id, file_name, stored_name, size_bytes, media_type, uploaded_at FROM uploads WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query upload {upload_id}"))
    }

    pub async fn list_uploads(&self, limit: i64) -> Result<Vec<UploadRecord>> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT upload_id, file_name, stored_name, size_bytes, media_type, uploaded_at FROM uploads ORDER BY uploaded_at DESC, upload_id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("query uploads")
    }

    pub async fn find_by_stored_name(&self, stored_name: &str) -> Result<Option<UploadRecord>> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT upload_id, file_name, stored_name, size_bytes, media_type, uploaded_at FROM uploads WHERE stored_name = ?",
        )
        .bind(stored_name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query stored upload {stored_name}"))
    }

    /// Removes the stored bytes, then the row. A file that is already gone
    /// does not keep the row alive.
    pub async fn delete_upload(&self, record: &UploadRecord) -> Result<()> {
        let path = self.stored_path(record);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("remove upload {}", path.display()))
            }
        }

        sqlx::query("DELETE FROM uploads WHERE upload_id = ?")
            .bind(&record.upload_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete upload {}", record.upload_id))?;
        Ok(())
    }

    pub fn stored_path(&self, record: &UploadRecord) -> PathBuf {
        self.upload_dir.join(&record.stored_name)
    }

    /// Keeps the `keep_last` newest uploads untouched; anything beyond that
    /// older than `max_age_days` loses both its row and its file. Returns the
    /// number of uploads removed.
    pub async fn purge_expired(&self, keep_last: i64, max_age_days: i64) -> Result<u64> {
        let candidates = sqlx::query_as::<_, UploadRecord>(
            "SELECT upload_id, file_name, stored_name, size_bytes, media_type, uploaded_at FROM uploads ORDER BY uploaded_at DESC, upload_id DESC LIMIT -1 OFFSET ?",
        )
        .bind(keep_last.max(0))
        .fetch_all(&self.pool)
        .await
        .context("query purge candidates")?;

        let cutoff = Utc::now() - Duration::days(max_age_days);
        let mut removed = 0;
        for record in candidates {
            let uploaded_at = match DateTime::parse_from_rfc3339(&record.uploaded_at) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(err) => {
                    warn!(upload_id = %record.upload_id, error = %err, "skipping upload with unparseable timestamp");
                    continue;
                }
            };
            if uploaded_at >= cutoff {
                continue;
            }

            if let Err(err) = self.delete_upload(&record).await {
                warn!(upload_id = %record.upload_id, error = %err, "failed to remove expired upload");
                continue;
            }
            removed += 1;
        }

        if removed > 0 {
            info!(removed, "purged expired uploads");
        }
        Ok(removed)
    }
}

fn normalize_sqlite_uri(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{raw}")
    }
}
