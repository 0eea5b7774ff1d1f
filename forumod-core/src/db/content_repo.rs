//! The storage half of `classify_and_update` (§4.1): one transaction that
//! reads the prior marker row, computes the classification, and UPSERTs
//! the new row — committed together so concurrent sightings of the same
//! `pid` serialize cleanly (§5 "Ordering guarantees").

use async_trait::async_trait;
use chrono::Utc;
use forumod_model::content::Content;
use forumod_model::UpdateStatus;

use crate::classifier::{classify, IncomingMarkers, PriorMarkers};
use crate::db::pool::DbPool;
use crate::error::Result;

/// Storage seam for the classifier so the evaluator/spider tests can
/// swap in an in-memory fake without a database.
#[async_trait]
pub trait ContentCacheStore: Send + Sync {
    async fn classify_and_update(&self, content: &Content) -> Result<UpdateStatus>;

    /// Deletes cache rows whose `last_update` predates `now - expire_secs`
    /// (`PID_CACHE_EXPIRE`, §3).
    async fn sweep_expired(&self, now: i64, expire_secs: i64) -> Result<u64>;
}

pub struct SqlContentCacheStore {
    pool: DbPool,
}

impl SqlContentCacheStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentCacheStore for SqlContentCacheStore {
    async fn classify_and_update(&self, content: &Content) -> Result<UpdateStatus> {
        let pid = content.pid().0 as i64;
        let tid = content.tid().0 as i64;
        let kind = content.kind();

        let mut tx = self.pool.begin().await?;

        let prior_row: Option<(Option<i64>, Option<i64>)> =
            sqlx::query_as("SELECT last_time, reply_num FROM content WHERE pid = ?")
                .bind(pid)
                .fetch_optional(&mut *tx)
                .await?;

        let prior = prior_row.map(|(last_time, reply_num)| PriorMarkers {
            last_time,
            reply_num: reply_num.map(|n| n as i32),
        });

        let incoming = IncomingMarkers {
            last_time: content.last_time(),
            reply_num: content.reply_num(),
        };

        let status = classify(kind, incoming, prior);

        let images = serde_json::to_string(content.images()).unwrap_or_else(|_| "[]".to_string());
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO content
                (pid, tid, fname, create_time, title, text, floor, images, type,
                 last_time, reply_num, last_update, author_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(pid) DO UPDATE SET
                tid = excluded.tid,
                fname = excluded.fname,
                create_time = excluded.create_time,
                title = excluded.title,
                text = excluded.text,
                floor = excluded.floor,
                images = excluded.images,
                type = excluded.type,
                last_time = excluded.last_time,
                reply_num = excluded.reply_num,
                last_update = excluded.last_update,
                author_id = excluded.author_id",
        )
        .bind(pid)
        .bind(tid)
        .bind(content.fname().as_str())
        .bind(content.create_time())
        .bind(content.title())
        .bind(content.text())
        .bind(content.floor() as i64)
        .bind(images)
        .bind(kind.as_str())
        .bind(content.last_time())
        .bind(content.reply_num().map(|n| n as i64))
        .bind(now)
        .bind(content.user().user_id.0 as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(status)
    }

    async fn sweep_expired(&self, now: i64, expire_secs: i64) -> Result<u64> {
        let cutoff = now - expire_secs;
        let result = sqlx::query("DELETE FROM content WHERE last_update < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
