//! Persists the author attached to each crawled `Content` as a `user`
//! row plus a per-forum `user_level` row (§4.3 `crawl()` step (a)).

use forumod_model::ids::Fname;
use forumod_model::user::User;

use crate::db::pool::DbPool;
use crate::error::Result;

pub struct UserRepo {
    pool: DbPool,
}

impl UserRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upserts the author's identity row and bumps their per-forum level
    /// only when the newly observed level is strictly higher than the
    /// cached one (§4.3).
    pub async fn upsert_author(&self, fname: &Fname, user: &User) -> Result<()> {
        let user_id = user.user_id.0 as i64;

        sqlx::query(
            "INSERT INTO \"user\" (user_id, user_name, nick_name, portrait)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                user_name = excluded.user_name,
                nick_name = excluded.nick_name,
                portrait = excluded.portrait",
        )
        .bind(user_id)
        .bind(&user.user_name)
        .bind(&user.nick_name)
        .bind(&user.portrait)
        .execute(&self.pool)
        .await?;

        let existing_level: Option<(i64,)> = sqlx::query_as(
            "SELECT level FROM user_level WHERE user_id = ? AND fname = ?",
        )
        .bind(user_id)
        .bind(fname.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let should_write = match existing_level {
            Some((existing,)) => (user.level as i64) > existing,
            None => true,
        };

        if should_write {
            sqlx::query(
                "INSERT INTO user_level (user_id, fname, level)
                 VALUES (?, ?, ?)
                 ON CONFLICT(user_id, fname) DO UPDATE SET level = excluded.level",
            )
            .bind(user_id)
            .bind(fname.as_str())
            .bind(user.level as i64)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}
