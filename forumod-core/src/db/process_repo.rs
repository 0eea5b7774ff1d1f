//! Persists the evaluator's (C3) audit trail: one `process_log` row and
//! one `process_context` row per `(pid, user)` (§4.5, §6, §8 invariant 2).

use forumod_model::process::{ProcessContext, ProcessLog};

use crate::db::pool::DbPool;
use crate::error::Result;

pub struct ProcessRepo {
    pool: DbPool,
}

impl ProcessRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_log(&self, log: &ProcessLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO process_log
                (pid, \"user\", tid, create_time, process_time, result_rule, is_whitelist)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(pid, \"user\") DO UPDATE SET
                tid = excluded.tid,
                create_time = excluded.create_time,
                process_time = excluded.process_time,
                result_rule = excluded.result_rule,
                is_whitelist = excluded.is_whitelist",
        )
        .bind(log.pid.0 as i64)
        .bind(log.user.0 as i64)
        .bind(log.tid.0 as i64)
        .bind(log.create_time)
        .bind(log.process_time)
        .bind(log.result_rule.as_deref())
        .bind(log.is_whitelist)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_context(&self, ctx: &ProcessContext) -> Result<()> {
        let rules = serde_json::to_string(&ctx.rules).unwrap_or_else(|_| "[]".into());
        let conditions = serde_json::to_string(&ctx.conditions).unwrap_or_else(|_| "[]".into());

        sqlx::query(
            "INSERT INTO process_context (pid, \"user\", rules, conditions)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(pid, \"user\") DO UPDATE SET
                rules = excluded.rules,
                conditions = excluded.conditions",
        )
        .bind(ctx.pid.0 as i64)
        .bind(ctx.user.0 as i64)
        .bind(rules)
        .bind(conditions)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
