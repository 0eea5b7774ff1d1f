//! Connection pool setup and schema bootstrap for the tables in §6.
//!
//! Uses `sqlx::AnyPool` so the same SQL (plain `ON CONFLICT` upserts, no
//! backend-specific syntax) runs unmodified against SQLite or Postgres,
//! per §6 "Relational database (SQLite or PostgreSQL)".

use sqlx::any::{Any, AnyPoolOptions};
use sqlx::Pool;

use crate::error::Result;

pub type DbPool = Pool<Any>;

/// Opens the pool and ensures every table from §6 exists.
///
/// Failure here is one of the two fatal startup conditions named in
/// §7 ("inability to open the database on startup"); the caller
/// (`forumod-server`) is expected to abort the process on error.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool> {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

async fn ensure_schema(pool: &DbPool) -> Result<()> {
    for stmt in SCHEMA_STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS forum (
        fname TEXT PRIMARY KEY,
        fid BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS \"user\" (
        user_id BIGINT PRIMARY KEY,
        user_name TEXT,
        nick_name TEXT NOT NULL,
        portrait TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user_level (
        user_id BIGINT NOT NULL,
        fname TEXT NOT NULL,
        level INTEGER NOT NULL,
        PRIMARY KEY (user_id, fname)
    )",
    "CREATE TABLE IF NOT EXISTS content (
        pid BIGINT PRIMARY KEY,
        tid BIGINT NOT NULL,
        fname TEXT NOT NULL,
        create_time BIGINT NOT NULL,
        title TEXT NOT NULL,
        text TEXT NOT NULL,
        floor INTEGER NOT NULL,
        images TEXT NOT NULL,
        type TEXT NOT NULL,
        last_time BIGINT,
        reply_num INTEGER,
        last_update BIGINT NOT NULL,
        author_id BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS process_log (
        pid BIGINT NOT NULL,
        \"user\" BIGINT NOT NULL,
        tid BIGINT NOT NULL,
        create_time BIGINT NOT NULL,
        process_time BIGINT NOT NULL,
        result_rule TEXT,
        is_whitelist BOOLEAN,
        PRIMARY KEY (pid, \"user\")
    )",
    "CREATE TABLE IF NOT EXISTS process_context (
        pid BIGINT NOT NULL,
        \"user\" BIGINT NOT NULL,
        rules TEXT NOT NULL,
        conditions TEXT NOT NULL,
        PRIMARY KEY (pid, \"user\")
    )",
];
