//! Vector index schema migrations, applied when the database is opened

use anyhow::Context;
use sqlx::SqlitePool;

/// Schema migrations as `(version, description, sql)`, applied in order
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (1, "chunk embeddings", CHUNKS_V1),
    (2, "recorded graph schema", SCHEMA_STATE_V2),
];

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

const VERSION_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// One row per indexed chunk; `dimensions` lets mismatched vectors be spotted without decoding
const CHUNKS_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS document_chunks (
        id TEXT PRIMARY KEY NOT NULL,
        source TEXT NOT NULL,
        page INTEGER,
        chunk_offset INTEGER NOT NULL DEFAULT 0,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL,
        embedding_model TEXT NOT NULL,
        dimensions INTEGER NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_document_chunks_source ON document_chunks(source);
    CREATE INDEX IF NOT EXISTS idx_document_chunks_model ON document_chunks(embedding_model);
"#;

/// Single-row table holding the graph schema fingerprint seen by the last ingest or refresh
const SCHEMA_STATE_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS graph_schema_state (
        id INTEGER PRIMARY KEY NOT NULL CHECK (id = 1),
        fingerprint TEXT NOT NULL,
        recorded_at TIMESTAMP NOT NULL
    );
"#;

async fn applied_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(VERSION_TABLE).execute(pool).await?;

    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the recorded version
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let applied = applied_version(pool).await?;
    let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _, _)| *v > applied).collect();

    if pending.is_empty() {
        tracing::debug!(version = applied, "Vector index schema is up to date");
        return Ok(());
    }

    for (version, description, sql) in pending {
        tracing::info!(version = *version, description = *description, "Applying migration");
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
            .bind(*version)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to record migration v{}", version))?;
        tx.commit().await?;
    }
    Ok(())
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = applied_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}
