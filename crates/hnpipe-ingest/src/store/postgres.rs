//! PostgreSQL item store
//!
//! One transaction per cycle spans the five kind tables, the three flag tables
//! and the `scrape` watermark log, so the cursor (max id in `scrape`) can only
//! move once every row of the cycle is durable. Rows go in through chunked
//! multi-row INSERTs with `ON CONFLICT DO NOTHING`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use super::{CommitStats, ItemStore};
use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result};
use crate::models::{CycleBatch, ItemId};

/// Postgres caps a statement at 65535 bind parameters; the widest table has 7 columns.
const MAX_ROWS_PER_INSERT: usize = u16::MAX as usize / 7;

/// Open a connection pool
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    info!(max_connections = config.max_connections, "Database connection pool created");
    Ok(pool)
}

/// Apply the bundled schema migrations
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Schema migrations applied");
    Ok(())
}

pub struct PgItemStore {
    pool: PgPool,
    chunk_size: usize,
}

impl PgItemStore {
    pub fn new(pool: PgPool, chunk_size: usize) -> Self {
        Self {
            pool,
            chunk_size: chunk_size.clamp(1, MAX_ROWS_PER_INSERT),
        }
    }

    async fn write_batch(&self, batch: &CycleBatch) -> std::result::Result<CommitStats, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let n = self.chunk_size;

        let stats = CommitStats {
            stories: insert_rows(
                &mut tx,
                r#"INSERT INTO stories (id, title, "by", descendants, score, "time", url) "#,
                &batch.stories,
                n,
                |b, s| {
                    b.push_bind(s.id)
                        .push_bind(&s.title)
                        .push_bind(&s.by)
                        .push_bind(s.descendants)
                        .push_bind(s.score)
                        .push_bind(s.time)
                        .push_bind(&s.url);
                },
            )
            .await?,
            jobs: insert_rows(
                &mut tx,
                r#"INSERT INTO jobs (id, title, text, "by", score, "time", url) "#,
                &batch.jobs,
                n,
                |b, j| {
                    b.push_bind(j.id)
                        .push_bind(&j.title)
                        .push_bind(&j.text)
                        .push_bind(&j.by)
                        .push_bind(j.score)
                        .push_bind(j.time)
                        .push_bind(&j.url);
                },
            )
            .await?,
            comments: insert_rows(
                &mut tx,
                r#"INSERT INTO comments (id, text, "by", "time", parent) "#,
                &batch.comments,
                n,
                |b, c| {
                    b.push_bind(c.id)
                        .push_bind(&c.text)
                        .push_bind(&c.by)
                        .push_bind(c.time)
                        .push_bind(c.parent);
                },
            )
            .await?,
            polls: insert_rows(
                &mut tx,
                r#"INSERT INTO polls (id, title, text, "by", descendants, score, "time") "#,
                &batch.polls,
                n,
                |b, p| {
                    b.push_bind(p.id)
                        .push_bind(&p.title)
                        .push_bind(&p.text)
                        .push_bind(&p.by)
                        .push_bind(p.descendants)
                        .push_bind(p.score)
                        .push_bind(p.time);
                },
            )
            .await?,
            poll_options: insert_rows(
                &mut tx,
                r#"INSERT INTO pollopts (id, text, "by", poll, score, "time") "#,
                &batch.poll_options,
                n,
                |b, o| {
                    b.push_bind(o.id)
                        .push_bind(&o.text)
                        .push_bind(&o.by)
                        .push_bind(o.poll)
                        .push_bind(o.score)
                        .push_bind(o.time);
                },
            )
            .await?,
            deleted: insert_ids(&mut tx, "INSERT INTO deleted (item) ", &batch.deleted, n).await?,
            dead: insert_ids(&mut tx, "INSERT INTO dead (item) ", &batch.dead, n).await?,
            skipped: insert_ids(&mut tx, "INSERT INTO skipped (item) ", &batch.skipped, n).await?,
            // Watermark last: the cursor is derived from this table.
            watermarks: insert_rows(
                &mut tx,
                "INSERT INTO scrape (id, scrape_time) ",
                &batch.watermarks,
                n,
                |b, w| {
                    b.push_bind(w.id).push_bind(w.processed_at);
                },
            )
            .await?,
        };

        tx.commit().await?;
        Ok(stats)
    }
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn max_watermark_id(&self) -> Result<Option<ItemId>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM scrape")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    async fn commit(&self, batch: &CycleBatch) -> Result<CommitStats> {
        let stats = self.write_batch(batch).await.map_err(IngestError::storage)?;
        debug!(range = %batch.range, rows = stats.total(), "Cycle transaction committed");
        Ok(stats)
    }
}

/// Chunked multi-row INSERT ... ON CONFLICT DO NOTHING; returns rows written
async fn insert_rows<'a, T, F>(
    tx: &mut Transaction<'_, Postgres>,
    insert: &str,
    rows: &'a [T],
    chunk_size: usize,
    mut bind_row: F,
) -> std::result::Result<u64, sqlx::Error>
where
    T: Sync,
    F: FnMut(&mut Separated<'_, 'a, Postgres, &'static str>, &'a T) + Send,
{
    let mut written = 0;

    for chunk in rows.chunks(chunk_size) {
        let mut query_builder: QueryBuilder<'a, Postgres> = QueryBuilder::new(insert);
        query_builder.push_values(chunk, |mut b, row| bind_row(&mut b, row));
        query_builder.push(" ON CONFLICT DO NOTHING");

        written += query_builder.build().execute(&mut **tx).await?.rows_affected();
    }

    Ok(written)
}

async fn insert_ids(
    tx: &mut Transaction<'_, Postgres>,
    insert: &str,
    ids: &[ItemId],
    chunk_size: usize,
) -> std::result::Result<u64, sqlx::Error> {
    insert_rows(tx, insert, ids, chunk_size, |b, id| {
        b.push_bind(*id);
    })
    .await
}
