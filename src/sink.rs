use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, Postgres, QueryBuilder,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::ranker::OutputRow;

pub const DEFAULT_TABLE: &str = "highest_budget_revenues_ratio_movies";

const COLUMNS: [(&str, &str); 9] = [
    ("title", "TEXT"),
    ("budget", "DOUBLE PRECISION"),
    ("year", "INTEGER"),
    ("revenue", "DOUBLE PRECISION"),
    ("rating", "DOUBLE PRECISION"),
    ("ratio", "DOUBLE PRECISION"),
    ("production_company", "TEXT"),
    ("wikipedia_link", "TEXT"),
    ("wikipedia_abstract", "TEXT"),
];

// Postgres caps bind parameters per statement at 65535.
const MAX_BATCH_ROWS: usize = u16::MAX as usize / COLUMNS.len();

/// Accepts plain identifiers only; the table name is interpolated into DDL.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        || table.len() > 63
    {
        anyhow::bail!("invalid table name {:?}", table);
    }
    Ok(())
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS \"{}\"", table)
}

pub fn create_table_sql(table: &str) -> String {
    let columns = COLUMNS
        .iter()
        .map(|(name, ty)| format!("{} {}", name, ty))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE \"{}\" ({})", table, columns)
}

pub fn insert_prefix(table: &str) -> String {
    let names = COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO \"{}\" ({}) ", table, names)
}

pub struct Db {
    pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connect_options =
            PgConnectOptions::from_str(database_url).context("parsing database url")?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options)
            .await
            .context("connecting to database")?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Replaces `table` with `rows` in a single transaction: either the new contents are
    /// committed in full or the previous table is left untouched.
    #[instrument(skip(self, rows))]
    pub async fn replace_table(
        &self,
        table: &str,
        rows: &[OutputRow],
        batch_size: usize,
    ) -> Result<u64> {
        validate_table_name(table)?;
        let batch_size = batch_size.clamp(1, MAX_BATCH_ROWS);

        let mut tx = self.pool.begin().await?;
        sqlx::raw_sql(&drop_table_sql(table))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("dropping {}", table))?;
        sqlx::raw_sql(&create_table_sql(table))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("creating {}", table))?;

        let mut written = 0u64;
        for chunk in rows.chunks(batch_size) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix(table));
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(r.title.as_deref())
                    .push_bind(r.budget)
                    .push_bind(r.year)
                    .push_bind(r.revenue)
                    .push_bind(r.rating)
                    .push_bind(r.ratio)
                    .push_bind(r.production_company.as_deref())
                    .push_bind(r.wikipedia_link.as_deref())
                    .push_bind(r.wikipedia_abstract.as_deref());
            });
            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .with_context(|| format!("inserting into {}", table))?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        info!("Replaced table {} with {} rows", table, written);
        Ok(written)
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("db pool closed");
    }
}
