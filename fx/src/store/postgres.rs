//! PostgreSQL-backed rate store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use super::{RateFilter, RateStore};
use crate::error::{FxError, FxResult};
use crate::observation::{CollectionKey, RateObservation};
use spotrate_common::{window_start, Currency, RateType};

/// Scale of the `rate` column.
const RATE_SCALE: u32 = 8;

/// `TIMESTAMPTZ` binds before this are not encodable, and no row predates it.
fn window_floor(max_age: Duration) -> DateTime<Utc> {
    window_start(max_age).max(DateTime::<Utc>::UNIX_EPOCH)
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS exchange_rate (
        id BIGSERIAL PRIMARY KEY,
        query_time TIMESTAMPTZ NOT NULL,
        mtime TIMESTAMPTZ NULL,
        from_currency VARCHAR(10) NOT NULL,
        to_currency VARCHAR(10) NOT NULL,
        rate NUMERIC(21,8) NOT NULL,
        source VARCHAR(32) NOT NULL,
        type VARCHAR(32) NOT NULL,
        note TEXT NULL,
        collection_key VARCHAR(8) NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_exchange_rate_query_time ON exchange_rate (query_time)",
];

const SELECT_COLUMNS: &str = "SELECT query_time, mtime, from_currency, to_currency, rate, \
     source, type, note, collection_key FROM exchange_rate WHERE query_time >= ";

/// Connection settings for [`PgRateStore`].
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    /// Database URL.
    pub database_url: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/spotrate".to_string(),
            max_connections: 5,
        }
    }
}

impl PgStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(n) = std::env::var("SPOTRATE_DB_MAX_CONNECTIONS") {
            if let Ok(n) = n.parse() {
                config.max_connections = n;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.max_connections == 0 {
            return Err("Pool needs at least one connection".to_string());
        }
        Ok(())
    }
}

/// Rate store over a single append-only `exchange_rate` table.
#[derive(Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool using `config`.
    pub async fn connect(config: &PgStoreConfig) -> FxResult<Self> {
        config.validate().map_err(FxError::StorageUnavailable)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        info!(max_connections = config.max_connections, "Connected rate store");
        Ok(Self::new(pool))
    }

    /// Create the table and index when missing.
    pub async fn ensure_schema(&self) -> FxResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Rate store schema ready");
        Ok(())
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &RateFilter) {
        if let Some(source) = &filter.source {
            qb.push(" AND source = ").push_bind(source.clone());
        }
        if let Some(from) = &filter.from_currency {
            qb.push(" AND from_currency = ").push_bind(from.code().to_string());
        }
        if let Some(to) = &filter.to_currency {
            qb.push(" AND to_currency = ").push_bind(to.code().to_string());
        }
        if let Some(rate_type) = &filter.rate_type {
            qb.push(" AND type = ").push_bind(rate_type.as_str().to_string());
        }
        if let Some(key) = filter.collection_key {
            qb.push(" AND collection_key = ").push_bind(key.as_str());
        }
    }

    fn decode(row: &PgRow) -> FxResult<RateObservation> {
        let from: String = row.try_get("from_currency")?;
        let to: String = row.try_get("to_currency")?;
        let rate_type: String = row.try_get("type")?;
        let source: String = row.try_get("source")?;
        let key: String = row.try_get("collection_key")?;

        Ok(RateObservation {
            from_currency: Currency::new(from),
            to_currency: Currency::new(to),
            rate_type: RateType::new(rate_type),
            rate: row.try_get::<Decimal, _>("rate")?,
            source: Some(source),
            note: row.try_get::<Option<String>, _>("note")?,
            query_time: row.try_get::<DateTime<Utc>, _>("query_time")?,
            source_mtime: row.try_get::<Option<DateTime<Utc>>, _>("mtime")?,
            collection_key: key.parse::<CollectionKey>()?,
        })
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn insert(&self, observation: &RateObservation) -> FxResult<()> {
        observation.validate()?;
        sqlx::query(
            "INSERT INTO exchange_rate \
             (query_time, mtime, from_currency, to_currency, rate, source, type, note, collection_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(observation.query_time)
        .bind(observation.source_mtime)
        .bind(observation.from_currency.code())
        .bind(observation.to_currency.code())
        .bind(observation.rate)
        .bind(observation.source_str())
        .bind(observation.rate_type.as_str())
        .bind(observation.note.as_deref())
        .bind(observation.collection_key.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_recent(
        &self,
        filter: &RateFilter,
        max_age: Duration,
        limit: Option<usize>,
    ) -> FxResult<Vec<RateObservation>> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        qb.push_bind(window_floor(max_age));
        Self::push_filter(&mut qb, filter);
        qb.push(" ORDER BY query_time DESC, id DESC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn distinct_sources(
        &self,
        filter: &RateFilter,
        max_age: Duration,
    ) -> FxResult<Vec<String>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT DISTINCT source FROM exchange_rate WHERE query_time >= ",
        );
        qb.push_bind(window_floor(max_age));
        Self::push_filter(&mut qb, filter);
        qb.push(" ORDER BY source");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("source").map_err(FxError::from))
            .collect()
    }

    fn rate_scale(&self) -> Option<u32> {
        Some(RATE_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::normalize_rate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = PgStoreConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = PgStoreConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());

        config.max_connections = 1;
        config.database_url.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filter_sql() {
        let filter = RateFilter::default()
            .with_source("bca")
            .with_collection_key(CollectionKey::FullTable);
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        qb.push_bind(window_start(Duration::hours(1)));
        PgRateStore::push_filter(&mut qb, &filter);

        let sql = qb.sql();
        assert!(sql.contains("query_time >= $1"));
        assert!(sql.contains("AND source = $2"));
        assert!(sql.contains("AND collection_key = $3"));
        assert!(!sql.contains("from_currency ="));
    }

    #[test]
    fn test_window_floor_is_encodable() {
        assert_eq!(window_floor(Duration::MAX), DateTime::<Utc>::UNIX_EPOCH);
        assert!(window_floor(Duration::hours(1)) > DateTime::<Utc>::UNIX_EPOCH);
    }

    /// Needs a reachable database: `DATABASE_URL=... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_insert_and_read_back() {
        if std::env::var("DATABASE_URL").is_err() {
            return;
        }
        let store = PgRateStore::connect(&PgStoreConfig::from_env()).await.unwrap();
        store.ensure_schema().await.unwrap();

        let source = format!("pg-{}", spotrate_common::now().timestamp_micros());
        let quote = crate::observation::RateQuote::new(
            spotrate_common::CurrencyPair::new("USD", "IDR"),
            RateType::sell(),
            normalize_rate(dec!(0.0000645161290322), RATE_SCALE),
        )
        .with_note("1/buy_er");
        let row = RateObservation::from_quote(quote, &source, CollectionKey::FullTable);
        store.insert(&row).await.unwrap();

        let filter = RateFilter::default().with_source(source.clone());
        let rows = store.query_recent(&filter, Duration::hours(1), None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rate.to_string(), row.rate.to_string());
        assert_eq!(rows[0].note.as_deref(), Some("1/buy_er"));
        assert_eq!(rows[0].collection_key, CollectionKey::FullTable);
        assert_eq!(rows[0].pair(), row.pair());

        let sources = store.distinct_sources(&filter, Duration::MAX).await.unwrap();
        assert_eq!(sources, vec![source]);
    }
}
