use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use crate::data::sources::{ResultStore, SigmaStore};
use crate::execution::types::{
    BacktestRow, BaselineRow, HistoryFilter, StoredAnalysis, StoredSummary,
};
use crate::strategies::types::{AnalysisResult, AnalysisStatus};

const ANALYSIS_COLUMNS: &str = "id, source_market_id, event_title, event_url, market_question,
     schema_side, threshold_f, location_name, target_date, close_time, price, liquidity,
     forecast_temp_f, sigma_f, risk_profile, p_model, edge, ev_net, gates, signal, status,
     unsupported_reason, summary, created_at";

/// SQLite store for analyses, per-location sigma and cached summaries.
pub struct AnalysisDatabase {
    conn: Mutex<Connection>,
}

impl AnalysisDatabase {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather_markets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_market_id TEXT,
                source_event_id TEXT,
                event_title TEXT NOT NULL,
                event_url TEXT,
                market_question TEXT NOT NULL,
                schema_side TEXT,
                threshold_f REAL,
                location_name TEXT,
                location_key TEXT,
                target_date TEXT,
                close_time TEXT,
                price REAL,
                liquidity REAL,
                forecast_temp_f REAL,
                forecast_source TEXT,
                sigma_f REAL,
                risk_profile TEXT NOT NULL,
                p_model REAL,
                edge REAL,
                ev_net REAL,
                gates TEXT NOT NULL,
                signal TEXT NOT NULL,
                status TEXT NOT NULL,
                unsupported_reason TEXT,
                summary TEXT,
                market_snapshot TEXT,
                forecast_snapshot TEXT,
                created_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS forecast_sigma (
                location_key TEXT PRIMARY KEY,
                sigma_f REAL NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ai_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cache_key TEXT NOT NULL UNIQUE,
                summary TEXT NOT NULL,
                source TEXT NOT NULL,
                model TEXT,
                payload TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_weather_markets_status ON weather_markets(status);
            CREATE INDEX IF NOT EXISTS idx_weather_markets_history
                ON weather_markets(schema_side, location_key, created_at);

            INSERT OR IGNORE INTO forecast_sigma (location_key, sigma_f, updated_at)
                VALUES ('default', 4.5, datetime('now'));
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    /// Insert a new analysis row. Rows are never updated afterwards.
    pub fn insert_analysis(&self, result: &AnalysisResult) -> Result<i64> {
        if result.status == AnalysisStatus::Error {
            anyhow::bail!("Error results are not persisted");
        }

        let unsupported_reason = match result.status {
            AnalysisStatus::Unsupported => result.reason.clone(),
            _ => None,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO weather_markets (
                source_market_id, source_event_id, event_title, event_url, market_question,
                schema_side, threshold_f, location_name, location_key, target_date,
                close_time, price, liquidity, forecast_temp_f, forecast_source, sigma_f,
                risk_profile, p_model, edge, ev_net, gates, signal, status,
                unsupported_reason, summary, market_snapshot, forecast_snapshot, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                       ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
            params![
                result.market_id,
                result.event_id,
                result.event_title,
                result.event_url,
                result.market_question,
                result.schema.side.map(|s| s.as_str()),
                result.schema.threshold_f,
                result.forecast.location_name,
                result.forecast.location_key,
                result.forecast.target_date,
                result.market.close_time,
                result.market.price,
                result.market.liquidity,
                result.forecast.temperature_f,
                result.forecast.source,
                result.forecast.sigma_f,
                result.risk_profile.as_str(),
                result.metrics.p_model,
                result.metrics.edge,
                result.metrics.ev_net,
                serde_json::to_string(&result.gates)?,
                result.signal.as_str(),
                result.status.as_str(),
                unsupported_reason,
                result.summary,
                serde_json::to_string(&result.snapshots.market)?,
                serde_json::to_string(&result.snapshots.forecast)?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get_baseline(&self, id: i64) -> Result<Option<BaselineRow>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, schema_side, location_key FROM weather_markets WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(id, side, location_key)| BaselineRow {
            id,
            schema_side: side.and_then(|s| s.parse().ok()),
            location_key,
        }))
    }

    pub fn get_analysis(&self, id: i64) -> Result<Option<StoredAnalysis>> {
        let conn = self.conn.lock();
        let analysis = conn
            .query_row(
                &format!("SELECT {} FROM weather_markets WHERE id = ?1", ANALYSIS_COLUMNS),
                params![id],
                map_analysis,
            )
            .optional()?;
        Ok(analysis)
    }

    /// Most recent analyses of any status, newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<StoredAnalysis>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM weather_markets ORDER BY created_at DESC, id DESC LIMIT ?1",
            ANALYSIS_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], map_analysis)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.into())
    }

    /// Successful analyses with a model probability, newest first.
    pub fn get_history(&self, filter: &HistoryFilter) -> Result<Vec<BacktestRow>> {
        let mut sql = String::from(
            "SELECT id, event_title, market_question, risk_profile, signal, price, p_model,
                    edge, ev_net, created_at
             FROM weather_markets
             WHERE status = 'ok' AND p_model IS NOT NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(id) = filter.exclude_id {
            args.push(Box::new(id));
            sql.push_str(&format!(" AND id != ?{}", args.len()));
        }
        if let Some(side) = filter.schema_side {
            args.push(Box::new(side.as_str().to_string()));
            sql.push_str(&format!(" AND schema_side = ?{}", args.len()));
        }
        if let Some(key) = &filter.location_key {
            args.push(Box::new(key.clone()));
            sql.push_str(&format!(" AND location_key = ?{}", args.len()));
        }
        args.push(Box::new(filter.limit as i64));
        sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT ?{}", args.len()));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| {
                Ok(BacktestRow {
                    id: row.get(0)?,
                    event_title: row.get(1)?,
                    market_question: row.get(2)?,
                    risk_profile: row.get(3)?,
                    signal: row.get(4)?,
                    price: row.get(5)?,
                    p_model: row.get(6)?,
                    edge: row.get(7)?,
                    ev_net: row.get(8)?,
                    created_at: row.get(9)?,
                })
            },
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.into())
    }

    /// Count stored analyses
    pub fn count_analyses(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: usize =
            conn.query_row("SELECT COUNT(*) FROM weather_markets", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_sigma(&self, location_key: &str) -> Result<Option<f64>> {
        let conn = self.conn.lock();
        let sigma = conn
            .query_row(
                "SELECT sigma_f FROM forecast_sigma WHERE location_key = ?1",
                params![location_key],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(sigma)
    }

    pub fn upsert_sigma(&self, location_key: &str, sigma_f: f64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO forecast_sigma (location_key, sigma_f, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(location_key) DO UPDATE SET sigma_f = excluded.sigma_f,
                                                     updated_at = excluded.updated_at",
            params![location_key, sigma_f, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn find_summary(&self, cache_key: &str) -> Result<Option<StoredSummary>> {
        let conn = self.conn.lock();
        let summary = conn
            .query_row(
                "SELECT id, cache_key, summary, source, updated_at
                 FROM ai_summaries WHERE cache_key = ?1",
                params![cache_key],
                |row| {
                    Ok(StoredSummary {
                        id: row.get(0)?,
                        cache_key: row.get(1)?,
                        summary: row.get(2)?,
                        source: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    /// Insert or refresh a summary by cache key, returning its row id.
    pub fn upsert_summary(
        &self,
        cache_key: &str,
        summary: &str,
        source: &str,
        model: Option<&str>,
        payload: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ai_summaries (cache_key, summary, source, model, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(cache_key) DO UPDATE SET summary = excluded.summary,
                                                  source = excluded.source,
                                                  model = excluded.model,
                                                  payload = excluded.payload,
                                                  updated_at = excluded.updated_at",
            params![cache_key, summary, source, model, payload, Utc::now().to_rfc3339()],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM ai_summaries WHERE cache_key = ?1",
            params![cache_key],
            |row| row.get(0),
        )?;
        Ok(id)
    }
}

/// Map a `weather_markets` row selected with [`ANALYSIS_COLUMNS`].
///
/// Unreadable gate JSON reads as all gates failed.
fn map_analysis(row: &Row<'_>) -> rusqlite::Result<StoredAnalysis> {
    let side: Option<String> = row.get(5)?;
    let gates: String = row.get(18)?;

    Ok(StoredAnalysis {
        id: row.get(0)?,
        source_market_id: row.get(1)?,
        event_title: row.get(2)?,
        event_url: row.get(3)?,
        market_question: row.get(4)?,
        schema_side: side.and_then(|s| s.parse().ok()),
        threshold_f: row.get(6)?,
        location_name: row.get(7)?,
        target_date: row.get(8)?,
        close_time: row.get(9)?,
        price: row.get(10)?,
        liquidity: row.get(11)?,
        forecast_temp_f: row.get(12)?,
        sigma_f: row.get(13)?,
        risk_profile: row.get(14)?,
        p_model: row.get(15)?,
        edge: row.get(16)?,
        ev_net: row.get(17)?,
        gates: serde_json::from_str(&gates).unwrap_or_default(),
        signal: row.get(19)?,
        status: row.get(20)?,
        unsupported_reason: row.get(21)?,
        summary: row.get(22)?,
        created_at: row.get(23)?,
    })
}

#[async_trait]
impl ResultStore for AnalysisDatabase {
    async fn persist(&self, result: &AnalysisResult) -> Result<i64> {
        self.insert_analysis(result)
    }

    async fn find_baseline(&self, id: i64) -> Result<Option<BaselineRow>> {
        self.get_baseline(id)
    }

    async fn list_history_matching(&self, filter: &HistoryFilter) -> Result<Vec<BacktestRow>> {
        self.get_history(filter)
    }
}

#[async_trait]
impl SigmaStore for AnalysisDatabase {
    async fn lookup(&self, location_key: &str) -> Result<Option<f64>> {
        self.get_sigma(location_key)
    }
}
