//! # Classification Store
//!
//! SQLite-backed storage for runs, their streams and the activity → run type
//! mapping.
//!
//! ## Tables
//!
//! 1. **runs**: one row per activity, overwritten on re-ingest
//! 2. **run_streams**: per-sample rows, replaced wholesale per activity
//! 3. **run_types**: latest label per activity (primary key on activity ID,
//!    so repeated upserts never duplicate rows)
//! 4. **weather_by_run**: temperature and humidity per activity
//! 5. **oura_sleep** / **oura_readiness**: daily recovery readings, keyed by
//!    day and timestamp
//!
//! ## Example
//!
//! ```rust
//! use run_classifier::{PipelineConfig, RunSummary, RunType, SqliteStore};
//!
//! let mut store = SqliteStore::in_memory().unwrap();
//! for id in 1..=6 {
//!     let km = 4.0 * id as f64;
//!     store.upsert_run(&RunSummary::new(id, None, km, km * 5.5)).unwrap();
//! }
//!
//! let report = store.reclassify(&PipelineConfig::default(), chrono::Utc::now());
//! assert!(report.persisted);
//! assert_eq!(store.run_type_or_unknown(6).unwrap(), RunType::LongRun);
//! assert_eq!(store.run_type_or_unknown(99).unwrap(), RunType::Unknown);
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{debug, info, warn};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::pipeline::{run_pipeline, PipelineReport};
use crate::storage::{ClassificationSink, RunSource};
use crate::summary::{
    ReadinessRecord, RunWeather, SleepRecord, TrainingSummary, READINESS_DAYS, SLEEP_DAYS,
};
use crate::{Classification, PipelineConfig, RunSummary, RunType, StreamSample};

/// Local start times are stored as naive ISO-8601 text.
const START_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const RUN_COLUMNS: &str = "activity_id, start_date_local, run_name, distance_km, \
     moving_time_min, pace_min_per_km, total_elevation_gain_m, average_heartrate, \
     max_heartrate, summary_polyline";

/// SQLite store for runs, streams and labels.
pub struct SqliteStore {
    db: Connection,
    db_path: String,
}

impl SqliteStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a store at the given database path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("[Store] Opened {}", db_path);

        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    /// Path this store was opened with.
    pub fn path(&self) -> &str {
        &self.db_path
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Run summaries (one per activity)
            CREATE TABLE IF NOT EXISTS runs (
                activity_id INTEGER PRIMARY KEY,
                start_date_local TEXT,
                run_name TEXT,
                distance_km REAL NOT NULL,
                moving_time_min REAL NOT NULL,
                pace_min_per_km REAL,
                total_elevation_gain_m REAL NOT NULL DEFAULT 0,
                average_heartrate REAL,
                max_heartrate REAL,
                summary_polyline TEXT
            );

            -- Raw per-sample streams
            CREATE TABLE IF NOT EXISTS run_streams (
                activity_id INTEGER NOT NULL,
                stream_index INTEGER NOT NULL,
                time_sec INTEGER NOT NULL,
                heartrate REAL,
                velocity_smooth REAL,
                distance_m REAL,
                PRIMARY KEY (activity_id, stream_index)
            );

            -- Latest classification per activity
            CREATE TABLE IF NOT EXISTS run_types (
                activity_id INTEGER PRIMARY KEY,
                run_type TEXT NOT NULL,
                classified_at TEXT NOT NULL
            );

            -- Conditions per run
            CREATE TABLE IF NOT EXISTS weather_by_run (
                activity_id INTEGER PRIMARY KEY,
                temp_c REAL,
                humidity_pct REAL
            );

            -- Recovery readings
            CREATE TABLE IF NOT EXISTS oura_sleep (
                day TEXT PRIMARY KEY,
                total_sleep_duration INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS oura_readiness (
                timestamp TEXT PRIMARY KEY,
                score INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_start ON runs(start_date_local);
            CREATE INDEX IF NOT EXISTS idx_streams_time ON run_streams(activity_id, time_sec);
        "#,
        )?;
        debug!("[Store] Schema ready");
        Ok(())
    }

    // ========================================================================
    // Runs & Streams
    // ========================================================================

    /// Insert a run, overwriting any existing row for the same activity.
    pub fn upsert_run(&mut self, run: &RunSummary) -> Result<()> {
        self.upsert_runs(std::slice::from_ref(run))?;
        Ok(())
    }

    /// Insert several runs in one transaction.
    pub fn upsert_runs(&mut self, runs: &[RunSummary]) -> Result<usize> {
        let tx = self.db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO runs
                 (activity_id, start_date_local, run_name, distance_km, moving_time_min,
                  pace_min_per_km, total_elevation_gain_m, average_heartrate, max_heartrate,
                  summary_polyline)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for run in runs {
                stmt.execute(params![
                    run.activity_id,
                    run.start_date_local
                        .map(|d| d.format(START_DATE_FORMAT).to_string()),
                    &run.name,
                    run.distance_km,
                    run.moving_time_min,
                    run.pace_min_per_km,
                    run.total_elevation_gain_m,
                    run.average_heartrate,
                    run.max_heartrate,
                    &run.summary_polyline,
                ])?;
            }
        }
        tx.commit()?;
        debug!("[Store] Upserted {} runs", runs.len());
        Ok(runs.len())
    }

    /// Replace every stream sample of one activity.
    ///
    /// Samples are stored in the given order; `stream_index` is their position.
    pub fn replace_streams(&mut self, activity_id: i64, samples: &[StreamSample]) -> Result<usize> {
        let tx = self.db.transaction()?;
        tx.execute(
            "DELETE FROM run_streams WHERE activity_id = ?",
            params![activity_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO run_streams
                 (activity_id, stream_index, time_sec, heartrate, velocity_smooth, distance_m)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for (index, s) in samples.iter().enumerate() {
                stmt.execute(params![
                    activity_id,
                    index as i64,
                    s.time_sec,
                    s.heartrate,
                    s.velocity_smooth,
                    s.distance_m,
                ])?;
            }
        }
        tx.commit()?;
        debug!(
            "[Store] Stored {} stream samples for activity {}",
            samples.len(),
            activity_id
        );
        Ok(samples.len())
    }

    /// Every stored run, by activity ID.
    pub fn get_runs(&self) -> Result<Vec<RunSummary>> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {} FROM runs ORDER BY activity_id",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map([], run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    /// One stored run.
    pub fn get_run(&self, activity_id: i64) -> Result<Option<RunSummary>> {
        let run = self
            .db
            .query_row(
                &format!("SELECT {} FROM runs WHERE activity_id = ?", RUN_COLUMNS),
                params![activity_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    /// Stream samples of one activity, ordered by elapsed time.
    pub fn get_streams(&self, activity_id: i64) -> Result<Vec<StreamSample>> {
        let mut stmt = self.db.prepare(
            "SELECT activity_id, time_sec, heartrate, velocity_smooth, distance_m
             FROM run_streams WHERE activity_id = ? ORDER BY time_sec, stream_index",
        )?;
        let samples = stmt
            .query_map(params![activity_id], sample_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(samples)
    }

    pub fn run_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========================================================================
    // Classifications
    // ========================================================================

    /// Upsert labels keyed by activity ID, in one transaction.
    pub fn upsert_classifications(&mut self, classifications: &[Classification]) -> Result<usize> {
        write_classifications(&self.db, classifications)
    }

    /// Reclassify every stored run and persist the labels with `now`.
    pub fn reclassify(&mut self, config: &PipelineConfig, now: DateTime<Utc>) -> PipelineReport {
        let mut writer = LabelWriter { db: &self.db };
        run_pipeline(&*self, &mut writer, config, now)
    }

    /// Current label for one activity, if any.
    pub fn get_classification(&self, activity_id: i64) -> Result<Option<Classification>> {
        let raw = self
            .db
            .query_row(
                "SELECT activity_id, run_type, classified_at FROM run_types WHERE activity_id = ?",
                params![activity_id],
                raw_classification,
            )
            .optional()?;
        raw.map(RawClassification::parse).transpose()
    }

    /// Current label for one activity, or [`RunType::Unknown`].
    pub fn run_type_or_unknown(&self, activity_id: i64) -> Result<RunType> {
        Ok(self
            .get_classification(activity_id)?
            .map_or(RunType::Unknown, |c| c.run_type))
    }

    /// The full current mapping, by activity ID.
    pub fn all_classifications(&self) -> Result<Vec<Classification>> {
        let mut stmt = self.db.prepare(
            "SELECT activity_id, run_type, classified_at FROM run_types ORDER BY activity_id",
        )?;
        let raw = stmt
            .query_map([], raw_classification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawClassification::parse).collect()
    }

    /// Activity ID → label, for table views.
    pub fn classification_map(&self) -> Result<HashMap<i64, RunType>> {
        Ok(self
            .all_classifications()?
            .into_iter()
            .map(|c| (c.activity_id, c.run_type))
            .collect())
    }

    /// How many activities carry each label.
    pub fn run_type_counts(&self) -> Result<BTreeMap<RunType, usize>> {
        let mut stmt = self
            .db
            .prepare("SELECT run_type, COUNT(*) FROM run_types GROUP BY run_type")?;
        let raw: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = BTreeMap::new();
        for (label, count) in raw {
            counts.insert(label.parse::<RunType>()?, count as usize);
        }
        Ok(counts)
    }

    /// Drop every stored label.
    pub fn clear_classifications(&mut self) -> Result<()> {
        self.db.execute("DELETE FROM run_types", [])?;
        info!("[Store] Cleared classifications");
        Ok(())
    }

    // ========================================================================
    // Weather & Recovery
    // ========================================================================

    /// Store weather readings, overwriting any existing row per activity.
    pub fn upsert_weather(&mut self, readings: &[RunWeather]) -> Result<usize> {
        let tx = self.db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO weather_by_run (activity_id, temp_c, humidity_pct)
                 VALUES (?, ?, ?)",
            )?;
            for w in readings {
                stmt.execute(params![w.activity_id, w.temp_c, w.humidity_pct])?;
            }
        }
        tx.commit()?;
        debug!("[Store] Upserted weather for {} runs", readings.len());
        Ok(readings.len())
    }

    /// Activity ID → weather at the time of the run.
    pub fn weather_by_run(&self) -> Result<HashMap<i64, RunWeather>> {
        let mut stmt = self
            .db
            .prepare("SELECT activity_id, temp_c, humidity_pct FROM weather_by_run")?;
        let readings = stmt
            .query_map([], |row| {
                Ok(RunWeather {
                    activity_id: row.get(0)?,
                    temp_c: row.get(1)?,
                    humidity_pct: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(readings.into_iter().map(|w| (w.activity_id, w)).collect())
    }

    /// Store nightly sleep totals, one row per day.
    pub fn upsert_sleep(&mut self, nights: &[SleepRecord]) -> Result<usize> {
        let tx = self.db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO oura_sleep (day, total_sleep_duration) VALUES (?, ?)",
            )?;
            for night in nights {
                stmt.execute(params![night.day.to_string(), night.total_sleep_duration])?;
            }
        }
        tx.commit()?;
        debug!("[Store] Upserted {} sleep records", nights.len());
        Ok(nights.len())
    }

    /// The latest five nights, newest first.
    pub fn recent_sleep(&self) -> Result<Vec<SleepRecord>> {
        let mut stmt = self.db.prepare(
            "SELECT day, total_sleep_duration FROM oura_sleep ORDER BY day DESC LIMIT ?",
        )?;
        let nights = stmt
            .query_map(params![SLEEP_DAYS as i64], |row| {
                let day: String = row.get(0)?;
                Ok(SleepRecord {
                    day: parse_text(0, &day, |s| s.parse::<NaiveDate>())?,
                    total_sleep_duration: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nights)
    }

    /// Store daily readiness scores, one row per timestamp.
    pub fn upsert_readiness(&mut self, scores: &[ReadinessRecord]) -> Result<usize> {
        let tx = self.db.transaction()?;
        {
            let mut stmt = tx
                .prepare("INSERT OR REPLACE INTO oura_readiness (timestamp, score) VALUES (?, ?)")?;
            for r in scores {
                stmt.execute(params![
                    r.timestamp.format(START_DATE_FORMAT).to_string(),
                    r.score
                ])?;
            }
        }
        tx.commit()?;
        debug!("[Store] Upserted {} readiness scores", scores.len());
        Ok(scores.len())
    }

    /// The latest seven readiness scores, newest first.
    pub fn recent_readiness(&self) -> Result<Vec<ReadinessRecord>> {
        let mut stmt = self.db.prepare(
            "SELECT timestamp, score FROM oura_readiness ORDER BY timestamp DESC LIMIT ?",
        )?;
        let scores = stmt
            .query_map(params![READINESS_DAYS as i64], |row| {
                let timestamp: String = row.get(0)?;
                Ok(ReadinessRecord {
                    timestamp: parse_text(0, &timestamp, |s| {
                        NaiveDateTime::parse_from_str(s, START_DATE_FORMAT)
                    })?,
                    score: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scores)
    }

    /// Four-week summary of the stored runs with their labels, weather and
    /// the latest recovery readings.
    ///
    /// Unreadable recovery rows leave those sections empty.
    pub fn training_summary(&self, now: NaiveDateTime) -> Result<Option<TrainingSummary>> {
        let runs = self.get_runs()?;
        let labels = self.classification_map()?;
        let weather = self.weather_by_run()?;
        let Some(summary) = TrainingSummary::last_four_weeks(&runs, &labels, &weather, now) else {
            return Ok(None);
        };

        let sleep = self.recent_sleep().unwrap_or_else(|e| {
            warn!("[Store] Sleep readings unavailable: {}", e);
            Vec::new()
        });
        let readiness = self.recent_readiness().unwrap_or_else(|e| {
            warn!("[Store] Readiness readings unavailable: {}", e);
            Vec::new()
        });
        Ok(Some(summary.with_recovery(sleep, readiness)))
    }
}

fn write_classifications(db: &Connection, classifications: &[Classification]) -> Result<usize> {
    let tx = db.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO run_types (activity_id, run_type, classified_at)
             VALUES (?, ?, ?)
             ON CONFLICT(activity_id) DO UPDATE SET
                run_type = excluded.run_type,
                classified_at = excluded.classified_at",
        )?;
        for c in classifications {
            stmt.execute(params![
                c.activity_id,
                c.run_type.as_str(),
                c.classified_at.to_rfc3339(),
            ])?;
        }
    }
    tx.commit()?;
    info!("[Store] Upserted {} classifications", classifications.len());
    Ok(classifications.len())
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunSummary> {
    let start: Option<String> = row.get(1)?;
    let start_date_local = start
        .map(|s| parse_text(1, &s, |s| NaiveDateTime::parse_from_str(s, START_DATE_FORMAT)))
        .transpose()?;

    Ok(RunSummary {
        activity_id: row.get(0)?,
        start_date_local,
        name: row.get(2)?,
        distance_km: row.get(3)?,
        moving_time_min: row.get(4)?,
        pace_min_per_km: row.get(5)?,
        total_elevation_gain_m: row.get(6)?,
        average_heartrate: row.get(7)?,
        max_heartrate: row.get(8)?,
        summary_polyline: row.get(9)?,
    })
}

/// Parse a text column, reporting failures as a conversion error on `index`.
fn parse_text<T, E>(
    index: usize,
    text: &str,
    parse: impl FnOnce(&str) -> std::result::Result<T, E>,
) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    parse(text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<StreamSample> {
    Ok(StreamSample {
        activity_id: row.get(0)?,
        time_sec: row.get(1)?,
        heartrate: row.get(2)?,
        velocity_smooth: row.get(3)?,
        distance_m: row.get(4)?,
    })
}

/// A `run_types` row before its text columns are parsed.
struct RawClassification {
    activity_id: i64,
    run_type: String,
    classified_at: String,
}

fn raw_classification(row: &Row<'_>) -> rusqlite::Result<RawClassification> {
    Ok(RawClassification {
        activity_id: row.get(0)?,
        run_type: row.get(1)?,
        classified_at: row.get(2)?,
    })
}

impl RawClassification {
    fn parse(self) -> Result<Classification> {
        let classified_at = DateTime::parse_from_rfc3339(&self.classified_at)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);
        Ok(Classification {
            activity_id: self.activity_id,
            run_type: self.run_type.parse()?,
            classified_at,
        })
    }
}

// ============================================================================
// Storage interface
// ============================================================================

impl RunSource for SqliteStore {
    fn load_runs(&self) -> Result<Vec<RunSummary>> {
        self.get_runs()
    }

    fn load_streams(&self, activity_ids: &[i64]) -> Result<Vec<StreamSample>> {
        let mut samples = Vec::new();
        for &id in activity_ids {
            samples.extend(self.get_streams(id)?);
        }
        Ok(samples)
    }
}

/// Sink over a borrowed connection, so one store can be read and written
/// within the same pipeline run.
struct LabelWriter<'a> {
    db: &'a Connection,
}

impl ClassificationSink for LabelWriter<'_> {
    fn upsert_classifications(&mut self, classifications: &[Classification]) -> Result<usize> {
        write_classifications(self.db, classifications)
    }
}

impl ClassificationSink for SqliteStore {
    fn upsert_classifications(&mut self, classifications: &[Classification]) -> Result<usize> {
        SqliteStore::upsert_classifications(self, classifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start(day: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 5, day).and_then(|d| d.and_hms_opt(7, 30, 0))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn label(activity_id: i64, run_type: RunType, secs: i64) -> Classification {
        Classification {
            activity_id,
            run_type,
            classified_at: at(secs),
        }
    }

    #[test]
    fn test_run_roundtrip() {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut run = RunSummary::new(42, start(3), 10.0, 55.0)
            .with_heartrate(Some(148.0), Some(171.0))
            .with_elevation(Some(87.0));
        run.name = Some("Morning Run".to_string());
        run.summary_polyline = Some("_p~iF~ps|U_ulLnnqC_mqNvxq`@".to_string());
        store.upsert_run(&run).unwrap();

        assert_eq!(store.get_run(42).unwrap(), Some(run.clone()));
        assert_eq!(store.get_run(7).unwrap(), None);

        // Re-ingest overwrites
        let updated = RunSummary::new(42, start(3), 10.5, 57.0);
        store.upsert_run(&updated).unwrap();
        assert_eq!(store.run_count().unwrap(), 1);
        assert_eq!(store.get_run(42).unwrap(), Some(updated));
    }

    #[test]
    fn test_replace_streams() {
        let mut store = SqliteStore::in_memory().unwrap();
        let first: Vec<StreamSample> = (0..20)
            .map(|t| StreamSample::new(1, t, Some(140.0), Some(3.0)))
            .collect();
        store.replace_streams(1, &first).unwrap();
        assert_eq!(store.get_streams(1).unwrap().len(), 20);

        let second: Vec<StreamSample> = (0..5)
            .rev()
            .map(|t| StreamSample::new(1, t, None, Some(2.5)))
            .collect();
        store.replace_streams(1, &second).unwrap();

        let stored = store.get_streams(1).unwrap();
        assert_eq!(stored.len(), 5);
        let times: Vec<i64> = stored.iter().map(|s| s.time_sec).collect();
        assert_eq!(times, vec![0, 1, 2, 3, 4]);
        assert!(store.get_streams(2).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_overwrites_without_duplicates() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .upsert_classifications(&[
                label(1, RunType::EasyRun, 1_000),
                label(2, RunType::LongRun, 1_000),
            ])
            .unwrap();
        store
            .upsert_classifications(&[
                label(1, RunType::TempoRun, 2_000),
                label(3, RunType::Interval, 2_000),
            ])
            .unwrap();

        let all = store.all_classifications().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], label(1, RunType::TempoRun, 2_000));
        assert_eq!(all[1], label(2, RunType::LongRun, 1_000));
        assert_eq!(
            store.get_classification(1).unwrap().unwrap().classified_at,
            at(2_000)
        );
    }

    #[test]
    fn test_run_type_or_unknown() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .upsert_classifications(&[label(5, RunType::SpeedWork, 0)])
            .unwrap();
        assert_eq!(store.run_type_or_unknown(5).unwrap(), RunType::SpeedWork);
        assert_eq!(store.run_type_or_unknown(6).unwrap(), RunType::Unknown);
    }

    #[test]
    fn test_run_type_counts() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .upsert_classifications(&[
                label(1, RunType::EasyRun, 0),
                label(2, RunType::EasyRun, 0),
                label(3, RunType::LongRun, 0),
            ])
            .unwrap();
        let counts = store.run_type_counts().unwrap();
        assert_eq!(counts.get(&RunType::EasyRun), Some(&2));
        assert_eq!(counts.get(&RunType::LongRun), Some(&1));
        assert_eq!(counts.get(&RunType::Interval), None);

        store.clear_classifications().unwrap();
        assert!(store.run_type_counts().unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_label_is_an_error() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .db
            .execute(
                "INSERT INTO run_types (activity_id, run_type, classified_at) VALUES (1, 'jog', ?)",
                params![at(0).to_rfc3339()],
            )
            .unwrap();
        assert!(matches!(
            store.get_classification(1),
            Err(crate::ClassifyError::InvalidRunType { .. })
        ));
    }

    #[test]
    fn test_reclassify_stored_runs() {
        let mut store = SqliteStore::in_memory().unwrap();
        let runs: Vec<RunSummary> = (1..=6)
            .map(|id| RunSummary::new(id, start(id as u32), 4.0 * id as f64, 22.0 * id as f64))
            .collect();
        store.upsert_runs(&runs).unwrap();

        let report = store.reclassify(&PipelineConfig::default(), at(5_000));
        assert!(report.persisted);
        assert_eq!(report.runs, 6);
        assert_eq!(store.all_classifications().unwrap().len(), 6);
        assert_eq!(store.run_type_or_unknown(4).unwrap(), RunType::LongRun);

        // Same data, same labels
        let before = store.classification_map().unwrap();
        store.reclassify(&PipelineConfig::default(), at(6_000));
        assert_eq!(store.classification_map().unwrap(), before);
        assert_eq!(store.get_classification(1).unwrap().unwrap().classified_at, at(6_000));
    }

    #[test]
    fn test_load_streams_for_batch() {
        let mut store = SqliteStore::in_memory().unwrap();
        for id in 1..=3 {
            let samples: Vec<StreamSample> = (0..4)
                .map(|t| StreamSample::new(id, t, Some(150.0), Some(3.0)))
                .collect();
            store.replace_streams(id, &samples).unwrap();
        }
        let loaded = store.load_streams(&[3, 1]).unwrap();
        assert_eq!(loaded.len(), 8);
        assert!(loaded[..4].iter().all(|s| s.activity_id == 3));
    }

    #[test]
    fn test_weather_roundtrip() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .upsert_weather(&[
                RunWeather {
                    activity_id: 1,
                    temp_c: Some(18.5),
                    humidity_pct: Some(72.0),
                },
                RunWeather {
                    activity_id: 2,
                    temp_c: Some(9.0),
                    humidity_pct: None,
                },
            ])
            .unwrap();
        // Re-ingest overwrites
        store
            .upsert_weather(&[RunWeather {
                activity_id: 1,
                temp_c: Some(19.0),
                humidity_pct: Some(70.0),
            }])
            .unwrap();

        let weather = store.weather_by_run().unwrap();
        assert_eq!(weather.len(), 2);
        assert_eq!(weather[&1].temp_c, Some(19.0));
        assert_eq!(weather[&2].humidity_pct, None);
    }

    #[test]
    fn test_recovery_reads_latest_rows() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert!(store.recent_sleep().unwrap().is_empty());
        assert!(store.recent_readiness().unwrap().is_empty());

        let nights: Vec<SleepRecord> = (1..=9)
            .map(|d| SleepRecord {
                day: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
                total_sleep_duration: 27_000,
            })
            .collect();
        store.upsert_sleep(&nights).unwrap();
        let scores: Vec<ReadinessRecord> = (1..=9)
            .map(|d| ReadinessRecord {
                timestamp: start(d).unwrap(),
                score: 70 + d as i64,
            })
            .collect();
        store.upsert_readiness(&scores).unwrap();

        let sleep = store.recent_sleep().unwrap();
        assert_eq!(sleep.len(), SLEEP_DAYS);
        assert_eq!(sleep[0].day, NaiveDate::from_ymd_opt(2024, 5, 9).unwrap());
        assert_eq!(sleep[4].day, NaiveDate::from_ymd_opt(2024, 5, 5).unwrap());

        let readiness = store.recent_readiness().unwrap();
        assert_eq!(readiness.len(), READINESS_DAYS);
        assert_eq!(readiness[0], scores[8]);
        assert_eq!(readiness[6].score, 73);
    }

    #[test]
    fn test_training_summary_joins_stored_tables() {
        let mut store = SqliteStore::in_memory().unwrap();
        let now = start(20).unwrap();
        assert_eq!(store.training_summary(now).unwrap(), None);

        store
            .upsert_runs(&[
                RunSummary::new(1, start(10), 12.0, 66.0),
                RunSummary::new(2, start(12), 6.0, 30.0),
            ])
            .unwrap();
        store
            .upsert_classifications(&[label(2, RunType::TempoRun, 0)])
            .unwrap();
        store
            .upsert_weather(&[RunWeather {
                activity_id: 2,
                temp_c: Some(22.0),
                humidity_pct: Some(55.0),
            }])
            .unwrap();
        store
            .upsert_sleep(&[SleepRecord {
                day: NaiveDate::from_ymd_opt(2024, 5, 19).unwrap(),
                total_sleep_duration: 28_800,
            }])
            .unwrap();

        let summary = store.training_summary(now).unwrap().unwrap();
        assert_eq!(summary.run_count, 2);
        assert_eq!(summary.recent[0].run_type, RunType::TempoRun);
        assert_eq!(summary.recent[0].temp_c, Some(22.0));
        assert_eq!(summary.recent[1].run_type, RunType::Unknown);
        assert_eq!(summary.sleep.len(), 1);
        assert!(summary.readiness.is_empty());
        assert!(summary.to_string().contains("- 2024-05-19: 8.0 hrs sleep"));
    }

    #[test]
    fn test_unreadable_sleep_row_leaves_section_empty() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.upsert_run(&RunSummary::new(1, start(10), 5.0, 27.5)).unwrap();
        store
            .db
            .execute(
                "INSERT INTO oura_sleep (day, total_sleep_duration) VALUES ('yesterday', 1)",
                [],
            )
            .unwrap();

        assert!(store.recent_sleep().is_err());
        let summary = store.training_summary(start(12).unwrap()).unwrap().unwrap();
        assert!(summary.sleep.is_empty());
        assert_eq!(summary.run_count, 1);
    }
}
