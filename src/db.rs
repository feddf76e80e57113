//! Main database implementation

use crate::config::EngineConfig;
use crate::core::record::{Record, RecordDraft};
use crate::core::temporal::{LogicalTime, TimeRange};
use crate::core::value::{EntityId, Value};
use crate::error::{Error, Result};
use crate::query::{optimize, parse_operator, parse_select, EvalResult, Evaluator, Operator};
use crate::storage::{Archive, TableRow};
use crate::trace::Trace;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Recording archive plus the query engine over it
pub struct TraceDB {
    /// Event archive for the recorded run
    archive: Arc<Archive>,
    config: EngineConfig,
    /// Workers for query evaluation
    pool: Arc<rayon::ThreadPool>,
    /// Trace of the last archive version queried
    trace: RwLock<Option<Arc<Trace>>>,
}

impl TraceDB {
    /// Create an empty database with default settings
    pub fn in_memory() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_archive(Arc::new(Archive::new()), config)
    }

    /// Query an archive that may be shared with a recorder
    pub fn with_archive(archive: Arc<Archive>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("timetravel-worker-{i}"))
            .build()?;
        Ok(Self {
            archive,
            config,
            pool: Arc::new(pool),
            trace: RwLock::new(None),
        })
    }

    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Record one event; `None` while recording is paused
    pub fn store(&self, draft: RecordDraft) -> Option<LogicalTime> {
        self.archive.store(draft)
    }

    pub fn pause(&self) {
        self.archive.pause();
    }

    pub fn resume(&self) {
        self.archive.resume();
    }

    pub fn is_recording(&self) -> bool {
        self.archive.is_recording()
    }

    /// Discard the recorded run along with every derived cache
    pub fn reset(&self) {
        self.archive.reset();
        *self.trace.write() = None;
    }

    /// Trace of the current archive contents, rebuilt when stale
    pub fn trace(&self) -> Arc<Trace> {
        if let Some(trace) = self.trace.read().as_ref() {
            if trace.version() == self.archive.version() {
                return Arc::clone(trace);
            }
        }

        let mut slot = self.trace.write();
        if let Some(trace) = slot.as_ref() {
            if trace.version() == self.archive.version() {
                return Arc::clone(trace);
            }
        }
        let (version, journal) = self.archive.snapshot();
        let trace = Arc::new(Trace::new(version, journal, self.config.max_build_depth));
        *slot = Some(Arc::clone(&trace));
        trace
    }

    /// Drop the current trace and its caches, then rebuild
    pub fn rebuild(&self) -> Arc<Trace> {
        *self.trace.write() = None;
        self.trace()
    }

    pub fn by_line(&self, line: u32) -> Vec<Arc<Record>> {
        self.archive.by_line(line)
    }

    pub fn by_entity(&self, entity: EntityId) -> Vec<Arc<Record>> {
        self.archive.by_entity(entity)
    }

    pub fn in_time_range(&self, range: TimeRange) -> Vec<Arc<Record>> {
        self.archive.in_time_range(range)
    }

    /// First and last time `entity` appears in the run
    pub fn lifetime(&self, entity: EntityId) -> Option<TimeRange> {
        self.trace().lifetime(entity)
    }

    /// Reconstruct `entity` as it was at `t`
    pub fn build(&self, entity: EntityId, t: LogicalTime) -> Option<Value> {
        self.trace().build(entity, t)
    }

    /// Reconstruct the value a variable name held at `t`
    pub fn build_name(&self, name: &str, line: Option<u32>, t: LogicalTime) -> Option<Value> {
        self.trace().build_name(name, line, t)
    }

    pub fn export_table(&self) -> Vec<TableRow> {
        self.archive.export_table()
    }

    pub fn import_table(&self, rows: Vec<TableRow>) -> Result<()> {
        self.archive.import_table(rows)?;
        *self.trace.write() = None;
        Ok(())
    }

    /// Evaluate a select list, optionally filtered by a condition, over
    /// `[start, end]` (both default to the recorded span)
    pub fn evaluate(
        &self,
        select: &str,
        where_: Option<&str>,
        start: Option<LogicalTime>,
        end: Option<LogicalTime>,
    ) -> Result<EvalResult> {
        let items = parse_select(select)?;
        let condition = where_.map(parse_operator).transpose()?.map(optimize);

        let trace = self.trace();
        let Some(window) = trace.window(start, end) else {
            tracing::debug!(select, "empty query window");
            return Ok(EvalResult::new());
        };

        let started = Instant::now();
        let evaluator = Evaluator::new(&trace, &self.config);
        // A panic inside a worker is reported like any other failed query.
        let parts = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pool.install(|| {
                items
                    .into_par_iter()
                    .map(|item| {
                        let key = item.operator.to_string();
                        let boolean = item.operator.is_boolean();
                        let mut op = optimize(item.operator);
                        if let Some(condition) = &condition {
                            op = Operator::Where(Box::new(op), Box::new(condition.clone()));
                        }
                        let mut result = (*evaluator.eval(&op, window)?).clone();
                        if boolean {
                            result = result.rename(&[key]);
                        }
                        if !item.targets.is_empty() {
                            result = result.rename(&item.targets);
                        }
                        Ok(result)
                    })
                    .collect::<Result<Vec<_>>>()
            })
        }))
        .map_err(|_| Error::Evaluation("query evaluation panicked".to_string()))??;

        let result = parts.into_iter().fold(EvalResult::new(), EvalResult::join);
        tracing::debug!(
            select,
            %window,
            entries = result.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "query evaluated"
        );
        Ok(result)
    }

    /// [`evaluate`](Self::evaluate) rendered as JSON
    ///
    /// Failures are logged and reported in the document rather than
    /// returned.
    pub fn query(
        &self,
        select: &str,
        where_: Option<&str>,
        start: Option<LogicalTime>,
        end: Option<LogicalTime>,
    ) -> serde_json::Value {
        match self.evaluate(select, where_, start, end) {
            Ok(result) => result.to_json(),
            Err(e) => {
                tracing::error!(select, error = %e, "query failed");
                serde_json::json!({ "keys": [], "error": e.to_string() })
            }
        }
    }

    /// Run [`evaluate`](Self::evaluate) off the async runtime with a deadline
    ///
    /// The evaluation itself is not cancelled; its result is dropped when the
    /// deadline passes first.
    pub async fn query_with_timeout(
        self: &Arc<Self>,
        select: &str,
        where_: Option<&str>,
        start: Option<LogicalTime>,
        end: Option<LogicalTime>,
        timeout: Duration,
    ) -> Result<EvalResult> {
        let db = Arc::clone(self);
        let select = select.to_string();
        let where_ = where_.map(str::to_string);
        let task =
            tokio::task::spawn_blocking(move || db.evaluate(&select, where_.as_deref(), start, end));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Evaluation(format!("query task failed: {e}"))),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{EventKind, FieldKey};

    fn var(name: &str, value: impl Into<Value>, line: u32) -> RecordDraft {
        Record::builder(1, FieldKey::name(name), EventKind::Var)
            .value(value)
            .line(line)
    }

    #[test]
    fn test_store_and_query() {
        let db = TraceDB::in_memory().unwrap();
        db.store(var("x", 1, 1));
        db.store(var("x", 2, 2));
        db.store(var("x", 3, 3));

        let result = db.evaluate("x", Some("x > 1"), None, None).unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.get(0).unwrap().results.is_empty());
        assert_eq!(result.get(2).unwrap().get("x"), Some(&Some(Value::Int(3))));
    }

    #[test]
    fn test_trace_follows_archive_version() {
        let db = TraceDB::in_memory().unwrap();
        db.store(var("x", 1, 1));
        let first = db.trace();
        assert!(Arc::ptr_eq(&first, &db.trace()));

        db.store(var("x", 2, 2));
        let second = db.trace();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(db.build_name("x", None, 1), Some(Value::Int(2)));
    }

    #[test]
    fn test_reset_clears_everything() {
        let db = TraceDB::in_memory().unwrap();
        db.store(var("x", 1, 1));
        db.reset();
        assert!(db.archive().is_empty());
        assert_eq!(db.store(var("y", 1, 1)), Some(0));
        assert_eq!(db.build_name("x", None, 0), None);
    }

    #[test]
    fn test_paused_store_is_dropped() {
        let db = TraceDB::in_memory().unwrap();
        db.pause();
        assert_eq!(db.store(var("x", 1, 1)), None);
        db.resume();
        assert_eq!(db.store(var("x", 1, 1)), Some(0));
    }

    #[test]
    fn test_query_reports_errors() {
        let db = TraceDB::in_memory().unwrap();
        db.store(var("x", 1, 1));
        let doc = db.query("Until(x)", None, None, None);
        assert_eq!(doc["keys"], serde_json::json!([]));
        assert!(doc["error"].as_str().unwrap().contains("Until"));
    }

    #[test]
    fn test_empty_archive_yields_empty_result() {
        let db = TraceDB::in_memory().unwrap();
        assert!(db.evaluate("x", None, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig::default().with_max_build_depth(0);
        assert!(matches!(TraceDB::new(config), Err(Error::Configuration(_))));
        let config = EngineConfig::default().with_float_tolerance(-0.5);
        assert!(matches!(TraceDB::new(config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_oversized_raw_values_degrade_to_none() {
        let db = TraceDB::in_memory().unwrap();
        db.store(var("x", 1, 1));
        let huge_range = "len(range(-9000000000000000000, 9000000000000000000))";
        let huge_list = "[0] * 1000000000000000000";
        let doc = db.query(&format!("Raw('{huge_range}'), Raw('{huge_list}')"), None, None, None);
        assert!(doc.get("error").is_none());
        assert_eq!(doc["(0, 0)"][huge_range], serde_json::Value::Null);
        assert_eq!(doc["(0, 0)"][huge_list], serde_json::Value::Null);
    }
}
