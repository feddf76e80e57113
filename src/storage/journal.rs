//! Event journal: append-only storage for records, and the archive that
//! owns the logical clock

use crate::core::record::{EventKind, FieldKey, Record, RecordDraft};
use crate::core::temporal::{LogicalTime, TimeRange};
use crate::core::value::EntityId;
use crate::error::{Error, Result};
use crate::storage::table::TableRow;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for event journal implementations
pub trait EventJournal: Send + Sync {
    /// Append a timed record; times must be strictly increasing
    fn append(&mut self, record: Record) -> Result<()>;

    /// Version number the next record for `(entity, field)` will receive
    fn next_record_id(&self, entity: EntityId, field: &FieldKey) -> u64;

    /// All records in time order
    fn records(&self) -> &[Arc<Record>];

    /// Record stored at exactly `t`
    fn at(&self, t: LogicalTime) -> Option<&Arc<Record>>;

    /// Records of one (entity, field) slot, oldest first
    fn by_key(&self, entity: EntityId, field: &FieldKey) -> Vec<Arc<Record>>;

    /// Records touching an entity
    fn by_entity(&self, entity: EntityId) -> Vec<Arc<Record>>;

    /// Records emitted from a source line
    fn by_line(&self, line: u32) -> Vec<Arc<Record>>;

    /// Records of one kind
    fn by_kind(&self, kind: EventKind) -> Vec<Arc<Record>>;

    /// Records with time in `range`
    fn in_time_range(&self, range: TimeRange) -> &[Arc<Record>];

    /// Drop every record
    fn clear(&mut self);
}

/// In-memory implementation of event journal
#[derive(Debug, Clone, Default)]
pub struct InMemoryJournal {
    /// Records ordered by time
    records: Vec<Arc<Record>>,
    /// Positions per (entity, field) slot
    by_key: HashMap<(EntityId, FieldKey), Vec<usize>>,
    /// Positions per entity
    by_entity: HashMap<EntityId, Vec<usize>>,
    /// Positions per source line
    by_line: HashMap<u32, Vec<usize>>,
    /// Positions per kind
    by_kind: HashMap<EventKind, Vec<usize>>,
}

impl InMemoryJournal {
    /// Create a new in-memory journal
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Time of the latest record
    pub fn last_time(&self) -> Option<LogicalTime> {
        self.records.last().map(|r| r.time)
    }

    /// Time of the earliest record
    pub fn first_time(&self) -> Option<LogicalTime> {
        self.records.first().map(|r| r.time)
    }

    /// Every distinct entity that has records
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.by_entity.keys().copied()
    }

    fn collect(&self, positions: Option<&Vec<usize>>) -> Vec<Arc<Record>> {
        positions
            .map(|ps| ps.iter().map(|&p| Arc::clone(&self.records[p])).collect())
            .unwrap_or_default()
    }
}

impl EventJournal for InMemoryJournal {
    fn append(&mut self, record: Record) -> Result<()> {
        if let Some(last) = self.last_time() {
            if record.time <= last {
                return Err(Error::Temporal(format!(
                    "record at {} does not follow last record at {}",
                    record.time, last
                )));
            }
        }

        let position = self.records.len();
        self.by_key
            .entry(record.key())
            .or_insert_with(Vec::new)
            .push(position);
        self.by_entity
            .entry(record.entity)
            .or_insert_with(Vec::new)
            .push(position);
        self.by_line
            .entry(record.line)
            .or_insert_with(Vec::new)
            .push(position);
        self.by_kind
            .entry(record.kind)
            .or_insert_with(Vec::new)
            .push(position);
        self.records.push(Arc::new(record));
        Ok(())
    }

    fn next_record_id(&self, entity: EntityId, field: &FieldKey) -> u64 {
        self.by_key
            .get(&(entity, field.clone()))
            .map(|ps| ps.len() as u64)
            .unwrap_or(0)
    }

    fn records(&self) -> &[Arc<Record>] {
        &self.records
    }

    fn at(&self, t: LogicalTime) -> Option<&Arc<Record>> {
        self.records
            .binary_search_by_key(&t, |r| r.time)
            .ok()
            .map(|idx| &self.records[idx])
    }

    fn by_key(&self, entity: EntityId, field: &FieldKey) -> Vec<Arc<Record>> {
        self.collect(self.by_key.get(&(entity, field.clone())))
    }

    fn by_entity(&self, entity: EntityId) -> Vec<Arc<Record>> {
        self.collect(self.by_entity.get(&entity))
    }

    fn by_line(&self, line: u32) -> Vec<Arc<Record>> {
        self.collect(self.by_line.get(&line))
    }

    fn by_kind(&self, kind: EventKind) -> Vec<Arc<Record>> {
        self.collect(self.by_kind.get(&kind))
    }

    fn in_time_range(&self, range: TimeRange) -> &[Arc<Record>] {
        let start = self.records.partition_point(|r| r.time < range.first);
        let end = self.records.partition_point(|r| r.time <= range.last);
        &self.records[start..end]
    }

    fn clear(&mut self) {
        self.records.clear();
        self.by_key.clear();
        self.by_entity.clear();
        self.by_line.clear();
        self.by_kind.clear();
    }
}

/// The archive of one recorded run
///
/// Owns the logical clock and the journal. Allocating a time and appending
/// the record happen under one write lock, so journal order is clock order.
pub struct Archive {
    journal: RwLock<InMemoryJournal>,
    clock: AtomicU64,
    recording: AtomicBool,
    /// Bumped on every change; lets readers detect a stale snapshot
    version: AtomicU64,
}

impl Archive {
    /// Create an empty archive that is recording
    pub fn new() -> Self {
        Self {
            journal: RwLock::new(InMemoryJournal::new()),
            clock: AtomicU64::new(0),
            recording: AtomicBool::new(true),
            version: AtomicU64::new(0),
        }
    }

    /// Next logical time; strictly increasing, never reused within a run
    pub fn allocate_time(&self) -> LogicalTime {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// Time stamp and append a record
    ///
    /// Returns `None` without touching the log while recording is paused.
    pub fn store(&self, draft: RecordDraft) -> Option<LogicalTime> {
        if !self.is_recording() {
            return None;
        }

        let mut journal = self.journal.write();
        let time = self.allocate_time();
        let record_id = journal.next_record_id(draft.entity, &draft.field);
        let record = draft.into_record(time, record_id);
        tracing::trace!(
            time,
            entity = record.entity,
            field = %record.field,
            kind = %record.kind,
            "stored record"
        );
        if let Err(e) = journal.append(record) {
            tracing::error!(error = %e, "journal rejected record");
            return None;
        }
        self.version.fetch_add(1, Ordering::SeqCst);
        Some(time)
    }

    /// Stop recording; internal code can run without polluting the log
    pub fn pause(&self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    /// Resume recording
    pub fn resume(&self) {
        self.recording.store(true, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Discard the run: clear every record and restart the clock
    pub fn reset(&self) {
        let mut journal = self.journal.write();
        journal.clear();
        self.clock.store(0, Ordering::SeqCst);
        self.version.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("archive reset");
    }

    /// Change counter, see [`Archive::snapshot`]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Copy of the journal together with the version it reflects
    pub fn snapshot(&self) -> (u64, InMemoryJournal) {
        let journal = self.journal.read();
        (self.version(), journal.clone())
    }

    /// Run `f` against the journal under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&InMemoryJournal) -> R) -> R {
        f(&self.journal.read())
    }

    pub fn len(&self) -> usize {
        self.journal.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.journal.read().is_empty()
    }

    pub fn last_time(&self) -> Option<LogicalTime> {
        self.journal.read().last_time()
    }

    pub fn by_line(&self, line: u32) -> Vec<Arc<Record>> {
        self.journal.read().by_line(line)
    }

    pub fn by_entity(&self, entity: EntityId) -> Vec<Arc<Record>> {
        self.journal.read().by_entity(entity)
    }

    pub fn by_kind(&self, kind: EventKind) -> Vec<Arc<Record>> {
        self.journal.read().by_kind(kind)
    }

    pub fn in_time_range(&self, range: TimeRange) -> Vec<Arc<Record>> {
        self.journal.read().in_time_range(range).to_vec()
    }

    /// Flat table of every record, sorted by time
    pub fn export_table(&self) -> Vec<TableRow> {
        self.journal
            .read()
            .records()
            .iter()
            .map(|r| TableRow::from(r.as_ref()))
            .collect()
    }

    /// Replace the archive contents with previously exported rows
    ///
    /// Times are kept as exported; the clock continues after the last row.
    pub fn import_table(&self, mut rows: Vec<TableRow>) -> Result<()> {
        rows.sort_by_key(|row| row.time);
        let mut imported = InMemoryJournal::new();
        let mut next = 0;
        for row in rows {
            let record = Record::from(row);
            next = record.time + 1;
            imported.append(record)?;
        }

        // The current run is only replaced once every row was accepted.
        let mut journal = self.journal.write();
        *journal = imported;
        self.clock.store(next, Ordering::SeqCst);
        self.version.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(records = journal.len(), "imported table");
        Ok(())
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}
