//! Run statistics and the periodic publisher feeding progress listeners.
//!
//! Counters are plain atomics updated with `Relaxed` ordering by the import
//! engine; the publisher reads them from its own task, so a snapshot can lag
//! behind by an in-flight update. They drive progress output only.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::Stage;

/// Shared counter block for one migration run.
#[derive(Debug)]
pub struct ImportStatistics {
    run_id: Uuid,
    started: Instant,
    stage: Mutex<Option<Stage>>,
    entities: AtomicU64,
    relationships: AtomicU64,
    hierarchies: AtomicU64,
    vertex_types: AtomicU64,
    edge_types: AtomicU64,
    aggregated_edge_types: AtomicU64,
    records_total: AtomicU64,
    records_analyzed: AtomicU64,
    vertices_created: AtomicU64,
    vertices_updated: AtomicU64,
    edges_created: AtomicU64,
    edges_updated: AtomicU64,
    rows_skipped: AtomicU64,
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl Default for ImportStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportStatistics {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            stage: Mutex::new(None),
            entities: AtomicU64::new(0),
            relationships: AtomicU64::new(0),
            hierarchies: AtomicU64::new(0),
            vertex_types: AtomicU64::new(0),
            edge_types: AtomicU64::new(0),
            aggregated_edge_types: AtomicU64::new(0),
            records_total: AtomicU64::new(0),
            records_analyzed: AtomicU64::new(0),
            vertices_created: AtomicU64::new(0),
            vertices_updated: AtomicU64::new(0),
            edges_created: AtomicU64::new(0),
            edges_updated: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            warnings: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record a recoverable problem. Logged at warn level.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message);
        }
    }

    /// Record a skipped structural element. Logged at error level; the run continues.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message);
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn set_stage(&self, stage: Stage) {
        if let Ok(mut current) = self.stage.lock() {
            *current = Some(stage);
        }
    }

    pub fn set_schema_counts(&self, entities: usize, relationships: usize) {
        self.entities.store(entities as u64, Ordering::Relaxed);
        self.relationships.store(relationships as u64, Ordering::Relaxed);
    }

    pub fn set_hierarchy_count(&self, hierarchies: usize) {
        self.hierarchies.store(hierarchies as u64, Ordering::Relaxed);
    }

    pub fn set_graph_counts(&self, vertex_types: usize, edge_types: usize, aggregated: usize) {
        self.vertex_types.store(vertex_types as u64, Ordering::Relaxed);
        self.edge_types.store(edge_types as u64, Ordering::Relaxed);
        self.aggregated_edge_types.store(aggregated as u64, Ordering::Relaxed);
    }

    pub fn add_records_total(&self, rows: u64) {
        self.records_total.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn record_analyzed(&self) {
        self.records_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.rows_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn vertex_written(&self, created: bool) {
        let counter = if created { &self.vertices_created } else { &self.vertices_updated };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn edge_written(&self, created: bool) {
        let counter = if created { &self.edges_created } else { &self.edges_updated };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatisticsSnapshot {
            run_id: self.run_id,
            stage: self.stage.lock().ok().and_then(|s| *s),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            entities: load(&self.entities),
            relationships: load(&self.relationships),
            hierarchies: load(&self.hierarchies),
            vertex_types: load(&self.vertex_types),
            edge_types: load(&self.edge_types),
            aggregated_edge_types: load(&self.aggregated_edge_types),
            records_total: load(&self.records_total),
            records_analyzed: load(&self.records_analyzed),
            vertices_created: load(&self.vertices_created),
            vertices_updated: load(&self.vertices_updated),
            edges_created: load(&self.edges_created),
            edges_updated: load(&self.edges_updated),
            rows_skipped: load(&self.rows_skipped),
            warnings: self.warnings.lock().map(|w| w.len()).unwrap_or_default(),
            errors: self.errors.lock().map(|e| e.len()).unwrap_or_default(),
        }
    }
}

/// Point-in-time copy of [`ImportStatistics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub run_id: Uuid,
    pub stage: Option<Stage>,
    pub elapsed_ms: u64,
    pub entities: u64,
    pub relationships: u64,
    pub hierarchies: u64,
    pub vertex_types: u64,
    pub edge_types: u64,
    pub aggregated_edge_types: u64,
    pub records_total: u64,
    pub records_analyzed: u64,
    pub vertices_created: u64,
    pub vertices_updated: u64,
    pub edges_created: u64,
    pub edges_updated: u64,
    pub rows_skipped: u64,
    pub warnings: usize,
    pub errors: usize,
}

impl StatisticsSnapshot {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Share of source records analyzed so far, 0.0 to 100.0.
    pub fn percentage(&self) -> f64 {
        if self.records_total == 0 {
            return if self.stage == Some(Stage::Done) { 100.0 } else { 0.0 };
        }
        (self.records_analyzed as f64 / self.records_total as f64 * 100.0).min(100.0)
    }

    /// Linear extrapolation from the rate observed so far.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.records_analyzed == 0 || self.records_total == 0 {
            return None;
        }
        let remaining = self.records_total.saturating_sub(self.records_analyzed);
        let per_record = self.elapsed_ms as f64 / self.records_analyzed as f64;
        Some(Duration::from_millis((per_record * remaining as f64) as u64))
    }

    pub fn vertices(&self) -> u64 {
        self.vertices_created + self.vertices_updated
    }

    pub fn edges(&self) -> u64 {
        self.edges_created + self.edges_updated
    }
}

/// Receives snapshots from a [`StatisticsPublisher`]. Must not block.
pub trait StatisticsListener: Send + Sync {
    fn on_statistics(&self, snapshot: &StatisticsSnapshot);
}

/// Logs each snapshot through `tracing`.
#[derive(Debug, Default)]
pub struct LogListener;

impl StatisticsListener for LogListener {
    fn on_statistics(&self, snapshot: &StatisticsSnapshot) {
        info!(
            stage = ?snapshot.stage,
            progress = format!("{:.1}%", snapshot.percentage()),
            analyzed = snapshot.records_analyzed,
            total = snapshot.records_total,
            vertices = snapshot.vertices(),
            edges = snapshot.edges(),
            warnings = snapshot.warnings,
            "Migration progress"
        );
    }
}

/// Fixed-interval task fanning snapshots out to listeners.
pub struct StatisticsPublisher {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl StatisticsPublisher {
    /// Spawn the ticker on the current tokio runtime.
    pub fn start(
        stats: Arc<ImportStatistics>,
        listeners: Vec<Arc<dyn StatisticsListener>>,
        period: Duration,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => publish(&stats, &listeners),
                    _ = &mut stopped => {
                        publish(&stats, &listeners);
                        break;
                    }
                }
            }
        });
        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Stop ticking after one final publication.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "Statistics publisher ended abnormally");
        }
    }
}

fn publish(stats: &ImportStatistics, listeners: &[Arc<dyn StatisticsListener>]) {
    let snapshot = stats.snapshot();
    for listener in listeners {
        listener.on_statistics(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<StatisticsSnapshot>>,
    }

    impl StatisticsListener for Recorder {
        fn on_statistics(&self, snapshot: &StatisticsSnapshot) {
            self.seen.lock().unwrap().push(snapshot.clone());
        }
    }

    #[test]
    fn test_counters_and_percentage() {
        let stats = ImportStatistics::new();
        stats.add_records_total(4);
        stats.record_analyzed();
        stats.vertex_written(true);
        stats.vertex_written(false);
        stats.edge_written(true);
        stats.warn("unknown type 'GEOMETRY'");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.vertices_created, 1);
        assert_eq!(snapshot.vertices_updated, 1);
        assert_eq!(snapshot.vertices(), 2);
        assert_eq!(snapshot.edges(), 1);
        assert_eq!(snapshot.warnings, 1);
        assert_eq!(snapshot.percentage(), 25.0);
        assert!(snapshot.estimated_remaining().is_some());
        assert_eq!(stats.warnings(), vec!["unknown type 'GEOMETRY'".to_string()]);
    }

    #[test]
    fn test_empty_run_percentage() {
        let stats = ImportStatistics::new();
        assert_eq!(stats.snapshot().percentage(), 0.0);
        stats.set_stage(Stage::Done);
        assert_eq!(stats.snapshot().percentage(), 100.0);
        assert_eq!(stats.snapshot().estimated_remaining(), None);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let stats = ImportStatistics::new();
        stats.set_stage(Stage::Importing);
        stats.vertex_written(true);

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["stage"], "importing");
        assert_eq!(json["vertices_created"], 1);
        assert_eq!(json["run_id"], stats.run_id().to_string());
    }

    #[tokio::test]
    async fn test_publisher_emits_final_snapshot_on_stop() {
        let stats = Arc::new(ImportStatistics::new());
        let recorder = Arc::new(Recorder::default());
        let publisher = StatisticsPublisher::start(
            Arc::clone(&stats),
            vec![recorder.clone() as Arc<dyn StatisticsListener>],
            Duration::from_secs(3600),
        );
        stats.record_analyzed();
        publisher.stop().await;

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].records_analyzed, 1);
    }
}
