//! Scenario runner - executes chaos scenarios against the fusion engine.
//!
//! Every scenario runs two engines side by side. The reference engine sees
//! the oracle's records in emission order, exactly once, the instant they
//! are produced. The engine under test sees them through `ChaosDelivery`.
//! After a final full-sync batch both must agree on everything except
//! per-id state of executed entities, which is allowed to depend on
//! arrival order.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tacmap_core::{
    decode_batch, AnnotationApply, Command, FusionConfig, FusionEngine, FusionError, FusionService, GlobalId,
    IngestReport, ServiceConfig, Snapshot,
};
use tacmap_env::{BatchEnvelope, FeedId, FusionContext};
use tracing::{debug, info, warn};

use crate::context::SimContext;
use crate::delivery::{ChaosDelivery, DeliveryStats, ScriptedSource};
use crate::exporter::{SimEvent, SimExport, SimFrame, TruthPosition};
use crate::oracle::Oracle;
use crate::scenarios::{ScenarioId, ScenarioSetup};

/// Random stream for flight physics.
const PHYSICS_STREAM: u64 = 1;

/// Random stream for delivery faults.
const DELIVERY_STREAM: u64 = 2;

/// Ticks between exported frames.
const EXPORT_INTERVAL: u64 = 5;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Entities in the engine under test at the end
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Frame-by-frame export, when requested
    pub export: Option<SimExport>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    /// Batches produced by the oracle
    pub batches_emitted: u64,

    /// Envelopes handed to the engine under test
    pub envelopes_delivered: u64,

    pub duplicates: u64,
    pub corrupted: u64,
    pub reordered: u64,

    /// Records the engine under test skipped
    pub records_skipped: u64,

    /// Records with unhandled opcodes
    pub unknown_records: u64,

    /// Envelopes that were not a JSON array
    pub batches_rejected: u64,

    /// Annotation batches parked while the layer was not ready
    pub annotation_batches_buffered: u64,

    /// Operator executions
    pub executions: u64,
}

impl ScenarioMetrics {
    fn absorb_delivery(&mut self, stats: &DeliveryStats) {
        self.duplicates = stats.duplicated;
        self.corrupted = stats.corrupted;
        self.reordered = stats.reordered;
    }
}

/// Runs chaos scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Batches per second
    tick_rate_hz: u32,

    /// Simulated duration in seconds
    max_duration_secs: f64,

    /// Engine configuration (layer readiness is set per scenario)
    config: FusionConfig,

    /// Record frames for export
    export: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: 2,
            max_duration_secs: 60.0,
            config: FusionConfig::default(),
            export: false,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the simulated duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the engine configuration.
    pub fn with_config(mut self, config: FusionConfig) -> Self {
        self.config = config;
        self
    }

    /// Records frames into `ScenarioResult::export`.
    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    fn target_ticks(&self) -> u64 {
        // Operator actions happen at 1/3 and 1/2 of the run
        ((self.max_duration_secs * self.tick_rate_hz as f64).round() as u64).max(4)
    }

    fn engine_config(&self, setup: &ScenarioSetup) -> FusionConfig {
        FusionConfig {
            annotation_layer_ready: !setup.late_layer,
            ..self.config.clone()
        }
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let setup = scenario.setup();
        if setup.via_service {
            self.run_service(scenario, &setup)
        } else {
            self.run_direct(scenario, &setup)
        }
    }

    /// Feeds the engine under test directly, one envelope at a time.
    fn run_direct(&self, scenario: ScenarioId, setup: &ScenarioSetup) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let mut oracle = Oracle::new(context.stream_seed(PHYSICS_STREAM));
        oracle.populate(setup.friendlies, setup.hostiles);
        let mut delivery = ChaosDelivery::new(context.stream_seed(DELIVERY_STREAM), FeedId(1), scenario.delivery());

        let (mut engine, mut reference) = match engine_pair(self.engine_config(setup)) {
            Ok(pair) => pair,
            Err(e) => return self.rejected(scenario, e),
        };

        let mut metrics = ScenarioMetrics::default();
        let mut export = self.export.then(|| SimExport::new(scenario.name(), self.seed));
        let mut executed = Vec::new();

        let dt = 1.0 / self.tick_rate_hz as f64;
        let target_ticks = self.target_ticks();

        for tick in 0..target_ticks {
            oracle.step(dt);
            context.advance_time(Duration::from_secs_f64(dt));
            let now_ms = context.now_ms();

            let records = oracle.emit_tick();
            metrics.batches_emitted += 1;
            let report = reference.ingest(&records);
            note_reference(&report, &mut metrics);

            delivery.submit(now_ms, &records);
            for envelope in delivery.drain_until(now_ms) {
                deliver(&mut engine, &envelope, &mut metrics);
            }

            let mut events = Vec::new();
            for command in operator_commands(setup, tick, target_ticks, &mut oracle) {
                if let Command::Execute(id) = command {
                    executed.push(id);
                    metrics.executions += 1;
                }
                apply_command(&mut engine, command);
                apply_command(&mut reference, command);
                events.push(SimEvent::info(format!("{:?}", command)));
            }

            if let Some(export) = export.as_mut() {
                if tick % EXPORT_INTERVAL == 0 || !events.is_empty() {
                    export.add_frame(frame(&oracle, &engine, events));
                }
            }

            if tick % self.tick_rate_hz as u64 == 0 {
                debug!(
                    "  t={:.1}s | flights={} | entities={} | in flight={}",
                    oracle.time(),
                    oracle.active_entities().count(),
                    engine.store().len(),
                    delivery.in_flight()
                );
            }
        }

        for envelope in delivery.drain_all() {
            deliver(&mut engine, &envelope, &mut metrics);
        }

        let sync = oracle.full_sync();
        metrics.batches_emitted += 1;
        reference.ingest(&sync);
        let envelope = delivery.clean_envelope(context.now_ms(), &sync);
        deliver(&mut engine, &envelope, &mut metrics);

        metrics.absorb_delivery(delivery.stats());
        if let Some(export) = export.as_mut() {
            export.add_frame(frame(&oracle, &engine, vec![SimEvent::info("full sync")]));
        }

        let outcome = check(setup, &oracle, &engine, &reference, &executed);
        self.finish(scenario, target_ticks, &oracle, &engine, metrics, outcome, export)
    }

    /// Replays the same delivery through `FusionService` on a tokio runtime.
    fn run_service(&self, scenario: ScenarioId, setup: &ScenarioSetup) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let mut oracle = Oracle::new(context.stream_seed(PHYSICS_STREAM));
        oracle.populate(setup.friendlies, setup.hostiles);
        let mut delivery = ChaosDelivery::new(context.stream_seed(DELIVERY_STREAM), FeedId(1), scenario.delivery());

        let (mut engine, mut reference) = match engine_pair(self.engine_config(setup)) {
            Ok(pair) => pair,
            Err(e) => return self.rejected(scenario, e),
        };
        let mut metrics = ScenarioMetrics::default();
        let mut envelopes = Vec::new();
        let mut commands = Vec::new();
        let mut executed = Vec::new();

        let dt = 1.0 / self.tick_rate_hz as f64;
        let target_ticks = self.target_ticks();
        let mut emit_clock_ms = 0u64;

        for tick in 0..target_ticks {
            oracle.step(dt);
            emit_clock_ms = (oracle.time() * 1000.0).round() as u64;

            let records = oracle.emit_tick();
            metrics.batches_emitted += 1;
            let report = reference.ingest(&records);
            note_reference(&report, &mut metrics);

            delivery.submit(emit_clock_ms, &records);
            envelopes.extend(delivery.drain_until(emit_clock_ms));

            for command in operator_commands(setup, tick, target_ticks, &mut oracle) {
                if let Command::Execute(id) = command {
                    executed.push(id);
                    metrics.executions += 1;
                }
                apply_command(&mut reference, command);
                commands.push(command);
            }
        }

        envelopes.extend(delivery.drain_all());
        let sync = oracle.full_sync();
        metrics.batches_emitted += 1;
        reference.ingest(&sync);
        envelopes.push(delivery.clean_envelope(emit_clock_ms, &sync));
        metrics.envelopes_delivered = envelopes.len() as u64;
        metrics.absorb_delivery(delivery.stats());

        let skipped = Arc::new(AtomicU64::new(0));
        let unknown = Arc::new(AtomicU64::new(0));
        {
            let skipped = skipped.clone();
            let unknown = unknown.clone();
            engine.subscribe(Box::new(move |report: &IngestReport| {
                skipped.fetch_add(report.skipped.len() as u64, Ordering::Relaxed);
                unknown.fetch_add(report.unknown as u64, Ordering::Relaxed);
            }));
        }

        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let outcome = Err(format!("failed to start runtime: {}", e));
                return self.finish(scenario, target_ticks, &oracle, &reference, metrics, outcome, None);
            }
        };

        let service_name = format!("sim-{}", scenario.name());
        let envelope_count = envelopes.len();
        let engine = runtime.block_on(async {
            let source = Arc::new(ScriptedSource::new(scenario.name(), envelopes).with_clock(context.clone()));
            let (service, handle, _reader) = FusionService::new(
                context.clone(),
                source,
                engine,
                ServiceConfig {
                    name: service_name,
                    ..ServiceConfig::default()
                },
            );

            let operator = tokio::spawn(async move {
                for command in commands {
                    if handle.send(command).await.is_err() {
                        break;
                    }
                }
            });

            let engine = service.run().await;
            if operator.await.is_err() {
                warn!("Operator task panicked");
            }
            engine
        });

        metrics.records_skipped = skipped.load(Ordering::Relaxed);
        metrics.unknown_records = unknown.load(Ordering::Relaxed);
        metrics.batches_rejected = (envelope_count as u64).saturating_sub(engine.batch_count());

        let export = self.export.then(|| {
            let mut export = SimExport::new(scenario.name(), self.seed);
            export.add_frame(frame(&oracle, &engine, vec![SimEvent::info("service stopped")]));
            export
        });

        let outcome = check(setup, &oracle, &engine, &reference, &executed);
        self.finish(scenario, target_ticks, &oracle, &engine, metrics, outcome, export)
    }

    /// Result for a scenario whose engine config was refused.
    fn rejected(&self, scenario: ScenarioId, error: FusionError) -> ScenarioResult {
        warn!("✗ {} not started: {}", scenario.name(), error);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            final_entity_count: 0,
            failure_reason: Some(error.to_string()),
            metrics: ScenarioMetrics::default(),
            export: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        scenario: ScenarioId,
        total_ticks: u64,
        oracle: &Oracle,
        engine: &FusionEngine,
        metrics: ScenarioMetrics,
        outcome: Result<(), String>,
        mut export: Option<SimExport>,
    ) -> ScenarioResult {
        let failure_reason = outcome.err();
        let passed = failure_reason.is_none();

        if passed {
            info!(
                "✓ {} complete: {} envelopes ({} reordered, {} duplicated, {} corrupted), {} skipped records, {} entities",
                scenario.name(),
                metrics.envelopes_delivered,
                metrics.reordered,
                metrics.duplicates,
                metrics.corrupted,
                metrics.records_skipped,
                engine.store().len()
            );
        } else {
            warn!(
                "✗ {} failed: {}",
                scenario.name(),
                failure_reason.as_deref().unwrap_or("unknown")
            );
        }

        if let Some(export) = export.as_mut() {
            export.finalize(passed, failure_reason.clone());
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks,
            final_time_secs: oracle.time(),
            final_entity_count: engine.store().len(),
            failure_reason,
            metrics,
            export,
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Engine under test and the in-order reference, from one config.
fn engine_pair(config: FusionConfig) -> Result<(FusionEngine, FusionEngine), FusionError> {
    Ok((FusionEngine::new(config.clone())?, FusionEngine::new(config)?))
}

fn note_reference(report: &IngestReport, metrics: &mut ScenarioMetrics) {
    if report.annotations == Some(AnnotationApply::Buffered) {
        metrics.annotation_batches_buffered += 1;
    }
}

/// Decodes and ingests one envelope into the engine under test.
fn deliver(engine: &mut FusionEngine, envelope: &BatchEnvelope, metrics: &mut ScenarioMetrics) {
    metrics.envelopes_delivered += 1;
    match decode_batch(&envelope.payload) {
        Ok(records) => {
            let report = engine.ingest(&records);
            metrics.records_skipped += report.skipped.len() as u64;
            metrics.unknown_records += report.unknown as u64;
        }
        Err(e) => {
            metrics.batches_rejected += 1;
            debug!("Rejected envelope {}: {}", envelope.sequence, e);
        }
    }
}

/// Operator actions due at `tick`. Executions also remove the flight from the oracle.
fn operator_commands(setup: &ScenarioSetup, tick: u64, ticks: u64, oracle: &mut Oracle) -> Vec<Command> {
    let mut commands = Vec::new();

    if setup.operator_locks && tick == ticks / 3 {
        if let Some(id) = oracle.first_hostile() {
            commands.push(Command::Lock(id));
        }
    }

    if tick == ticks / 2 {
        if setup.operator_executes {
            if let Some(id) = oracle.first_hostile() {
                oracle.remove_entity(id);
                commands.push(Command::Execute(id));
            }
        }
        if setup.late_layer {
            commands.push(Command::LayerReady);
        }
    }
    commands
}

fn apply_command(engine: &mut FusionEngine, command: Command) {
    match command {
        Command::Lock(id) => {
            engine.lock(id);
        }
        Command::Execute(id) => {
            engine.execute(id);
        }
        Command::LayerReady => {
            engine.mark_layer_ready();
        }
    }
}

fn frame(oracle: &Oracle, engine: &FusionEngine, events: Vec<SimEvent>) -> SimFrame {
    SimFrame {
        time_sec: oracle.time(),
        ground_truth: oracle
            .ground_truth_positions()
            .into_iter()
            .map(|(id, class, point)| TruthPosition::new(id, class, point))
            .collect(),
        snapshot: engine.snapshot(),
        events,
    }
}

/// Snapshot fields where the engine under test disagrees with the reference.
fn divergence(actual: &Snapshot, expected: &Snapshot, executed: &[GlobalId]) -> Vec<&'static str> {
    let live = |id: &GlobalId| !executed.contains(id);
    let live_locked = |s: &Snapshot| s.locked.iter().copied().filter(live).collect::<BTreeSet<_>>();
    let live_threats = |s: &Snapshot| {
        s.threat_locks
            .iter()
            .filter(|(id, _)| live(id))
            .map(|(id, on)| (*id, *on))
            .collect::<Vec<_>>()
    };

    let mut fields = Vec::new();
    if actual.entities != expected.entities {
        fields.push("entities");
    }
    if actual.network_members != expected.network_members {
        fields.push("network_members");
    }
    if actual.camera != expected.camera {
        fields.push("camera");
    }
    if actual.executed != expected.executed {
        fields.push("executed");
    }
    if live_locked(actual) != live_locked(expected) {
        fields.push("locked");
    }
    if live_threats(actual) != live_threats(expected) {
        fields.push("threat_locks");
    }
    if actual.engagements != expected.engagements {
        fields.push("engagements");
    }
    if actual.engagement_lines != expected.engagement_lines {
        fields.push("engagement_lines");
    }
    if actual.annotations != expected.annotations {
        fields.push("annotations");
    }
    if actual.proximity_alerts != expected.proximity_alerts {
        fields.push("proximity_alerts");
    }
    fields
}

/// Post-run invariants for the engine under test.
fn check(
    setup: &ScenarioSetup,
    oracle: &Oracle,
    engine: &FusionEngine,
    reference: &FusionEngine,
    executed: &[GlobalId],
) -> Result<(), String> {
    let actual = engine.snapshot();
    let expected = reference.snapshot();

    let diverged = divergence(&actual, &expected, executed);
    if !diverged.is_empty() {
        return Err(format!("diverged from in-order result in: {}", diverged.join(", ")));
    }

    for &id in executed {
        if actual.entity(id).is_some() || !actual.is_executed(id) {
            return Err(format!("executed entity {} reappeared", id));
        }
    }

    for truth in oracle.active_entities() {
        let entity = actual
            .entity(truth.id)
            .ok_or_else(|| format!("entity {} missing", truth.id))?;
        if entity.point() != Some(truth.position) {
            return Err(format!("entity {} position {:?} differs from truth", truth.id, entity.point()));
        }
        if entity.callsign() != Some(truth.callsign.as_str()) || entity.class != truth.class {
            return Err(format!("entity {} metadata not fused", truth.id));
        }
    }

    if let Some(mother) = oracle.mother_id() {
        let zoom_bounds = engine.config().zoom.min_zoom..=engine.config().zoom.max_zoom;
        match actual.camera {
            Some(view) if view.reference.global_id() == Some(mother) => {
                if !zoom_bounds.contains(&view.zoom) {
                    return Err(format!("zoom {} outside {:?}", view.zoom, zoom_bounds));
                }
            }
            other => return Err(format!("camera not centered on mother {}: {:?}", mother, other)),
        }
    }

    if setup.late_layer && !engine.annotation_layer_ready() {
        return Err("annotation layer never became ready".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(scenario: ScenarioId, secs: f64) -> ScenarioResult {
        ScenarioRunner::new(42).with_duration(secs).run(scenario)
    }

    #[test]
    fn test_baseline_scenario() {
        let result = run(ScenarioId::Baseline, 10.0);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_entity_count, 7);
        assert_eq!(result.metrics.reordered, 0);
        assert_eq!(result.metrics.records_skipped, 0);
    }

    #[test]
    fn test_reorder_scenario_converges() {
        let result = run(ScenarioId::Reorder, 20.0);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.reordered > 0);
    }

    #[test]
    fn test_duplicate_scenario() {
        let result = run(ScenarioId::Duplicate, 20.0);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.duplicates > 0);
        assert!(result.metrics.envelopes_delivered > result.metrics.batches_emitted);
    }

    #[test]
    fn test_corrupt_scenario_skips_garbage() {
        let result = run(ScenarioId::Corrupt, 30.0);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.corrupted > 0);
        assert!(result.metrics.records_skipped + result.metrics.batches_rejected > 0);
    }

    #[test]
    fn test_execution_scenario() {
        let result = run(ScenarioId::Execution, 10.0);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.executions, 1);
        assert_eq!(result.final_entity_count, 6);
    }

    #[test]
    fn test_late_layer_buffers() {
        let result = run(ScenarioId::LateLayer, 10.0);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.annotation_batches_buffered > 0);
    }

    #[test]
    fn test_service_loop_scenario() {
        let result = run(ScenarioId::ServiceLoop, 10.0);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.envelopes_delivered > 0);
    }

    #[test]
    fn test_chaos_storm_scenario() {
        let result = run(ScenarioId::ChaosStorm, 20.0);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.reordered > 0);
    }

    #[test]
    fn test_invalid_config_fails_without_running() {
        let mut config = FusionConfig::default();
        config.zoom.min_zoom = 14.0;
        config.zoom.max_zoom = 3.0;

        for scenario in [ScenarioId::Baseline, ScenarioId::ServiceLoop] {
            let result = ScenarioRunner::new(42).with_duration(5.0).with_config(config.clone()).run(scenario);
            assert!(!result.passed);
            assert_eq!(result.total_ticks, 0);
            assert!(result.failure_reason.as_deref().unwrap_or("").contains("zoom bounds"));
        }
    }

    #[test]
    fn test_runs_are_deterministic() {
        let first = run(ScenarioId::ChaosStorm, 10.0);
        let second = run(ScenarioId::ChaosStorm, 10.0);

        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.final_entity_count, second.final_entity_count);
    }

    #[test]
    fn test_export_frames() {
        let result = ScenarioRunner::new(7)
            .with_duration(5.0)
            .with_export(true)
            .run(ScenarioId::Execution);

        let export = result.export.expect("export requested");
        assert!(export.frames.len() >= 3);
        assert_eq!(export.passed, result.passed);
        assert!(export.frames.iter().any(|f| !f.events.is_empty()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_chaos_storm_converges_for_any_seed(seed in any::<u64>()) {
            let result = ScenarioRunner::new(seed).with_duration(8.0).run(ScenarioId::ChaosStorm);
            prop_assert!(result.passed, "{:?}", result.failure_reason);
        }
    }
}
