//! Chaos scenarios for the fusion engine.

use crate::delivery::DeliveryConfig;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: clean feed, sanity of merge and centering
    Baseline,

    /// SIM-002: heavy delivery jitter reorders batches
    Reorder,

    /// SIM-003: batches delivered more than once
    Duplicate,

    /// SIM-004: garbage records and undecodable payloads
    Corrupt,

    /// SIM-005: operator executes and locks hostiles mid-run
    Execution,

    /// SIM-006: annotation layer comes up halfway through
    LateLayer,

    /// SIM-007: batches and commands through the async service
    ServiceLoop,

    /// SIM-008: everything bad at once
    ChaosStorm,
}

/// Fleet and operator behavior for a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSetup {
    pub friendlies: usize,
    pub hostiles: usize,
    /// Execute the first hostile halfway through
    pub operator_executes: bool,
    /// Lock the first hostile a third of the way through
    pub operator_locks: bool,
    /// Annotation layer starts not ready and comes up halfway
    pub late_layer: bool,
    /// Run through `FusionService` instead of the engine directly
    pub via_service: bool,
}

impl Default for ScenarioSetup {
    fn default() -> Self {
        Self {
            friendlies: 4,
            hostiles: 3,
            operator_executes: false,
            operator_locks: false,
            late_layer: false,
            via_service: false,
        }
    }
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Baseline,
            ScenarioId::Reorder,
            ScenarioId::Duplicate,
            ScenarioId::Corrupt,
            ScenarioId::Execution,
            ScenarioId::LateLayer,
            ScenarioId::ServiceLoop,
            ScenarioId::ChaosStorm,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "baseline",
            ScenarioId::Reorder => "reorder",
            ScenarioId::Duplicate => "duplicate",
            ScenarioId::Corrupt => "corrupt",
            ScenarioId::Execution => "execution",
            ScenarioId::LateLayer => "late_layer",
            ScenarioId::ServiceLoop => "service_loop",
            ScenarioId::ChaosStorm => "chaos_storm",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "In-order feed, every flight fused with position and callsign",
            ScenarioId::Reorder => "0-3s delivery jitter, converge to the in-order result",
            ScenarioId::Duplicate => "40% of batches delivered twice, no extra entities",
            ScenarioId::Corrupt => "Garbage records and truncated payloads skipped, rest applied",
            ScenarioId::Execution => "Executed hostile never reappears despite late reports",
            ScenarioId::LateLayer => "Annotations buffered until the map layer is ready",
            ScenarioId::ServiceLoop => "Single-writer service with concurrent commands",
            ScenarioId::ChaosStorm => "Jitter + duplicates + garbage + executions + late layer",
        }
    }

    /// Delivery faults for the scenario.
    pub fn delivery(&self) -> DeliveryConfig {
        match self {
            ScenarioId::Baseline | ScenarioId::LateLayer => DeliveryConfig::in_order(),
            ScenarioId::Reorder => DeliveryConfig {
                jitter_ms: 1500.0,
                ..DeliveryConfig::in_order()
            },
            ScenarioId::Duplicate => DeliveryConfig {
                jitter_ms: 200.0,
                duplicate_rate: 0.4,
                ..DeliveryConfig::in_order()
            },
            ScenarioId::Corrupt => DeliveryConfig {
                corrupt_rate: 0.4,
                ..DeliveryConfig::in_order()
            },
            ScenarioId::Execution => DeliveryConfig {
                jitter_ms: 800.0,
                ..DeliveryConfig::in_order()
            },
            ScenarioId::ServiceLoop => DeliveryConfig {
                jitter_ms: 500.0,
                duplicate_rate: 0.2,
                corrupt_rate: 0.2,
            },
            ScenarioId::ChaosStorm => DeliveryConfig {
                jitter_ms: 3000.0,
                duplicate_rate: 0.3,
                corrupt_rate: 0.3,
            },
        }
    }

    /// Fleet and operator behavior for the scenario.
    pub fn setup(&self) -> ScenarioSetup {
        let base = ScenarioSetup::default();
        match self {
            ScenarioId::Execution => ScenarioSetup {
                operator_executes: true,
                operator_locks: true,
                ..base
            },
            ScenarioId::LateLayer => ScenarioSetup {
                late_layer: true,
                ..base
            },
            ScenarioId::ServiceLoop => ScenarioSetup {
                operator_locks: true,
                late_layer: true,
                via_service: true,
                ..base
            },
            ScenarioId::ChaosStorm => ScenarioSetup {
                friendlies: 8,
                hostiles: 6,
                operator_executes: true,
                operator_locks: true,
                late_layer: true,
                via_service: false,
            },
            _ => base,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" | "sim-001" => Ok(ScenarioId::Baseline),
            "reorder" | "sim-002" => Ok(ScenarioId::Reorder),
            "duplicate" | "sim-003" => Ok(ScenarioId::Duplicate),
            "corrupt" | "sim-004" => Ok(ScenarioId::Corrupt),
            "execution" | "sim-005" => Ok(ScenarioId::Execution),
            "late_layer" | "latelayer" | "sim-006" => Ok(ScenarioId::LateLayer),
            "service_loop" | "serviceloop" | "sim-007" => Ok(ScenarioId::ServiceLoop),
            "chaos_storm" | "chaosstorm" | "sim-008" => Ok(ScenarioId::ChaosStorm),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
