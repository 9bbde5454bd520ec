//! Snapshot shared between the engine and the display context
//!
//! Two independent locks: telemetry flows engine → display, rod targets flow
//! whichever way the current control mode dictates. Each critical section
//! only copies a handful of scalars.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::reactor::{ReactorEngine, RodKind};

/// Engine telemetry, written and read as one unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub neutron_population: f64,
    pub reactivity_pcm: f64,
    pub power_watts: f64,
    pub rod_current_positions: [u32; 3],
    pub in_scram: bool,
    pub automatic_control: bool,
}

impl TelemetrySnapshot {
    pub fn from_engine(engine: &ReactorEngine) -> Self {
        Self {
            neutron_population: engine.neutron_population(),
            reactivity_pcm: engine.reactivity_pcm(),
            power_watts: engine.power_watts(),
            rod_current_positions: RodKind::ALL.map(|kind| engine.rod(kind).current_position()),
            in_scram: engine.in_scram(),
            automatic_control: engine.automatic_control,
        }
    }

    /// Whether the operator, not the engine, owns the rod targets
    pub fn operator_owns_targets(&self) -> bool {
        !self.automatic_control && !self.in_scram
    }
}

/// Target positions of the three rods, indexed by [`RodKind::index`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RodTargets(pub [u32; 3]);

impl RodTargets {
    pub fn from_engine(engine: &ReactorEngine) -> Self {
        Self(RodKind::ALL.map(|kind| engine.rod(kind).target_position()))
    }

    pub fn get(&self, kind: RodKind) -> u32 {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: RodKind, position: u32) {
        self.0[kind.index()] = position;
    }
}

/// Memory block handed to both execution contexts, usually inside an `Arc`
#[derive(Debug, Default)]
pub struct SharedMemory {
    telemetry: Mutex<TelemetrySnapshot>,
    rod_targets: Mutex<RodTargets>,
}

// The guarded data are plain scalars, so a panic on the other side cannot
// leave them half-written in a way that matters.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded from the engine's current state
    pub fn for_engine(engine: &ReactorEngine) -> Self {
        Self {
            telemetry: Mutex::new(TelemetrySnapshot::from_engine(engine)),
            rod_targets: Mutex::new(RodTargets::from_engine(engine)),
        }
    }

    pub fn publish_telemetry(&self, engine: &ReactorEngine) {
        let snapshot = TelemetrySnapshot::from_engine(engine);
        *lock(&self.telemetry) = snapshot;
    }

    pub fn read_telemetry(&self) -> TelemetrySnapshot {
        *lock(&self.telemetry)
    }

    pub fn write_rod_targets(&self, targets: RodTargets) {
        *lock(&self.rod_targets) = targets;
    }

    pub fn read_rod_targets(&self) -> RodTargets {
        *lock(&self.rod_targets)
    }

    /// Engine side of the rod target exchange.
    ///
    /// In manual mode outside a SCRAM the engine adopts the operator's
    /// targets; otherwise it publishes its own.
    pub fn exchange_rod_targets_engine(&self, engine: &mut ReactorEngine) {
        let mut shared = lock(&self.rod_targets);

        if !engine.automatic_control && !engine.in_scram() {
            for kind in RodKind::ALL {
                engine.rod_mut(kind).set_target_position(shared.get(kind));
            }
        } else {
            *shared = RodTargets::from_engine(engine);
        }
    }

    /// Display side of the rod target exchange. Writes `operator_targets`
    /// when the operator owns the rods per the last telemetry, otherwise
    /// returns the engine's targets for display.
    pub fn exchange_rod_targets_display(&self, operator_targets: RodTargets) -> RodTargets {
        let telemetry = self.read_telemetry();
        let mut shared = lock(&self.rod_targets);

        if telemetry.operator_owns_targets() {
            *shared = operator_targets;
        }
        *shared
    }
}
