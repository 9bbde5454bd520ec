//! Time-series recorder for simulation runs

use ndarray::{aview1, Array2, ArrayView1, Axis};

use crate::reactor::ReactorEngine;

/// Column layout of a trace row
pub const TRACE_COLUMNS: [&str; 6] = [
    "time_s",
    "power_w",
    "fuel_temperature_c",
    "water_temperature_c",
    "reactivity_pcm",
    "regulating_target",
];

const POWER_COLUMN: usize = 1;

/// Samples the engine every `sample_every` steps
#[derive(Debug, Clone)]
pub struct Trace {
    sample_every: u64,
    samples: Array2<f64>,
}

impl Trace {
    pub fn new(sample_every: u64) -> Self {
        Self {
            sample_every: sample_every.max(1),
            samples: Array2::zeros((0, TRACE_COLUMNS.len())),
        }
    }

    pub fn sample_every(&self) -> u64 {
        self.sample_every
    }

    /// Record a row if the engine is on a sampling step
    pub fn observe(&mut self, engine: &ReactorEngine) {
        if engine.steps_elapsed() % self.sample_every == 0 {
            self.record(engine);
        }
    }

    /// Record a row unconditionally
    pub fn record(&mut self, engine: &ReactorEngine) {
        let row = [
            engine.time_elapsed_seconds(),
            engine.power_watts(),
            engine.fuel_temperature_celsius(),
            engine.water_temperature_celsius(),
            engine.reactivity_pcm(),
            engine.regulating_rod().target_position() as f64,
        ];
        // The row length always matches the column count
        if let Err(err) = self.samples.push_row(aview1(&row)) {
            log::error!("dropping trace sample: {err}");
        }
    }

    pub fn len(&self) -> usize {
        self.samples.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    pub fn column(&self, index: usize) -> ArrayView1<'_, f64> {
        self.samples.column(index)
    }

    pub fn peak_power(&self) -> f64 {
        self.samples
            .column(POWER_COLUMN)
            .fold(0.0_f64, |peak, &power| peak.max(power))
    }

    pub fn to_csv(&self) -> String {
        let mut csv = TRACE_COLUMNS.join(",");
        csv.push('\n');
        for row in self.samples.axis_iter(Axis(0)) {
            let fields: Vec<String> = row.iter().map(|value| value.to_string()).collect();
            csv.push_str(&fields.join(","));
            csv.push('\n');
        }
        csv
    }
}
