//! Point kinetics with six delayed neutron precursor groups
//!
//! Explicit Euler integration of
//!
//! ```text
//! dN/dt  = N (ρ - β_eff) / Λ + Σ λ_i C_i + S
//! dC_i/dt = β_i / Λ · N - λ_i C_i
//! ```

use serde::{Deserialize, Serialize};

use crate::config::DelayedGroupConfig;

pub const NUM_DELAYED_GROUPS: usize = 6;

/// One lumped group of delayed neutron emitters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecursorGroup {
    /// Delayed neutron fraction β_i
    pub fraction: f64,
    /// Decay constant λ_i [1/s]
    pub decay_constant: f64,
    /// Precursor population C_i
    pub population: f64,
}

impl PrecursorGroup {
    /// dC_i/dt for the given neutron population
    pub fn rate(&self, neutron_population: f64, prompt_lifetime_seconds: f64) -> f64 {
        self.fraction / prompt_lifetime_seconds * neutron_population
            - self.decay_constant * self.population
    }

    /// Delayed neutrons emitted per second, λ_i C_i
    pub fn emission_rate(&self) -> f64 {
        self.decay_constant * self.population
    }
}

/// The six precursor groups, indexed 0..5
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedNeutronGroups {
    groups: [PrecursorGroup; NUM_DELAYED_GROUPS],
}

impl DelayedNeutronGroups {
    /// Empty groups (no precursors yet) with the given nuclear data
    pub fn new(data: &[DelayedGroupConfig; NUM_DELAYED_GROUPS]) -> Self {
        Self {
            groups: data.map(|group| PrecursorGroup {
                fraction: group.fraction,
                decay_constant: group.decay_constant,
                population: 0.0,
            }),
        }
    }

    pub fn groups(&self) -> &[PrecursorGroup; NUM_DELAYED_GROUPS] {
        &self.groups
    }

    pub fn get(&self, index: usize) -> Option<&PrecursorGroup> {
        self.groups.get(index)
    }

    pub fn populations(&self) -> [f64; NUM_DELAYED_GROUPS] {
        self.groups.map(|group| group.population)
    }

    pub fn beta_effective(&self) -> f64 {
        self.groups.iter().map(|group| group.fraction).sum()
    }

    /// Σ λ_i C_i
    pub fn total_emission_rate(&self) -> f64 {
        self.groups.iter().map(PrecursorGroup::emission_rate).sum()
    }

    /// Advance every group by one step. Populations are floored at zero.
    pub fn step(&mut self, neutron_population: f64, prompt_lifetime_seconds: f64, dt: f64) {
        for group in &mut self.groups {
            let rate = group.rate(neutron_population, prompt_lifetime_seconds);
            group.population = (group.population + rate * dt).max(0.0);
        }
    }
}

/// dN/dt for the current neutron population and unitless reactivity
pub fn neutron_rate(
    neutron_population: f64,
    reactivity: f64,
    prompt_lifetime_seconds: f64,
    precursors: &DelayedNeutronGroups,
    source_per_second: f64,
) -> f64 {
    let balanced_reactivity = reactivity - precursors.beta_effective();
    neutron_population * balanced_reactivity / prompt_lifetime_seconds
        + precursors.total_emission_rate()
        + source_per_second
}
