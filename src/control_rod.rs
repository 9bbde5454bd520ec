//! Control rod actuation and worth model
//!
//! Rod insertion is kept as a fixed-point integer between 0 (fully
//! withdrawn) and 4_000_000 (fully inserted). Worth is linear in insertion.

use serde::{Deserialize, Serialize};

/// Insertion of a rod in position units, always within
/// `[FULLY_WITHDRAWN, FULLY_INSERTED]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct RodPosition(u32);

impl RodPosition {
    pub const FULLY_WITHDRAWN: RodPosition = RodPosition(0);
    pub const FULLY_INSERTED: RodPosition = RodPosition(4_000_000);

    /// Position units per unit of insertion fraction
    pub const SCALE: f64 = 4_000_000.0;

    pub fn new(units: u32) -> Self {
        Self(units.min(Self::FULLY_INSERTED.0))
    }

    /// Clamp a signed position, e.g. the result of stepping a position down
    /// past zero
    pub fn saturating_from_i64(units: i64) -> Self {
        Self(units.clamp(0, Self::FULLY_INSERTED.0 as i64) as u32)
    }

    pub fn units(self) -> u32 {
        self.0
    }

    /// 0.0 fully withdrawn, 1.0 fully inserted
    pub fn as_fraction(self) -> f64 {
        self.0 as f64 / Self::SCALE
    }

    /// Position in the 0..=999 range used by panel displays
    pub fn to_display_per_mille(self) -> u16 {
        (self.0 / (Self::FULLY_INSERTED.0 / 1000)).min(999) as u16
    }
}

impl From<u32> for RodPosition {
    fn from(units: u32) -> Self {
        Self::new(units)
    }
}

impl From<RodPosition> for u32 {
    fn from(position: RodPosition) -> Self {
        position.0
    }
}

/// A single control rod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRod {
    current_position: RodPosition,
    target_position: RodPosition,
    /// Maximum travel in position units per simulated second
    speed_per_second: u32,
    /// Worth at full insertion [pcm]
    full_worth_pcm: f64,
}

impl ControlRod {
    /// Creates a rod resting at `position`, with its target equal to it
    pub fn new(position: u32, speed_per_second: u32, full_worth_pcm: f64) -> Self {
        let position = RodPosition::new(position);
        Self {
            current_position: position,
            target_position: position,
            speed_per_second,
            full_worth_pcm,
        }
    }

    pub fn current_position(&self) -> u32 {
        self.current_position.units()
    }

    pub fn current_position_as_fraction(&self) -> f64 {
        self.current_position.as_fraction()
    }

    pub fn set_current_position(&mut self, position: u32) {
        self.current_position = RodPosition::new(position);
    }

    pub fn target_position(&self) -> u32 {
        self.target_position.units()
    }

    pub fn target_position_as_fraction(&self) -> f64 {
        self.target_position.as_fraction()
    }

    pub fn set_target_position(&mut self, position: u32) {
        self.target_position = RodPosition::new(position);
    }

    pub fn speed_steps_per_second(&self) -> u32 {
        self.speed_per_second
    }

    pub fn set_speed_steps_per_second(&mut self, speed: u32) {
        self.speed_per_second = speed;
    }

    pub fn full_worth_pcm(&self) -> f64 {
        self.full_worth_pcm
    }

    pub fn is_at_target(&self) -> bool {
        self.current_position == self.target_position
    }

    /// Slam the rod fully in, bypassing the speed limit
    pub fn insert_fully(&mut self) {
        self.current_position = RodPosition::FULLY_INSERTED;
        self.target_position = RodPosition::FULLY_INSERTED;
    }

    /// Move towards the target by at most `speed * dt` whole position units.
    /// Never overshoots.
    pub fn move_towards_target(&mut self, delta_t_seconds: f64) {
        let remaining = self.target_position.units() as i64 - self.current_position.units() as i64;
        let max_delta = (delta_t_seconds * self.speed_per_second as f64).max(0.0) as i64;
        let delta = remaining.clamp(-max_delta, max_delta);

        self.current_position =
            RodPosition::saturating_from_i64(self.current_position.units() as i64 + delta);
    }

    /// Worth contributed at `position` [pcm], linear in insertion
    pub fn worth_at_position_pcm(&self, position: u32) -> f64 {
        (position as f64 / RodPosition::SCALE) * self.full_worth_pcm
    }

    /// Worth at the current position [pcm]
    pub fn worth_pcm(&self) -> f64 {
        self.worth_at_position_pcm(self.current_position.units())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORTH: f64 = 4000.0 / 3.0;

    #[test]
    fn positions_clamp_instead_of_failing() {
        let mut rod = ControlRod::new(9_000_000, 1000, WORTH);
        assert_eq!(rod.current_position(), 4_000_000);
        assert_eq!(rod.target_position(), 4_000_000);

        rod.set_target_position(u32::MAX);
        assert_eq!(rod.target_position(), 4_000_000);
        rod.set_current_position(4_000_001);
        assert_eq!(rod.current_position(), 4_000_000);
        rod.set_current_position(0);
        assert_eq!(rod.current_position(), 0);
    }

    #[test]
    fn worth_is_exactly_linear() {
        let rod = ControlRod::new(0, 1000, WORTH);
        for position in (0..=4_000_000u32).step_by(123_457).chain([4_000_000]) {
            let expected = (position as f64 / 4_000_000.0) * WORTH;
            assert_eq!(rod.worth_at_position_pcm(position), expected);
        }
        assert_eq!(rod.worth_at_position_pcm(4_000_000), WORTH);
    }

    #[test]
    fn motion_is_speed_limited_in_both_directions() {
        let mut rod = ControlRod::new(1_000_000, 60_000, WORTH);
        rod.set_target_position(2_000_000);
        rod.move_towards_target(0.5);
        assert_eq!(rod.current_position(), 1_030_000);

        rod.set_target_position(0);
        rod.move_towards_target(1.0);
        assert_eq!(rod.current_position(), 970_000);
    }

    #[test]
    fn motion_never_overshoots_and_always_progresses() {
        let mut rod = ControlRod::new(0, 80_000, WORTH);
        rod.set_target_position(10_003);

        let mut previous_gap = rod.target_position().abs_diff(rod.current_position());
        for dt in [1e-4, 0.01, 0.05, 0.1, 3.0, 1e-4] {
            rod.move_towards_target(dt);
            let gap = rod.target_position().abs_diff(rod.current_position());
            assert!(gap <= previous_gap);
            let max_step = (dt * 80_000.0) as u32;
            assert_eq!(previous_gap - gap, max_step.min(previous_gap));
            previous_gap = gap;
        }
        assert!(rod.is_at_target());
    }

    #[test]
    fn sub_unit_steps_do_not_move_the_rod() {
        let mut rod = ControlRod::new(500, 5_000, WORTH);
        rod.set_target_position(0);
        rod.move_towards_target(1e-4);
        assert_eq!(rod.current_position(), 500);
    }

    #[test]
    fn insert_fully_bypasses_speed_limit() {
        let mut rod = ControlRod::new(0, 1, WORTH);
        rod.insert_fully();
        assert_eq!(rod.current_position(), 4_000_000);
        assert_eq!(rod.target_position(), 4_000_000);
        assert!((rod.worth_pcm() - WORTH).abs() < 1e-9);
    }

    #[test]
    fn display_mapping_stays_below_one_thousand() {
        assert_eq!(RodPosition::new(0).to_display_per_mille(), 0);
        assert_eq!(RodPosition::new(2_400_000).to_display_per_mille(), 600);
        assert_eq!(RodPosition::FULLY_INSERTED.to_display_per_mille(), 999);
    }
}
