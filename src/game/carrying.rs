//! Load carried by a character and the modifiers derived from it.
//!
//! Every derived value is a pure function of the component's fields. The only mutation is
//! `current_weight`, written by gameplay code outside the motion core.

use serde::Deserialize;

use super::constants::animation as anim_consts;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CarryingComponent {
    pub current_weight: f32,
    pub capacity: f32,

    /// Fraction of speed kept at full load (0..1)
    pub min_speed_at_max_load: f32,
    /// Shape of the speed falloff (1 = linear, >1 = slow start, sharp end)
    pub speed_curve_exponent: f32,

    pub min_animation_speed_at_max_load: f32,
    pub animation_speed_curve: f32,

    pub max_stamina_drain_at_full_load: f32,
    pub balance_reduction: f32,
    pub sway_amplitude: f32,
    pub footstep_volume_multiplier: f32,
    pub breathing_intensity: f32,
}

impl Default for CarryingComponent {
    fn default() -> Self {
        Self {
            current_weight: 0.0,
            capacity: 1.0,
            min_speed_at_max_load: 0.2,
            speed_curve_exponent: 1.0,
            min_animation_speed_at_max_load: 0.5,
            animation_speed_curve: 1.0,
            max_stamina_drain_at_full_load: 2.0,
            balance_reduction: 0.3,
            sway_amplitude: 0.1,
            footstep_volume_multiplier: 1.5,
            breathing_intensity: 2.0,
        }
    }
}

impl CarryingComponent {
    /// Saturated load ratio, or `None` when the component has no usable capacity.
    fn saturated_ratio(&self) -> Option<f32> {
        if self.capacity <= 0.0 {
            return None;
        }
        Some((self.current_weight / self.capacity).clamp(0.0, 1.0))
    }

    /// Movement speed multiplier in `[min_speed_at_max_load, 1]`.
    ///
    /// Non-increasing in load, exactly 1 with no load, and 1 for any load when capacity <= 0.
    pub fn speed_multiplier(&self) -> f32 {
        let Some(ratio) = self.saturated_ratio() else {
            return 1.0;
        };
        // A non-positive exponent would make an empty load count as full.
        let exponent = if self.speed_curve_exponent > 0.0 {
            self.speed_curve_exponent
        } else {
            1.0
        };
        let multiplier = 1.0 - ratio.powf(exponent);
        multiplier.max(self.min_speed_at_max_load.clamp(0.0, 1.0))
    }

    pub fn animation_speed_multiplier(&self) -> f32 {
        let Some(ratio) = self.saturated_ratio() else {
            return 1.0;
        };
        let exponent = if self.animation_speed_curve > 0.0 {
            self.animation_speed_curve
        } else {
            1.0
        };
        let curved = ratio.powf(exponent);
        let multiplier = lerp(1.0, self.min_animation_speed_at_max_load, curved);
        multiplier.max(anim_consts::MIN_ANIMATION_SPEED)
    }

    pub fn stamina_drain_multiplier(&self) -> f32 {
        match self.saturated_ratio() {
            Some(ratio) => lerp(1.0, self.max_stamina_drain_at_full_load, ratio * ratio),
            None => 1.0,
        }
    }

    pub fn balance_stability(&self) -> f32 {
        match self.saturated_ratio() {
            Some(ratio) => lerp(1.0, 1.0 - self.balance_reduction, ratio),
            None => 1.0,
        }
    }

    pub fn sway_amount(&self) -> f32 {
        match self.saturated_ratio() {
            Some(ratio) => self.sway_amplitude * ratio * ratio,
            None => 0.0,
        }
    }

    pub fn footstep_volume(&self) -> f32 {
        match self.saturated_ratio() {
            Some(ratio) => lerp(1.0, self.footstep_volume_multiplier, ratio),
            None => 1.0,
        }
    }

    pub fn breathing_intensity(&self) -> f32 {
        match self.saturated_ratio() {
            Some(ratio) => lerp(1.0, self.breathing_intensity, ratio * ratio),
            None => 1.0,
        }
    }

    pub fn is_overloaded(&self) -> bool {
        self.current_weight > self.capacity
    }

    pub fn load_ratio(&self) -> f32 {
        self.saturated_ratio().unwrap_or(0.0)
    }

    pub fn remaining_capacity(&self) -> f32 {
        (self.capacity - self.current_weight).max(0.0)
    }

    pub fn can_carry_additional_weight(&self, additional_weight: f32) -> bool {
        self.current_weight + additional_weight <= self.capacity
    }

    /// Speed at which a displayed weight should blend toward `target_weight`.
    pub fn weight_transition_speed(&self, target_weight: f32, base_transition_speed: f32) -> f32 {
        let speed_modifier = lerp(1.0, 0.5, self.load_ratio());
        let relative_difference = if self.capacity > 0.0 {
            (target_weight - self.current_weight).abs() / self.capacity
        } else {
            0.0
        };
        base_transition_speed * speed_modifier * (1.0 + relative_difference)
    }
}

/// Multiplier for an optional carrying component; characters without one move at full speed.
pub fn speed_multiplier(carrying: Option<&CarryingComponent>) -> f32 {
    carrying.map_or(1.0, CarryingComponent::speed_multiplier)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
