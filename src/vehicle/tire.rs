// ==============================================================================
// tire.rs — TIRE SOLVER (IMPULSE-DOMAIN FRICTION, OVERRIDABLE CLAMP)
// ------------------------------------------------------------------------------
// Per grounded wheel:
// 1) slip:   s = ω·r - v_long                    (contact patch sliding speed)
//            slip ratio = |s| / max(|v_long|, |ω·r|)
//            slip angle = atan2(|v_lat|, |v_long|) in degrees
// 2) friction coefficients from the wheel's longitudinal / lateral curves
// 3) raw impulses that would cancel slip this tick:
//            J_long = s / (1/m + r²/I)       (wheel spin and chassis share)
//            J_lat  = -v_lat · m
// 4) clamp: limits from the policy (default μ·J_susp per axis), then a friction
//    ellipse when both axes are saturated together
//
// The clamp policy is the one swappable piece: `TireModel::max_impulse`.
// ==============================================================================

use std::fmt;

use crate::vehicle::wheel::Wheel;

/// Everything a clamp policy gets to see about one wheel this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TireFrictionQuery {
    pub wheel_index: usize,
    pub suspension_impulse: f32,
    pub longitudinal_friction: f32,
    pub lateral_friction: f32,
    pub longitudinal_slip: f32,
    pub lateral_slip: f32,
    pub dt: f32,
}

/// Maximum impulse magnitudes a tire may transmit this tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TireImpulseLimit {
    pub longitudinal: f32,
    pub lateral: f32,
}

pub type TireMaxImpulseFn = Box<dyn Fn(&TireFrictionQuery) -> TireImpulseLimit + Send + Sync>;

/// `μ·J_susp` on each axis.
pub fn friction_limit(q: &TireFrictionQuery) -> TireImpulseLimit {
    TireImpulseLimit {
        longitudinal: q.longitudinal_friction * q.suspension_impulse,
        lateral: q.lateral_friction * q.suspension_impulse,
    }
}

/// Friction limit with the longitudinal axis multiplied, for tunings calibrated
/// against a solver that let through `multiplier` times the intended impulse.
pub fn scaled_longitudinal(multiplier: f32) -> TireMaxImpulseFn {
    Box::new(move |q: &TireFrictionQuery| TireImpulseLimit {
        longitudinal: multiplier * q.longitudinal_friction * q.suspension_impulse,
        lateral: q.lateral_friction * q.suspension_impulse,
    })
}

/// Contact-patch velocities, ground relative, in the wheel basis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlipVelocities {
    pub longitudinal: f32,
    pub lateral: f32,
}

/// Result for one wheel, consumed immediately by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TireImpulse {
    pub longitudinal: f32,
    pub lateral: f32,
    pub longitudinal_slip: f32,
    pub lateral_slip: f32,
    pub longitudinal_friction: f32,
    pub lateral_friction: f32,
}

#[derive(Default)]
pub struct TireModel {
    /// `None` uses [`friction_limit`].
    pub max_impulse: Option<TireMaxImpulseFn>,
}

impl fmt::Debug for TireModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TireModel")
            .field("max_impulse", &self.max_impulse.as_ref().map(|_| "custom"))
            .finish()
    }
}

#[inline]
fn sanitize_limit(v: f32) -> f32 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

#[inline]
fn clamp_axis(raw: f32, max: f32) -> f32 {
    if max > 0.0 && raw.is_finite() { raw.clamp(-max, max) } else { 0.0 }
}

impl TireModel {
    pub fn with_max_impulse(max_impulse: TireMaxImpulseFn) -> Self {
        Self { max_impulse: Some(max_impulse) }
    }

    pub fn limits(&self, q: &TireFrictionQuery) -> TireImpulseLimit {
        let raw = match &self.max_impulse {
            Some(f) => f(q),
            None => friction_limit(q),
        };
        TireImpulseLimit {
            longitudinal: sanitize_limit(raw.longitudinal),
            lateral: sanitize_limit(raw.lateral),
        }
    }

    /// Tire impulses for one grounded wheel. `effective_mass` is the share of
    /// chassis mass this wheel pushes against.
    pub fn compute_wheel_impulse(
        &self,
        wheel_index: usize,
        wheel: &Wheel,
        suspension_impulse: f32,
        slip: SlipVelocities,
        effective_mass: f32,
        dt: f32,
    ) -> TireImpulse {
        let s = &wheel.settings;
        let v_long = slip.longitudinal;
        let v_lat = slip.lateral;
        let rim_speed = wheel.angular_velocity() * s.radius;
        let sliding = rim_speed - v_long;

        let reference = v_long.abs().max(rim_speed.abs());
        let longitudinal_slip = if reference > 1e-3 { sliding.abs() / reference } else { 0.0 };
        let lateral_slip = if v_lat.abs() > 1e-3 || v_long.abs() > 1e-3 {
            v_lat.abs().atan2(v_long.abs()).to_degrees()
        } else {
            0.0
        };

        let longitudinal_friction = s.longitudinal_friction.sample(longitudinal_slip);
        let lateral_friction = s.lateral_friction.sample(lateral_slip);

        let mass = effective_mass.max(1e-3);
        let inv_mass_long = 1.0 / mass + s.radius * s.radius / s.inertia;
        let raw_long = sliding / inv_mass_long;
        let raw_lat = -v_lat * mass;

        let limit = self.limits(&TireFrictionQuery {
            wheel_index,
            suspension_impulse: suspension_impulse.max(0.0),
            longitudinal_friction,
            lateral_friction,
            longitudinal_slip,
            lateral_slip,
            dt,
        });

        let mut longitudinal = clamp_axis(raw_long, limit.longitudinal);
        let mut lateral = clamp_axis(raw_lat, limit.lateral);

        // Combined slip ellipse
        if limit.longitudinal > 0.0 && limit.lateral > 0.0 {
            let nx = longitudinal / limit.longitudinal;
            let ny = lateral / limit.lateral;
            let ellipse = nx * nx + ny * ny;
            if ellipse > 1.0 {
                let scale = 1.0 / ellipse.sqrt();
                longitudinal *= scale;
                lateral *= scale;
            }
        }

        TireImpulse {
            longitudinal,
            lateral,
            longitudinal_slip,
            lateral_slip,
            longitudinal_friction,
            lateral_friction,
        }
    }
}
