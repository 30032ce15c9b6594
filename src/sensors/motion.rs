//! Gravity separation for accelerometer streams.
//!
//! The headband reports raw axis counts that mix the constant gravity vector
//! with transient motion. A single-pole low-pass filter tracks the gravity
//! component; subtracting it leaves the motion component.

/// 3D vector of axis values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Magnitude (length) of the vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Gravity and motion components for one accelerometer sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEstimate {
    /// Low-pass gravity estimate
    pub gravity: Vector3,
    /// Residual motion (raw minus gravity)
    pub motion: Vector3,
}

/// Exponential low-pass filter tracking the gravity component per axis.
///
/// `gravity += alpha * (raw - gravity)`; the first sample seeds the estimate
/// directly so there is no settle-from-zero transient.
#[derive(Debug)]
pub struct GravityFilter {
    alpha: f64,
    gravity: Option<Vector3>,
}

impl GravityFilter {
    /// Smoothing factor for the shipped 50 Hz accelerometer rate.
    pub const DEFAULT_ALPHA: f64 = 0.1;

    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            gravity: None,
        }
    }

    /// Feed one raw sample; returns the updated gravity/motion split.
    pub fn update(&mut self, raw: Vector3) -> MotionEstimate {
        let gravity = match self.gravity {
            None => raw,
            Some(g) => Vector3::new(
                g.x + self.alpha * (raw.x - g.x),
                g.y + self.alpha * (raw.y - g.y),
                g.z + self.alpha * (raw.z - g.z),
            ),
        };
        self.gravity = Some(gravity);

        MotionEstimate {
            gravity,
            motion: Vector3::new(raw.x - gravity.x, raw.y - gravity.y, raw.z - gravity.z),
        }
    }

    /// Discard the estimate; the next sample reseeds it.
    pub fn reset(&mut self) {
        self.gravity = None;
    }
}

impl Default for GravityFilter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ALPHA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_seeds_gravity() {
        let mut filter = GravityFilter::default();

        let estimate = filter.update(Vector3::new(0.0, 0.0, 64.0));
        assert_eq!(estimate.gravity, Vector3::new(0.0, 0.0, 64.0));
        assert_eq!(estimate.motion, Vector3::default());
    }

    #[test]
    fn test_constant_input_converges_to_zero_motion() {
        let mut filter = GravityFilter::default();

        let mut estimate = filter.update(Vector3::new(10.0, 20.0, 64.0));
        for _ in 0..100 {
            estimate = filter.update(Vector3::new(10.0, 20.0, 64.0));
        }

        assert!(estimate.motion.magnitude() < 1e-9);
        assert!((estimate.gravity.z - 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_step_shows_up_as_motion_first() {
        let mut filter = GravityFilter::default();
        filter.update(Vector3::new(0.0, 0.0, 64.0));

        // A sudden jolt is mostly motion; gravity barely moves.
        let estimate = filter.update(Vector3::new(0.0, 0.0, 164.0));
        assert!(estimate.motion.z > 80.0);
        assert!(estimate.gravity.z < 80.0);
    }

    #[test]
    fn test_reset_reseeds() {
        let mut filter = GravityFilter::default();
        filter.update(Vector3::new(0.0, 0.0, 64.0));
        filter.reset();

        let estimate = filter.update(Vector3::new(5.0, 5.0, 5.0));
        assert_eq!(estimate.gravity, Vector3::new(5.0, 5.0, 5.0));
    }
}
