//! Kinematic state types and the dead-reckoning step.
//!
//! All angles are degrees. Headings live in `[0, 360)`, attitude angles in
//! `(-180, 180]`. Positions are geodetic (latitude, longitude, altitude above
//! the reference surface in metres).

use geo::{HaversineDestination, Point};
use serde::{Deserialize, Serialize};

/// Standard gravity (m/s²) used for coordinated-turn bank angle.
const GRAVITY: f64 = 9.80665;

/// Normalizes a heading into `[0, 360)`.
pub fn normalize_heading(degs: f64) -> f64 {
    let h = degs.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if h >= 360.0 { 0.0 } else { h }
}

/// Normalizes an attitude angle into `(-180, 180]`.
pub fn normalize_signed(degs: f64) -> f64 {
    let a = normalize_heading(degs);
    if a > 180.0 { a - 360.0 } else { a }
}

/// Geodetic position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat_degs: f64,
    pub lon_degs: f64,
    pub alt_mtrs: f64,
}

impl GeoPosition {
    pub fn new(lat_degs: f64, lon_degs: f64, alt_mtrs: f64) -> Self {
        Self { lat_degs, lon_degs, alt_mtrs }
    }

    /// 2D point in `geo` convention (x = longitude, y = latitude).
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.lon_degs, self.lat_degs)
    }
}

/// Platform attitude.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub roll_degs: f64,
    pub pitch_degs: f64,
    pub yaw_degs: f64,
}

impl Attitude {
    pub fn new(roll_degs: f64, pitch_degs: f64, yaw_degs: f64) -> Self {
        Self {
            roll_degs: normalize_signed(roll_degs),
            pitch_degs: normalize_signed(pitch_degs),
            yaw_degs: normalize_signed(yaw_degs),
        }
    }
}

/// Direction and rate of travel over the ground.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Course {
    pub heading_degs: f64,
    pub speed_mtr_sec: f64,
}

impl Course {
    pub fn new(heading_degs: f64, speed_mtr_sec: f64) -> Self {
        Self {
            heading_degs: normalize_heading(heading_degs),
            speed_mtr_sec: speed_mtr_sec.max(0.0),
        }
    }
}

/// Rate of change of the course, used for extrapolation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CourseDelta {
    /// Turn rate, degrees per second (positive = clockwise)
    pub heading_rate_degs_sec: f64,
    /// Longitudinal acceleration, m/s²
    pub speed_rate_mtr_sec2: f64,
    /// Vertical speed, m/s
    pub climb_rate_mtr_sec: f64,
}

impl CourseDelta {
    pub fn new(heading_rate_degs_sec: f64, speed_rate_mtr_sec2: f64, climb_rate_mtr_sec: f64) -> Self {
        Self { heading_rate_degs_sec, speed_rate_mtr_sec2, climb_rate_mtr_sec }
    }

    pub fn is_zero(&self) -> bool {
        self.heading_rate_degs_sec == 0.0
            && self.speed_rate_mtr_sec2 == 0.0
            && self.climb_rate_mtr_sec == 0.0
    }
}

/// Full kinematic state of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KinematicState {
    pub position: GeoPosition,
    pub attitude: Attitude,
    pub course: Course,
    pub course_delta: CourseDelta,
}

impl KinematicState {
    /// Dead-reckons the state forward by `dt` seconds.
    ///
    /// Position moves along the current heading on a great circle, then the
    /// course delta is applied. With a zero course delta the attitude is left
    /// as commanded. Otherwise it is derived from the motion: yaw follows
    /// heading, pitch follows the flight-path angle and roll is the
    /// coordinated-turn bank for the current turn rate.
    pub fn advance(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let manoeuvring = !self.course_delta.is_zero();

        let distance = self.course.speed_mtr_sec * dt;
        if distance > 0.0 {
            let next = self
                .position
                .to_point()
                .haversine_destination(self.course.heading_degs, distance);
            self.position.lat_degs = next.y();
            self.position.lon_degs = normalize_signed(next.x());
        }
        if !manoeuvring {
            return;
        }
        self.position.alt_mtrs += self.course_delta.climb_rate_mtr_sec * dt;

        self.course = Course::new(
            self.course.heading_degs + self.course_delta.heading_rate_degs_sec * dt,
            self.course.speed_mtr_sec + self.course_delta.speed_rate_mtr_sec2 * dt,
        );

        let speed = self.course.speed_mtr_sec;
        let turn_rate_rads = self.course_delta.heading_rate_degs_sec.to_radians();
        let roll = (speed * turn_rate_rads / GRAVITY).atan().to_degrees();
        let pitch = if speed > 0.0 || self.course_delta.climb_rate_mtr_sec != 0.0 {
            self.course_delta.climb_rate_mtr_sec.atan2(speed).to_degrees()
        } else {
            0.0
        };
        self.attitude = Attitude::new(roll, pitch, self.course.heading_degs);
    }
}
