//! Simulated platform record.

use crate::element::Element;
use crate::kinematics::{Attitude, Course, GeoPosition, KinematicState};
use std::collections::BTreeMap;
use std::fmt::Write;

/// A simulated platform tracked by name.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Stable identifier, fixed at creation
    name: String,

    /// Free-text classifier (e.g. "F16")
    pub class: String,

    /// Free-text grouping (e.g. "air", "blue")
    pub category: String,

    /// Current kinematic state
    pub state: KinematicState,

    /// State restored when a scenario run starts fresh
    pub start: Option<KinematicState>,

    /// Height to hold above terrain, if terrain following
    pub terrain_clearance_mtrs: Option<f64>,

    /// Named attachments
    pub elements: BTreeMap<String, Box<dyn Element>>,
}

impl Entity {
    /// Creates a stationary entity at the origin.
    pub fn new(name: &str, class: &str) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            category: String::new(),
            state: KinematicState::default(),
            start: None,
            terrain_clearance_mtrs: None,
            elements: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> &GeoPosition {
        &self.state.position
    }

    pub fn attitude(&self) -> &Attitude {
        &self.state.attitude
    }

    pub fn course(&self) -> &Course {
        &self.state.course
    }

    /// Position line used by the all-positions report.
    pub fn position_line(&self) -> String {
        let p = &self.state.position;
        format!(
            "{} {:.6} {:.6} {:.1} hdg={:.1} spd={:.1}",
            self.name, p.lat_degs, p.lon_degs, p.alt_mtrs, self.state.course.heading_degs, self.state.course.speed_mtr_sec
        )
    }

    /// Multi-line detail report.
    pub fn report(&self) -> String {
        let s = &self.state;
        let mut out = String::new();
        let _ = writeln!(out, "Entity: {}", self.name);
        let _ = writeln!(out, "  Class: {}  Category: {}", self.class, self.category);
        let _ = writeln!(
            out,
            "  Position: lat={:.6} lon={:.6} alt={:.1}m",
            s.position.lat_degs, s.position.lon_degs, s.position.alt_mtrs
        );
        let _ = writeln!(
            out,
            "  Attitude: roll={:.1} pitch={:.1} yaw={:.1}",
            s.attitude.roll_degs, s.attitude.pitch_degs, s.attitude.yaw_degs
        );
        let _ = writeln!(
            out,
            "  Course: hdg={:.1} spd={:.1}m/s",
            s.course.heading_degs, s.course.speed_mtr_sec
        );
        let _ = writeln!(
            out,
            "  CourseDelta: hdg-rate={:.2} spd-rate={:.2} climb={:.2}",
            s.course_delta.heading_rate_degs_sec, s.course_delta.speed_rate_mtr_sec2, s.course_delta.climb_rate_mtr_sec
        );
        if let Some(clearance) = self.terrain_clearance_mtrs {
            let _ = writeln!(out, "  TerrainFollow: {:.1}m", clearance);
        }
        for (name, element) in &self.elements {
            let _ = writeln!(out, "  Element {}: {}", name, element.describe());
        }
        out.trim_end().to_string()
    }
}
