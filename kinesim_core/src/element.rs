//! Entity sub-elements and the factory that builds them by type tag.
//!
//! Elements are attachments carried by a platform (sensors, trails, ...).
//! Each one gets a look at its host's kinematic state every tick. New kinds
//! are added by registering a constructor under a tag; asking for a tag
//! nobody registered builds nothing.

use crate::kinematics::{normalize_heading, GeoPosition, KinematicState};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

/// A named attachment with its own state.
pub trait Element: Debug + Send + Sync {
    /// Type tag the element was built from.
    fn kind(&self) -> &'static str;

    /// Advances element state alongside its host.
    fn update(&mut self, host: &KinematicState, dt: f64);

    /// Sets a named numeric property. Returns false for unknown keys.
    fn set_property(&mut self, key: &str, value: f64) -> bool;

    /// One-line human readable state.
    fn describe(&self) -> String;

    fn clone_box(&self) -> Box<dyn Element>;
}

impl Clone for Box<dyn Element> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Scanning sensor: sweeps its look direction around the host at a fixed rate.
#[derive(Debug, Clone)]
pub struct SensorElement {
    pub range_mtrs: f64,
    pub scan_rate_degs_sec: f64,
    /// Look direction relative to the host heading
    pub scan_bearing_degs: f64,
    pub enabled: bool,
}

impl Default for SensorElement {
    fn default() -> Self {
        Self {
            range_mtrs: 50_000.0,
            scan_rate_degs_sec: 36.0,
            scan_bearing_degs: 0.0,
            enabled: true,
        }
    }
}

impl Element for SensorElement {
    fn kind(&self) -> &'static str {
        "sensor"
    }

    fn update(&mut self, _host: &KinematicState, dt: f64) {
        if self.enabled {
            self.scan_bearing_degs = normalize_heading(self.scan_bearing_degs + self.scan_rate_degs_sec * dt);
        }
    }

    fn set_property(&mut self, key: &str, value: f64) -> bool {
        match key {
            "range" => self.range_mtrs = value.max(0.0),
            "scanrate" => self.scan_rate_degs_sec = value,
            "enabled" => self.enabled = value != 0.0,
            _ => return false,
        }
        true
    }

    fn describe(&self) -> String {
        format!(
            "sensor range={:.0}m bearing={:.1} enabled={}",
            self.range_mtrs, self.scan_bearing_degs, self.enabled
        )
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}

/// Breadcrumb history of the host position, oldest first.
#[derive(Debug, Clone)]
pub struct TrailElement {
    pub capacity: usize,
    /// Minimum seconds between breadcrumbs
    pub interval_secs: f64,
    since_last: f64,
    points: VecDeque<GeoPosition>,
}

/// Upper bound on a trail's capacity.
const MAX_TRAIL_POINTS: usize = 100_000;

impl Default for TrailElement {
    fn default() -> Self {
        Self {
            capacity: 100,
            interval_secs: 1.0,
            since_last: f64::INFINITY,
            points: VecDeque::new(),
        }
    }
}

impl TrailElement {
    pub fn points(&self) -> impl Iterator<Item = &GeoPosition> {
        self.points.iter()
    }
}

impl Element for TrailElement {
    fn kind(&self) -> &'static str {
        "trail"
    }

    fn update(&mut self, host: &KinematicState, dt: f64) {
        self.since_last += dt;
        if self.since_last < self.interval_secs {
            return;
        }
        self.since_last = 0.0;
        self.points.push_back(host.position);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    fn set_property(&mut self, key: &str, value: f64) -> bool {
        match key {
            "capacity" => {
                self.capacity = value.clamp(1.0, MAX_TRAIL_POINTS as f64) as usize;
                while self.points.len() > self.capacity {
                    self.points.pop_front();
                }
            }
            "interval" => self.interval_secs = value.max(0.0),
            _ => return false,
        }
        true
    }

    fn describe(&self) -> String {
        format!("trail points={}/{}", self.points.len(), self.capacity)
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}

fn new_sensor() -> Box<dyn Element> {
    Box::new(SensorElement::default())
}

fn new_trail() -> Box<dyn Element> {
    Box::new(TrailElement::default())
}

/// Constructor stored in the factory table.
pub type ElementConstructor = fn() -> Box<dyn Element>;

/// Table from type tag to constructor.
#[derive(Debug, Clone)]
pub struct ElementFactory {
    constructors: BTreeMap<String, ElementConstructor>,
}

impl ElementFactory {
    /// Empty factory: every tag is unknown.
    pub fn empty() -> Self {
        Self { constructors: BTreeMap::new() }
    }

    /// Factory with the built-in `sensor` and `trail` kinds.
    pub fn with_builtin() -> Self {
        let mut factory = Self::empty();
        factory.register("sensor", new_sensor);
        factory.register("trail", new_trail);
        factory
    }

    /// Adds or replaces a constructor. Tags are case-insensitive.
    pub fn register(&mut self, tag: &str, constructor: ElementConstructor) {
        self.constructors.insert(tag.to_ascii_lowercase(), constructor);
    }

    /// Builds an element, or `None` for an unknown tag.
    pub fn create(&self, tag: &str) -> Option<Box<dyn Element>> {
        self.constructors.get(&tag.to_ascii_lowercase()).map(|build| build())
    }

    pub fn tags(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl Default for ElementFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}
