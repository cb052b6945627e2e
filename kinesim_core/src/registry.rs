//! Entity registry: the owner of every live platform.
//!
//! The registry maintains the simulated world:
//! - Lifecycle of entities (add, delete, reset)
//! - Field mutations from the command and message front doors
//! - The periodic kinetics step driven by the update loop
//!
//! One coarse `RwLock` guards the whole map. Lookups take the read lock and
//! hand out clones; mutations and the kinetics pass take the write lock, so a
//! pass never sees an entity half-added or half-removed.

use crate::element::ElementFactory;
use crate::elevation::{is_valid_elevation, ElevationStore};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::kinematics::{Attitude, Course, CourseDelta, GeoPosition, KinematicState};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Thread-safe set of entities keyed by name.
pub struct EntityRegistry {
    /// All live entities
    entities: RwLock<BTreeMap<String, Entity>>,

    /// Element constructors by type tag
    elements: ElementFactory,

    /// Terrain for terrain-following entities
    terrain: Option<Arc<ElevationStore>>,
}

impl EntityRegistry {
    /// Creates an empty registry with the built-in element kinds and no terrain.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            elements: ElementFactory::with_builtin(),
            terrain: None,
        }
    }

    /// Attaches the elevation store consulted by terrain following.
    pub fn with_terrain(mut self, terrain: Arc<ElevationStore>) -> Self {
        self.terrain = Some(terrain);
        self
    }

    // A tick that panicked mid-pass leaves the lock poisoned; the map is
    // still structurally sound, so keep serving it.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Entity>> {
        self.entities.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Entity>> {
        self.entities.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `f` to the named entity under the write lock.
    fn modify<T>(&self, name: &str, f: impl FnOnce(&mut Entity) -> T) -> CoreResult<T> {
        let mut entities = self.write();
        let entity = entities.get_mut(name).ok_or_else(|| CoreError::not_found(name))?;
        Ok(f(entity))
    }

    /// Creates an entity if the name is unused.
    ///
    /// Returns true when a new entity was created, false when the name was
    /// already taken (the existing entity is left untouched).
    pub fn add_entity(&self, name: &str, class: &str) -> bool {
        let mut entities = self.write();
        if entities.contains_key(name) {
            return false;
        }
        entities.insert(name.to_string(), Entity::new(name, class));
        debug!("Added entity {} ({})", name, class);
        true
    }

    /// Creates an entity already placed in `state`, in one step.
    ///
    /// Returns false and changes nothing if the name is taken.
    pub fn add_entity_at(&self, name: &str, class: &str, state: KinematicState) -> bool {
        let mut entities = self.write();
        if entities.contains_key(name) {
            return false;
        }
        let mut entity = Entity::new(name, class);
        entity.state = state;
        entities.insert(name.to_string(), entity);
        debug!("Added entity {} ({})", name, class);
        true
    }

    /// Creates the entity or retypes the existing one, then places it.
    ///
    /// An absent `category` keeps the existing category. Returns true when a
    /// new entity was created.
    pub fn upsert_entity(&self, name: &str, class: &str, category: Option<&str>, position: GeoPosition) -> bool {
        let mut entities = self.write();
        let created = !entities.contains_key(name);
        let entity = entities
            .entry(name.to_string())
            .or_insert_with(|| Entity::new(name, class));
        entity.class = class.to_string();
        if let Some(category) = category {
            entity.category = category.to_string();
        }
        entity.state.position = position;
        if created {
            debug!("Added entity {} ({})", name, class);
        }
        created
    }

    /// Removes one entity. Returns false if it was not there.
    pub fn delete_entity(&self, name: &str) -> bool {
        let removed = self.write().remove(name).is_some();
        if removed {
            debug!("Deleted entity {}", name);
        }
        removed
    }

    /// Removes every entity, returning how many were removed.
    pub fn delete_all(&self) -> usize {
        let mut entities = self.write();
        let count = entities.len();
        entities.clear();
        count
    }

    /// Clears the registry between scenarios.
    pub fn reset(&self) {
        let count = self.delete_all();
        debug!("Registry reset, {} entities removed", count);
    }

    /// Snapshot of the named entity.
    pub fn entity_for_name(&self, name: &str) -> Option<Entity> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Names in sorted order.
    pub fn entity_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Snapshot of every entity in name order.
    pub fn snapshot(&self) -> Vec<Entity> {
        self.read().values().cloned().collect()
    }

    pub fn set_type(&self, name: &str, class: &str, category: &str) -> CoreResult<()> {
        self.modify(name, |e| {
            e.class = class.to_string();
            e.category = category.to_string();
        })
    }

    /// Records the start state and moves the entity there now.
    pub fn set_start_details(&self, name: &str, position: GeoPosition, attitude: Attitude, course: Course) -> CoreResult<()> {
        self.modify(name, |e| {
            let start = KinematicState {
                position,
                attitude,
                course,
                course_delta: CourseDelta::default(),
            };
            e.start = Some(start);
            e.state = start;
        })
    }

    pub fn set_current_details(
        &self,
        name: &str,
        position: GeoPosition,
        attitude: Attitude,
        course: Course,
        course_delta: CourseDelta,
    ) -> CoreResult<()> {
        self.modify(name, |e| {
            e.state = KinematicState { position, attitude, course, course_delta };
        })
    }

    pub fn set_position(&self, name: &str, position: GeoPosition) -> CoreResult<()> {
        self.modify(name, |e| e.state.position = position)
    }

    pub fn set_course(&self, name: &str, course: Course) -> CoreResult<()> {
        self.modify(name, |e| e.state.course = course)
    }

    /// Moves the entity and turns it to `heading_degs`, keeping its speed.
    pub fn set_position_heading(&self, name: &str, position: GeoPosition, heading_degs: f64) -> CoreResult<()> {
        self.modify(name, |e| {
            e.state.position = position;
            e.state.course = Course::new(heading_degs, e.state.course.speed_mtr_sec);
        })
    }

    /// Replaces position, attitude and course, keeping the course delta.
    pub fn replace_motion(&self, name: &str, position: GeoPosition, attitude: Attitude, course: Course) -> CoreResult<()> {
        self.modify(name, |e| {
            e.state.position = position;
            e.state.attitude = attitude;
            e.state.course = course;
        })
    }

    pub fn set_attitude(&self, name: &str, attitude: Attitude) -> CoreResult<()> {
        self.modify(name, |e| e.state.attitude = attitude)
    }

    pub fn set_course_delta(&self, name: &str, course_delta: CourseDelta) -> CoreResult<()> {
        self.modify(name, |e| e.state.course_delta = course_delta)
    }

    /// Turns terrain following on (`Some(clearance)`) or off (`None`).
    pub fn set_terrain_following(&self, name: &str, clearance_mtrs: Option<f64>) -> CoreResult<()> {
        self.modify(name, |e| e.terrain_clearance_mtrs = clearance_mtrs)
    }

    /// Attaches an element built from `tag` under `element_name`.
    ///
    /// Returns `Ok(false)` and creates nothing when the tag is unknown.
    pub fn add_element(&self, name: &str, element_name: &str, tag: &str) -> CoreResult<bool> {
        let Some(element) = self.elements.create(tag) else {
            debug!("No element type '{}', nothing attached to {}", tag, name);
            return self.modify(name, |_| false);
        };
        self.modify(name, |e| {
            e.elements.insert(element_name.to_string(), element);
            true
        })
    }

    /// Element type tags `add_element` accepts, in sorted order.
    pub fn element_tags(&self) -> Vec<String> {
        self.elements.tags().into_iter().map(str::to_string).collect()
    }

    /// Sets a numeric property on an attached element.
    pub fn set_element_property(&self, name: &str, element_name: &str, key: &str, value: f64) -> CoreResult<()> {
        let applied = self.modify(name, |e| {
            e.elements
                .get_mut(element_name)
                .map(|element| element.set_property(key, value))
                .unwrap_or(false)
        })?;
        if !applied {
            return Err(CoreError::InvalidArgument(format!(
                "{}.{} has no property '{}'",
                name, element_name, key
            )));
        }
        Ok(())
    }

    /// Puts every entity with recorded start details back at its start state.
    pub fn restore_start_states(&self) -> usize {
        let mut entities = self.write();
        let mut restored = 0;
        for entity in entities.values_mut() {
            if let Some(start) = entity.start {
                entity.state = start;
                restored += 1;
            }
        }
        restored
    }

    /// Advances every entity by `dt` seconds. Returns the number advanced.
    ///
    /// Holds the write lock for the whole pass: one pass at a time, and no
    /// add/delete can interleave with it.
    pub fn update_kinetics(&self, dt: f64) -> usize {
        let mut entities = self.write();
        for entity in entities.values_mut() {
            entity.state.advance(dt);

            if let (Some(clearance), Some(terrain)) = (entity.terrain_clearance_mtrs, &self.terrain) {
                let p = entity.state.position;
                let ground = terrain.elevation_at(p.lat_degs, p.lon_degs);
                if is_valid_elevation(ground) {
                    entity.state.position.alt_mtrs = ground + clearance;
                }
            }

            for element in entity.elements.values_mut() {
                element.update(&entity.state, dt);
            }
        }
        entities.len()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::{ElevationPatch, GeoBounds};
    use approx::assert_relative_eq;
    use geo::HaversineDistance;
    use proptest::prelude::*;

    #[test]
    fn test_add_then_lookup_then_delete() {
        let registry = EntityRegistry::new();
        assert!(registry.add_entity("Viper1", "F16"));

        let entity = registry.entity_for_name("Viper1").unwrap();
        assert_eq!(entity.name(), "Viper1");
        assert_eq!(entity.class, "F16");

        assert!(registry.delete_entity("Viper1"));
        assert!(registry.entity_for_name("Viper1").is_none());
    }

    #[test]
    fn test_double_add_keeps_one() {
        let registry = EntityRegistry::new();
        assert!(registry.add_entity("Viper1", "F16"));
        assert!(!registry.add_entity("Viper1", "MiG29"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entity_for_name("Viper1").unwrap().class, "F16");
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let registry = EntityRegistry::new();
        assert!(!registry.delete_entity("ghost"));
        assert_eq!(registry.delete_all(), 0);
    }

    #[test]
    fn test_mutators_report_not_found() {
        let registry = EntityRegistry::new();
        let err = registry.set_position("ghost", GeoPosition::default()).unwrap_err();
        assert!(matches!(err, CoreError::EntityNotFound(ref n) if n == "ghost"));
        assert!(registry.set_course("ghost", Course::default()).is_err());
        assert!(registry.set_attitude("ghost", Attitude::default()).is_err());
        assert!(registry.set_type("ghost", "a", "b").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_kinetics_advances_along_heading() {
        let registry = EntityRegistry::new();
        registry.add_entity("A", "F16");
        let start = GeoPosition::new(10.0, 20.0, 3000.0);
        registry.set_position("A", start).unwrap();
        registry.set_course("A", Course::new(45.0, 250.0)).unwrap();

        assert_eq!(registry.update_kinetics(0.5), 1);

        let e = registry.entity_for_name("A").unwrap();
        let moved = start.to_point().haversine_distance(&e.position().to_point());
        assert_relative_eq!(moved, 125.0, epsilon = 1e-4);
        assert_eq!(e.course().heading_degs, 45.0);
    }

    #[test]
    fn test_commanded_attitude_survives_tick() {
        let registry = EntityRegistry::new();
        registry.add_entity("X", "F16");
        registry.set_course("X", Course::new(0.0, 120.0)).unwrap();
        registry.set_attitude("X", Attitude::new(10.0, 5.0, 270.0)).unwrap();

        registry.update_kinetics(0.02);

        let attitude = *registry.entity_for_name("X").unwrap().attitude();
        assert_relative_eq!(attitude.roll_degs, 10.0);
        assert_relative_eq!(attitude.pitch_degs, 5.0);
        assert_relative_eq!(attitude.yaw_degs, -90.0);
    }

    #[test]
    fn test_upsert_creates_then_retypes() {
        let registry = EntityRegistry::new();
        assert!(registry.upsert_entity("X", "F16", Some("air"), GeoPosition::new(1.0, 2.0, 3.0)));
        assert!(!registry.upsert_entity("X", "F35", None, GeoPosition::new(4.0, 5.0, 6.0)));

        let e = registry.entity_for_name("X").unwrap();
        assert_eq!(e.class, "F35");
        assert_eq!(e.category, "air");
        assert_eq!(e.position(), &GeoPosition::new(4.0, 5.0, 6.0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_entity_at_places_in_one_step() {
        let registry = EntityRegistry::new();
        let state = KinematicState {
            position: GeoPosition::new(10.0, 20.0, 0.0),
            course: Course::new(45.0, 0.0),
            ..Default::default()
        };
        assert!(registry.add_entity_at("A", "Quad", state));
        assert!(!registry.add_entity_at("A", "Quad", KinematicState::default()));
        assert_eq!(registry.entity_for_name("A").unwrap().state, state);
    }

    #[test]
    fn test_position_heading_keeps_speed() {
        let registry = EntityRegistry::new();
        registry.add_entity("A", "F16");
        registry.set_course("A", Course::new(10.0, 150.0)).unwrap();

        registry.set_position_heading("A", GeoPosition::new(1.0, 2.0, 100.0), 90.0).unwrap();

        let e = registry.entity_for_name("A").unwrap();
        assert_eq!(e.course(), &Course::new(90.0, 150.0));
        assert!(registry.set_position_heading("ghost", GeoPosition::default(), 0.0).is_err());
        assert!(registry.replace_motion("ghost", GeoPosition::default(), Attitude::default(), Course::default()).is_err());
    }

    #[test]
    fn test_start_details_restore() {
        let registry = EntityRegistry::new();
        registry.add_entity("A", "F16");
        registry
            .set_start_details("A", GeoPosition::new(1.0, 2.0, 3.0), Attitude::default(), Course::new(90.0, 100.0))
            .unwrap();
        registry.update_kinetics(10.0);
        assert_ne!(registry.entity_for_name("A").unwrap().position().lon_degs, 2.0);

        assert_eq!(registry.restore_start_states(), 1);
        assert_eq!(registry.entity_for_name("A").unwrap().position().lon_degs, 2.0);
    }

    #[test]
    fn test_terrain_following_holds_clearance() {
        let terrain = Arc::new(ElevationStore::new());
        terrain.insert("hill", ElevationPatch::flat(GeoBounds::new(0.0, 0.0, 1.0, 1.0), 3, 400.0).unwrap());
        let registry = EntityRegistry::new().with_terrain(terrain);
        registry.add_entity("A", "Heli");
        registry.set_position("A", GeoPosition::new(0.5, 0.5, 5000.0)).unwrap();
        registry.set_terrain_following("A", Some(150.0)).unwrap();

        registry.update_kinetics(0.1);

        assert_relative_eq!(registry.entity_for_name("A").unwrap().position().alt_mtrs, 550.0);
    }

    #[test]
    fn test_unknown_element_tag_creates_nothing() {
        let registry = EntityRegistry::new();
        registry.add_entity("A", "F16");

        assert!(!registry.add_element("A", "pod", "laser").unwrap());
        assert_eq!(registry.element_tags(), vec!["sensor", "trail"]);
        assert!(registry.add_element("A", "radar", "sensor").unwrap());
        assert!(registry.add_element("ghost", "radar", "sensor").is_err());

        let e = registry.entity_for_name("A").unwrap();
        assert_eq!(e.elements.len(), 1);
        assert!(e.elements.contains_key("radar"));
    }

    #[test]
    fn test_element_property() {
        let registry = EntityRegistry::new();
        registry.add_entity("A", "F16");
        registry.add_element("A", "radar", "sensor").unwrap();

        assert!(registry.set_element_property("A", "radar", "range", 1000.0).is_ok());
        assert!(registry.set_element_property("A", "radar", "colour", 1.0).is_err());
        assert!(registry.set_element_property("A", "pod", "range", 1.0).is_err());
    }

    #[test]
    fn test_delete_all_during_kinetics_is_safe() {
        let registry = Arc::new(EntityRegistry::new());
        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for round in 0..200 {
                    for i in 0..20 {
                        registry.add_entity(&format!("E{}-{}", round, i), "drone");
                    }
                    registry.delete_all();
                }
            })
        };
        for _ in 0..500 {
            let advanced = registry.update_kinetics(0.02);
            assert!(advanced <= 20);
        }
        writer.join().unwrap();
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn prop_add_lookup_delete(name in "[A-Za-z][A-Za-z0-9_]{0,15}") {
            let registry = EntityRegistry::new();
            prop_assert!(registry.add_entity(&name, "cls"));
            prop_assert!(!registry.add_entity(&name, "cls"));
            prop_assert_eq!(registry.len(), 1);
            let found = registry.entity_for_name(&name);
            prop_assert_eq!(found.map(|e| e.name().to_string()), Some(name.clone()));
            prop_assert!(registry.delete_entity(&name));
            prop_assert!(registry.entity_for_name(&name).is_none());
        }
    }
}
