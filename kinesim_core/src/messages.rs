//! Structured message front door.
//!
//! Each inbound message is a JSON object with exactly one key naming its kind:
//!
//! ```text
//! {"EntityPosition":{"EntityName":"X","LatDegs":1.0,"LongDegs":2.0,"AltitudeMtrs":100.0,"YawDegs":90.0}}
//! ```
//!
//! Field sets are strict: a missing, mistyped or unexpected field fails the
//! whole decode, so a bad message never half-applies. Decoded messages are
//! applied by [`translate`], which mirrors the entity and scenario commands.

use crate::error::{CoreError, CoreResult};
use crate::kinematics::{Attitude, Course, GeoPosition};
use crate::runtime::RuntimeContext;
use kinesim_env::Notification;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Creates or retypes an entity and places it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct EntityAdd {
    pub entity_name: String,
    pub entity_class: String,
    #[serde(default)]
    pub entity_category: Option<String>,
    pub lat_degs: f64,
    pub long_degs: f64,
    #[serde(default)]
    pub altitude_mtrs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct EntityDelete {
    pub entity_name: String,
}

/// Full replacement of position, attitude and course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct EntityUpdate {
    pub entity_name: String,
    pub lat_degs: f64,
    pub long_degs: f64,
    pub altitude_mtrs: f64,
    pub roll_degs: f64,
    pub pitch_degs: f64,
    pub yaw_degs: f64,
    pub heading_degs: f64,
    pub speed_mtr_sec: f64,
}

/// Position fix plus heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct EntityPosition {
    pub entity_name: String,
    pub lat_degs: f64,
    pub long_degs: f64,
    pub altitude_mtrs: f64,
    /// Senders put the heading in `YawDegs` on this message only.
    #[serde(rename = "YawDegs")]
    pub heading_degs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct EntityCourse {
    pub entity_name: String,
    pub heading_degs: f64,
    pub speed_mtr_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct EntityAttitude {
    pub entity_name: String,
    pub roll_degs: f64,
    pub pitch_degs: f64,
    pub yaw_degs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ScenarioLoad {
    pub scenario_name: String,
}

/// Payload of the scenario control messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoFields {}

/// Rebases the simulation clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ClockSync {
    pub scenario_time_secs: f64,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    EntityAdd(EntityAdd),
    EntityDelete(EntityDelete),
    EntityUpdate(EntityUpdate),
    EntityPosition(EntityPosition),
    EntityCourse(EntityCourse),
    EntityAttitude(EntityAttitude),
    ScenarioLoad(ScenarioLoad),
    ScenarioStart,
    ScenarioStop,
    ScenarioPause,
    ScenarioContinue,
    ClockSync(ClockSync),
}

impl InboundMessage {
    /// Tag the message was decoded from.
    pub fn tag(&self) -> &'static str {
        match self {
            InboundMessage::EntityAdd(_) => "EntityAdd",
            InboundMessage::EntityDelete(_) => "EntityDelete",
            InboundMessage::EntityUpdate(_) => "EntityUpdate",
            InboundMessage::EntityPosition(_) => "EntityPosition",
            InboundMessage::EntityCourse(_) => "EntityCourse",
            InboundMessage::EntityAttitude(_) => "EntityAttitude",
            InboundMessage::ScenarioLoad(_) => "ScenarioLoad",
            InboundMessage::ScenarioStart => "ScenarioStart",
            InboundMessage::ScenarioStop => "ScenarioStop",
            InboundMessage::ScenarioPause => "ScenarioPause",
            InboundMessage::ScenarioContinue => "ScenarioContinue",
            InboundMessage::ClockSync(_) => "ClockSync",
        }
    }
}

fn payload<T: DeserializeOwned>(tag: &str, value: &Value) -> CoreResult<T> {
    T::deserialize(value).map_err(|e| CoreError::decode(format!("{}: {}", tag, e)))
}

/// Payload-less control messages accept `{}` or `null`.
fn no_fields(tag: &str, value: &Value) -> CoreResult<()> {
    if value.is_null() {
        return Ok(());
    }
    payload::<NoFields>(tag, value).map(|_| ())
}

/// Decodes the payload of one tagged message.
pub fn decode(tag: &str, value: &Value) -> CoreResult<InboundMessage> {
    let message = match tag {
        "EntityAdd" => InboundMessage::EntityAdd(payload(tag, value)?),
        "EntityDelete" => InboundMessage::EntityDelete(payload(tag, value)?),
        "EntityUpdate" => InboundMessage::EntityUpdate(payload(tag, value)?),
        "EntityPosition" => InboundMessage::EntityPosition(payload(tag, value)?),
        "EntityCourse" => InboundMessage::EntityCourse(payload(tag, value)?),
        "EntityAttitude" => InboundMessage::EntityAttitude(payload(tag, value)?),
        "ScenarioLoad" => InboundMessage::ScenarioLoad(payload(tag, value)?),
        "ScenarioStart" => no_fields(tag, value).map(|_| InboundMessage::ScenarioStart)?,
        "ScenarioStop" => no_fields(tag, value).map(|_| InboundMessage::ScenarioStop)?,
        "ScenarioPause" => no_fields(tag, value).map(|_| InboundMessage::ScenarioPause)?,
        "ScenarioContinue" => no_fields(tag, value).map(|_| InboundMessage::ScenarioContinue)?,
        "ClockSync" => InboundMessage::ClockSync(payload(tag, value)?),
        other => return Err(CoreError::decode(format!("unknown message '{}'", other))),
    };
    Ok(message)
}

/// Decodes a complete message: a JSON object with exactly one key.
pub fn decode_json(text: &str) -> CoreResult<InboundMessage> {
    let value: Value = serde_json::from_str(text).map_err(CoreError::decode)?;
    let Value::Object(object) = value else {
        return Err(CoreError::decode("message must be a JSON object"));
    };
    if object.len() != 1 {
        return Err(CoreError::decode(format!(
            "message must have exactly one key, found {}",
            object.len()
        )));
    }
    let (tag, body) = object
        .iter()
        .next()
        .ok_or_else(|| CoreError::decode("empty message"))?;
    decode(tag, body)
}

/// Warns about and skips a message aimed at an entity that does not exist.
fn ignored(tag: &str, name: &str) -> CoreResult<String> {
    warn!("{} for unknown entity {} ignored", tag, name);
    Ok(format!("{} ignored: no entity {}", tag, name))
}

/// Turns a missing entity into the logged no-op, passing other outcomes on.
fn applied(tag: &str, name: &str, result: CoreResult<()>, text: String) -> CoreResult<String> {
    match result {
        Ok(()) => Ok(text),
        Err(CoreError::EntityNotFound(_)) => ignored(tag, name),
        Err(e) => Err(e),
    }
}

/// Rejects NaN and infinite fields before anything is applied.
fn finite(tag: &str, fields: &[(&str, f64)]) -> CoreResult<()> {
    match fields.iter().find(|(_, value)| !value.is_finite()) {
        Some((field, value)) => Err(CoreError::decode(format!("{}: {} is {}", tag, field, value))),
        None => Ok(()),
    }
}

impl InboundMessage {
    /// Checks every numeric field is finite.
    pub fn validate(&self) -> CoreResult<()> {
        let tag = self.tag();
        match self {
            InboundMessage::EntityAdd(m) => finite(
                tag,
                &[("LatDegs", m.lat_degs), ("LongDegs", m.long_degs), ("AltitudeMtrs", m.altitude_mtrs)],
            ),
            InboundMessage::EntityUpdate(m) => finite(
                tag,
                &[
                    ("LatDegs", m.lat_degs),
                    ("LongDegs", m.long_degs),
                    ("AltitudeMtrs", m.altitude_mtrs),
                    ("RollDegs", m.roll_degs),
                    ("PitchDegs", m.pitch_degs),
                    ("YawDegs", m.yaw_degs),
                    ("HeadingDegs", m.heading_degs),
                    ("SpeedMtrSec", m.speed_mtr_sec),
                ],
            ),
            InboundMessage::EntityPosition(m) => finite(
                tag,
                &[
                    ("LatDegs", m.lat_degs),
                    ("LongDegs", m.long_degs),
                    ("AltitudeMtrs", m.altitude_mtrs),
                    ("YawDegs", m.heading_degs),
                ],
            ),
            InboundMessage::EntityCourse(m) => {
                finite(tag, &[("HeadingDegs", m.heading_degs), ("SpeedMtrSec", m.speed_mtr_sec)])
            }
            InboundMessage::EntityAttitude(m) => finite(
                tag,
                &[("RollDegs", m.roll_degs), ("PitchDegs", m.pitch_degs), ("YawDegs", m.yaw_degs)],
            ),
            InboundMessage::ClockSync(m) => finite(tag, &[("ScenarioTimeSecs", m.scenario_time_secs)]),
            _ => Ok(()),
        }
    }
}

/// Applies a decoded message to the runtime.
///
/// Each entity message is applied under a single registry write, so a
/// concurrent delete either happens before it (the message is ignored) or
/// after it.
pub fn translate(rt: &RuntimeContext, message: InboundMessage) -> CoreResult<String> {
    debug!("Translating {}", message.tag());
    message.validate()?;
    let registry = rt.registry();
    match message {
        InboundMessage::EntityAdd(m) => {
            let position = GeoPosition::new(m.lat_degs, m.long_degs, m.altitude_mtrs);
            let created =
                registry.upsert_entity(&m.entity_name, &m.entity_class, m.entity_category.as_deref(), position);
            if created {
                rt.notify(Notification::EntityCreated { entity_name: m.entity_name.clone() });
                Ok(format!("Added {}", m.entity_name))
            } else {
                Ok(format!("Updated {}", m.entity_name))
            }
        }
        InboundMessage::EntityDelete(m) => {
            if registry.delete_entity(&m.entity_name) {
                rt.notify(Notification::EntityDeleted { entity_name: m.entity_name.clone() });
                Ok(format!("Deleted {}", m.entity_name))
            } else {
                Ok(format!("{} not present", m.entity_name))
            }
        }
        InboundMessage::EntityUpdate(m) => {
            let result = registry.replace_motion(
                &m.entity_name,
                GeoPosition::new(m.lat_degs, m.long_degs, m.altitude_mtrs),
                Attitude::new(m.roll_degs, m.pitch_degs, m.yaw_degs),
                Course::new(m.heading_degs, m.speed_mtr_sec),
            );
            applied("EntityUpdate", &m.entity_name, result, format!("Updated {}", m.entity_name))
        }
        InboundMessage::EntityPosition(m) => {
            let result = registry.set_position_heading(
                &m.entity_name,
                GeoPosition::new(m.lat_degs, m.long_degs, m.altitude_mtrs),
                m.heading_degs,
            );
            applied("EntityPosition", &m.entity_name, result, format!("Positioned {}", m.entity_name))
        }
        InboundMessage::EntityCourse(m) => {
            let result = registry.set_course(&m.entity_name, Course::new(m.heading_degs, m.speed_mtr_sec));
            applied("EntityCourse", &m.entity_name, result, format!("Course set for {}", m.entity_name))
        }
        InboundMessage::EntityAttitude(m) => {
            let result = registry.set_attitude(&m.entity_name, Attitude::new(m.roll_degs, m.pitch_degs, m.yaw_degs));
            applied("EntityAttitude", &m.entity_name, result, format!("Attitude set for {}", m.entity_name))
        }
        InboundMessage::ScenarioLoad(m) => rt.load_scenario(&m.scenario_name),
        InboundMessage::ScenarioStart => {
            if rt.start_simulation() {
                Ok("Scenario started".to_string())
            } else {
                Ok("Scenario already running".to_string())
            }
        }
        InboundMessage::ScenarioStop => {
            if rt.stop_simulation() {
                Ok("Scenario stopped".to_string())
            } else {
                Ok("Scenario already stopped".to_string())
            }
        }
        InboundMessage::ScenarioPause => {
            if rt.pause_simulation() {
                Ok("Scenario paused".to_string())
            } else {
                Err(CoreError::ClockState("not running".to_string()))
            }
        }
        InboundMessage::ScenarioContinue => {
            if rt.resume_simulation() {
                Ok("Scenario continued".to_string())
            } else {
                Ok("Scenario already running".to_string())
            }
        }
        InboundMessage::ClockSync(m) => {
            let elapsed = Duration::try_from_secs_f64(m.scenario_time_secs)
                .map_err(|e| CoreError::decode(format!("ClockSync: {}", e)))?;
            rt.clock().set_elapsed(elapsed);
            Ok(format!("Clock synced to {:.3}s", m.scenario_time_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockState;
    use crate::runtime::tests::test_runtime;
    use approx::assert_relative_eq;

    const POSITION: &str =
        r#"{"EntityPosition":{"EntityName":"X","LatDegs":1.0,"LongDegs":2.0,"AltitudeMtrs":100.0,"YawDegs":90.0}}"#;

    #[test]
    fn test_position_yaw_is_heading() {
        let InboundMessage::EntityPosition(m) = decode_json(POSITION).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(m.entity_name, "X");
        assert_eq!(m.heading_degs, 90.0);
    }

    #[test]
    fn test_unknown_tag_fails() {
        let err = decode_json(r#"{"EntityTeleport":{"EntityName":"X"}}"#).unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }

    #[test]
    fn test_malformed_payloads_fail() {
        // missing field
        assert!(decode_json(r#"{"EntityCourse":{"EntityName":"X","HeadingDegs":1.0}}"#).is_err());
        // wrong type
        assert!(decode_json(r#"{"ClockSync":{"ScenarioTimeSecs":"soon"}}"#).is_err());
        // unexpected field
        assert!(decode_json(r#"{"EntityDelete":{"EntityName":"X","Force":true}}"#).is_err());
        // two tags
        assert!(decode_json(r#"{"ScenarioStart":{},"ScenarioStop":{}}"#).is_err());
        assert!(decode_json("[1,2]").is_err());
        assert!(decode_json("not json").is_err());
    }

    #[test]
    fn test_control_messages_accept_empty_payload() {
        assert_eq!(decode_json(r#"{"ScenarioStart":{}}"#).unwrap(), InboundMessage::ScenarioStart);
        assert_eq!(decode("ScenarioPause", &Value::Null).unwrap(), InboundMessage::ScenarioPause);
        assert!(decode_json(r#"{"ScenarioStop":{"Now":true}}"#).is_err());
    }

    #[test]
    fn test_add_twice_updates() {
        let rt = test_runtime();
        let add = r#"{"EntityAdd":{"EntityName":"X","EntityClass":"F16","EntityCategory":"air","LatDegs":1.0,"LongDegs":2.0}}"#;
        assert_eq!(rt.handle_message(add).text, "Added X");

        let again = r#"{"EntityAdd":{"EntityName":"X","EntityClass":"F35","LatDegs":5.0,"LongDegs":6.0,"AltitudeMtrs":900.0}}"#;
        let response = rt.handle_message(again);
        assert!(response.success);
        assert_eq!(response.text, "Updated X");

        let e = rt.registry().entity_for_name("X").unwrap();
        assert_eq!(e.class, "F35");
        assert_eq!(e.category, "air");
        assert_eq!(e.position(), &GeoPosition::new(5.0, 6.0, 900.0));
        assert_eq!(rt.registry().len(), 1);
    }

    #[test]
    fn test_position_for_missing_entity_is_ignored() {
        let rt = test_runtime();
        let response = rt.handle_message(POSITION);
        assert!(response.success);
        assert!(rt.registry().is_empty());
    }

    #[test]
    fn test_position_sets_heading_keeps_speed() {
        let rt = test_runtime();
        rt.execute("entityadd X F16");
        rt.execute("entitycourse X 10 150");
        assert!(rt.handle_message(POSITION).success);

        let e = rt.registry().entity_for_name("X").unwrap();
        assert_relative_eq!(e.course().heading_degs, 90.0);
        assert_relative_eq!(e.course().speed_mtr_sec, 150.0);
        assert_relative_eq!(e.position().alt_mtrs, 100.0);
    }

    #[test]
    fn test_update_course_attitude_delete() {
        let rt = test_runtime();
        rt.execute("entityadd X F16");
        let update = r#"{"EntityUpdate":{"EntityName":"X","LatDegs":1.0,"LongDegs":2.0,"AltitudeMtrs":3.0,
            "RollDegs":10.0,"PitchDegs":5.0,"YawDegs":200.0,"HeadingDegs":200.0,"SpeedMtrSec":50.0}}"#;
        assert!(rt.handle_message(update).success);
        let e = rt.registry().entity_for_name("X").unwrap();
        assert_relative_eq!(e.attitude().yaw_degs, -160.0);
        assert_relative_eq!(e.course().speed_mtr_sec, 50.0);

        rt.handle_message(r#"{"EntityCourse":{"EntityName":"X","HeadingDegs":-90.0,"SpeedMtrSec":80.0}}"#);
        assert_relative_eq!(rt.registry().entity_for_name("X").unwrap().course().heading_degs, 270.0);

        rt.handle_message(r#"{"EntityAttitude":{"EntityName":"X","RollDegs":0.0,"PitchDegs":0.0,"YawDegs":45.0}}"#);
        assert_relative_eq!(rt.registry().entity_for_name("X").unwrap().attitude().yaw_degs, 45.0);

        assert_eq!(rt.handle_message(r#"{"EntityDelete":{"EntityName":"X"}}"#).text, "Deleted X");
        assert!(rt.handle_message(r#"{"EntityDelete":{"EntityName":"X"}}"#).success);
    }

    #[test]
    fn test_scenario_messages_drive_clock() {
        let rt = test_runtime();
        assert!(rt.handle_message(r#"{"ScenarioStart":{}}"#).success);
        assert_eq!(rt.clock().state(), ClockState::Running);
        rt.handle_message(r#"{"ScenarioPause":{}}"#);
        assert_eq!(rt.clock().state(), ClockState::Paused);
        rt.handle_message(r#"{"ClockSync":{"ScenarioTimeSecs":42.5}}"#);
        assert_eq!(rt.clock().elapsed(), Duration::from_secs_f64(42.5));
        rt.handle_message(r#"{"ScenarioContinue":{}}"#);
        assert!(rt.clock().is_running());
        rt.handle_message(r#"{"ScenarioStop":{}}"#);
        assert_eq!(rt.clock().state(), ClockState::Stopped);

        assert!(!rt.handle_message(r#"{"ClockSync":{"ScenarioTimeSecs":-1.0}}"#).success);
    }

    #[test]
    fn test_scenario_messages_report_clock_outcome() {
        let rt = test_runtime();
        let pause = rt.handle_message(r#"{"ScenarioPause":{}}"#);
        assert!(!pause.success);
        assert_eq!(rt.clock().state(), ClockState::Stopped);
        assert_eq!(rt.handle_message(r#"{"ScenarioStop":{}}"#).text, "Scenario already stopped");

        assert_eq!(rt.handle_message(r#"{"ScenarioStart":{}}"#).text, "Scenario started");
        assert_eq!(rt.handle_message(r#"{"ScenarioStart":{}}"#).text, "Scenario already running");
        assert_eq!(rt.handle_message(r#"{"ScenarioContinue":{}}"#).text, "Scenario already running");
        rt.stop_simulation();
    }

    #[test]
    fn test_non_finite_fields_rejected_without_mutation() {
        let rt = test_runtime();
        rt.execute("entityadd X F16");
        let message = InboundMessage::EntityPosition(EntityPosition {
            entity_name: "X".to_string(),
            lat_degs: f64::NAN,
            long_degs: 2.0,
            altitude_mtrs: 100.0,
            heading_degs: 90.0,
        });

        let err = translate(&rt, message).unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
        let e = rt.registry().entity_for_name("X").unwrap();
        assert_eq!(e.position(), &GeoPosition::default());
        assert_eq!(e.course().heading_degs, 0.0);

        let add = InboundMessage::EntityAdd(EntityAdd {
            entity_name: "Y".to_string(),
            entity_class: "F16".to_string(),
            entity_category: None,
            lat_degs: 1.0,
            long_degs: f64::INFINITY,
            altitude_mtrs: 0.0,
        });
        assert!(translate(&rt, add).is_err());
        assert!(!rt.registry().contains("Y"));
    }

    #[test]
    fn test_position_racing_delete_is_ignored_or_applied() {
        let rt = test_runtime();
        for round in 0..50 {
            rt.execute("entityadd X F16");
            let deleter = {
                let rt = std::sync::Arc::clone(&rt);
                std::thread::spawn(move || rt.handle_message(r#"{"EntityDelete":{"EntityName":"X"}}"#))
            };
            let response = rt.handle_message(POSITION);
            assert!(response.success, "round {}: {}", round, response.text);
            assert!(deleter.join().unwrap().success);
            assert!(!rt.registry().contains("X"));
        }
    }
}
