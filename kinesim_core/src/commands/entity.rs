//! Entity lifecycle, detail and report commands.

use super::{arg, num, opt_num, FnCommand};
use crate::error::{CoreError, CoreResult};
use crate::kinematics::{Attitude, Course, CourseDelta, GeoPosition, KinematicState};
use crate::runtime::RuntimeContext;
use kinesim_env::Notification;
use rand::Rng;

pub const COMMANDS: &[FnCommand] = &[
    FnCommand::new("entityadd", "entityadd <name> <class> [category] - create an entity", add),
    FnCommand::new(
        "entityaddbatch",
        "entityaddbatch <prefix> <count> <class> <lat> <lon> [spread-degs] - create entities scattered around a point",
        add_batch,
    ),
    FnCommand::new("entitydelete", "entitydelete <name> - remove an entity", delete),
    FnCommand::new("entitydeleteall", "entitydeleteall - remove every entity", delete_all),
    FnCommand::new("entitypos", "entitypos <name> <lat> <lon> <alt> - set position", position),
    FnCommand::new("entitycourse", "entitycourse <name> <heading> <speed> - set course", course),
    FnCommand::new(
        "entitycoursedelta",
        "entitycoursedelta <name> <heading-rate> <speed-rate> [climb-rate] - set rates of change",
        course_delta,
    ),
    FnCommand::new("entityatt", "entityatt <name> <roll> <pitch> <yaw> - set attitude", attitude),
    FnCommand::new("entitytype", "entitytype <name> <class> <category> - set classification", entity_type),
    FnCommand::new(
        "entitystart",
        "entitystart <name> <lat> <lon> <alt> <heading> <speed> - set the start state",
        start,
    ),
    FnCommand::new(
        "entityelement",
        "entityelement <name> <element-name> <type> - attach an element",
        element,
    ),
    FnCommand::new(
        "entityelementset",
        "entityelementset <name> <element-name> <property> <value> - tune an attached element",
        element_set,
    ),
    FnCommand::new(
        "entityterrain",
        "entityterrain <name> <clearance-mtrs|off> - follow terrain at a height",
        terrain,
    ),
    FnCommand::new("entityfocus", "entityfocus <name> - focus the front-end on an entity", focus),
    FnCommand::new("entityreport", "entityreport <name> - show full entity details", report),
    FnCommand::new("entitypositions", "entitypositions - one position line per entity", positions),
];

/// Spread used by `entityaddbatch` when none is given.
const DEFAULT_SPREAD_DEGS: f64 = 0.1;

/// Most entities one `entityaddbatch` may create.
pub const MAX_BATCH: usize = 10_000;

/// Widest scatter `entityaddbatch` accepts, in degrees either side.
const MAX_SPREAD_DEGS: f64 = 90.0;

fn add(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let class = arg(args, 1, "class")?;
    if !rt.registry().add_entity(name, class) {
        return Err(CoreError::DuplicateEntity(name.to_string()));
    }
    if let Some(category) = args.get(2) {
        rt.registry().set_type(name, class, category)?;
    }
    rt.notify(Notification::EntityCreated { entity_name: name.to_string() });
    Ok(format!("Added {}", name))
}

fn add_batch(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let prefix = arg(args, 0, "prefix")?;
    let count: usize = num(args, 1, "count")?;
    let class = arg(args, 2, "class")?;
    let lat: f64 = num(args, 3, "lat")?;
    let lon: f64 = num(args, 4, "lon")?;
    let spread = opt_num::<f64>(args, 5, "spread")?.unwrap_or(DEFAULT_SPREAD_DEGS).abs();
    if count > MAX_BATCH {
        return Err(CoreError::InvalidArgument(format!("count {} exceeds {}", count, MAX_BATCH)));
    }
    if spread > MAX_SPREAD_DEGS {
        return Err(CoreError::InvalidArgument(format!("spread {} exceeds {} degrees", spread, MAX_SPREAD_DEGS)));
    }

    let registry = rt.registry();
    let mut rng = rand::thread_rng();
    let mut created = 0;
    for i in 1..=count {
        let name = format!("{}{}", prefix, i);
        let (dlat, dlon) = if spread > 0.0 {
            (rng.gen_range(-spread..=spread), rng.gen_range(-spread..=spread))
        } else {
            (0.0, 0.0)
        };
        let state = KinematicState {
            position: GeoPosition::new((lat + dlat).clamp(-90.0, 90.0), lon + dlon, 0.0),
            course: Course::new(rng.gen_range(0.0..360.0), 0.0),
            ..Default::default()
        };
        if registry.add_entity_at(&name, class, state) {
            rt.notify(Notification::EntityCreated { entity_name: name });
            created += 1;
        }
    }
    Ok(format!("Added {} of {} entities", created, count))
}

fn delete(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    if !rt.registry().delete_entity(name) {
        return Ok(format!("{} not present", name));
    }
    rt.notify(Notification::EntityDeleted { entity_name: name.to_string() });
    Ok(format!("Deleted {}", name))
}

fn delete_all(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    let count = rt.registry().delete_all();
    Ok(format!("Deleted {} entities", count))
}

fn position(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let pos = GeoPosition::new(num(args, 1, "lat")?, num(args, 2, "lon")?, num(args, 3, "alt")?);
    rt.registry().set_position(name, pos)?;
    Ok(format!("{} at {:.6} {:.6} {:.1}", name, pos.lat_degs, pos.lon_degs, pos.alt_mtrs))
}

fn course(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let course = Course::new(num(args, 1, "heading")?, num(args, 2, "speed")?);
    rt.registry().set_course(name, course)?;
    Ok(format!("{} hdg={:.1} spd={:.1}", name, course.heading_degs, course.speed_mtr_sec))
}

fn course_delta(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let climb = opt_num::<f64>(args, 3, "climb-rate")?.unwrap_or(0.0);
    let delta = CourseDelta::new(num(args, 1, "heading-rate")?, num(args, 2, "speed-rate")?, climb);
    rt.registry().set_course_delta(name, delta)?;
    Ok(format!("{} course delta set", name))
}

fn attitude(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let att = Attitude::new(num(args, 1, "roll")?, num(args, 2, "pitch")?, num(args, 3, "yaw")?);
    rt.registry().set_attitude(name, att)?;
    Ok(format!(
        "{} roll={:.1} pitch={:.1} yaw={:.1}",
        name, att.roll_degs, att.pitch_degs, att.yaw_degs
    ))
}

fn entity_type(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let class = arg(args, 1, "class")?;
    let category = arg(args, 2, "category")?;
    rt.registry().set_type(name, class, category)?;
    Ok(format!("{} is {} / {}", name, class, category))
}

fn start(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let pos = GeoPosition::new(num(args, 1, "lat")?, num(args, 2, "lon")?, num(args, 3, "alt")?);
    let course = Course::new(num(args, 4, "heading")?, num(args, 5, "speed")?);
    let att = Attitude::new(0.0, 0.0, course.heading_degs);
    rt.registry().set_start_details(name, pos, att, course)?;
    Ok(format!("{} start state set", name))
}

fn element(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let element_name = arg(args, 1, "element-name")?;
    let tag = arg(args, 2, "type")?;
    if rt.registry().add_element(name, element_name, tag)? {
        Ok(format!("{} now carries {} ({})", name, element_name, tag))
    } else {
        let known = rt.registry().element_tags().join(" ");
        Err(CoreError::InvalidArgument(format!("unknown element type '{}' (known: {})", tag, known)))
    }
}

fn element_set(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let element_name = arg(args, 1, "element-name")?;
    let key = arg(args, 2, "property")?;
    let value: f64 = num(args, 3, "value")?;
    rt.registry().set_element_property(name, element_name, key, value)?;
    Ok(format!("{}.{} {} = {}", name, element_name, key, value))
}

fn terrain(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let setting = arg(args, 1, "clearance")?;
    if setting.eq_ignore_ascii_case("off") {
        rt.registry().set_terrain_following(name, None)?;
        return Ok(format!("{} terrain following off", name));
    }
    let clearance: f64 = num(args, 1, "clearance")?;
    rt.registry().set_terrain_following(name, Some(clearance))?;
    Ok(format!("{} following terrain at {:.1}m", name, clearance))
}

fn focus(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    rt.focus_entity(name)?;
    Ok(format!("Focus on {}", name))
}

fn report(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    rt.registry()
        .entity_for_name(name)
        .map(|e| e.report())
        .ok_or_else(|| CoreError::not_found(name))
}

fn positions(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    let lines: Vec<String> = rt.registry().snapshot().iter().map(|e| e.position_line()).collect();
    if lines.is_empty() {
        return Ok("No entities".to_string());
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use crate::runtime::tests::test_runtime;
    use approx::assert_relative_eq;

    #[test]
    fn test_entityadd_requires_class() {
        let rt = test_runtime();
        assert!(rt.execute("entityadd X F16").success);
        assert!(rt.registry().contains("X"));

        let before = rt.registry().len();
        let response = rt.execute("entityadd");
        assert!(!response.success);
        assert_eq!(rt.registry().len(), before);
        assert!(!rt.execute("entityadd Y").success);
        assert!(!rt.registry().contains("Y"));
    }

    #[test]
    fn test_entityadd_duplicate_fails() {
        let rt = test_runtime();
        assert!(rt.execute("entityadd X F16 air").success);
        assert!(!rt.execute("entityadd X MiG29").success);
        assert_eq!(rt.registry().entity_for_name("X").unwrap().category, "air");
    }

    #[test]
    fn test_setters_and_report() {
        let rt = test_runtime();
        rt.execute("entityadd X F16");
        assert!(rt.execute("entitypos X 51.5 -0.1 3000").success);
        assert!(rt.execute("entitycourse X 450 200").success);
        assert!(rt.execute("entityatt X 0 5 270").success);
        assert!(rt.execute("entitytype X F16C blue").success);

        let e = rt.registry().entity_for_name("X").unwrap();
        assert_relative_eq!(e.position().lat_degs, 51.5);
        assert_relative_eq!(e.course().heading_degs, 90.0);
        assert_relative_eq!(e.attitude().yaw_degs, -90.0);

        let report = rt.execute("entityreport X");
        assert!(report.text.contains("Class: F16C  Category: blue"));
        assert!(!rt.execute("entitypos X north -0.1 3000").success);
        assert!(!rt.execute("entitypos Ghost 1 2 3").success);
    }

    #[test]
    fn test_batch_and_positions() {
        let rt = test_runtime();
        let response = rt.execute("entityaddbatch drone 5 Quad 10 20 0.5");
        assert_eq!(response.text, "Added 5 of 5 entities");
        let lines = rt.execute("entitypositions").text;
        assert_eq!(lines.lines().count(), 5);
        for e in rt.registry().snapshot() {
            assert!((e.position().lat_degs - 10.0).abs() <= 0.5);
        }
        assert!(rt.execute("entitydeleteall").text.contains("5"));
        assert_eq!(rt.execute("entitypositions").text, "No entities");
    }

    #[test]
    fn test_element_and_terrain() {
        let rt = test_runtime();
        rt.execute("entityadd X Heli");
        assert!(rt.execute("entityelement X radar sensor").success);
        let unknown = rt.execute("entityelement X pod laser");
        assert!(!unknown.success);
        assert!(unknown.text.contains("known: sensor trail"));
        assert!(rt.execute("entityterrain X 150").success);
        assert_eq!(rt.registry().entity_for_name("X").unwrap().terrain_clearance_mtrs, Some(150.0));
        assert!(rt.execute("entityterrain X off").success);
        assert_eq!(rt.registry().entity_for_name("X").unwrap().terrain_clearance_mtrs, None);
    }

    #[test]
    fn test_element_properties_tunable() {
        let rt = test_runtime();
        rt.execute("entityadd X Heli");
        rt.execute("entityelement X radar sensor");
        rt.execute("entityelement X crumbs trail");

        assert!(rt.execute("entityelementset X radar range 25000").success);
        assert!(rt.execute("entityelementset X crumbs capacity 8").success);
        assert!(!rt.execute("entityelementset X radar colour 1").success);
        assert!(!rt.execute("entityelementset X pod range 1").success);
        assert!(!rt.execute("entityelementset X radar range NaN").success);
    }

    #[test]
    fn test_batch_rejects_bad_input_without_mutation() {
        let rt = test_runtime();
        assert!(!rt.execute("entityaddbatch d 3 Q 0 0 inf").success);
        assert!(!rt.execute("entityaddbatch d 3 Q 0 0 NaN").success);
        assert!(!rt.execute("entityaddbatch d 3 Q 0 0 1e308").success);
        assert!(!rt.execute(&format!("entityaddbatch d {} Q 0 0", super::MAX_BATCH + 1)).success);
        assert!(rt.registry().is_empty());
    }

    #[test]
    fn test_delete_and_focus_missing() {
        let rt = test_runtime();
        let absent = rt.execute("entitydelete Ghost");
        assert!(absent.success);
        assert_eq!(absent.text, "Ghost not present");
        assert!(!rt.execute("entityfocus Ghost").success);
        rt.execute("entityadd X F16");
        assert!(rt.execute("entityfocus X").success);
        assert_eq!(rt.execute("entitydelete x").text, "x not present");
        assert!(rt.registry().contains("X"));
        assert_eq!(rt.execute("EntityDelete X").text, "Deleted X");
    }
}
