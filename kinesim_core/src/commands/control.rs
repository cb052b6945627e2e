//! Process, configuration, clock and scenario commands.

use super::{arg, FnCommand};
use crate::error::{CoreError, CoreResult};
use crate::runtime::RuntimeContext;

pub const COMMANDS: &[FnCommand] = &[
    FnCommand::new("exit", "exit - end the session", exit),
    FnCommand::new("help", "help [command] - list commands or show one usage", help),
    FnCommand::new("configget", "configget <key> - show one configuration value", config_get),
    FnCommand::new("configset", "configset <key> <value> - change one configuration value", config_set),
    FnCommand::new("configlist", "configlist - show every configuration value", config_list),
    FnCommand::new("simstart", "simstart - start a fresh run from the start states", sim_start),
    FnCommand::new("simstop", "simstop - stop the update loop", sim_stop),
    FnCommand::new("simpause", "simpause - pause the update loop", sim_pause),
    FnCommand::new("simresume", "simresume - resume without resetting elapsed time", sim_resume),
    FnCommand::new("simreset", "simreset - zero elapsed time (clock must not be running)", sim_reset),
    FnCommand::new("simstatus", "simstatus - show clock state and elapsed time", sim_status),
    FnCommand::new("scenarioload", "scenarioload <name> - clear the world and load a scenario", scenario_load),
];

fn exit(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    rt.request_exit();
    Ok("Exiting".to_string())
}

fn help(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let dispatcher = rt.dispatcher();
    if let Some(name) = args.first() {
        let command = dispatcher
            .get(name)
            .ok_or_else(|| CoreError::UnknownCommand(name.to_string()))?;
        return Ok(command.usage().to_string());
    }
    let lines: Vec<String> = dispatcher
        .names()
        .into_iter()
        .filter_map(|name| dispatcher.get(name))
        .map(|command| command.usage().to_string())
        .collect();
    Ok(lines.join("\n"))
}

fn config_get(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let key = arg(args, 0, "key")?;
    let value = rt.config().get(key)?;
    Ok(format!("{} = {}", key, value))
}

fn config_set(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let key = arg(args, 0, "key")?;
    arg(args, 1, "value")?;
    let raw = args[1..].join(" ");
    let value = rt.set_config(key, &raw)?;
    Ok(format!("{} = {}", key, value))
}

fn config_list(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    let lines: Vec<String> = rt
        .config()
        .entries()?
        .into_iter()
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect();
    Ok(lines.join("\n"))
}

fn sim_start(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    if rt.start_simulation() {
        Ok("Simulation started".to_string())
    } else {
        Ok("Simulation already running".to_string())
    }
}

fn sim_stop(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    rt.stop_simulation();
    Ok(format!("Simulation stopped ({})", rt.clock().status()))
}

fn sim_pause(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    if rt.pause_simulation() {
        Ok(format!("Simulation paused ({})", rt.clock().status()))
    } else {
        Err(CoreError::ClockState("not running".to_string()))
    }
}

fn sim_resume(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    if rt.resume_simulation() {
        Ok("Simulation resumed".to_string())
    } else {
        Ok("Simulation already running".to_string())
    }
}

fn sim_reset(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    rt.reset_simulation()?;
    Ok("Simulation reset".to_string())
}

fn sim_status(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    let scenario = rt.scenario_name().unwrap_or_else(|| "-".to_string());
    Ok(format!("{} scenario={} entities={}", rt.clock().status(), scenario, rt.registry().len()))
}

fn scenario_load(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    rt.load_scenario(name)
}

#[cfg(test)]
mod tests {
    use crate::clock::ClockState;
    use crate::runtime::tests::test_runtime;

    #[test]
    fn test_exit_sets_flag() {
        let rt = test_runtime();
        assert!(!rt.exit_requested());
        assert!(rt.execute("exit").success);
        assert!(rt.exit_requested());
    }

    #[test]
    fn test_help_lists_and_describes() {
        let rt = test_runtime();
        let all = rt.execute("help");
        assert!(all.success);
        assert!(all.text.contains("entityadd <name> <class>"));

        let one = rt.execute("help SimStart");
        assert_eq!(one.text, "simstart - start a fresh run from the start states");
        assert!(!rt.execute("help nothing").success);
    }

    #[test]
    fn test_config_commands() {
        let rt = test_runtime();
        assert_eq!(rt.execute("configset tick_rate_hz 25").text, "tick_rate_hz = 25");
        assert_eq!(rt.execute("configget tick_rate_hz").text, "tick_rate_hz = 25");
        assert!(!rt.execute("configset tick_rate_hz quick").success);
        assert!(!rt.execute("configget").success);
        assert!(rt.execute("configlist").text.contains("listen_addr = "));
    }

    #[test]
    fn test_clock_commands() {
        let rt = test_runtime();
        assert!(rt.execute("simstart").success);
        assert_eq!(rt.clock().state(), ClockState::Running);
        assert!(!rt.execute("simreset").success);
        assert!(rt.execute("simpause").success);
        assert_eq!(rt.clock().state(), ClockState::Paused);
        assert!(rt.execute("simresume").success);
        assert!(rt.execute("simstop").success);
        assert!(rt.execute("simreset").success);
        assert!(rt.execute("simstatus").text.starts_with("state=stopped"));
    }
}
