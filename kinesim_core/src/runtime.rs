//! Runtime context: the composition root of a simulation.
//!
//! Ties the engines to the environment abstraction:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RuntimeContext                         │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │  Environment                                          │  │
//! │  │  • TimeSource       → update loop dt                  │  │
//! │  │  • NotificationSink → focus / scenario / entity events│  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │                              │                              │
//! │  ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────────┐   │
//! │  │  CLOCK   │ │ REGISTRY │ │ ELEVATION │ │  DISPATCHER  │   │
//! │  │  + loop  │ │ entities │ │  + archive│ │  commands    │   │
//! │  └──────────┘ └──────────┘ └───────────┘ └──────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no global instance. Front doors (console, message server) each
//! hold an `Arc<RuntimeContext>` and go through [`RuntimeContext::execute`]
//! or [`RuntimeContext::handle_message`].
//!
//! # Usage
//!
//! ```ignore
//! use kinesim_core::{RuntimeConfig, RuntimeContext};
//! use kinesim_env::{BroadcastSink, WallClock};
//!
//! let (sink, _rx) = BroadcastSink::new(256);
//! let rt = RuntimeContext::new(RuntimeConfig::default(), Arc::new(sink), WallClock::shared())?;
//! let response = rt.execute("entityadd Viper1 F16");
//! ```

use crate::archive::TileArchive;
use crate::clock::SimClock;
use crate::commands::{CommandDispatcher, CommandResponse};
use crate::config::RuntimeConfig;
use crate::elevation::ElevationStore;
use crate::error::{CoreError, CoreResult};
use crate::messages;
use crate::registry::EntityRegistry;
use kinesim_env::{Notification, NotificationSink, ScenarioEventKind, SessionId, TimeSource};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Extension of scenario script files.
const SCENARIO_EXTENSION: &str = "scn";

/// Shared handle to one running simulation.
pub struct RuntimeContext {
    /// Live configuration
    config: RwLock<RuntimeConfig>,

    /// All simulated entities
    registry: Arc<EntityRegistry>,

    /// Loaded terrain
    elevation: Arc<ElevationStore>,

    /// Update loop driver
    clock: SimClock,

    /// Text command table
    dispatcher: CommandDispatcher,

    /// Tile archive, opened on first use
    archive: Mutex<Option<Arc<TileArchive>>>,

    /// Outbound events to the front-end
    notifier: Arc<dyn NotificationSink>,

    /// Current scenario name and run id
    scenario: Mutex<(Option<String>, SessionId)>,

    exit_requested: AtomicBool,
}

impl RuntimeContext {
    /// Builds a runtime with every built-in command registered.
    ///
    /// # Arguments
    /// * `config` - Initial configuration
    /// * `notifier` - Sink for outbound notifications
    /// * `time` - Time source driving the update loop
    ///
    /// # Returns
    /// `Err(CoreError::DuplicateCommand)` if the command table is inconsistent.
    pub fn new(
        config: RuntimeConfig,
        notifier: Arc<dyn NotificationSink>,
        time: Arc<dyn TimeSource>,
    ) -> CoreResult<Arc<Self>> {
        let elevation = Arc::new(ElevationStore::new());
        let registry = Arc::new(EntityRegistry::new().with_terrain(Arc::clone(&elevation)));
        let clock = SimClock::new(Arc::clone(&registry), time, Arc::clone(&notifier), config.timing());
        let dispatcher = CommandDispatcher::with_builtin()?;

        info!(
            "Runtime ready: {} commands, {} Hz",
            dispatcher.len(),
            config.tick_rate_hz
        );

        Ok(Arc::new(Self {
            config: RwLock::new(config),
            registry,
            elevation,
            clock,
            dispatcher,
            archive: Mutex::new(None),
            notifier,
            scenario: Mutex::new((None, SessionId::new())),
            exit_requested: AtomicBool::new(false),
        }))
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn elevation(&self) -> &Arc<ElevationStore> {
        &self.elevation
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Snapshot of the configuration.
    pub fn config(&self) -> RuntimeConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Changes one configuration key, returning its new value.
    ///
    /// Timing keys take effect the next time the update loop starts. Changing
    /// the archive path closes the open archive.
    pub fn set_config(&self, key: &str, raw: &str) -> CoreResult<Value> {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        config.set(key, raw)?;
        self.clock.set_timing(config.timing());
        if key == "tile_archive_path" {
            *self.archive.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
        config.get(key)
    }

    /// The tile archive, opening it at the configured path on first use.
    pub fn archive(&self) -> CoreResult<Arc<TileArchive>> {
        let path = self.config().tile_archive_path;
        let mut slot = self.archive.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(archive) = slot.as_ref() {
            return Ok(Arc::clone(archive));
        }
        let archive = Arc::new(TileArchive::open(path)?);
        *slot = Some(Arc::clone(&archive));
        Ok(archive)
    }

    /// Uses an already-open archive instead of the configured path.
    pub fn set_archive(&self, archive: TileArchive) {
        *self.archive.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(archive));
    }

    /// Sends a notification; delivery failures are logged and dropped.
    pub fn notify(&self, notification: Notification) {
        let kind = notification.kind();
        if let Err(e) = self.notifier.notify(notification) {
            debug!("Notification {} not delivered: {}", kind, e);
        }
    }

    /// Runs one command line.
    pub fn execute(&self, line: &str) -> CommandResponse {
        self.dispatcher.execute(self, line)
    }

    /// Decodes and applies one JSON message.
    pub fn handle_message(&self, text: &str) -> CommandResponse {
        let result = catch_unwind(AssertUnwindSafe(|| {
            messages::decode_json(text).and_then(|message| messages::translate(self, message))
        }));
        match result {
            Ok(result) => result.into(),
            Err(_) => CommandResponse::fail("Message handler panicked"),
        }
    }

    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    pub fn scenario_name(&self) -> Option<String> {
        self.scenario.lock().unwrap_or_else(|e| e.into_inner()).0.clone()
    }

    fn scenario_event(&self, event: ScenarioEventKind) {
        let (scenario, run_id) = self.scenario.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.notify(Notification::ScenarioEvent { scenario, event, run_id });
    }

    /// Tells the front-end to focus on an entity.
    pub fn focus_entity(&self, name: &str) -> CoreResult<()> {
        if !self.registry.contains(name) {
            return Err(CoreError::not_found(name));
        }
        self.notify(Notification::FocusChanged { entity_name: name.to_string() });
        Ok(())
    }

    /// Starts a fresh run: entities go back to their start states and a new
    /// run id is issued. Returns false if already running.
    pub fn start_simulation(&self) -> bool {
        if self.clock.is_running() {
            return false;
        }
        let restored = self.registry.restore_start_states();
        self.scenario.lock().unwrap_or_else(|e| e.into_inner()).1 = SessionId::new();
        if !self.clock.start() {
            return false;
        }
        info!("Simulation started, {} entities restored to start", restored);
        self.scenario_event(ScenarioEventKind::Started);
        true
    }

    pub fn stop_simulation(&self) -> bool {
        let stopped = self.clock.stop();
        if stopped {
            self.scenario_event(ScenarioEventKind::Stopped);
        }
        stopped
    }

    pub fn pause_simulation(&self) -> bool {
        let paused = self.clock.pause();
        if paused {
            self.scenario_event(ScenarioEventKind::Paused);
        }
        paused
    }

    /// Continues the current run without touching elapsed time.
    pub fn resume_simulation(&self) -> bool {
        let resumed = self.clock.resume();
        if resumed {
            self.scenario_event(ScenarioEventKind::Continued);
        }
        resumed
    }

    /// Zeroes the clock. Fails while running.
    pub fn reset_simulation(&self) -> CoreResult<()> {
        self.clock.reset()?;
        self.scenario_event(ScenarioEventKind::Reset);
        Ok(())
    }

    /// Clears the world and loads a scenario.
    ///
    /// Stops the loop, resets the clock, removes every entity, then runs
    /// `<scenario_dir>/<name>.scn` line by line through the dispatcher if
    /// the file exists. Blank lines and `#` comments are skipped.
    pub fn load_scenario(&self, name: &str) -> CoreResult<String> {
        if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\') || name.contains("..") {
            return Err(CoreError::InvalidArgument(format!("bad scenario name '{}'", name)));
        }

        self.stop_simulation();
        self.clock.reset()?;
        self.registry.reset();
        *self.scenario.lock().unwrap_or_else(|e| e.into_inner()) = (Some(name.to_string()), SessionId::new());

        let path = self.config().scenario_dir.join(format!("{}.{}", name, SCENARIO_EXTENSION));
        let mut summary = format!("Loaded scenario {}", name);
        if path.is_file() {
            let script = std::fs::read_to_string(&path)?;
            let (mut ran, mut failed) = (0, 0);
            for line in script.lines().map(str::trim) {
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if line.split_whitespace().next().is_some_and(|c| c.eq_ignore_ascii_case("scenarioload")) {
                    warn!("{}: nested scenarioload skipped", path.display());
                    continue;
                }
                let response = self.execute(line);
                ran += 1;
                if !response.success {
                    failed += 1;
                    warn!("{}: '{}' failed: {}", path.display(), line, response.text);
                }
            }
            summary = format!("{} ({} commands, {} failed)", summary, ran, failed);
        } else {
            debug!("No script at {}, scenario starts empty", path.display());
        }

        info!("{}", summary);
        self.scenario_event(ScenarioEventKind::Loaded);
        Ok(summary)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ClockState;
    use kinesim_env::{BroadcastSink, NullSink, WallClock};

    /// Runtime with a throwaway archive and no notification consumer.
    pub(crate) fn test_runtime() -> Arc<RuntimeContext> {
        let rt = RuntimeContext::new(RuntimeConfig::default(), Arc::new(NullSink), WallClock::shared()).unwrap();
        rt.set_archive(TileArchive::temporary().unwrap());
        rt
    }

    fn scratch_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("kinesim-rt-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_focus_and_scenario_notifications() {
        let (sink, mut rx) = BroadcastSink::new(16);
        let rt = RuntimeContext::new(RuntimeConfig::default(), Arc::new(sink), WallClock::shared()).unwrap();

        rt.execute("entityadd Eagle1 F15");
        assert!(rt.execute("entityfocus Eagle1").success);
        assert!(rt.start_simulation());
        assert!(rt.stop_simulation());

        assert_eq!(rx.try_recv().unwrap(), Notification::EntityCreated { entity_name: "Eagle1".into() });
        assert_eq!(rx.try_recv().unwrap(), Notification::FocusChanged { entity_name: "Eagle1".into() });
        let mut events = Vec::new();
        while let Ok(n) = rx.try_recv() {
            if let Notification::ScenarioEvent { event, .. } = n {
                events.push(event);
            }
        }
        assert_eq!(events, vec![ScenarioEventKind::Started, ScenarioEventKind::Stopped]);
    }

    #[test]
    fn test_scenario_load_runs_script() {
        let dir = scratch_dir();
        std::fs::write(
            dir.join("intercept.scn"),
            "# two jets\nentityadd Red1 MiG29\nentitystart Red1 10 20 5000 90 250\n\nentityadd Blue1 F16\nbogus command\nscenarioload intercept\n",
        )
        .unwrap();

        let rt = test_runtime();
        rt.set_config("scenario_dir", dir.to_str().unwrap()).unwrap();
        rt.execute("entityadd Leftover X");

        let summary = rt.load_scenario("intercept").unwrap();
        assert_eq!(summary, "Loaded scenario intercept (4 commands, 1 failed)");
        assert_eq!(rt.registry().entity_names(), vec!["Blue1".to_string(), "Red1".to_string()]);
        assert_eq!(rt.scenario_name().as_deref(), Some("intercept"));
        assert_eq!(rt.clock().state(), ClockState::Stopped);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_scenario_load_without_script_clears_world() {
        let rt = test_runtime();
        rt.execute("entityadd A F16");
        rt.start_simulation();
        assert_eq!(rt.execute("scenarioload empty").text, "Loaded scenario empty");
        assert!(rt.registry().is_empty());
        assert!(!rt.clock().is_running());
        assert!(!rt.execute("scenarioload ../etc").success);
    }

    #[test]
    fn test_fresh_start_restores_start_state() {
        let rt = test_runtime();
        rt.execute("entityadd A F16");
        rt.execute("entitystart A 1 2 300 0 0");
        rt.execute("entitypos A 40 40 0");
        assert!(rt.start_simulation());
        rt.stop_simulation();
        assert_eq!(rt.registry().entity_for_name("A").unwrap().position().lat_degs, 1.0);
    }

    #[test]
    fn test_config_timing_applies_to_clock() {
        let rt = test_runtime();
        rt.set_config("tick_rate_hz", "10").unwrap();
        assert_eq!(rt.clock().timing().interval, std::time::Duration::from_millis(100));
    }
}
