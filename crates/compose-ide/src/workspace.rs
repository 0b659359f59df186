//! The live project, state and active screen, with snapshot history and persistence.

use crate::action::{self, ActionOutcome};
use crate::error::{InteractionError, PersistenceError, RenderError};
use crate::evaluator::RecordingHost;
use crate::export::{self, BundleFile};
use crate::history::{History, PersistedRecord, Snapshot};
use crate::project::{DEFAULT_SCREEN_ID, Project, Screen, companion_key, default_state, now_millis};
use crate::render::{Preview, Surface};
use crate::storage::Storage;
use serde::Serialize;
use std::fmt;

pub const STORAGE_KEY: &str = "mini_ide_compose_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Ok,
    Warn,
    Error,
    Info,
}

/// Outcome message of the last operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub message: String,
    pub kind: StatusKind,
}

impl Status {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Ok)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Warn)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Error)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Info)
    }

    fn new(message: impl Into<String>, kind: StatusKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StatusKind::Ok => "ok",
            StatusKind::Warn => "warn",
            StatusKind::Error => "error",
            StatusKind::Info => "info",
        };
        write!(f, "[{kind}] {}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStep {
    Moved { cursor: usize },
    NothingToUndo,
    NothingToRedo,
}

/// What a render pass left behind besides the surface content.
#[derive(Debug)]
pub struct RenderOutcome {
    pub result: Result<(), RenderError>,
    pub logs: Vec<String>,
    /// Actions the screen dispatched while rendering, already applied.
    pub actions: Vec<ActionOutcome>,
}

#[derive(Debug)]
pub struct InteractionOutcome {
    pub logs: Vec<String>,
    pub actions: Vec<ActionOutcome>,
}

pub struct Workspace<S: Storage> {
    storage: S,
    project: Project,
    state: serde_json::Value,
    active_screen_id: Option<String>,
    history: History,
    status: Status,
}

impl<S: Storage> Workspace<S> {
    /// Load the persisted workspace, or start from defaults.
    ///
    /// A malformed record is replaced by a fresh initial snapshot and the
    /// failure is reported through the status.
    pub fn open(storage: S) -> Self {
        let mut workspace = Self {
            storage,
            project: Project::initial(now_millis()),
            state: default_state(),
            active_screen_id: Some(DEFAULT_SCREEN_ID.to_string()),
            history: History::new(),
            status: Status::ok("Ready"),
        };
        match workspace.load() {
            Ok(Some(history)) => {
                if let Some(current) = history.current().cloned() {
                    workspace.restore(current);
                }
                log::info!(
                    "Loaded project with {} history entries, cursor at {}",
                    history.len(),
                    history.cursor()
                );
                workspace.history = history;
                workspace.status = Status::ok("Project loaded from storage");
            }
            Ok(None) => {
                log::info!("No stored project, starting from defaults");
                workspace.commit("New project created");
            }
            Err(error) => {
                log::error!("Could not load project: {error}");
                if workspace.snapshot().is_ok() {
                    workspace.status = Status::error(format!("Failed to load project: {error}"));
                }
            }
        }
        workspace
    }

    fn load(&self) -> Result<Option<History>, PersistenceError> {
        let Some(raw) = self.storage.load(STORAGE_KEY)? else {
            return Ok(None);
        };
        let malformed = |reason: String| PersistenceError::Malformed {
            key: STORAGE_KEY.to_string(),
            reason,
        };
        let record: PersistedRecord =
            serde_json::from_str(&raw).map_err(|error| malformed(error.to_string()))?;
        record.into_history().map(Some).map_err(malformed)
    }

    fn persist(&mut self) -> Result<(), PersistenceError> {
        let Some(record) = PersistedRecord::new(&self.history) else {
            return Ok(());
        };
        let serialized = serde_json::to_string(&record)?;
        self.storage.save(STORAGE_KEY, &serialized)
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.project = snapshot.project;
        self.state = snapshot.state;
        self.active_screen_id = snapshot.active_screen_id;
    }

    /// Record the live project, state and active screen as a new history entry.
    ///
    /// The in-memory history keeps the entry even when persisting it fails.
    pub fn snapshot(&mut self) -> Result<(), PersistenceError> {
        self.history.push(Snapshot {
            project: self.project.clone(),
            state: self.state.clone(),
            active_screen_id: self.active_screen_id.clone(),
        });
        log::debug!("Snapshot {} recorded", self.history.cursor());
        match self.persist() {
            Ok(()) => {
                self.status = Status::ok("Snapshot saved");
                Ok(())
            }
            Err(error) => {
                log::error!("Failed to save state: {error}");
                self.status = Status::error(format!("Failed to save state: {error}"));
                Err(error)
            }
        }
    }

    fn commit(&mut self, message: impl Into<String>) {
        if self.snapshot().is_ok() {
            self.status = Status::ok(message);
        }
    }

    pub fn undo(&mut self) -> HistoryStep {
        let Some(snapshot) = self.history.undo().cloned() else {
            self.status = Status::warn("Nothing to undo");
            return HistoryStep::NothingToUndo;
        };
        self.restore(snapshot);
        self.after_move("Undo successful")
    }

    pub fn redo(&mut self) -> HistoryStep {
        let Some(snapshot) = self.history.redo().cloned() else {
            self.status = Status::warn("Nothing to redo");
            return HistoryStep::NothingToRedo;
        };
        self.restore(snapshot);
        self.after_move("Redo successful")
    }

    fn after_move(&mut self, message: &str) -> HistoryStep {
        self.status = match self.persist() {
            Ok(()) => Status::ok(message),
            Err(error) => {
                log::warn!("History position not saved: {error}");
                Status::warn(format!("{message}, but the position was not saved: {error}"))
            }
        };
        HistoryStep::Moved {
            cursor: self.history.cursor(),
        }
    }

    pub fn current_screen(&self) -> Option<&Screen> {
        self.project.screen(self.active_screen_id.as_deref()?)
    }

    /// Make `id` the active screen. Not recorded in history.
    pub fn select_screen(&mut self, id: &str) -> bool {
        let Some(screen) = self.project.screen(id) else {
            self.status = Status::warn(format!("Unknown screen `{id}`"));
            return false;
        };
        self.status = Status::info(format!("Editing {}", screen.name));
        self.active_screen_id = Some(id.to_string());
        true
    }

    /// Add a screen from the template and make it active. Returns its id.
    pub fn new_screen(&mut self, name: Option<&str>) -> String {
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Screen{}", self.project.screens.len() + 1));
        let screen = Screen::new(name.as_str(), now_millis());
        let id = screen.id.clone();
        self.project.screens.push(screen);
        self.active_screen_id = Some(id.clone());
        self.commit(format!("Created screen {name}"));
        id
    }

    pub fn delete_screen(&mut self, id: &str) -> bool {
        let Some(position) = self.project.screens.iter().position(|screen| screen.id == id) else {
            self.status = Status::warn(format!("Unknown screen `{id}`"));
            return false;
        };
        let screen = self.project.screens.remove(position);
        self.project.files.remove(&companion_key(id));
        if self.active_screen_id.as_deref() == Some(id) {
            self.active_screen_id = self.project.screens.first().map(|screen| screen.id.clone());
        }
        self.commit(format!("Deleted screen {}", screen.name));
        true
    }

    /// Replace a screen's source and, when given, its companion source.
    pub fn save_screen_code(&mut self, id: &str, compose: &str, companion: Option<&str>) -> bool {
        let Some(screen) = self.project.screen_mut(id) else {
            self.status = Status::warn(format!("Unknown screen `{id}`"));
            return false;
        };
        screen.compose = compose.to_string();
        let name = screen.name.clone();
        if let Some(companion) = companion {
            self.project.set_companion(id, companion);
        }
        self.commit(format!("Saved {name}"));
        true
    }

    /// Apply an action string to the state. A state change is one history step.
    pub fn execute_action(&mut self, action: &str) -> ActionOutcome {
        let outcome = action::execute(action, &self.state);
        if outcome.changed {
            self.state = outcome.state.clone();
            if self.snapshot().is_err() {
                return outcome;
            }
        }
        self.status = match outcome.errors.first() {
            Some(error) => Status::error(format!("Action error: {error}")),
            None if outcome.changed => Status::ok("State updated"),
            None => Status::info("Nothing to change"),
        };
        outcome
    }

    /// Replace the whole state document.
    pub fn set_state(&mut self, state: serde_json::Value) {
        self.state = state;
        self.commit("State updated");
    }

    /// Render the active screen, then apply the actions it dispatched.
    pub async fn render(&mut self, preview: &mut Preview, surface: &mut Surface) -> RenderOutcome {
        let source = self
            .current_screen()
            .map(|screen| screen.compose.clone())
            .unwrap_or_default();
        let mut host = RecordingHost::default();
        let result = preview
            .refresh(&source, &self.state, surface, &mut host)
            .await;
        match &result {
            Ok(()) => self.status = Status::ok(format!("{} render successful", preview.mode())),
            Err(error) => self.status = Status::error(format!("Render error: {error}")),
        }
        let actions = self.apply_dispatched(&host.actions);
        RenderOutcome {
            result,
            logs: host.logs,
            actions,
        }
    }

    /// Fire `event` on an interactive element of `surface` and apply what it dispatched.
    pub fn interact(
        &mut self,
        surface: &Surface,
        index: usize,
        event: &str,
    ) -> Result<InteractionOutcome, InteractionError> {
        let mut host = RecordingHost::default();
        if let Err(error) = surface.trigger(index, event, &mut host) {
            self.status = Status::error(format!("Action error: {error}"));
            return Err(error);
        }
        let actions = self.apply_dispatched(&host.actions);
        Ok(InteractionOutcome {
            logs: host.logs,
            actions,
        })
    }

    fn apply_dispatched(&mut self, actions: &[String]) -> Vec<ActionOutcome> {
        actions
            .iter()
            .map(|action| self.execute_action(action))
            .collect()
    }

    /// Export bundle of the live project and state.
    pub fn export(&self, exported_at: u64) -> Result<Vec<BundleFile>, serde_json::Error> {
        export::bundle(&self.project, &self.state, exported_at)
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn state(&self) -> &serde_json::Value {
        &self.state
    }

    pub fn active_screen_id(&self) -> Option<&str> {
        self.active_screen_id.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderMode;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn test_fresh_workspace_has_initial_snapshot() {
        let workspace = Workspace::open(MemoryStorage::new());
        assert_eq!(workspace.history().len(), 1);
        assert_eq!(workspace.active_screen_id(), Some(DEFAULT_SCREEN_ID));
        assert_eq!(workspace.state(), &json!({ "name": "Compose", "counter": 0 }));
        assert_eq!(workspace.status().kind, StatusKind::Ok);
        assert!(workspace.storage().get(STORAGE_KEY).is_some());
    }

    #[test]
    fn test_new_screen_defaults_and_delete() {
        let mut workspace = Workspace::open(MemoryStorage::new());
        let id = workspace.new_screen(None);
        assert_eq!(workspace.current_screen().unwrap().name, "Screen2");
        assert!(workspace.current_screen().unwrap().compose.contains("This is Screen2"));
        assert_eq!(workspace.history().len(), 2);

        assert!(workspace.delete_screen(&id));
        assert_eq!(workspace.active_screen_id(), Some(DEFAULT_SCREEN_ID));
        assert!(workspace.delete_screen(DEFAULT_SCREEN_ID));
        assert_eq!(workspace.active_screen_id(), None);
        assert!(workspace.current_screen().is_none());
        assert!(!workspace.delete_screen("s_missing"));
        assert_eq!(workspace.status().kind, StatusKind::Warn);
        assert_eq!(workspace.history().len(), 4);
    }

    #[test]
    fn test_select_screen_does_not_snapshot() {
        let mut workspace = Workspace::open(MemoryStorage::new());
        let id = workspace.new_screen(Some("Details"));
        assert!(workspace.select_screen(DEFAULT_SCREEN_ID));
        assert!(!workspace.select_screen("s_unknown"));
        assert_eq!(workspace.active_screen_id(), Some(DEFAULT_SCREEN_ID));
        assert_eq!(workspace.history().len(), 2);
        assert!(workspace.select_screen(&id));
    }

    #[test]
    fn test_save_screen_code_stores_companion() {
        let mut workspace = Workspace::open(MemoryStorage::new());
        assert!(workspace.save_screen_code(
            DEFAULT_SCREEN_ID,
            "render(() => Text('x'))",
            Some("fun Main() {}")
        ));
        assert_eq!(workspace.current_screen().unwrap().compose, "render(() => Text('x'))");
        assert_eq!(workspace.project().companion(DEFAULT_SCREEN_ID), Some("fun Main() {}"));
        assert_eq!(workspace.status(), &Status::ok("Saved MainScreen"));
    }

    #[test]
    fn test_action_with_errors_reports_status() {
        let mut workspace = Workspace::open(MemoryStorage::new());
        let outcome = workspace.execute_action("counter = counter + 1; broken =");
        assert!(outcome.changed);
        assert_eq!(workspace.state()["counter"], json!(1));
        assert_eq!(workspace.status().kind, StatusKind::Error);
        assert_eq!(workspace.history().len(), 2);

        let outcome = workspace.execute_action("");
        assert!(!outcome.changed);
        assert_eq!(workspace.history().len(), 2);
    }

    #[test]
    fn test_persistence_failure_keeps_memory_history() {
        let mut workspace = Workspace::open(MemoryStorage::new());
        workspace.storage_mut().fail_writes = true;
        assert!(workspace.snapshot().is_err());
        assert_eq!(workspace.history().len(), 2);
        assert_eq!(workspace.status().kind, StatusKind::Error);

        assert!(matches!(workspace.undo(), HistoryStep::Moved { cursor: 0 }));
        assert_eq!(workspace.status().kind, StatusKind::Warn);
    }

    #[tokio::test]
    async fn test_render_and_click_counter() {
        let mut workspace = Workspace::open(MemoryStorage::new());
        let mut preview = Preview::new(RenderMode::Builtin);
        let mut surface = Surface::new("preview");

        let outcome = workspace.render(&mut preview, &mut surface).await;
        assert!(outcome.result.is_ok());
        assert_eq!(surface.text_content(), "Hello, Compose!Clicks: 0");

        let interaction = workspace.interact(&surface, 0, "click").unwrap();
        assert_eq!(interaction.actions.len(), 1);
        assert_eq!(workspace.state()["counter"], json!(1));
        assert_eq!(workspace.history().len(), 2);

        workspace.render(&mut preview, &mut surface).await.result.unwrap();
        assert_eq!(surface.text_content(), "Hello, Compose!Clicks: 1");
    }

    #[tokio::test]
    async fn test_actions_dispatched_while_rendering_are_applied_after() {
        let mut workspace = Workspace::open(MemoryStorage::new());
        workspace.save_screen_code(
            DEFAULT_SCREEN_ID,
            "execute('visits = (state.visits || 0) + 1')\nrender(() => Text('Visits ' + (state.visits || 0)))",
            None,
        );
        let steps = workspace.history().len();
        let mut preview = Preview::new(RenderMode::Builtin);
        let mut surface = Surface::new("preview");
        let outcome = workspace.render(&mut preview, &mut surface).await;
        assert_eq!(surface.text_content(), "Visits 0");
        assert_eq!(outcome.actions.len(), 1);
        assert!(outcome.actions[0].changed);
        assert!(outcome.actions[0].errors.is_empty());
        assert_eq!(workspace.state()["visits"], json!(1));
        assert_eq!(workspace.history().len(), steps + 1);

        workspace.render(&mut preview, &mut surface).await;
        assert_eq!(surface.text_content(), "Visits 1");
        assert_eq!(workspace.state()["visits"], json!(2));
    }

    #[test]
    fn test_action_on_absent_key_reports_error() {
        let mut workspace = Workspace::open(MemoryStorage::new());
        let outcome = workspace.execute_action("visits = visits + 1");
        assert!(!outcome.changed);
        assert!(matches!(&outcome.errors[..], [crate::error::ActionError::Eval { .. }]));
        assert_eq!(workspace.status().kind, StatusKind::Error);
        assert_eq!(workspace.history().len(), 1);
    }
}
