//! Screens, the project that holds them and the default workspace content.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

pub const DEFAULT_SCREEN_ID: &str = "s_initial";
pub const DEFAULT_SCREEN_NAME: &str = "MainScreen";

const DEFAULT_SCREEN_SOURCE: &str = "\
// Welcome to the Compose Mini IDE!
// Use the render() function to define your UI.
render(() => Column(add => {
  add(Text(() => 'Hello, ' + (state.name || 'World') + '!'))

  // Buttons can execute actions to modify the state
  add(Button(
    () => execute('counter = (counter || 0) + 1'),
    () => 'Clicks: ' + (state.counter || 0)
  ))
}))
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    pub id: String,
    pub name: String,
    /// DSL source of the screen.
    pub compose: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub screens: Vec<Screen>,
    /// Auxiliary sources, companions live under `<screen id>_kotlin`.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl Screen {
    pub fn new(name: impl Into<String>, created_at: u64) -> Self {
        let name = name.into();
        Self {
            id: new_screen_id(),
            compose: screen_template(&name),
            name,
            created_at,
        }
    }

    pub fn initial(created_at: u64) -> Self {
        Self {
            id: DEFAULT_SCREEN_ID.to_string(),
            name: DEFAULT_SCREEN_NAME.to_string(),
            compose: DEFAULT_SCREEN_SOURCE.to_string(),
            created_at,
        }
    }
}

impl Project {
    pub fn initial(created_at: u64) -> Self {
        Self {
            screens: vec![Screen::initial(created_at)],
            files: BTreeMap::new(),
        }
    }

    pub fn screen(&self, id: &str) -> Option<&Screen> {
        self.screens.iter().find(|screen| screen.id == id)
    }

    pub fn screen_mut(&mut self, id: &str) -> Option<&mut Screen> {
        self.screens.iter_mut().find(|screen| screen.id == id)
    }

    pub fn companion(&self, screen_id: &str) -> Option<&str> {
        self.files.get(&companion_key(screen_id)).map(String::as_str)
    }

    pub fn set_companion(&mut self, screen_id: &str, content: impl Into<String>) {
        self.files.insert(companion_key(screen_id), content.into());
    }

    pub fn has_unique_screen_ids(&self) -> bool {
        let mut seen = HashSet::new();
        self.screens.iter().all(|screen| seen.insert(screen.id.as_str()))
    }
}

pub fn companion_key(screen_id: &str) -> String {
    format!("{screen_id}_kotlin")
}

pub fn new_screen_id() -> String {
    format!("s_{}", Ulid::new().to_string().to_lowercase())
}

/// Source given to a freshly created screen.
pub fn screen_template(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "// New Screen: {name}\nrender(() => Column(add => {{\n  add(Text(() => 'This is {escaped}'))\n}}))\n"
    )
}

pub fn default_state() -> serde_json::Value {
    serde_json::json!({ "name": "Compose", "counter": 0 })
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
