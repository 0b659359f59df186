//! Linear undo/redo log of whole-workspace snapshots.

use crate::project::Project;
use serde::{Deserialize, Serialize};

/// Immutable copy of everything the user can change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub project: Project,
    pub state: serde_json::Value,
    pub active_screen_id: Option<String>,
}

/// Append-only log with a movable cursor.
///
/// Once an entry exists the cursor always points at one. Pushing after an
/// undo drops every entry past the cursor.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<Snapshot>,
    cursor: usize,
}

/// The document stored under the workspace key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub project: Project,
    pub state: serde_json::Value,
    pub active_screen_id: Option<String>,
    pub history: Vec<Snapshot>,
    pub history_index: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from persisted parts, rejecting inconsistent ones.
    pub fn from_parts(entries: Vec<Snapshot>, cursor: usize) -> Result<Self, String> {
        if entries.is_empty() {
            return Err("history is empty".to_string());
        }
        if cursor >= entries.len() {
            return Err(format!(
                "history index {cursor} is out of range for {} entries",
                entries.len()
            ));
        }
        if let Some(position) = entries
            .iter()
            .position(|entry| !entry.project.has_unique_screen_ids())
        {
            return Err(format!("history entry {position} has duplicate screen ids"));
        }
        Ok(Self { entries, cursor })
    }

    /// Append a snapshot after the cursor, discarding the redo branch.
    pub fn push(&mut self, snapshot: Snapshot) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(snapshot);
        self.cursor = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<&Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.cursor)
    }

    pub fn entries(&self) -> &[Snapshot] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistedRecord {
    /// Record of `history` with its current entry as the live data.
    pub fn new(history: &History) -> Option<Self> {
        let current = history.current()?;
        Some(Self {
            project: current.project.clone(),
            state: current.state.clone(),
            active_screen_id: current.active_screen_id.clone(),
            history: history.entries().to_vec(),
            history_index: history.cursor(),
        })
    }

    pub fn into_history(self) -> Result<History, String> {
        if !self.project.has_unique_screen_ids() {
            return Err("project has duplicate screen ids".to_string());
        }
        History::from_parts(self.history, self.history_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(counter: i64) -> Snapshot {
        Snapshot {
            project: Project::initial(0),
            state: json!({ "counter": counter }),
            active_screen_id: Some("s_initial".to_string()),
        }
    }

    #[test]
    fn test_single_entry_has_nothing_to_undo() {
        let mut history = History::new();
        history.push(snapshot(0));
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.current(), Some(&snapshot(0)));
    }

    #[test]
    fn test_push_after_undo_truncates() {
        let mut history = History::new();
        for counter in 0..4 {
            history.push(snapshot(counter));
        }
        history.undo();
        history.undo();
        history.push(snapshot(10));
        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), 2);
        assert!(!history.can_redo());
        assert_eq!(history.current(), Some(&snapshot(10)));
    }

    #[test]
    fn test_from_parts_validates() {
        assert!(History::from_parts(Vec::new(), 0).is_err());
        assert!(History::from_parts(vec![snapshot(0)], 1).is_err());

        let mut duplicated = snapshot(0);
        duplicated.project.screens.push(duplicated.project.screens[0].clone());
        assert!(History::from_parts(vec![snapshot(0), duplicated], 0).is_err());

        let history = History::from_parts(vec![snapshot(0), snapshot(1)], 0).unwrap();
        assert!(history.can_redo());
    }

    #[test]
    fn test_record_json_layout() {
        let mut history = History::new();
        history.push(snapshot(0));
        history.push(snapshot(1));
        history.undo();
        let record = PersistedRecord::new(&history).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["historyIndex"], 0);
        assert_eq!(json["activeScreenId"], "s_initial");
        assert_eq!(json["state"], json!({ "counter": 0 }));
        assert_eq!(json["history"].as_array().unwrap().len(), 2);
        assert_eq!(json["history"][1]["state"], json!({ "counter": 1 }));
    }
}
