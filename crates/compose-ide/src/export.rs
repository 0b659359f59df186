//! Export bundle layout. Archive encoding is left to the caller.

use crate::project::Project;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

pub const EXPORT_ROOT: &str = "compose-web-project";

#[derive(Debug, Clone, PartialEq)]
pub struct BundleFile {
    /// Relative path with `/` separators.
    pub path: String,
    pub contents: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    exported_at: u64,
    screens: Vec<ManifestScreen<'a>>,
}

#[derive(Serialize)]
struct ManifestScreen<'a> {
    id: &'a str,
    name: &'a str,
}

/// Files of the export bundle, in archive order.
pub fn bundle(
    project: &Project,
    state: &serde_json::Value,
    exported_at: u64,
) -> Result<Vec<BundleFile>, serde_json::Error> {
    let manifest = Manifest {
        exported_at,
        screens: project
            .screens
            .iter()
            .map(|screen| ManifestScreen {
                id: &screen.id,
                name: &screen.name,
            })
            .collect(),
    };

    let mut files = vec![
        BundleFile {
            path: format!("{EXPORT_ROOT}/project.json"),
            contents: serde_json::to_string_pretty(&manifest)?,
        },
        BundleFile {
            path: format!("{EXPORT_ROOT}/state.json"),
            contents: serde_json::to_string_pretty(state)?,
        },
    ];
    for screen in &project.screens {
        let name = file_name(&screen.name);
        files.push(BundleFile {
            path: format!("{EXPORT_ROOT}/screens/{name}.dsl.js"),
            contents: screen.compose.clone(),
        });
        if let Some(companion) = project.companion(&screen.id).filter(|code| !code.is_empty()) {
            files.push(BundleFile {
                path: format!("{EXPORT_ROOT}/screens/{name}.kt"),
                contents: companion.to_string(),
            });
        }
    }
    Ok(files)
}

fn file_name(name: &str) -> String {
    name.chars()
        .map(|character| match character {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}

/// Write the bundle below `directory`.
pub fn write_bundle(files: &[BundleFile], directory: &Path) -> io::Result<()> {
    for file in files {
        let path = directory.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &file.contents)?;
    }
    Ok(())
}
