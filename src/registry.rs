//! Directory-backed workflow registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::parser::load_file;
use crate::workflow::WorkflowDefinition;

/// Workflows indexed by name.
///
/// A snapshot: built once per load and never mutated afterwards. Callers
/// wanting to pick up changes load again and swap the whole registry.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn get(&self, name: &str) -> Option<&Arc<WorkflowDefinition>> {
        self.workflows.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Workflow names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<WorkflowDefinition>)> {
        self.workflows.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    fn insert(&mut self, source: &Path, definition: WorkflowDefinition) {
        let name = definition.name.clone();
        if self.workflows.insert(name.clone(), Arc::new(definition)).is_some() {
            tracing::warn!(
                workflow = %name,
                file = %source.display(),
                "Duplicate workflow name, later file wins"
            );
        }
    }
}

/// Load every workflow file directly inside `dir`.
///
/// Files are processed in lexicographic order of their names. Files that
/// fail to read or parse are logged and skipped, and a missing or
/// unreadable directory gives an empty registry. Subdirectories are not
/// descended into.
///
/// ```rust,no_run
/// use fleet_workflows::load_from_directory;
///
/// let registry = load_from_directory("/etc/workflows");
/// for name in registry.names() {
///     println!("{}", name);
/// }
/// ```
pub fn load_from_directory(dir: impl AsRef<Path>) -> WorkflowRegistry {
    let dir = dir.as_ref();
    let mut registry = WorkflowRegistry::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "Cannot read workflow directory");
            return registry;
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    for path in &files {
        match load_file(path) {
            Ok(definition) => {
                tracing::debug!(workflow = %definition.name, file = %path.display(), "Loaded workflow");
                registry.insert(path, definition);
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %format!("{:#}", err), "Skipping workflow file");
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        files = files.len(),
        workflows = registry.len(),
        "Workflow registry loaded"
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DECOMMISSION_JSON: &str = r#"{
    "name": "decommission_device",
    "description": "Removes device info from all services.",
    "version": 4,
    "tasks": [
        {
            "name": "delete_device_inventory",
            "type": "http",
            "http": {
                "uri": "http://inventory:8080/api/devices/${workflow.input.device_id}",
                "method": "DELETE",
                "body": "Payload",
                "headers": {"X-Request-ID": "${workflow.input.request_id}"},
                "connectionTimeOut": 1000,
                "readTimeOut": 1000
            }
        }
    ],
    "inputParameters": ["device_id", "request_id"],
    "schemaVersion": 1
}"#;

    const PROVISION_YAML: &str = r#"
name: provision_device
description: Provision device.
version: 2
tasks:
  - name: create_device_inventory
    type: http
    retries: 3
    http:
      uri: http://inventory:8080/api/internal/devices
      method: POST
      contentType: application/json
      body: ${workflow.input.device}
      headers:
        X-Request-ID: ${workflow.input.request_id}
      connectionTimeOut: 8000
      readTimeOut: 8000
inputParameters:
  - request_id
  - device
"#;

    fn dir_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    #[test]
    fn test_json_and_yaml_load() {
        let dir = dir_with(&[
            ("decommission.json", DECOMMISSION_JSON),
            ("provision.yaml", PROVISION_YAML),
        ]);

        let registry = load_from_directory(dir.path());

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["decommission_device", "provision_device"]
        );
        for (name, workflow) in registry.iter() {
            assert_eq!(name, workflow.name);
        }
        assert_eq!(registry.get("provision_device").unwrap().tasks[0].retries, 3);
    }

    #[test]
    fn test_bad_files_are_skipped() {
        let dir = dir_with(&[
            ("good.json", DECOMMISSION_JSON),
            ("good.yaml", PROVISION_YAML),
            ("fail.json", "{{}"),
            ("bad.json", r#"{foo: "bar"}"#),
            ("random.file", "random content"),
            ("fail.yml", "  foo: bar: baz"),
        ]);

        let registry = load_from_directory(dir.path());

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("decommission_device"));
        assert!(registry.contains("provision_device"));
    }

    #[test]
    fn test_only_bad_files() {
        let dir = dir_with(&[("fail.json", "{{}")]);
        assert!(load_from_directory(dir.path()).is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let registry = load_from_directory("/tmp/path/to/directory/that/does/not/exist/at/all");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_later_file_wins_on_duplicate_name() {
        let v1 = DECOMMISSION_JSON.replace("\"version\": 4", "\"version\": 1");
        let v2 = DECOMMISSION_JSON.replace("\"version\": 4", "\"version\": 2");
        let dir = dir_with(&[("b.json", v2.as_str()), ("a.json", v1.as_str())]);

        let registry = load_from_directory(dir.path());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("decommission_device").unwrap().version, 2);
    }

    #[test]
    fn test_subdirectories_are_not_scanned() {
        let dir = dir_with(&[("top.json", DECOMMISSION_JSON)]);
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("provision.yaml"), PROVISION_YAML).unwrap();

        let registry = load_from_directory(dir.path());

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["decommission_device"]);
    }
}
