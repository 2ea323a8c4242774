//! Services state read from a JSON snapshot on disk.
//!
//! The file's modification time is the change timestamp, so anything that
//! rewrites the snapshot (a discovery agent, a deploy script) triggers a sync.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::service::Service;
use crate::state::{ServicesState, StateError};

/// On-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Clone)]
pub struct FileState {
    path: PathBuf,
}

impl FileState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StateSnapshot, StateError> {
        let file = File::open(&self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl ServicesState for FileState {
    fn last_changed(&self) -> Result<DateTime<Utc>, StateError> {
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|source| StateError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn each_service_sorted(&self, visit: &mut dyn FnMut(&Service)) -> Result<(), StateError> {
        let mut services = self.load()?.services;
        services.sort_by(|a, b| (&a.hostname, &a.id).cmp(&(&b.hostname, &b.id)));
        for svc in &services {
            visit(svc);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_sorted_services() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"services": [
                {{"id": "b", "hostname": "h2", "image": "web:1", "ports": [{{"port": 80}}]}},
                {{"id": "a", "hostname": "h1", "name": "db"}}
            ]}}"#
        )
        .unwrap();

        let state = FileState::new(file.path());
        let mut ids = Vec::new();
        state.each_service_sorted(&mut |svc| ids.push(svc.id.clone())).unwrap();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(state.last_changed().unwrap() > DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let missing = FileState::new("/no/such/state.json");
        assert!(matches!(missing.last_changed(), Err(StateError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let broken = FileState::new(file.path());
        let err = broken.each_service_sorted(&mut |_| {}).unwrap_err();
        assert!(matches!(err, StateError::Parse { .. }));
    }
}
