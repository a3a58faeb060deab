//! An in-memory `Agent` double for integration tests, standing in for a real
//! rclone-shaped binary. The system under test talks to an external agent by
//! contract, so a fake implementing the trait is the right test boundary —
//! not a mocked subprocess.

use std::collections::HashMap;
use std::sync::Mutex;

use dupsync::agent::{Agent, ListEntry};
use dupsync::error::AgentError;

pub struct FakeAgent {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self { files: Mutex::new(HashMap::new()) }
    }

    pub fn put(&self, full_path: &str, contents: &[u8]) {
        self.files.lock().unwrap().insert(full_path.to_string(), contents.to_vec());
    }

    pub fn contains(&self, full_path: &str) -> bool {
        self.files.lock().unwrap().contains_key(full_path)
    }

    pub fn get(&self, full_path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(full_path).cloned()
    }
}

impl Agent for FakeAgent {
    fn list(&self, root: &str) -> Result<Vec<ListEntry>, AgentError> {
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter_map(|(path, contents)| {
                path.strip_prefix(root).map(|rel| ListEntry {
                    path: rel.to_string(),
                    size: contents.len() as u64,
                    mtime: 0,
                    is_dir: false,
                })
            })
            .collect())
    }

    fn hashsum(&self, _algo: &str, root: &str) -> Result<HashMap<String, String>, AgentError> {
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter_map(|(path, contents)| {
                path.strip_prefix(root)
                    .map(|rel| (rel.to_string(), format!("{}", dupsync::hash::hash_bytes(contents))))
            })
            .collect())
    }

    fn read_file(&self, path: &str) -> Result<String, AgentError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
            .unwrap_or_default())
    }

    fn copyto(&self, src: &str, dst: &str) -> Result<(), AgentError> {
        let mut files = self.files.lock().unwrap();
        let contents = files.get(src).cloned().ok_or_else(|| AgentError::Copy {
            src: src.to_string(),
            dst: dst.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        })?;
        files.insert(dst.to_string(), contents);
        Ok(())
    }

    fn moveto(&self, src: &str, dst: &str) -> Result<(), AgentError> {
        let mut files = self.files.lock().unwrap();
        let contents = files.remove(src).ok_or_else(|| AgentError::Move {
            src: src.to_string(),
            dst: dst.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        })?;
        files.insert(dst.to_string(), contents);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), AgentError> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn mkdir(&self, _path: &str) -> Result<(), AgentError> {
        Ok(())
    }

    fn rmdirs(&self, _path: &str) -> Result<(), AgentError> {
        Ok(())
    }
}
