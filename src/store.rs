use std::path::PathBuf;

/// Single-record credential store, last-write-wins. Unreadable state is
/// indistinguishable from an empty store: `get` collapses it to `None` so
/// the gate can treat it as unauthenticated instead of failing.
pub trait SessionStore {
    fn get(&self) -> Option<String>;
    fn set(&mut self, raw: &str);
    /// Best-effort purge. Idempotent; removing an empty store is a no-op.
    fn remove(&mut self);
}

/// Session record persisted as one file in the selected workspace, so a
/// login survives sidecar restarts the way the original kept it in browser
/// storage across page loads.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        FileStore { path }
    }
}

impl SessionStore for FileStore {
    fn get(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if !raw.trim().is_empty() => Some(raw),
            _ => None,
        }
    }

    fn set(&mut self, raw: &str) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&self.path, raw);
    }

    fn remove(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// In-process slot. Holds the session before a workspace is selected and
/// doubles as the test store.
#[derive(Default)]
pub struct MemoryStore {
    slot: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self) -> Option<String> {
        self.slot.clone()
    }

    fn set(&mut self, raw: &str) {
        self.slot = Some(raw.to_string());
    }

    fn remove(&mut self) {
        self.slot = None;
    }
}
