//! Metadata handed from the encoder to the decoder
//!
//! The duplicator and the synthesizer record thread identity, per-thread
//! sizes, and variable renamings here; the decoder uses them to present
//! backend traces in terms of the original program.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Thread identity established by the duplicator.
///
/// Each thread copy `f_i` keeps three links: its original function name,
/// its thread index, and (from the index) back to the name. Main is always
/// thread 0 and is its own "copy".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMap {
    /// copy name -> original function name
    names: HashMap<String, String>,
    /// copy name -> thread index
    indexes: HashMap<String, u32>,
    /// thread index -> original function name
    index_to_name: HashMap<u32, String>,
    /// thread index -> copy name (what the driver actually calls)
    index_to_copy: HashMap<u32, String>,
    /// number of threads, main included
    count: u32,
}

impl Default for ThreadMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadMap {
    /// A map containing only the main thread (index 0).
    #[must_use]
    pub fn new() -> Self {
        let mut map = Self {
            names: HashMap::new(),
            indexes: HashMap::new(),
            index_to_name: HashMap::new(),
            index_to_copy: HashMap::new(),
            count: 1,
        };
        map.names.insert("main".into(), "main".into());
        map.indexes.insert("main".into(), 0);
        map.index_to_name.insert(0, "main".into());
        map.index_to_copy.insert(0, "main".into());
        map
    }

    /// Register a thread copy. Indices are assigned in creation order
    /// starting at 1.
    pub fn register(&mut self, copy: impl Into<String>, original: impl Into<String>) -> u32 {
        let index = self.count;
        let copy = copy.into();
        let original = original.into();
        self.names.insert(copy.clone(), original.clone());
        self.indexes.insert(copy.clone(), index);
        self.index_to_name.insert(index, original);
        self.index_to_copy.insert(index, copy);
        self.count += 1;
        index
    }

    /// Total thread count, main included.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Original function name behind a copy.
    #[must_use]
    pub fn original_of(&self, copy: &str) -> Option<&str> {
        self.names.get(copy).map(String::as_str)
    }

    /// Thread index of a copy.
    #[must_use]
    pub fn index_of(&self, copy: &str) -> Option<u32> {
        self.indexes.get(copy).copied()
    }

    /// Original function name of thread `index`.
    #[must_use]
    pub fn name_of(&self, index: u32) -> Option<&str> {
        self.index_to_name.get(&index).map(String::as_str)
    }

    /// Copy name of thread `index` (the function the driver calls).
    #[must_use]
    pub fn copy_name_of(&self, index: u32) -> Option<&str> {
        self.index_to_copy.get(&index).map(String::as_str)
    }
}

/// Per-thread figures computed by the synthesizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadMeta {
    /// thread index -> size (count of visible statements)
    sizes: HashMap<u32, u32>,
    /// thread index -> line of the thread's last statement in the output
    end_lines: HashMap<u32, u32>,
}

impl ThreadMeta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_size(&mut self, thread: u32, size: u32) {
        self.sizes.insert(thread, size);
    }

    pub fn set_end_line(&mut self, thread: u32, line: u32) {
        self.end_lines.insert(thread, line);
    }

    #[must_use]
    pub fn size(&self, thread: u32) -> Option<u32> {
        self.sizes.get(&thread).copied()
    }

    #[must_use]
    pub fn end_line(&self, thread: u32) -> Option<u32> {
        self.end_lines.get(&thread).copied()
    }

    /// The largest per-thread size, used to size program counters.
    #[must_use]
    pub fn max_size(&self) -> u32 {
        self.sizes.values().copied().max().unwrap_or(0)
    }
}

/// Renamed-variable map: synthetic name back to source name and scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarNameMap {
    originals: HashMap<String, String>,
    scopes: HashMap<String, String>,
}

impl VarNameMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        renamed: impl Into<String>,
        original: impl Into<String>,
        scope: impl Into<String>,
    ) {
        let renamed = renamed.into();
        self.originals.insert(renamed.clone(), original.into());
        self.scopes.insert(renamed, scope.into());
    }

    /// Source name behind a synthetic identifier; identity for names that
    /// were never renamed.
    #[must_use]
    pub fn original<'a>(&'a self, name: &'a str) -> &'a str {
        self.originals.get(name).map_or(name, String::as_str)
    }

    /// Scope (enclosing function) a renamed identifier belongs to.
    #[must_use]
    pub fn scope(&self, name: &str) -> Option<&str> {
        self.scopes.get(name).map(String::as_str)
    }

    /// Rewrite every renamed identifier occurring in `text` back to its
    /// source spelling. Longer names are replaced first so that one synthetic
    /// name being a prefix of another cannot corrupt the result.
    #[must_use]
    pub fn restore_in(&self, text: &str) -> String {
        let mut names: Vec<&String> = self.originals.keys().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let mut out = text.to_string();
        for name in names {
            if out.contains(name.as_str()) {
                out = out.replace(name.as_str(), &self.originals[name]);
            }
        }
        out
    }
}
