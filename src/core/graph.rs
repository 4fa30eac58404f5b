use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

/// Which modules each entry point reaches.
///
/// Modules are stored in dependency order (a module appears after everything
/// it imports), which is also the order they are concatenated in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleGraph {
    entries: BTreeMap<String, Vec<PathBuf>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_entry(&mut self, name: &str, modules: Vec<PathBuf>) {
        self.entries.insert(name.to_string(), modules);
    }

    pub fn modules_of(&self, entry: &str) -> &[PathBuf] {
        self.entries.get(entry).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entries that must be recompiled after `changed` paths were touched.
    ///
    /// Returns `None` when some changed path is not part of any entry's
    /// subgraph: such a change (a new file, a scanned template, an SCSS
    /// partial) can affect any entry, so everything is recompiled.
    pub fn affected_entries(&self, changed: &HashSet<PathBuf>) -> Option<BTreeSet<String>> {
        let mut affected = BTreeSet::new();

        for path in changed {
            let mut hit = false;
            for (entry, modules) in &self.entries {
                if modules.iter().any(|m| m == path) {
                    affected.insert(entry.clone());
                    hit = true;
                }
            }
            if !hit {
                return None;
            }
        }

        Some(affected)
    }
}
