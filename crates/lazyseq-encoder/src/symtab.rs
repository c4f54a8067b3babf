//! Symbol-table query interface
//!
//! Parsing and block-scoped symbol resolution happen upstream; the encoder
//! only ever asks the questions below. `SymbolTable` is the plain answer
//! store the pipeline fills in from the parser's output.

use std::collections::{HashMap, HashSet};

/// The queries the encoder needs answered about the input program.
pub trait SymbolQuery {
    /// Is `name` a file-scope (global) variable?
    fn is_global(&self, name: &str) -> bool;

    /// Is `name` a pointer in function `scope` (or at file scope)?
    fn is_pointer(&self, scope: &str, name: &str) -> bool;

    /// Overall identifier occurrence count of function `name`.
    fn occurrence_count(&self, name: &str) -> u32;

    /// Explicit call count of function `name`.
    fn call_count(&self, name: &str) -> u32;

    /// Number of times function `name` is used as a thread start routine.
    fn creation_count(&self, name: &str) -> u32;
}

/// In-memory symbol facts
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    globals: HashSet<String>,
    pointers: HashSet<(String, String)>,
    occurrences: HashMap<String, u32>,
    calls: HashMap<String, u32>,
    creations: HashMap<String, u32>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, name: impl Into<String>) {
        self.globals.insert(name.into());
    }

    pub fn add_pointer(&mut self, scope: impl Into<String>, name: impl Into<String>) {
        self.pointers.insert((scope.into(), name.into()));
    }

    pub fn set_function_counts(
        &mut self,
        name: impl Into<String>,
        occurrences: u32,
        calls: u32,
        creations: u32,
    ) {
        let name = name.into();
        self.occurrences.insert(name.clone(), occurrences);
        self.calls.insert(name.clone(), calls);
        self.creations.insert(name, creations);
    }
}

impl SymbolQuery for SymbolTable {
    fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    fn is_pointer(&self, scope: &str, name: &str) -> bool {
        self.pointers
            .contains(&(scope.to_string(), name.to_string()))
            || self.pointers.contains(&(String::new(), name.to_string()))
    }

    fn occurrence_count(&self, name: &str) -> u32 {
        self.occurrences.get(name).copied().unwrap_or(0)
    }

    fn call_count(&self, name: &str) -> u32 {
        self.calls.get(name).copied().unwrap_or(0)
    }

    fn creation_count(&self, name: &str) -> u32 {
        self.creations.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_table_queries() {
        let mut table = SymbolTable::new();
        table.add_global("x");
        table.add_pointer("main", "p");
        table.add_pointer("", "q");
        table.set_function_counts("worker", 3, 1, 2);

        assert!(table.is_global("x"));
        assert!(!table.is_global("y"));
        assert!(table.is_pointer("main", "p"));
        assert!(!table.is_pointer("worker", "p"));
        // file-scope pointers are visible from every scope
        assert!(table.is_pointer("worker", "q"));
        assert_eq!(table.occurrence_count("worker"), 3);
        assert_eq!(table.call_count("worker"), 1);
        assert_eq!(table.creation_count("worker"), 2);
        assert_eq!(table.creation_count("absent"), 0);
    }
}
