//! Line maps and their backward composition
//!
//! Every source transformation records, for each line it emits, the line of
//! its own input that produced it. Chaining those partial maps backward
//! translates a line in the final sequentialized program to a coordinate in
//! the original input.

use crate::Coord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output-line to input-line map for one transformation stage.
///
/// The map is partial: lines the stage injected from nothing have no entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineMap {
    map: HashMap<u32, u32>,
}

impl LineMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that output line `out` was produced from input line `inp`.
    pub fn insert(&mut self, out: u32, inp: u32) {
        self.map.insert(out, inp);
    }

    /// The input line behind output line `out`, if it maps to one.
    #[must_use]
    pub fn lookup(&self, out: u32) -> Option<u32> {
        self.map.get(&out).copied()
    }

    /// Smallest output line that maps to input line `inp`, if any.
    ///
    /// Forward lookup is only used for diagnostics; when several output
    /// lines share an origin the first one is the canonical representative.
    #[must_use]
    pub fn lookup_forward(&self, inp: u32) -> Option<u32> {
        self.map
            .iter()
            .filter(|&(_, &v)| v == inp)
            .map(|(&k, _)| k)
            .min()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

impl FromIterator<(u32, u32)> for LineMap {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// The ordered line maps of a whole pipeline run, first stage first.
///
/// `input_files` attributes original-input lines to the files a merge stage
/// concatenated; it may be empty when the input was a single file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineMapChain {
    stages: Vec<LineMap>,
    input_files: HashMap<u32, String>,
}

impl LineMapChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the map of the next transformation stage.
    pub fn push(&mut self, map: LineMap) {
        self.stages.push(map);
    }

    /// Attribute original line `line` to `file`.
    pub fn set_input_file(&mut self, line: u32, file: impl Into<String>) {
        self.input_files.insert(line, file.into());
    }

    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Walk a final-output line backward through every stage.
    ///
    /// Returns `None` as soon as any stage has no entry, meaning the line
    /// was injected by the pipeline and has no original counterpart.
    #[must_use]
    pub fn resolve(&self, line: u32) -> Option<Coord> {
        let mut current = line;
        for stage in self.stages.iter().rev() {
            current = stage.lookup(current)?;
        }
        match self.input_files.get(&current) {
            Some(file) => Some(Coord::new(current, file.clone())),
            None => Some(Coord::line(current)),
        }
    }

    /// Walk an original-input line forward through every stage.
    ///
    /// At each stage the smallest mapped line is taken. Used only for
    /// diagnostics and map sanity checks.
    #[must_use]
    pub fn forward(&self, line: u32) -> Option<u32> {
        let mut current = line;
        for stage in &self.stages {
            current = stage.lookup_forward(current)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> LineMapChain {
        // stage 1: 10 -> 3, 11 -> 4
        // stage 2: 20 -> 10, 21 -> 10, 22 -> 11
        let mut chain = LineMapChain::new();
        chain.push([(10, 3), (11, 4)].into_iter().collect());
        chain.push([(20, 10), (21, 10), (22, 11)].into_iter().collect());
        chain
    }

    #[test]
    fn test_resolve_through_two_stages() {
        let chain = chain();
        assert_eq!(chain.resolve(20), Some(Coord::line(3)));
        assert_eq!(chain.resolve(21), Some(Coord::line(3)));
        assert_eq!(chain.resolve(22), Some(Coord::line(4)));
    }

    #[test]
    fn test_resolve_injected_line_is_none() {
        let chain = chain();
        assert_eq!(chain.resolve(23), None);
    }

    #[test]
    fn test_resolve_attributes_file() {
        let mut chain = chain();
        chain.set_input_file(3, "input.c");
        assert_eq!(chain.resolve(20), Some(Coord::new(3, "input.c")));
        // line 4 has no attribution, stays file-less
        assert_eq!(chain.resolve(22), Some(Coord::line(4)));
    }

    #[test]
    fn test_forward_picks_smallest_line() {
        let chain = chain();
        assert_eq!(chain.forward(3), Some(20));
        assert_eq!(chain.forward(4), Some(22));
        assert_eq!(chain.forward(5), None);
    }

    #[test]
    fn test_forward_then_resolve_round_trips() {
        let chain = chain();
        for original in [3u32, 4] {
            let out = chain.forward(original).unwrap();
            assert_eq!(chain.resolve(out), Some(Coord::line(original)));
        }
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = LineMapChain::new();
        assert_eq!(chain.resolve(7), Some(Coord::line(7)));
        assert_eq!(chain.forward(7), Some(7));
    }
}
