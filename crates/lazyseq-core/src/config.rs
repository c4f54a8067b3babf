//! Configuration surface for the sequentialization pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Loop iteration cap used by the upstream unroller when a loop bound cannot
/// be derived statically ("soft" unwinding).
///
/// This is a pragmatic cap inherited from earlier tooling, not a proven-sound
/// bound: a run that exhausts it reports LOOP BOUND EXCEEDED instead of a
/// verdict, so results stay conservative but possibly incomplete.
pub const SOFT_UNWIND_CAP: u32 = 10_000;

/// Scheduling discipline explored by the synthesized driver.
///
/// The two modes are mutually exclusive: a configuration carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleMode {
    /// `rounds` rounds, each letting every eligible thread run a further
    /// prefix of its body.
    RoundRobin { rounds: u32 },

    /// `contexts` resumptions, each nondeterministically assigned to a
    /// currently active thread (context 0 always resumes main).
    ContextBounded { contexts: u32 },
}

impl Default for ScheduleMode {
    fn default() -> Self {
        ScheduleMode::RoundRobin { rounds: 1 }
    }
}

/// Configuration for the encoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Scheduling mode (round-robin or context-bounded)
    pub mode: ScheduleMode,

    /// Maximum thread creations (0 = unbounded)
    pub max_threads: u32,

    /// Round-robin schedule restriction string, e.g. `"1,2:+:3"`
    pub schedule: Option<String>,

    /// Check for deadlock
    pub deadlock: bool,

    /// Model spurious condition-variable wakeups
    pub nondet_condvar_wakeups: bool,

    /// Label branch/loop condition evaluations for richer counterexamples
    pub extra_tracking: bool,
}

/// Which threads may run in one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRestriction {
    /// `+` wildcard: any thread may run
    pub any: bool,
    /// Explicitly admitted thread indices
    pub threads: BTreeSet<u32>,
}

impl RoundRestriction {
    /// Whether thread `t` may be scheduled in this round
    #[must_use]
    pub fn admits(&self, t: u32) -> bool {
        self.any || self.threads.contains(&t)
    }

    fn wildcard() -> Self {
        Self {
            any: true,
            threads: BTreeSet::new(),
        }
    }
}

/// A parsed, validated schedule restriction: one entry per round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    rounds: Vec<RoundRestriction>,
}

impl Schedule {
    /// Parse a restriction string of the form `round_0:round_1:...` where
    /// each round is a comma-separated set of thread indices or `+`.
    ///
    /// Invalid entries void the whole restriction (with a warning) rather
    /// than silently constraining the search in an unintended way. The
    /// result always has at least `rounds` entries, padded with wildcards,
    /// and the main thread (index 0) is forced eligible in round 0.
    #[must_use]
    pub fn parse(raw: Option<&str>, rounds: u32, max_threads: u32) -> Self {
        let mut explicit: Vec<RoundRestriction> = Vec::new();

        if let Some(raw) = raw {
            let normalized = normalize(raw);

            if !normalized.is_empty() {
                let mut valid = true;

                for part in normalized.split(':') {
                    let mut restriction = RoundRestriction::default();

                    for entry in part.split(',') {
                        if entry == "+" {
                            restriction.any = true;
                        } else if let Ok(t) = entry.parse::<u32>() {
                            if max_threads > 0 && t > max_threads {
                                warn!(
                                    "invalid scheduling ignored (thread {} does not exist)",
                                    t
                                );
                                valid = false;
                            }
                            restriction.threads.insert(t);
                        } else {
                            warn!("invalid scheduling ignored");
                            valid = false;
                        }
                    }

                    explicit.push(restriction);
                }

                if !valid {
                    explicit.clear();
                }
            }
        }

        // Pad short schedules with unconstrained rounds.
        while (explicit.len() as u32) < rounds {
            explicit.push(RoundRestriction::wildcard());
        }

        // The main thread must always be schedulable in the first round.
        if let Some(first) = explicit.first_mut() {
            first.threads.insert(0);
        }

        Self { rounds: explicit }
    }

    /// Number of rounds after schedule/round-count reconciliation
    #[must_use]
    pub fn round_count(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// The restriction for round `r`
    #[must_use]
    pub fn round(&self, r: u32) -> &RoundRestriction {
        &self.rounds[r as usize]
    }
}

/// Strip stray separators the way a forgiving CLI would.
fn normalize(raw: &str) -> String {
    let mut s = raw.to_string();
    while s.contains("::") {
        s = s.replace("::", ":");
    }
    while s.contains(",,") {
        s = s.replace(",,", ",");
    }
    s.trim_matches(|c| c == ':' || c == ',').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_schedule() {
        let s = Schedule::parse(Some("1,2:+:3"), 3, 3);
        assert_eq!(s.round_count(), 3);
        assert!(s.round(0).admits(1));
        assert!(s.round(0).admits(2));
        assert!(!s.round(0).admits(3));
        assert!(s.round(1).admits(3));
        assert!(s.round(2).admits(3));
        assert!(!s.round(2).admits(1));
    }

    #[test]
    fn test_main_forced_in_round_zero() {
        let s = Schedule::parse(Some("1:2"), 2, 2);
        assert!(s.round(0).admits(0));
        assert!(!s.round(1).admits(0));
    }

    #[test]
    fn test_schedule_longer_than_rounds_extends() {
        let s = Schedule::parse(Some("0:1:0"), 2, 1);
        assert_eq!(s.round_count(), 3);
    }

    #[test]
    fn test_schedule_shorter_than_rounds_padded() {
        let s = Schedule::parse(Some("0"), 3, 1);
        assert_eq!(s.round_count(), 3);
        assert!(s.round(1).any);
        assert!(s.round(2).any);
    }

    #[test]
    fn test_invalid_entry_voids_schedule() {
        let s = Schedule::parse(Some("0:x:1"), 3, 1);
        assert_eq!(s.round_count(), 3);
        // all rounds are wildcards after the invalid schedule is dropped
        assert!(s.round(0).any);
        assert!(s.round(1).any);
        assert!(s.round(2).any);
    }

    #[test]
    fn test_out_of_range_thread_voids_schedule() {
        let s = Schedule::parse(Some("0:5"), 2, 2);
        assert!(s.round(0).any);
        assert!(s.round(1).any);
    }

    #[test]
    fn test_messy_separators_normalized() {
        let s = Schedule::parse(Some("::0,,1::+::"), 2, 2);
        assert_eq!(s.round_count(), 2);
        assert!(s.round(0).admits(1));
        assert!(!s.round(0).admits(2));
        assert!(s.round(1).any);
    }

    #[test]
    fn test_no_schedule_all_wildcards() {
        let s = Schedule::parse(None, 2, 2);
        assert_eq!(s.round_count(), 2);
        assert!(s.round(0).admits(0));
        assert!(s.round(0).any);
    }

    #[test]
    fn test_mode_default() {
        assert_eq!(
            ScheduleMode::default(),
            ScheduleMode::RoundRobin { rounds: 1 }
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = EncodeConfig {
            mode: ScheduleMode::ContextBounded { contexts: 3 },
            max_threads: 2,
            schedule: None,
            deadlock: true,
            nondet_condvar_wakeups: false,
            extra_tracking: true,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: EncodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode, config.mode);
        assert_eq!(back.max_threads, 2);
        assert!(back.deadlock);
        assert!(back.extra_tracking);
    }
}
