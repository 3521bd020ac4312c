//! Run state machine: explicit states and legal transition guards.
//!
//! The run controller calls `advance()` between phases. Each call validates
//! the edge and records it, so an aborted run can report how far it got.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Phases of one benchmark run.
///
/// Every run starts at `Init` and terminates at either `Done` or `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    /// Tools found, configuration valid, device resolved.
    PrerequisitesChecked,
    /// Baseline workspace bound to the requested revision.
    BaselineStaged,
    /// Current (and baseline) binaries built.
    Built,
    /// Primary candidates answered; unavailable references excluded.
    SmokeTested,
    /// Measurement tool running per operation.
    Measuring,
    /// Writing the summary document.
    Reporting,
    /// Terminal.
    Done,
    /// Terminal: a fatal error stopped the run.
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::PrerequisitesChecked => write!(f, "PrerequisitesChecked"),
            Self::BaselineStaged => write!(f, "BaselineStaged"),
            Self::Built => write!(f, "Built"),
            Self::SmokeTested => write!(f, "SmokeTested"),
            Self::Measuring => write!(f, "Measuring"),
            Self::Reporting => write!(f, "Reporting"),
            Self::Done => write!(f, "Done"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Legal edges:
/// ```text
/// Init → PrerequisitesChecked
/// PrerequisitesChecked → BaselineStaged | Built
/// BaselineStaged → Built
/// Built → SmokeTested → Measuring → Reporting → Done
/// any non-terminal → Aborted
/// ```
fn is_legal_transition(from: RunState, to: RunState) -> bool {
    use RunState::*;

    if to == Aborted && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Init, PrerequisitesChecked)
            | (PrerequisitesChecked, BaselineStaged)
            // Self-comparison disabled
            | (PrerequisitesChecked, Built)
            | (BaselineStaged, Built)
            | (Built, SmokeTested)
            | (SmokeTested, Measuring)
            | (Measuring, Reporting)
            | (Reporting, Done)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RunState,
    pub to: RunState,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct StateMachine {
    current: RunState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: RunState::Init,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    /// Move to `to` if the edge is legal.
    pub fn advance(&mut self, to: RunState, reason: Option<&str>) -> BenchResult<()> {
        if !is_legal_transition(self.current, to) {
            return Err(BenchError::IllegalTransition {
                from: self.current.to_string(),
                to: to.to_string(),
            });
        }

        tracing::debug!(from = %self.current, to = %to, "State transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Transition to `Aborted`; legal from any non-terminal state.
    pub fn abort(&mut self, reason: &str) -> BenchResult<()> {
        self.advance(RunState::Aborted, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Whether the run ever reached `state`.
    pub fn visited(&self, state: RunState) -> bool {
        self.transitions.iter().any(|t| t.to == state)
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history, logged at the end of a run.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} → {} ({}ms, {} transitions)",
            RunState::Init,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), RunState::Init);
        assert!(!sm.is_terminal());
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_path_with_baseline() {
        let mut sm = StateMachine::new();
        sm.advance(RunState::PrerequisitesChecked, None).unwrap();
        sm.advance(RunState::BaselineStaged, Some("main")).unwrap();
        sm.advance(RunState::Built, None).unwrap();
        sm.advance(RunState::SmokeTested, None).unwrap();
        sm.advance(RunState::Measuring, None).unwrap();
        sm.advance(RunState::Reporting, None).unwrap();
        sm.advance(RunState::Done, None).unwrap();

        assert!(sm.is_terminal());
        assert!(sm.visited(RunState::BaselineStaged));
        assert_eq!(sm.transitions().len(), 7);
    }

    #[test]
    fn test_baseline_step_is_optional() {
        let mut sm = StateMachine::new();
        sm.advance(RunState::PrerequisitesChecked, None).unwrap();
        sm.advance(RunState::Built, Some("self-comparison disabled"))
            .unwrap();
        assert!(!sm.visited(RunState::BaselineStaged));
    }

    #[test]
    fn test_abort_from_any_non_terminal_state() {
        for state in [
            RunState::Init,
            RunState::PrerequisitesChecked,
            RunState::BaselineStaged,
            RunState::Built,
            RunState::SmokeTested,
            RunState::Measuring,
            RunState::Reporting,
        ] {
            let mut sm = StateMachine {
                current: state,
                created_at: Instant::now(),
                transitions: Vec::new(),
            };
            assert!(sm.abort("build failed").is_ok());
            assert_eq!(sm.current(), RunState::Aborted);
        }
    }

    #[test]
    fn test_no_transitions_out_of_terminal_states() {
        let mut sm = StateMachine::new();
        sm.abort("missing hyperfine").unwrap();
        assert!(sm.abort("again").is_err());
        assert!(sm.advance(RunState::PrerequisitesChecked, None).is_err());
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        let mut sm = StateMachine::new();
        let err = sm.advance(RunState::Measuring, None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid state transition from Init to Measuring");

        sm.advance(RunState::PrerequisitesChecked, None).unwrap();
        sm.advance(RunState::Built, None).unwrap();
        assert!(sm.advance(RunState::BaselineStaged, None).is_err());
    }

    #[test]
    fn test_summary() {
        let mut sm = StateMachine::new();
        sm.advance(RunState::PrerequisitesChecked, None).unwrap();
        sm.abort("no device").unwrap();
        let summary = sm.summary();
        assert!(summary.contains("Aborted"));
        assert!(summary.contains("2 transitions"));
        assert_eq!(sm.transitions()[1].reason.as_deref(), Some("no device"));
    }
}
