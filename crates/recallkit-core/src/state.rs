//! Explicit trial states and the table of allowed transitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::CycleKind;

/// Where a cycle stands between announcing its words and finishing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    /// Listening, waiting for the announce action.
    Announce,
    /// Listening, words audible.
    Playing,
    /// Recording, capture not started.
    RecordingIdle,
    /// Recording, capture running.
    Capturing,
    /// Recording, audio in hand.
    Captured,
}

impl CycleStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            CycleStage::Announce => "listening(announce)",
            CycleStage::Playing => "listening(playing)",
            CycleStage::RecordingIdle => "recording(idle)",
            CycleStage::Capturing => "recording(capturing)",
            CycleStage::Captured => "recording(captured)",
        }
    }
}

/// State of one trial session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TrialState {
    Intro,
    AwaitingWordGeneration,
    Cycle { kind: CycleKind, stage: CycleStage },
    AwaitingInterferenceGeneration,
    /// Waiting out the delay before delayed recall.
    DelayPeriod,
    Complete,
}

impl TrialState {
    pub const fn cycle(kind: CycleKind, stage: CycleStage) -> Self {
        TrialState::Cycle { kind, stage }
    }

    pub fn stage(&self) -> Option<CycleStage> {
        match self {
            TrialState::Cycle { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn cycle_kind(&self) -> Option<CycleKind> {
        match self {
            TrialState::Cycle { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrialState::Complete)
    }

    /// Structural transition table. The number of learning cycles is
    /// enforced by the session, not here.
    pub fn can_transition_to(&self, target: TrialState) -> bool {
        use CycleKind::*;
        use CycleStage::*;
        use TrialState::*;

        match (*self, target) {
            (Intro, AwaitingWordGeneration) => true,
            (AwaitingWordGeneration, Cycle { kind: Learning(1), stage: Announce }) => true,
            (AwaitingInterferenceGeneration, Cycle { kind: Interference, stage: Announce }) => {
                true
            }
            (DelayPeriod, Cycle { kind: DelayedRecall, stage: RecordingIdle }) => true,

            // Within one cycle.
            (Cycle { kind: a, stage: from }, Cycle { kind: b, stage: to }) if a == b => matches!(
                (from, to),
                (Announce, Playing)
                    | (Playing, RecordingIdle)
                    | (Playing, Announce)
                    | (RecordingIdle, Capturing)
                    | (Capturing, Captured)
                    | (Capturing, RecordingIdle)
            ),

            // Finishing a cycle.
            (Cycle { kind: Learning(n), stage: Captured }, Cycle { kind: Learning(m), stage: Announce }) => {
                m == n.saturating_add(1) && m > n
            }
            (Cycle { kind: Learning(_), stage: Captured }, AwaitingInterferenceGeneration) => true,
            (Cycle { kind: Interference, stage: Captured }, DelayPeriod | Complete) => true,
            (Cycle { kind: DelayedRecall, stage: Captured }, Complete) => true,

            _ => false,
        }
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialState::Intro => write!(f, "intro"),
            TrialState::AwaitingWordGeneration => write!(f, "awaiting word generation"),
            TrialState::Cycle { kind, stage } => write!(f, "{kind} cycle {}", stage.as_str()),
            TrialState::AwaitingInterferenceGeneration => {
                write!(f, "awaiting interference generation")
            }
            TrialState::DelayPeriod => write!(f, "delay period"),
            TrialState::Complete => write!(f, "complete"),
        }
    }
}
