//! Curation state machine for a flagged bot message.
//!
//! ```text
//! Flagged ──analyze──▶ Analyzed ──edit──▶ Edited
//!    │                    │  ▲              │
//!    │                    └──┘ analyze      │
//!    │                    └──commit──▶ Committed ◀──commit──┘
//!    └──edit──▶ Edited
//! any non-terminal ──discard──▶ Discarded
//! any ──mark_handled──▶ Handled
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurationState {
    Flagged,
    Analyzed,
    Edited,
    Committed,
    Discarded,
    Handled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurationEvent {
    Analyze,
    Edit,
    Commit,
    Discard,
    MarkHandled,
}

impl CurationState {
    /// States hidden from the default flagged listing.
    pub const ARCHIVED: [CurationState; 3] =
        [CurationState::Committed, CurationState::Discarded, CurationState::Handled];

    pub fn as_str(self) -> &'static str {
        match self {
            CurationState::Flagged => "flagged",
            CurationState::Analyzed => "analyzed",
            CurationState::Edited => "edited",
            CurationState::Committed => "committed",
            CurationState::Discarded => "discarded",
            CurationState::Handled => "handled",
        }
    }

    pub fn is_terminal(self) -> bool {
        Self::ARCHIVED.contains(&self)
    }

    /// Next state after `event`, or `InvalidTransition`.
    pub fn apply(self, event: CurationEvent) -> Result<CurationState, AppError> {
        use CurationEvent as E;
        use CurationState as S;

        let next = match (self, event) {
            (_, E::MarkHandled) => Some(S::Handled),
            (s, _) if s.is_terminal() => None,
            (S::Flagged | S::Analyzed, E::Analyze) => Some(S::Analyzed),
            (S::Flagged | S::Analyzed | S::Edited, E::Edit) => Some(S::Edited),
            (S::Analyzed | S::Edited, E::Commit) => Some(S::Committed),
            (_, E::Discard) => Some(S::Discarded),
            _ => None,
        };
        next.ok_or_else(|| {
            AppError::InvalidTransition(format!("cannot {event:?} a message in state {self}"))
        })
    }
}

impl fmt::Display for CurationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurationState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flagged" => Ok(CurationState::Flagged),
            "analyzed" => Ok(CurationState::Analyzed),
            "edited" => Ok(CurationState::Edited),
            "committed" => Ok(CurationState::Committed),
            "discarded" => Ok(CurationState::Discarded),
            "handled" => Ok(CurationState::Handled),
            other => Err(AppError::Store(format!("unknown curation state '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CurationEvent as E;
    use super::CurationState as S;
    use super::*;

    #[test]
    fn happy_path() {
        let s = S::Flagged.apply(E::Analyze).unwrap();
        let s = s.apply(E::Edit).unwrap();
        assert_eq!(s, S::Edited);
        assert_eq!(s.apply(E::Commit).unwrap(), S::Committed);
    }

    #[test]
    fn commit_without_edit_from_analyzed() {
        assert_eq!(S::Analyzed.apply(E::Commit).unwrap(), S::Committed);
    }

    #[test]
    fn cannot_commit_unanalyzed() {
        assert!(matches!(S::Flagged.apply(E::Commit), Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn terminals_reject_everything_but_handled() {
        for s in [S::Committed, S::Discarded] {
            for e in [E::Analyze, E::Edit, E::Commit, E::Discard] {
                assert!(s.apply(e).is_err(), "{s} accepted {e:?}");
            }
            assert_eq!(s.apply(E::MarkHandled).unwrap(), S::Handled);
        }
    }

    #[test]
    fn discard_from_any_open_state() {
        for s in [S::Flagged, S::Analyzed, S::Edited] {
            assert_eq!(s.apply(E::Discard).unwrap(), S::Discarded);
        }
    }

    #[test]
    fn string_roundtrip() {
        for s in [S::Flagged, S::Analyzed, S::Edited, S::Committed, S::Discarded, S::Handled] {
            assert_eq!(s.as_str().parse::<S>().unwrap(), s);
        }
        assert!("bogus".parse::<S>().is_err());
    }
}
