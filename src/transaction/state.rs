//! Transaction decisions and the per-send phase machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Decision for a half message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Make the half message visible to consumers
    Commit,
    /// Discard the half message
    Rollback,
    /// Defer the decision to a later broker check
    Unknown,
}

impl TransactionState {
    /// Whether this state settles the message
    pub fn is_definitive(&self) -> bool {
        !matches!(self, TransactionState::Unknown)
    }
}

/// Progress of one transactional send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionPhase {
    HalfMessageSent,
    Executing,
    Committed,
    RolledBack,
    PendingRecheck,
}

impl TransactionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionPhase::Committed | TransactionPhase::RolledBack)
    }

    /// Legal edges of the phase machine
    pub fn can_transition_to(&self, next: TransactionPhase) -> bool {
        use TransactionPhase::*;

        matches!(
            (self, next),
            (HalfMessageSent, Executing)
                | (Executing, Committed)
                | (Executing, RolledBack)
                | (Executing, PendingRecheck)
                | (PendingRecheck, Committed)
                | (PendingRecheck, RolledBack)
                | (PendingRecheck, PendingRecheck)
        )
    }

    /// Phase reached once `state` has been reported
    pub fn settled_by(state: TransactionState) -> Self {
        match state {
            TransactionState::Commit => TransactionPhase::Committed,
            TransactionState::Rollback => TransactionPhase::RolledBack,
            TransactionState::Unknown => TransactionPhase::PendingRecheck,
        }
    }
}

/// A recorded phase change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: TransactionPhase,
    pub to: TransactionPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Rejected phase change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction phase transition from {from} to {to}")]
pub struct InvalidPhaseTransition {
    pub from: TransactionPhase,
    pub to: TransactionPhase,
}

/// Phase tracking for one in-flight transactional send
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub group: String,
    phase: TransactionPhase,
    history: Vec<PhaseTransition>,
}

impl TransactionRecord {
    /// Record for a half message the broker just accepted
    pub fn half_message_sent(transaction_id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            group: group.into(),
            phase: TransactionPhase::HalfMessageSent,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> TransactionPhase {
        self.phase
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    /// Move to the next phase
    pub fn advance(
        &mut self,
        to: TransactionPhase,
        reason: impl Into<String>,
    ) -> Result<&PhaseTransition, InvalidPhaseTransition> {
        if !self.phase.can_transition_to(to) {
            return Err(InvalidPhaseTransition {
                from: self.phase,
                to,
            });
        }

        self.history.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.into(),
        });
        self.phase = to;

        Ok(&self.history[self.history.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(TransactionState::Commit.to_string(), "COMMIT");
        assert_eq!(
            "ROLLBACK".parse::<TransactionState>().unwrap(),
            TransactionState::Rollback
        );
        assert!(!TransactionState::Unknown.is_definitive());
    }

    #[test]
    fn test_happy_path() {
        let mut record = TransactionRecord::half_message_sent("tx-1", "orders");
        record.advance(TransactionPhase::Executing, "half message accepted").unwrap();
        record.advance(TransactionPhase::Committed, "executor committed").unwrap();

        assert!(record.phase().is_terminal());
        assert_eq!(record.history().len(), 2);
        assert_eq!(record.history()[0].from, TransactionPhase::HalfMessageSent);
    }

    #[test]
    fn test_terminal_phases_are_final() {
        let mut record = TransactionRecord::half_message_sent("tx-2", "orders");
        record.advance(TransactionPhase::Executing, "").unwrap();
        record.advance(TransactionPhase::RolledBack, "").unwrap();

        let err = record.advance(TransactionPhase::Committed, "").unwrap_err();
        assert_eq!(err.from, TransactionPhase::RolledBack);
        assert_eq!(record.phase(), TransactionPhase::RolledBack);
    }

    #[test]
    fn test_execution_cannot_be_skipped() {
        let mut record = TransactionRecord::half_message_sent("tx-3", "orders");
        assert!(record.advance(TransactionPhase::Committed, "").is_err());
    }

    #[test]
    fn test_pending_recheck_resolves_later() {
        assert!(TransactionPhase::PendingRecheck.can_transition_to(TransactionPhase::RolledBack));
        assert_eq!(
            TransactionPhase::settled_by(TransactionState::Unknown),
            TransactionPhase::PendingRecheck
        );
    }
}
