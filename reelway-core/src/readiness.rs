//! Playback readiness policy
//!
//! Decides from a session snapshot whether the player can be handed the
//! stream URL before the download finishes.

use serde::{Deserialize, Serialize};

use crate::session::{DownloadSession, SessionState};

/// Point at which playback may begin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReadinessThreshold {
    /// Overall download progress, in percent
    Percent(f32),
    /// Contiguous bytes available from the start of the file
    MinBytes(u64),
}

/// Outcome of the readiness policy. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ReadinessDecision {
    NotReady,
    ReadyToStart,
    FullyAvailable,
}

/// Pure readiness decision.
///
/// Playback needs the engine to have reported the stream ready (the file is
/// then bound to the range server) and the threshold to be met. A file whose
/// every byte is on disk is `FullyAvailable` regardless of the threshold.
pub fn decide(
    state: SessionState,
    progress_percent: f32,
    contiguous_available_bytes: u64,
    total_size_bytes: Option<u64>,
    threshold: ReadinessThreshold,
) -> ReadinessDecision {
    if state != SessionState::Ready {
        return ReadinessDecision::NotReady;
    }

    if total_size_bytes.is_some_and(|total| contiguous_available_bytes >= total) {
        return ReadinessDecision::FullyAvailable;
    }

    let threshold_met = match threshold {
        ReadinessThreshold::Percent(percent) => progress_percent >= percent,
        ReadinessThreshold::MinBytes(bytes) => contiguous_available_bytes >= bytes,
    };

    if threshold_met {
        ReadinessDecision::ReadyToStart
    } else {
        ReadinessDecision::NotReady
    }
}

impl ReadinessDecision {
    /// Applies [`decide`] to a session snapshot.
    pub fn for_session(session: &DownloadSession, threshold: ReadinessThreshold) -> Self {
        decide(
            session.state,
            session.progress_percent,
            session.contiguous_available_bytes(),
            session.total_size_bytes(),
            threshold,
        )
    }
}

/// Turns the level-style decision into one-shot signals.
///
/// `ReadyToStart` is emitted the first time the threshold is crossed and
/// `FullyAvailable` the first time the whole file is present. Jumping
/// straight to `FullyAvailable` emits only that.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    threshold: ReadinessThreshold,
    emitted: ReadinessDecision,
}

impl ReadinessGate {
    pub fn new(threshold: ReadinessThreshold) -> Self {
        Self {
            threshold,
            emitted: ReadinessDecision::NotReady,
        }
    }

    /// Feeds one observation; returns the signal to act on, if any.
    pub fn observe(
        &mut self,
        state: SessionState,
        progress_percent: f32,
        contiguous_available_bytes: u64,
        total_size_bytes: Option<u64>,
    ) -> Option<ReadinessDecision> {
        let decision = decide(
            state,
            progress_percent,
            contiguous_available_bytes,
            total_size_bytes,
            self.threshold,
        );
        if decision > self.emitted {
            self.emitted = decision;
            Some(decision)
        } else {
            None
        }
    }

    /// Feeds a session snapshot.
    pub fn observe_session(&mut self, session: &DownloadSession) -> Option<ReadinessDecision> {
        self.observe(
            session.state,
            session.progress_percent,
            session.contiguous_available_bytes(),
            session.total_size_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOTAL: Option<u64> = Some(1_000_000);

    #[test]
    fn test_ready_to_start_fires_once_at_threshold() {
        let mut gate = ReadinessGate::new(ReadinessThreshold::Percent(2.0));
        let signals: Vec<_> = [0.0, 1.0, 2.0, 5.0, 10.0]
            .into_iter()
            .map(|progress| gate.observe(SessionState::Ready, progress, 1000, TOTAL))
            .collect();

        assert_eq!(
            signals,
            vec![
                None,
                None,
                Some(ReadinessDecision::ReadyToStart),
                None,
                None
            ]
        );
    }

    #[test]
    fn test_not_ready_before_engine_ready() {
        for state in [
            SessionState::Starting,
            SessionState::MetadataReceived,
            SessionState::Downloading,
            SessionState::Error,
            SessionState::Stopped,
        ] {
            assert_eq!(
                decide(state, 50.0, 500_000, TOTAL, ReadinessThreshold::Percent(2.0)),
                ReadinessDecision::NotReady
            );
        }
    }

    #[test]
    fn test_byte_threshold() {
        let threshold = ReadinessThreshold::MinBytes(4096);
        assert_eq!(
            decide(SessionState::Ready, 90.0, 4095, TOTAL, threshold),
            ReadinessDecision::NotReady
        );
        assert_eq!(
            decide(SessionState::Ready, 0.1, 4096, TOTAL, threshold),
            ReadinessDecision::ReadyToStart
        );
    }

    #[test]
    fn test_fully_available_when_every_byte_present() {
        assert_eq!(
            decide(
                SessionState::Ready,
                0.0,
                1_000_000,
                TOTAL,
                ReadinessThreshold::Percent(2.0)
            ),
            ReadinessDecision::FullyAvailable
        );
    }

    #[test]
    fn test_gate_emits_full_availability_once() {
        let mut gate = ReadinessGate::new(ReadinessThreshold::Percent(2.0));
        assert_eq!(
            gate.observe(SessionState::Ready, 5.0, 1000, TOTAL),
            Some(ReadinessDecision::ReadyToStart)
        );
        assert_eq!(
            gate.observe(SessionState::Ready, 100.0, 1_000_000, TOTAL),
            Some(ReadinessDecision::FullyAvailable)
        );
        assert_eq!(
            gate.observe(SessionState::Ready, 100.0, 1_000_000, TOTAL),
            None
        );
    }

    #[test]
    fn test_gate_skips_straight_to_full_availability() {
        let mut gate = ReadinessGate::new(ReadinessThreshold::Percent(50.0));
        assert_eq!(
            gate.observe(SessionState::Ready, 10.0, 1_000_000, TOTAL),
            Some(ReadinessDecision::FullyAvailable)
        );
        assert_eq!(gate.observe(SessionState::Ready, 60.0, 1_000_000, TOTAL), None);
    }
}
