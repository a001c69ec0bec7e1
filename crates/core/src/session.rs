use std::fmt;

/// Lifecycle of the live capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    FrameDisplayed,
    CaptureTriggered,
    Processed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    FrameReady,
    /// The frame source returned nothing; fatal to the session.
    FrameLost,
    CaptureRequested,
    /// The capture finished, successfully or not.
    ScanFinished,
    QuitRequested,
}

impl SessionState {
    pub fn transition(self, event: SessionEvent) -> SessionState {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (Stopped, _) => Stopped,
            (_, FrameLost) | (_, QuitRequested) => Stopped,
            (Idle, FrameReady) | (Processed, FrameReady) => FrameDisplayed,
            (FrameDisplayed, CaptureRequested) => CaptureTriggered,
            (CaptureTriggered, ScanFinished) => Processed,
            (state, _) => state,
        }
    }

    pub fn is_stopped(self) -> bool {
        self == SessionState::Stopped
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::FrameDisplayed => "frame_displayed",
            SessionState::CaptureTriggered => "capture_triggered",
            SessionState::Processed => "processed",
            SessionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionEvent::*;
    use super::SessionState::*;

    #[test]
    fn capture_cycle() {
        let s = Idle.transition(FrameReady);
        assert_eq!(s, FrameDisplayed);
        let s = s.transition(CaptureRequested);
        assert_eq!(s, CaptureTriggered);
        let s = s.transition(ScanFinished);
        assert_eq!(s, Processed);
        assert_eq!(s.transition(FrameReady), FrameDisplayed);
    }

    #[test]
    fn capture_needs_a_frame() {
        assert_eq!(Idle.transition(CaptureRequested), Idle);
        assert_eq!(FrameDisplayed.transition(ScanFinished), FrameDisplayed);
    }

    #[test]
    fn frame_loss_and_quit_stop_from_anywhere() {
        for s in [Idle, FrameDisplayed, CaptureTriggered, Processed] {
            assert_eq!(s.transition(FrameLost), Stopped);
            assert_eq!(s.transition(QuitRequested), Stopped);
        }
        assert_eq!(Stopped.transition(FrameReady), Stopped);
        assert!(Stopped.is_stopped());
    }
}
