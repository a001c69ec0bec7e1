use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use idscan_core::{
    button_area, scan_area, InteractionState, KeyCommand, PointerEvent, SessionEvent, SessionState,
};

use crate::commands::{print_report, AppContext, ScanReport};

/// Pending-capture flag shared with the input thread.
#[derive(Debug, Clone, Default)]
pub struct CaptureTrigger(Arc<AtomicBool>);

impl CaptureTrigger {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Reads and clears the flag in one step.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Supplies frames to the live loop. `None` means the source is gone.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<RgbImage>;
}

/// Replays the images of a directory in name order, looping forever.
pub struct DirectoryFrames {
    paths: Vec<PathBuf>,
    next: usize,
}

impl DirectoryFrames {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| idscan_ocr::is_image_path(p))
            .collect();
        if paths.is_empty() {
            bail!("No images found in {}", dir.display());
        }
        paths.sort();
        Ok(Self { paths, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for DirectoryFrames {
    fn next_frame(&mut self) -> Option<RgbImage> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        match image::open(path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!(path = %path.display(), "Failed to read frame: {e}");
                None
            }
        }
    }
}

// ── Input ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveInput {
    Key(KeyCommand),
    Pointer(PointerEvent),
}

/// Parses one stdin line: a key command, or `move|down|up|click X Y`.
/// `click` expands to a press and release at the same point.
pub fn parse_live_input(line: &str) -> Vec<LiveInput> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().map(str::to_ascii_lowercase);
    let coords: Option<(i64, i64)> = match (parts.next(), parts.next(), parts.next()) {
        (Some(x), Some(y), None) => x.parse().ok().zip(y.parse().ok()),
        _ => None,
    };

    match (verb.as_deref(), coords) {
        (Some("move"), Some((x, y))) => vec![LiveInput::Pointer(PointerEvent::Move { x, y })],
        (Some("down"), Some((x, y))) => vec![LiveInput::Pointer(PointerEvent::Down { x, y })],
        (Some("up"), Some((x, y))) => vec![LiveInput::Pointer(PointerEvent::Up { x, y })],
        (Some("click"), Some((x, y))) => vec![
            LiveInput::Pointer(PointerEvent::Down { x, y }),
            LiveInput::Pointer(PointerEvent::Up { x, y }),
        ],
        _ => vec![LiveInput::Key(KeyCommand::from_line(line))],
    }
}

/// Reads stdin on its own thread. Capture keys set the trigger directly;
/// everything else goes through the channel. End of input counts as quit.
pub fn spawn_stdin_reader(trigger: CaptureTrigger, tx: mpsc::UnboundedSender<LiveInput>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            for input in parse_live_input(&line) {
                match input {
                    LiveInput::Key(KeyCommand::Capture) => trigger.request(),
                    LiveInput::Key(KeyCommand::Other) => debug!(line = %line, "Ignoring input"),
                    other => {
                        if tx.send(other).is_err() {
                            return;
                        }
                    }
                }
            }
        }
        let _ = tx.send(LiveInput::Key(KeyCommand::Quit));
    })
}

// ── Session loop ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSummary {
    pub frames: usize,
    pub captured: usize,
    pub failed: usize,
    pub final_state: SessionState,
}

pub struct LiveSession<S: FrameSource> {
    source: S,
    trigger: CaptureTrigger,
    inputs: mpsc::UnboundedReceiver<LiveInput>,
    interval: Duration,
    interaction: InteractionState,
    state: SessionState,
}

impl<S: FrameSource> LiveSession<S> {
    pub fn new(source: S, trigger: CaptureTrigger, inputs: mpsc::UnboundedReceiver<LiveInput>, interval: Duration) -> Self {
        Self {
            source,
            trigger,
            inputs,
            interval,
            interaction: InteractionState::default(),
            state: SessionState::Idle,
        }
    }

    fn advance(&mut self, event: SessionEvent) {
        let next = self.state.transition(event);
        if next != self.state {
            debug!(from = %self.state, to = %next, ?event, "Session transition");
        }
        self.state = next;
    }

    /// Runs until quit or until the frame source fails. A failed capture is
    /// logged and the loop keeps going.
    pub async fn run(mut self, ctx: &AppContext) -> LiveSummary {
        let mut summary = LiveSummary { frames: 0, captured: 0, failed: 0, final_state: self.state };
        let mut quit = false;

        while !self.state.is_stopped() {
            let Some(frame) = self.source.next_frame() else {
                warn!("Frame source lost, stopping");
                self.advance(SessionEvent::FrameLost);
                break;
            };
            summary.frames += 1;
            self.advance(SessionEvent::FrameReady);

            let scan = scan_area(frame.width(), frame.height());
            let button = button_area(frame.width(), frame.height(), scan);
            while let Ok(input) = self.inputs.try_recv() {
                match input {
                    LiveInput::Key(KeyCommand::Quit) => quit = true,
                    LiveInput::Key(KeyCommand::Capture) => self.trigger.request(),
                    LiveInput::Key(KeyCommand::Other) => {}
                    LiveInput::Pointer(event) => {
                        let (next, clicked) = self.interaction.on_pointer(event, button);
                        if next.style() != self.interaction.style() {
                            debug!(style = ?next.style(), "Capture button");
                        }
                        self.interaction = next;
                        if clicked {
                            self.trigger.request();
                        }
                    }
                }
            }

            if self.trigger.take() {
                self.advance(SessionEvent::CaptureRequested);
                info!(region = %scan, "Capturing");
                match ctx.scan_frame(frame, Some(scan)).await {
                    Ok(outcome) => match ctx.persist(&outcome).await {
                        Ok(saved) => {
                            summary.captured += 1;
                            if let Err(e) = print_report(&ScanReport::new(&outcome, Some(&saved)), false) {
                                warn!("Failed to print report: {e:#}");
                            }
                        }
                        Err(e) => {
                            summary.failed += 1;
                            warn!("Failed to store capture: {e:#}");
                        }
                    },
                    Err(e) => {
                        summary.failed += 1;
                        warn!("Capture failed: {e:#}");
                    }
                }
                self.advance(SessionEvent::ScanFinished);
            }

            if quit {
                self.advance(SessionEvent::QuitRequested);
                break;
            }
            tokio::time::sleep(self.interval).await;
        }

        summary.final_state = self.state;
        summary
    }
}

pub async fn live(ctx: &AppContext, frames: &Path, interval: Duration) -> Result<LiveSummary> {
    let source = DirectoryFrames::open(frames)?;
    info!(frames = source.len(), "Live capture: Enter or 'space' to scan, 'click X Y' to press the button, 'q' to quit");

    let trigger = CaptureTrigger::default();
    let (tx, rx) = mpsc::unbounded_channel();
    // Not joined: the reader may stay blocked on stdin after the loop ends.
    let _reader = spawn_stdin_reader(trigger.clone(), tx);

    let summary = LiveSession::new(source, trigger, rx, interval).run(ctx).await;
    info!(
        frames = summary.frames,
        captured = summary.captured,
        failed = summary.failed,
        state = %summary.final_state,
        "Live capture ended"
    );
    Ok(summary)
}
