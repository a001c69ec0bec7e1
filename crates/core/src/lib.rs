pub mod geometry;
pub mod interaction;
pub mod record;
pub mod session;

pub use geometry::{button_area, scan_area, Rect};
pub use interaction::{ButtonStyle, InteractionState, KeyCommand, PointerEvent};
pub use record::{ExtractedRecord, Field, RecordReport, ScanRecord, NOT_FOUND};
pub use session::{SessionEvent, SessionState};
