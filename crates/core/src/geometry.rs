use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width:height ratio of the scan area. Wider than a real ID-1 card (1.586)
/// to keep the capture strip short.
pub const SCAN_ASPECT_RATIO: f64 = 2.2;

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Hit test, inclusive on every edge.
    pub fn contains(&self, px: i64, py: i64) -> bool {
        px >= self.x as i64 && px <= self.right() as i64 && py >= self.y as i64 && py <= self.bottom() as i64
    }

    /// Whether the rectangle lies completely inside a `width`×`height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Rect {
    type Err = String;

    /// Parses `X,Y,W,H`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("Expected X,Y,W,H but got '{s}'"));
        }
        let mut nums = [0u32; 4];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| format!("Invalid rectangle component '{part}'"))?;
        }
        Ok(Rect::new(nums[0], nums[1], nums[2], nums[3]))
    }
}

/// Resolution tiers used to scale the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    FullHd,
    Hd,
    Low,
}

impl Tier {
    fn of(frame_width: u32) -> Self {
        if frame_width >= 1920 {
            Tier::FullHd
        } else if frame_width >= 1280 {
            Tier::Hd
        } else {
            Tier::Low
        }
    }

    /// (scan width ratio, usable height ratio). The usable height is the
    /// frame minus a margin of 5%, 8% or 10% on both edges.
    fn scan_ratios(self) -> (f64, f64) {
        match self {
            Tier::FullHd => (0.35, 0.9),
            Tier::Hd => (0.4, 0.84),
            Tier::Low => (0.5, 0.8),
        }
    }

    fn button_size(self) -> (u32, u32) {
        match self {
            Tier::FullHd => (200, 60),
            Tier::Hd => (160, 50),
            Tier::Low => (120, 40),
        }
    }
}

/// The centered region of a frame where the card is expected.
pub fn scan_area(frame_width: u32, frame_height: u32) -> Rect {
    let (width_ratio, usable_ratio) = Tier::of(frame_width).scan_ratios();

    let mut width = (frame_width as f64 * width_ratio) as u32;
    let mut height = (width as f64 / SCAN_ASPECT_RATIO) as u32;

    let max_height = (frame_height as f64 * usable_ratio) as u32;
    if height > max_height {
        height = max_height;
        width = (height as f64 * SCAN_ASPECT_RATIO) as u32;
    }

    Rect {
        x: frame_width.saturating_sub(width) / 2,
        y: frame_height.saturating_sub(height) / 2,
        width,
        height,
    }
}

/// Position of the on-screen capture button: below the scan area, or above it
/// when there is no room left at the bottom of the frame.
pub fn button_area(frame_width: u32, frame_height: u32, scan: Rect) -> Rect {
    let (width, height) = Tier::of(frame_width).button_size();

    let x = scan.x as i64 + (scan.width as i64 - width as i64) / 2;
    let mut y = scan.bottom() as i64 + 30;
    if y + height as i64 > frame_height as i64 - 20 {
        y = scan.y as i64 - height as i64 - 30;
    }

    Rect {
        x: x.max(0) as u32,
        y: y.max(0) as u32,
        width,
        height,
    }
}
