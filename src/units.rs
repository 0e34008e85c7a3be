//! Frame and gain unit conversions.
//!
//! Integer frame positions are the canonical time unit; every second-valued
//! input crosses into frame space exactly once, through [`sec_to_frames`].

/// Lower clamp for dB-valued inputs.
pub const MIN_DB: f64 = -60.0;
/// Upper clamp for dB-valued inputs.
pub const MAX_DB: f64 = 6.0;

// Absorbs float noise like 0.1 * 30.0 == 3.0000000000000004 before ceil.
const FRAME_EPSILON: f64 = 1e-9;

/// Convert seconds to frames, rounding up.
pub fn sec_to_frames(seconds: f64, fps: f64) -> u64 {
    (seconds * fps - FRAME_EPSILON).ceil().max(0.0) as u64
}

/// Convert seconds to frames, rounding up, with a floor of one frame.
pub fn sec_to_frames_at_least_one(seconds: f64, fps: f64) -> u64 {
    sec_to_frames(seconds, fps).max(1)
}

pub fn frames_to_sec(frames: u64, fps: f64) -> f64 {
    (frames as f64) / fps
}

/// `10^(dB/20)` with the input clamped to `[MIN_DB, MAX_DB]`.
pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(clamp_db(db) / 20.0)
}

pub fn clamp_db(db: f64) -> f64 {
    db.clamp(MIN_DB, MAX_DB)
}

pub fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}
