//! BGM volume envelope.
//!
//! Pure functions of a BGM clip, its ducking intervals and a frame index.
//! The gain ladder selects between base, idle and talk levels; attack and
//! release ramps smooth the transitions against the nearest interval
//! boundaries, and clip-level fades, scene transitions and loop-segment
//! crossfades multiply on top. The final value is clamped to `[0, maxGain]`.

use crate::bgm_config::{
    DEFAULT_BASE_DB, DEFAULT_DUCK_DELTA_DB, DEFAULT_IDLE_BOOST_DB, DEFAULT_MAX_GAIN_DB,
};
use crate::intervals::{Interval, stabilize_intervals, talking_intervals};
use crate::loops::LoopSegment;
use crate::timeline::{BgmClip, Timeline};
use crate::units::{clamp01, db_to_gain};

/// Stabilized ducking intervals for one BGM clip, from the timeline's
/// character track. Empty when the clip does not duck.
pub fn ducking_intervals(timeline: &Timeline, clip: &BgmClip) -> Vec<Interval> {
    let Some(ducking) = &clip.ducking else {
        return Vec::new();
    };
    if !ducking.enabled {
        return Vec::new();
    }
    let raw = timeline
        .character_track()
        .map(talking_intervals)
        .unwrap_or_default();
    stabilize_intervals(
        &raw,
        ducking.merge_gap_frames.unwrap_or(0),
        ducking.min_hold_frames.unwrap_or(0),
        timeline.meta.total_frames,
    )
}

/// Envelope gain for `local_frame` of `clip`: ladder selection, ramps, and
/// the clip-level fade and transition multipliers. Loop-segment crossfades
/// are composed separately via [`segment_gain_at`].
pub fn clip_gain_at(
    clip: &BgmClip,
    loudness_gain_db: Option<f64>,
    local_frame: u64,
    duck_intervals: &[Interval],
) -> f64 {
    let g = ladder_gain(clip, loudness_gain_db, local_frame, duck_intervals);
    let g = g
        * ramp_in(local_frame, clip.fade_in_frames)
        * ramp_out(local_frame, clip.duration, clip.fade_out_frames)
        * ramp_in(local_frame, clip.transition_in_frames.unwrap_or(0))
        * ramp_out(local_frame, clip.duration, clip.transition_out_frames.unwrap_or(0));
    g.clamp(0.0, max_gain(clip))
}

/// Crossfade multiplier of one loop segment at a clip-local frame.
pub fn segment_crossfade_mul(seg: &LoopSegment, local_frame: u64) -> f64 {
    if local_frame < seg.clip_offset {
        return 0.0;
    }
    let seg_local = local_frame - seg.clip_offset;
    if seg_local >= seg.duration {
        return 0.0;
    }
    ramp_in(seg_local, seg.fade_in_frames) * ramp_out(seg_local, seg.duration, seg.fade_out_frames)
}

/// Full per-frame gain of one loop segment: the clip envelope with the
/// segment's crossfade applied in addition, clamped to `[0, maxGain]`.
pub fn segment_gain_at(
    clip: &BgmClip,
    loudness_gain_db: Option<f64>,
    seg: &LoopSegment,
    local_frame: u64,
    duck_intervals: &[Interval],
) -> f64 {
    let g = clip_gain_at(clip, loudness_gain_db, local_frame, duck_intervals)
        * segment_crossfade_mul(seg, local_frame);
    g.clamp(0.0, max_gain(clip))
}

fn max_gain(clip: &BgmClip) -> f64 {
    db_to_gain(clip.max_gain_db.unwrap_or(DEFAULT_MAX_GAIN_DB))
}

fn base_gain(clip: &BgmClip, loudness_gain_db: Option<f64>) -> f64 {
    let base = if let Some(db) = clip.volume_db {
        db_to_gain(db)
    } else if let Some(v) = clip.volume {
        clamp01(v)
    } else {
        db_to_gain(DEFAULT_BASE_DB)
    };
    match loudness_gain_db {
        Some(db) => base * db_to_gain(db),
        None => base,
    }
}

fn talk_gain(clip: &BgmClip, base: f64) -> f64 {
    let Some(ducking) = &clip.ducking else {
        return base;
    };
    if !ducking.enabled {
        return base;
    }
    if let Some(delta) = ducking.duck_delta_db {
        base * db_to_gain(delta.clamp(-60.0, 0.0))
    } else if let Some(db) = ducking.duck_volume_db {
        db_to_gain(db)
    } else if let Some(v) = ducking.duck_volume {
        base * clamp01(v)
    } else {
        base * db_to_gain(DEFAULT_DUCK_DELTA_DB)
    }
}

fn ladder_gain(
    clip: &BgmClip,
    loudness_gain_db: Option<f64>,
    local_frame: u64,
    intervals: &[Interval],
) -> f64 {
    let base = base_gain(clip, loudness_gain_db);
    let idle = base * db_to_gain(clip.idle_boost_db.unwrap_or(DEFAULT_IDLE_BOOST_DB));
    let talk = talk_gain(clip, base);

    let global = clip.start + local_frame;
    if intervals.iter().any(|iv| iv.contains(global)) {
        return talk;
    }

    let (attack, release) = clip
        .ducking
        .as_ref()
        .map(|d| (d.attack_frames.max(1), d.release_frames.max(1)))
        .unwrap_or((1, 1));

    let next_start = intervals
        .iter()
        .filter(|iv| iv.start > global)
        .map(|iv| iv.start - global)
        .min();
    let prev_end = intervals
        .iter()
        .filter(|iv| iv.end <= global)
        .map(|iv| global - iv.end)
        .min();

    if let Some(d) = next_start
        && d <= attack
    {
        // Approaching an interval: ramp idle -> talk.
        return idle - (idle - talk) * (1.0 - d as f64 / attack as f64);
    }
    if let Some(d) = prev_end
        && d < release
    {
        // Just left an interval: ramp talk -> idle.
        return talk + (idle - talk) * (d as f64 / release as f64);
    }
    idle
}

fn ramp_in(pos: u64, window: u64) -> f64 {
    if window == 0 || pos >= window {
        return 1.0;
    }
    clamp01(pos as f64 / window as f64)
}

fn ramp_out(pos: u64, duration: u64, window: u64) -> f64 {
    if window == 0 {
        return 1.0;
    }
    let remaining = duration.saturating_sub(pos);
    clamp01(remaining as f64 / window as f64)
}
