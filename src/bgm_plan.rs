//! BGM track planning.
//!
//! Walks the compiled scene spans and emits one clip per run of identical
//! resolved configuration. A settings change over the same source file
//! splits the clip and carries the playback position forward through
//! `audioOffsetFrames`; a source change crossfades via the transition
//! window. Clip boundaries inside a sustained sound get one-frame fades so
//! the bed is never audibly re-faded.

use std::collections::{BTreeMap, BTreeSet};

use crate::bgm_config::{
    BaseVolume, DuckLevel, ResolvedBgmConfig, config_key, resolve_bgm_config,
};
use crate::compile::CompileWarning;
use crate::script::{BgmConfig, Scene};
use crate::timeline::{BgmAssetDef, BgmClip, BgmDucking};
use crate::units::{sec_to_frames, sec_to_frames_at_least_one};

// 32-bit DJB2 fold; asset ids must be stable across compiles.
struct Djb2(u32);

impl Djb2 {
    const SEED: u32 = 5381;

    fn new() -> Self {
        Self(Self::SEED)
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h = h.wrapping_mul(33) ^ u32::from(b);
        }
        self.0 = h;
    }

    fn finish(self) -> u32 {
        self.0
    }
}

/// Deterministic BGM asset id for a source path.
pub fn bgm_asset_id(src: &str) -> String {
    let mut h = Djb2::new();
    h.write_bytes(src.as_bytes());
    format!("bgm_{:08x}", h.finish())
}

/// Wrapped playback position of an asset after `pos` accumulated frames.
///
/// With an unknown audio duration the position passes through untouched;
/// the renderer owns the consequence. An invalid loop window degrades to a
/// plain modulo over the full file.
pub fn wrap_playback_position(
    pos: u64,
    audio_duration_frames: Option<u64>,
    loop_enabled: bool,
    loop_start_frames: Option<u64>,
    loop_end_frames: Option<u64>,
) -> u64 {
    let Some(duration) = audio_duration_frames else {
        return pos;
    };
    if !loop_enabled {
        return pos.min(duration);
    }
    let ls = loop_start_frames.unwrap_or(0);
    let le = loop_end_frames.unwrap_or(duration);
    if le <= ls || le > duration {
        if duration == 0 {
            return 0;
        }
        return pos % duration;
    }
    if pos < ls {
        return pos;
    }
    ls + (pos - ls) % (le - ls)
}

/// Frame span one scene occupies on the timeline.
pub(crate) struct SceneSpan<'a> {
    pub scene: &'a Scene,
    pub start_frame: u64,
    pub end_frame: u64,
}

pub(crate) struct BgmPlan {
    pub clips: Vec<BgmClip>,
    pub assets: BTreeMap<String, BgmAssetDef>,
    pub warnings: Vec<CompileWarning>,
}

struct OpenClip {
    clip: BgmClip,
    key: String,
    cfg: ResolvedBgmConfig,
}

pub(crate) fn plan_bgm_track(
    video_bgm: &BgmConfig,
    spans: &[SceneSpan<'_>],
    total_frames: u64,
    fps: f64,
    duration_frames_by_asset: &BTreeMap<String, u64>,
    loudness_gain_db_by_asset: &BTreeMap<String, f64>,
) -> BgmPlan {
    let mut plan = BgmPlan {
        clips: Vec::new(),
        assets: BTreeMap::new(),
        warnings: Vec::new(),
    };
    let mut playback_pos = BTreeMap::<String, u64>::new();
    let mut warned_missing = BTreeSet::<String>::new();
    let mut open: Option<OpenClip> = None;

    for span in spans.iter().filter(|s| s.end_frame > s.start_frame) {
        let cfg = resolve_bgm_config(video_bgm, span.scene.bgm_override());
        let key = config_key(&cfg);
        let asset_id = bgm_asset_id(&cfg.src);
        register_asset(
            &mut plan.assets,
            &asset_id,
            &cfg,
            duration_frames_by_asset,
            loudness_gain_db_by_asset,
        );
        let asset_duration = plan.assets[&asset_id].duration_frames;
        if cfg.loop_enabled && asset_duration.is_none() && warned_missing.insert(asset_id.clone()) {
            plan.warnings.push(CompileWarning::MissingBgmDuration {
                asset_id: asset_id.clone(),
                src: cfg.src.clone(),
            });
        }

        open = Some(match open.take() {
            None => OpenClip {
                clip: base_clip(
                    &cfg,
                    &asset_id,
                    span.start_frame,
                    span.end_frame - span.start_frame,
                    fps,
                    asset_duration.is_some(),
                    true,
                ),
                key,
                cfg,
            },
            Some(mut cur) if cur.key == key => {
                cur.clip.duration = span.end_frame - cur.clip.start;
                cur
            }
            Some(mut cur) if cur.clip.asset_id == asset_id => {
                // Same file, different settings: split without a fade and
                // keep playback continuous through the wrapped offset.
                cur.clip.duration = span.start_frame - cur.clip.start;
                let pos = playback_pos.entry(asset_id.clone()).or_insert(0);
                *pos += cur.clip.duration;
                let offset = wrap_playback_position(
                    *pos,
                    asset_duration,
                    cfg.loop_enabled,
                    cfg.loop_start_sec.map(|s| sec_to_frames(s, fps)),
                    cfg.loop_end_sec.map(|s| sec_to_frames(s, fps)),
                );
                plan.clips.push(cur.clip);
                let mut clip = base_clip(
                    &cfg,
                    &asset_id,
                    span.start_frame,
                    span.end_frame - span.start_frame,
                    fps,
                    asset_duration.is_some(),
                    false,
                );
                clip.audio_offset_frames = Some(offset);
                OpenClip { clip, key, cfg }
            }
            Some(mut cur) => {
                // Source change: the outgoing clip plays into the incoming
                // scene by the transition window, both sides crossfade.
                let span_len = span.end_frame - span.start_frame;
                let transition =
                    sec_to_frames_at_least_one(cfg.transition_sec, fps).min(span_len);
                cur.clip.duration = span.start_frame + transition - cur.clip.start;
                cur.clip.transition_out_frames = Some(transition);
                *playback_pos.entry(cur.clip.asset_id.clone()).or_insert(0) +=
                    cur.clip.duration;
                plan.clips.push(cur.clip);

                playback_pos.insert(asset_id.clone(), 0);
                let mut clip = base_clip(
                    &cfg,
                    &asset_id,
                    span.start_frame,
                    span_len,
                    fps,
                    asset_duration.is_some(),
                    false,
                );
                clip.transition_in_frames = Some(transition);
                clip.audio_offset_frames = Some(0);
                OpenClip { clip, key, cfg }
            }
        });
    }

    if let Some(mut cur) = open {
        cur.clip.fade_out_frames = sec_to_frames_at_least_one(cur.cfg.fade_out_sec, fps);
        *playback_pos.entry(cur.clip.asset_id.clone()).or_insert(0) += cur.clip.duration;
        plan.clips.push(cur.clip);
    } else if total_frames > 0 {
        // No playable scene spans: one clip covers the whole timeline with
        // first-and-last semantics.
        let cfg = resolve_bgm_config(video_bgm, None);
        let asset_id = bgm_asset_id(&cfg.src);
        register_asset(
            &mut plan.assets,
            &asset_id,
            &cfg,
            duration_frames_by_asset,
            loudness_gain_db_by_asset,
        );
        let asset_duration = plan.assets[&asset_id].duration_frames;
        if cfg.loop_enabled && asset_duration.is_none() {
            plan.warnings.push(CompileWarning::MissingBgmDuration {
                asset_id: asset_id.clone(),
                src: cfg.src.clone(),
            });
        }
        let mut clip = base_clip(
            &cfg,
            &asset_id,
            0,
            total_frames,
            fps,
            asset_duration.is_some(),
            true,
        );
        clip.fade_out_frames = sec_to_frames_at_least_one(cfg.fade_out_sec, fps);
        plan.clips.push(clip);
    }

    plan
}

fn register_asset(
    assets: &mut BTreeMap<String, BgmAssetDef>,
    asset_id: &str,
    cfg: &ResolvedBgmConfig,
    duration_frames_by_asset: &BTreeMap<String, u64>,
    loudness_gain_db_by_asset: &BTreeMap<String, f64>,
) {
    if assets.contains_key(asset_id) {
        return;
    }
    assets.insert(
        asset_id.to_string(),
        BgmAssetDef {
            src: cfg.src.clone(),
            duration_frames: duration_frames_by_asset.get(asset_id).copied(),
            loudness_gain_db: loudness_gain_db_by_asset
                .get(asset_id)
                .map(|db| db.clamp(-12.0, 12.0)),
        },
    );
}

fn base_clip(
    cfg: &ResolvedBgmConfig,
    asset_id: &str,
    start: u64,
    duration: u64,
    fps: f64,
    asset_duration_known: bool,
    first: bool,
) -> BgmClip {
    let (volume_db, volume) = match cfg.base_volume {
        BaseVolume::Db(v) => (Some(v), None),
        BaseVolume::Linear(v) => (None, Some(v)),
    };
    let (duck_delta_db, duck_volume_db, duck_volume) = match cfg.ducking.level {
        DuckLevel::DeltaDb(v) => (Some(v), None, None),
        DuckLevel::VolumeDb(v) => (None, Some(v), None),
        DuckLevel::Volume(v) => (None, None, Some(v)),
    };
    BgmClip {
        asset_id: asset_id.to_string(),
        start,
        duration,
        audio_offset_frames: None,
        volume_db,
        volume,
        max_gain_db: Some(cfg.max_gain_db),
        fade_in_frames: if first {
            sec_to_frames_at_least_one(cfg.fade_in_sec, fps)
        } else {
            1
        },
        fade_out_frames: 1,
        loop_enabled: cfg.loop_enabled && asset_duration_known,
        loop_start_frames: cfg.loop_start_sec.map(|s| sec_to_frames(s, fps)),
        loop_end_frames: cfg.loop_end_sec.map(|s| sec_to_frames(s, fps)),
        loop_crossfade_frames: Some(sec_to_frames(cfg.loop_crossfade_sec, fps)),
        idle_boost_db: Some(cfg.idle_boost_db),
        ducking: Some(BgmDucking {
            enabled: cfg.ducking.enabled,
            duck_delta_db,
            duck_volume_db,
            duck_volume,
            attack_frames: sec_to_frames(cfg.ducking.attack_sec, fps),
            release_frames: sec_to_frames(cfg.ducking.release_sec, fps),
            merge_gap_frames: Some(sec_to_frames(cfg.ducking.merge_gap_sec, fps)),
            min_hold_frames: Some(sec_to_frames(cfg.ducking.min_hold_sec, fps)),
        }),
        transition_in_frames: None,
        transition_out_frames: None,
    }
}
