use std::collections::BTreeMap;

use crate::error::{ScriptlineError, ScriptlineResult};

pub const TIMELINE_VERSION: &str = "0.1";

/// Frame-precise edit plan produced by the compiler.
///
/// Created once per compile, immutable after return, and independently
/// validatable via [`Timeline::validate`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub version: String,
    pub meta: TimelineMeta,
    pub assets: TimelineAssets,
    pub tracks: Vec<Track>,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMeta {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub total_frames: u64,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineAssets {
    #[serde(default)]
    pub audio: BTreeMap<String, AudioAssetDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm: Option<BTreeMap<String, BgmAssetDef>>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAssetDef {
    pub src: String,
    pub duration_frames: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgmAssetDef {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loudness_gain_db: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Track {
    Audio { clips: Vec<AudioClip> },
    Subtitle { clips: Vec<SubtitleClip> },
    Character { clips: Vec<CharacterClip> },
    Bgm { clips: Vec<BgmClip> },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    pub asset_id: String,
    pub start: u64,
    pub duration: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleClip {
    pub start: u64,
    pub duration: u64,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterClip {
    pub start: u64,
    pub duration: u64,
    pub character_id: String,
    pub state: CharacterState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterState {
    pub is_talking: bool,
}

/// One background-music clip. All time fields are frame-valued.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgmClip {
    pub asset_id: String,
    pub start: u64,
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_offset_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gain_db: Option<f64>,
    pub fade_in_frames: u64,
    pub fade_out_frames: u64,
    #[serde(rename = "loop")]
    pub loop_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_start_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_end_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_crossfade_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_boost_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ducking: Option<BgmDucking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_in_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_out_frames: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgmDucking {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duck_delta_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duck_volume_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duck_volume: Option<f64>,
    pub attack_frames: u64,
    pub release_frames: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_gap_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_hold_frames: Option<u64>,
}

impl Timeline {
    pub fn from_json_str(json: &str) -> ScriptlineResult<Self> {
        let timeline: Timeline = serde_json::from_str(json)
            .map_err(|e| ScriptlineError::validation(format!("timeline decode failed: {e}")))?;
        timeline.validate()?;
        Ok(timeline)
    }

    pub fn to_json_string(&self) -> ScriptlineResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ScriptlineError::validation(format!("timeline encode failed: {e}")))
    }

    pub fn audio_track(&self) -> Option<&[AudioClip]> {
        self.tracks.iter().find_map(|t| match t {
            Track::Audio { clips } => Some(clips.as_slice()),
            _ => None,
        })
    }

    pub fn subtitle_track(&self) -> Option<&[SubtitleClip]> {
        self.tracks.iter().find_map(|t| match t {
            Track::Subtitle { clips } => Some(clips.as_slice()),
            _ => None,
        })
    }

    pub fn character_track(&self) -> Option<&[CharacterClip]> {
        self.tracks.iter().find_map(|t| match t {
            Track::Character { clips } => Some(clips.as_slice()),
            _ => None,
        })
    }

    pub fn bgm_track(&self) -> Option<&[BgmClip]> {
        self.tracks.iter().find_map(|t| match t {
            Track::Bgm { clips } => Some(clips.as_slice()),
            _ => None,
        })
    }

    pub fn bgm_asset(&self, asset_id: &str) -> Option<&BgmAssetDef> {
        self.assets.bgm.as_ref().and_then(|m| m.get(asset_id))
    }

    pub fn validate(&self) -> ScriptlineResult<()> {
        if self.version != TIMELINE_VERSION {
            return Err(ScriptlineError::validation(format!(
                "timeline version must be \"{TIMELINE_VERSION}\""
            )));
        }
        if !self.meta.fps.is_finite() || self.meta.fps <= 0.0 {
            return Err(ScriptlineError::validation("meta.fps must be > 0"));
        }
        if self.meta.width == 0 || self.meta.height == 0 {
            return Err(ScriptlineError::validation("meta width/height must be > 0"));
        }

        for (id, asset) in &self.assets.audio {
            if id.trim().is_empty() || asset.src.trim().is_empty() {
                return Err(ScriptlineError::validation(
                    "audio asset id/src must be non-empty",
                ));
            }
        }
        if let Some(bgm_assets) = &self.assets.bgm {
            for (id, asset) in bgm_assets {
                if id.trim().is_empty() || asset.src.trim().is_empty() {
                    return Err(ScriptlineError::validation(
                        "bgm asset id/src must be non-empty",
                    ));
                }
                if asset.duration_frames == Some(0) {
                    return Err(ScriptlineError::validation(format!(
                        "bgm asset '{id}' durationFrames must be > 0 when set"
                    )));
                }
                if let Some(db) = asset.loudness_gain_db
                    && !(-12.0..=12.0).contains(&db)
                {
                    return Err(ScriptlineError::validation(format!(
                        "bgm asset '{id}' loudnessGainDb must be within [-12, 12]"
                    )));
                }
            }
        }

        let total = self.meta.total_frames;
        for track in &self.tracks {
            match track {
                Track::Audio { clips } => {
                    self.check_spans("audio", clips.iter().map(|c| (c.start, c.duration)), total)?;
                    for clip in clips {
                        if !self.assets.audio.contains_key(&clip.asset_id) {
                            return Err(ScriptlineError::validation(format!(
                                "audio clip references missing asset '{}'",
                                clip.asset_id
                            )));
                        }
                    }
                }
                Track::Subtitle { clips } => {
                    self.check_spans(
                        "subtitle",
                        clips.iter().map(|c| (c.start, c.duration)),
                        total,
                    )?;
                }
                Track::Character { clips } => {
                    self.check_spans(
                        "character",
                        clips.iter().map(|c| (c.start, c.duration)),
                        total,
                    )?;
                    for clip in clips {
                        if clip.character_id.trim().is_empty() {
                            return Err(ScriptlineError::validation(
                                "character clip characterId must be non-empty",
                            ));
                        }
                    }
                }
                Track::Bgm { clips } => self.check_bgm_clips(clips, total)?,
            }
        }

        Ok(())
    }

    // Audio/subtitle/character tracks: clips strictly positive, in start
    // order, non-overlapping, within [0, totalFrames].
    fn check_spans(
        &self,
        track: &str,
        spans: impl Iterator<Item = (u64, u64)>,
        total: u64,
    ) -> ScriptlineResult<()> {
        let mut cursor = 0u64;
        for (start, duration) in spans {
            if duration == 0 {
                return Err(ScriptlineError::validation(format!(
                    "{track} clip duration must be > 0"
                )));
            }
            if start < cursor {
                return Err(ScriptlineError::validation(format!(
                    "{track} clips must be ordered and non-overlapping"
                )));
            }
            let end = start.saturating_add(duration);
            if end > total {
                return Err(ScriptlineError::validation(format!(
                    "{track} clip exceeds meta.totalFrames"
                )));
            }
            cursor = end;
        }
        Ok(())
    }

    // BGM clips may overlap by their transition window, so only start order
    // and the totalFrames bound are enforced here.
    fn check_bgm_clips(&self, clips: &[BgmClip], total: u64) -> ScriptlineResult<()> {
        let mut last_start = 0u64;
        for clip in clips {
            if clip.duration == 0 {
                return Err(ScriptlineError::validation("bgm clip duration must be > 0"));
            }
            if clip.start < last_start {
                return Err(ScriptlineError::validation(
                    "bgm clips must be in start order",
                ));
            }
            if clip.start.saturating_add(clip.duration) > total {
                return Err(ScriptlineError::validation(
                    "bgm clip exceeds meta.totalFrames",
                ));
            }
            let known = self
                .assets
                .bgm
                .as_ref()
                .is_some_and(|m| m.contains_key(&clip.asset_id));
            if !known {
                return Err(ScriptlineError::validation(format!(
                    "bgm clip references missing asset '{}'",
                    clip.asset_id
                )));
            }
            last_start = clip.start;
        }
        Ok(())
    }
}
