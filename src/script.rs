use std::collections::BTreeMap;

use crate::error::{ScriptlineError, ScriptlineResult};

pub const SCRIPT_VERSION: &str = "0.1";

/// Authored, declarative description of a narrated video.
///
/// Immutable during compile; the compiler never mutates its input.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub version: String,
    pub video: VideoConfig,
    #[serde(default)]
    pub cast: BTreeMap<String, CastMember>,
    pub scenes: Vec<Scene>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub default_pause_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm: Option<BgmConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_profile: Option<AudioProfile>,
}

/// Loudness targets handed to the media-probe collaborator.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProfile {
    pub bgm_target_lufs: f64,
    pub bgm_target_lra: f64,
    pub true_peak_db: f64,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastMember {
    pub voice: VoiceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<CastAssets>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    #[serde(default = "default_voice_engine")]
    pub engine: String,
    pub speaker_id: u32,
}

fn default_voice_engine() -> String {
    "voicevox".to_string()
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastAssets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<SceneStyle>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Scene {
    pub fn bgm_override(&self) -> Option<&SceneBgmOverride> {
        self.style.as_ref().and_then(|s| s.bgm.as_ref())
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_style: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm: Option<SceneBgmOverride>,
}

/// Smallest addressable unit of a Script.
///
/// Dispatch is an exhaustive `match`; a new variant without a compiler
/// handler fails the build instead of silently dropping frames. An unknown
/// `type` tag in JSON fails deserialization of the whole Script.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    Dialogue(DialogueBlock),
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueBlock {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BgmPreset {
    Talk,
    Calm,
    Hype,
    None,
}

/// Video-level BGM settings. Unset fields fall through to the preset and
/// the global defaults during resolution.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgmConfig {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<BgmPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gain_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out_sec: Option<f64>,
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_start_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_end_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_crossfade_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_boost_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ducking: Option<DuckingConfig>,
}

/// Scene-level BGM override: the same shape as [`BgmConfig`] with every
/// field optional, plus the crossfade length used when `src` changes.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneBgmOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<BgmPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gain_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out_sec: Option<f64>,
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_start_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_end_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_crossfade_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_boost_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ducking: Option<DuckingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_sec: Option<f64>,
}

/// Ducking settings. `duck_delta_db`, `duck_volume_db` and `duck_volume`
/// are alternative spellings for one level; precedence is resolved in
/// `bgm_config`, in that order.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuckingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duck_delta_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duck_volume_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duck_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_gap_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_hold_sec: Option<f64>,
}

impl Script {
    pub fn from_json_str(json: &str) -> ScriptlineResult<Self> {
        let script: Script = serde_json::from_str(json)
            .map_err(|e| ScriptlineError::validation(format!("script decode failed: {e}")))?;
        script.validate()?;
        Ok(script)
    }

    pub fn to_json_string(&self) -> ScriptlineResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ScriptlineError::validation(format!("script encode failed: {e}")))
    }

    pub fn validate(&self) -> ScriptlineResult<()> {
        if self.version != SCRIPT_VERSION {
            return Err(ScriptlineError::validation(format!(
                "script version must be \"{SCRIPT_VERSION}\""
            )));
        }
        if !self.video.fps.is_finite() || self.video.fps <= 0.0 {
            return Err(ScriptlineError::validation("video.fps must be > 0"));
        }
        if self.video.width == 0 || self.video.height == 0 {
            return Err(ScriptlineError::validation(
                "video width/height must be > 0",
            ));
        }
        if !self.video.default_pause_sec.is_finite() || self.video.default_pause_sec < 0.0 {
            return Err(ScriptlineError::validation(
                "video.defaultPauseSec must be >= 0",
            ));
        }
        if let Some(bgm) = &self.video.bgm {
            validate_bgm_config(bgm)?;
        }

        for (speaker, member) in &self.cast {
            if speaker.trim().is_empty() {
                return Err(ScriptlineError::validation("cast key must be non-empty"));
            }
            if member.voice.engine != "voicevox" {
                return Err(ScriptlineError::validation(format!(
                    "cast '{speaker}' voice engine must be \"voicevox\""
                )));
            }
        }

        if self.scenes.is_empty() {
            return Err(ScriptlineError::validation(
                "script must have at least one scene",
            ));
        }
        for scene in &self.scenes {
            if scene.id.trim().is_empty() {
                return Err(ScriptlineError::validation("scene id must be non-empty"));
            }
            if let Some(over) = scene.bgm_override() {
                validate_scene_bgm_override(&scene.id, over)?;
            }
            for (i, block) in scene.blocks.iter().enumerate() {
                match block {
                    Block::Dialogue(d) => {
                        if d.text.trim().is_empty() {
                            return Err(ScriptlineError::validation(format!(
                                "scene '{}' block {i}: dialogue text must be non-empty",
                                scene.id
                            )));
                        }
                        if d.speaker.trim().is_empty() {
                            return Err(ScriptlineError::validation(format!(
                                "scene '{}' block {i}: dialogue speaker must be non-empty",
                                scene.id
                            )));
                        }
                        if let Some(p) = d.pause_sec
                            && (!p.is_finite() || p < 0.0)
                        {
                            return Err(ScriptlineError::validation(format!(
                                "scene '{}' block {i}: pauseSec must be >= 0",
                                scene.id
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn validate_bgm_config(bgm: &BgmConfig) -> ScriptlineResult<()> {
    if bgm.src.trim().is_empty() {
        return Err(ScriptlineError::validation("bgm src must be non-empty"));
    }
    validate_bgm_fields(
        "video.bgm",
        bgm.volume,
        &[bgm.fade_in_sec, bgm.fade_out_sec, bgm.loop_crossfade_sec],
        bgm.ducking.as_ref(),
    )
}

fn validate_scene_bgm_override(scene_id: &str, over: &SceneBgmOverride) -> ScriptlineResult<()> {
    if let Some(src) = &over.src
        && src.trim().is_empty()
    {
        return Err(ScriptlineError::validation(format!(
            "scene '{scene_id}' bgm src must be non-empty when set"
        )));
    }
    if let Some(t) = over.transition_sec
        && (!t.is_finite() || t < 0.0)
    {
        return Err(ScriptlineError::validation(format!(
            "scene '{scene_id}' bgm transitionSec must be >= 0"
        )));
    }
    validate_bgm_fields(
        &format!("scene '{scene_id}' bgm"),
        over.volume,
        &[over.fade_in_sec, over.fade_out_sec, over.loop_crossfade_sec],
        over.ducking.as_ref(),
    )
}

fn validate_bgm_fields(
    at: &str,
    volume: Option<f64>,
    secs: &[Option<f64>],
    ducking: Option<&DuckingConfig>,
) -> ScriptlineResult<()> {
    if let Some(v) = volume
        && (!v.is_finite() || !(0.0..=1.0).contains(&v))
    {
        return Err(ScriptlineError::validation(format!(
            "{at}: volume must be within [0, 1]"
        )));
    }
    for s in secs.iter().flatten() {
        if !s.is_finite() || *s < 0.0 {
            return Err(ScriptlineError::validation(format!(
                "{at}: second-valued fields must be >= 0"
            )));
        }
    }
    if let Some(d) = ducking {
        for s in [d.attack_sec, d.release_sec, d.merge_gap_sec, d.min_hold_sec]
            .iter()
            .flatten()
        {
            if !s.is_finite() || *s < 0.0 {
                return Err(ScriptlineError::validation(format!(
                    "{at}: ducking second-valued fields must be >= 0"
                )));
            }
        }
        if let Some(v) = d.duck_volume
            && (!v.is_finite() || !(0.0..=1.0).contains(&v))
        {
            return Err(ScriptlineError::validation(format!(
                "{at}: duckVolume must be within [0, 1]"
            )));
        }
    }
    Ok(())
}
