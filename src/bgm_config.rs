//! BGM configuration resolution.
//!
//! A scene's effective config is built by layering, in ascending
//! precedence: global defaults, the named preset, the video-level explicit
//! fields, and the scene override's explicit fields. Only the nested
//! ducking object is deep-merged; everything else replaces field-wise.

use crate::script::{BgmConfig, BgmPreset, DuckingConfig, SceneBgmOverride};

pub const DEFAULT_BASE_DB: f64 = -12.0;
pub const DEFAULT_MAX_GAIN_DB: f64 = -3.0;
pub const DEFAULT_IDLE_BOOST_DB: f64 = 3.0;
pub const DEFAULT_DUCK_DELTA_DB: f64 = -8.0;
pub const DEFAULT_ATTACK_SEC: f64 = 0.10;
pub const DEFAULT_RELEASE_SEC: f64 = 0.25;
pub const DEFAULT_MERGE_GAP_SEC: f64 = 0.35;
pub const DEFAULT_MIN_HOLD_SEC: f64 = 0.60;
pub const DEFAULT_LOOP_CROSSFADE_SEC: f64 = 0.25;
pub const DEFAULT_FADE_IN_SEC: f64 = 1.0;
pub const DEFAULT_FADE_OUT_SEC: f64 = 1.0;
pub const DEFAULT_TRANSITION_SEC: f64 = 1.0;

/// Base volume: one logical value with two spellings. A layer that sets
/// either spelling replaces the slot wholesale, so a default dB value can
/// never shadow a user-set linear value.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub enum BaseVolume {
    Db(f64),
    Linear(f64),
}

/// Ducked level: one logical value with three spellings, resolved with
/// `duckDeltaDb` > `duckVolumeDb` > `duckVolume` precedence inside a layer.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub enum DuckLevel {
    DeltaDb(f64),
    VolumeDb(f64),
    Volume(f64),
}

/// Fully resolved per-scene BGM configuration. Serializable so its
/// canonical JSON form can serve as the planner's change-detection key.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedBgmConfig {
    pub src: String,
    pub base_volume: BaseVolume,
    pub max_gain_db: f64,
    pub fade_in_sec: f64,
    pub fade_out_sec: f64,
    pub loop_enabled: bool,
    pub loop_start_sec: Option<f64>,
    pub loop_end_sec: Option<f64>,
    pub loop_crossfade_sec: f64,
    pub idle_boost_db: f64,
    pub ducking: ResolvedDucking,
    pub transition_sec: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedDucking {
    pub enabled: bool,
    pub level: DuckLevel,
    pub attack_sec: f64,
    pub release_sec: f64,
    pub merge_gap_sec: f64,
    pub min_hold_sec: f64,
}

impl ResolvedBgmConfig {
    fn defaults(src: String) -> Self {
        Self {
            src,
            base_volume: BaseVolume::Db(DEFAULT_BASE_DB),
            max_gain_db: DEFAULT_MAX_GAIN_DB,
            fade_in_sec: DEFAULT_FADE_IN_SEC,
            fade_out_sec: DEFAULT_FADE_OUT_SEC,
            loop_enabled: true,
            loop_start_sec: None,
            loop_end_sec: None,
            loop_crossfade_sec: DEFAULT_LOOP_CROSSFADE_SEC,
            idle_boost_db: DEFAULT_IDLE_BOOST_DB,
            ducking: ResolvedDucking {
                enabled: false,
                level: DuckLevel::DeltaDb(DEFAULT_DUCK_DELTA_DB),
                attack_sec: DEFAULT_ATTACK_SEC,
                release_sec: DEFAULT_RELEASE_SEC,
                merge_gap_sec: DEFAULT_MERGE_GAP_SEC,
                min_hold_sec: DEFAULT_MIN_HOLD_SEC,
            },
            transition_sec: DEFAULT_TRANSITION_SEC,
        }
    }

    fn apply_preset(&mut self, preset: BgmPreset) {
        match preset {
            BgmPreset::Talk => {
                self.ducking.enabled = true;
            }
            BgmPreset::Calm => {
                self.base_volume = BaseVolume::Db(-16.0);
                self.idle_boost_db = 2.0;
                self.ducking.enabled = true;
                self.ducking.level = DuckLevel::DeltaDb(-6.0);
                self.ducking.attack_sec = 0.15;
                self.ducking.release_sec = 0.40;
            }
            BgmPreset::Hype => {
                self.base_volume = BaseVolume::Db(-8.0);
                self.max_gain_db = -2.0;
                self.idle_boost_db = 4.0;
                self.ducking.enabled = true;
                self.ducking.level = DuckLevel::DeltaDb(-10.0);
                self.ducking.attack_sec = 0.05;
                self.ducking.release_sec = 0.20;
            }
            BgmPreset::None => {
                self.idle_boost_db = 0.0;
                self.ducking.enabled = false;
            }
        }
    }

    fn apply_layer(&mut self, layer: &BgmLayer<'_>) {
        match (layer.volume_db, layer.volume) {
            (Some(db), _) => self.base_volume = BaseVolume::Db(db),
            (None, Some(v)) => self.base_volume = BaseVolume::Linear(v),
            (None, None) => {}
        }
        if let Some(v) = layer.max_gain_db {
            self.max_gain_db = v;
        }
        if let Some(v) = layer.fade_in_sec {
            self.fade_in_sec = v;
        }
        if let Some(v) = layer.fade_out_sec {
            self.fade_out_sec = v;
        }
        if let Some(v) = layer.loop_enabled {
            self.loop_enabled = v;
        }
        if let Some(v) = layer.loop_start_sec {
            self.loop_start_sec = Some(v);
        }
        if let Some(v) = layer.loop_end_sec {
            self.loop_end_sec = Some(v);
        }
        if let Some(v) = layer.loop_crossfade_sec {
            self.loop_crossfade_sec = v;
        }
        if let Some(v) = layer.idle_boost_db {
            self.idle_boost_db = v;
        }
        if let Some(d) = layer.ducking {
            // Deep merge: a ducking object replaces only the fields it sets.
            if let Some(v) = d.enabled {
                self.ducking.enabled = v;
            }
            match (d.duck_delta_db, d.duck_volume_db, d.duck_volume) {
                (Some(v), _, _) => self.ducking.level = DuckLevel::DeltaDb(v),
                (None, Some(v), _) => self.ducking.level = DuckLevel::VolumeDb(v),
                (None, None, Some(v)) => self.ducking.level = DuckLevel::Volume(v),
                (None, None, None) => {}
            }
            if let Some(v) = d.attack_sec {
                self.ducking.attack_sec = v;
            }
            if let Some(v) = d.release_sec {
                self.ducking.release_sec = v;
            }
            if let Some(v) = d.merge_gap_sec {
                self.ducking.merge_gap_sec = v;
            }
            if let Some(v) = d.min_hold_sec {
                self.ducking.min_hold_sec = v;
            }
        }
        if let Some(v) = layer.transition_sec {
            self.transition_sec = v;
        }
    }
}

// Borrowed view over the explicit fields of one layer, so video configs and
// scene overrides share a single merge path.
struct BgmLayer<'a> {
    volume_db: Option<f64>,
    volume: Option<f64>,
    max_gain_db: Option<f64>,
    fade_in_sec: Option<f64>,
    fade_out_sec: Option<f64>,
    loop_enabled: Option<bool>,
    loop_start_sec: Option<f64>,
    loop_end_sec: Option<f64>,
    loop_crossfade_sec: Option<f64>,
    idle_boost_db: Option<f64>,
    ducking: Option<&'a DuckingConfig>,
    transition_sec: Option<f64>,
}

impl<'a> BgmLayer<'a> {
    fn from_video(bgm: &'a BgmConfig) -> Self {
        Self {
            volume_db: bgm.volume_db,
            volume: bgm.volume,
            max_gain_db: bgm.max_gain_db,
            fade_in_sec: bgm.fade_in_sec,
            fade_out_sec: bgm.fade_out_sec,
            loop_enabled: bgm.loop_enabled,
            loop_start_sec: bgm.loop_start_sec,
            loop_end_sec: bgm.loop_end_sec,
            loop_crossfade_sec: bgm.loop_crossfade_sec,
            idle_boost_db: bgm.idle_boost_db,
            ducking: bgm.ducking.as_ref(),
            transition_sec: None,
        }
    }

    fn from_scene(over: &'a SceneBgmOverride) -> Self {
        Self {
            volume_db: over.volume_db,
            volume: over.volume,
            max_gain_db: over.max_gain_db,
            fade_in_sec: over.fade_in_sec,
            fade_out_sec: over.fade_out_sec,
            loop_enabled: over.loop_enabled,
            loop_start_sec: over.loop_start_sec,
            loop_end_sec: over.loop_end_sec,
            loop_crossfade_sec: over.loop_crossfade_sec,
            idle_boost_db: over.idle_boost_db,
            ducking: over.ducking.as_ref(),
            transition_sec: over.transition_sec,
        }
    }
}

/// Resolve the effective BGM config for one scene.
pub fn resolve_bgm_config(
    video: &BgmConfig,
    scene: Option<&SceneBgmOverride>,
) -> ResolvedBgmConfig {
    let src = scene
        .and_then(|s| s.src.clone())
        .unwrap_or_else(|| video.src.clone());
    let mut resolved = ResolvedBgmConfig::defaults(src);

    let preset = scene.and_then(|s| s.preset).or(video.preset);
    if let Some(preset) = preset {
        resolved.apply_preset(preset);
    }
    resolved.apply_layer(&BgmLayer::from_video(video));
    if let Some(over) = scene {
        resolved.apply_layer(&BgmLayer::from_scene(over));
    }
    resolved
}

/// Canonical serialization used for change detection across scenes.
/// Struct field order is fixed, so the JSON form is canonical.
pub fn config_key(cfg: &ResolvedBgmConfig) -> String {
    serde_json::to_string(cfg).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_bgm() -> BgmConfig {
        BgmConfig {
            src: "bgm/main.mp3".to_string(),
            preset: Some(BgmPreset::Talk),
            volume_db: None,
            volume: None,
            max_gain_db: None,
            fade_in_sec: None,
            fade_out_sec: None,
            loop_enabled: None,
            loop_start_sec: None,
            loop_end_sec: None,
            loop_crossfade_sec: None,
            idle_boost_db: None,
            ducking: None,
        }
    }

    #[test]
    fn talk_preset_equals_global_defaults_with_ducking() {
        let cfg = resolve_bgm_config(&video_bgm(), None);
        assert_eq!(cfg.base_volume, BaseVolume::Db(DEFAULT_BASE_DB));
        assert_eq!(cfg.max_gain_db, DEFAULT_MAX_GAIN_DB);
        assert_eq!(cfg.idle_boost_db, DEFAULT_IDLE_BOOST_DB);
        assert!(cfg.loop_enabled);
        assert!(cfg.ducking.enabled);
        assert_eq!(cfg.ducking.level, DuckLevel::DeltaDb(DEFAULT_DUCK_DELTA_DB));
        assert_eq!(cfg.ducking.attack_sec, DEFAULT_ATTACK_SEC);
        assert_eq!(cfg.ducking.release_sec, DEFAULT_RELEASE_SEC);
        assert_eq!(cfg.ducking.merge_gap_sec, DEFAULT_MERGE_GAP_SEC);
        assert_eq!(cfg.ducking.min_hold_sec, DEFAULT_MIN_HOLD_SEC);
    }

    #[test]
    fn none_preset_is_neutral() {
        let mut bgm = video_bgm();
        bgm.preset = Some(BgmPreset::None);
        let cfg = resolve_bgm_config(&bgm, None);
        assert!(!cfg.ducking.enabled);
        assert_eq!(cfg.idle_boost_db, 0.0);
    }

    #[test]
    fn video_explicit_fields_override_preset() {
        let mut bgm = video_bgm();
        bgm.volume_db = Some(-20.0);
        bgm.max_gain_db = Some(-1.0);
        let cfg = resolve_bgm_config(&bgm, None);
        assert_eq!(cfg.base_volume, BaseVolume::Db(-20.0));
        assert_eq!(cfg.max_gain_db, -1.0);
    }

    #[test]
    fn scene_override_beats_video_and_supplies_src() {
        let bgm = video_bgm();
        let over = SceneBgmOverride {
            src: Some("bgm/other.mp3".to_string()),
            volume_db: Some(-6.0),
            transition_sec: Some(0.5),
            ..SceneBgmOverride::default()
        };
        let cfg = resolve_bgm_config(&bgm, Some(&over));
        assert_eq!(cfg.src, "bgm/other.mp3");
        assert_eq!(cfg.base_volume, BaseVolume::Db(-6.0));
        assert_eq!(cfg.transition_sec, 0.5);
    }

    #[test]
    fn linear_volume_replaces_the_db_slot() {
        let mut bgm = video_bgm();
        bgm.volume = Some(0.4);
        let cfg = resolve_bgm_config(&bgm, None);
        assert_eq!(cfg.base_volume, BaseVolume::Linear(0.4));
    }

    #[test]
    fn ducking_deep_merge_keeps_unset_fields() {
        let mut bgm = video_bgm();
        bgm.ducking = Some(DuckingConfig {
            duck_volume: Some(0.2),
            ..DuckingConfig::default()
        });
        let cfg = resolve_bgm_config(&bgm, None);
        assert!(cfg.ducking.enabled);
        assert_eq!(cfg.ducking.level, DuckLevel::Volume(0.2));
        // attack/release survive from the preset layer
        assert_eq!(cfg.ducking.attack_sec, DEFAULT_ATTACK_SEC);
        assert_eq!(cfg.ducking.release_sec, DEFAULT_RELEASE_SEC);
    }

    #[test]
    fn partial_ducking_override_does_not_reenable() {
        let mut bgm = video_bgm();
        bgm.preset = Some(BgmPreset::None);
        // A later layer that sets only a level must leave `enabled` alone.
        let over = SceneBgmOverride {
            ducking: Some(DuckingConfig {
                duck_delta_db: Some(-5.0),
                ..DuckingConfig::default()
            }),
            ..SceneBgmOverride::default()
        };
        let cfg = resolve_bgm_config(&bgm, Some(&over));
        assert!(!cfg.ducking.enabled);
        assert_eq!(cfg.ducking.level, DuckLevel::DeltaDb(-5.0));

        let over = SceneBgmOverride {
            ducking: Some(DuckingConfig {
                enabled: Some(true),
                ..DuckingConfig::default()
            }),
            ..SceneBgmOverride::default()
        };
        let cfg = resolve_bgm_config(&bgm, Some(&over));
        assert!(cfg.ducking.enabled);
    }

    #[test]
    fn duck_level_precedence_within_a_layer() {
        let mut bgm = video_bgm();
        bgm.ducking = Some(DuckingConfig {
            duck_delta_db: Some(-4.0),
            duck_volume_db: Some(-30.0),
            duck_volume: Some(0.1),
            ..DuckingConfig::default()
        });
        let cfg = resolve_bgm_config(&bgm, None);
        assert_eq!(cfg.ducking.level, DuckLevel::DeltaDb(-4.0));
    }

    #[test]
    fn scene_preset_takes_precedence_over_video_preset() {
        let bgm = video_bgm();
        let over = SceneBgmOverride {
            preset: Some(BgmPreset::Hype),
            ..SceneBgmOverride::default()
        };
        let cfg = resolve_bgm_config(&bgm, Some(&over));
        assert_eq!(cfg.base_volume, BaseVolume::Db(-8.0));
        assert_eq!(cfg.ducking.level, DuckLevel::DeltaDb(-10.0));
    }

    #[test]
    fn config_key_detects_changes_and_matches_equals() {
        let bgm = video_bgm();
        let a = resolve_bgm_config(&bgm, None);
        let b = resolve_bgm_config(&bgm, None);
        assert_eq!(config_key(&a), config_key(&b));

        let over = SceneBgmOverride {
            volume_db: Some(-6.0),
            ..SceneBgmOverride::default()
        };
        let c = resolve_bgm_config(&bgm, Some(&over));
        assert_ne!(config_key(&a), config_key(&c));
    }
}
