use std::collections::BTreeMap;

use scriptline::{
    AudioManifestEntry, BgmConfig, BgmPreset, Block, CastMember, CompileInputs, CompileWarning,
    DialogueBlock, Scene, SceneBgmOverride, SceneStyle, Script, VideoConfig, VoiceConfig,
    bgm_asset_id, clip_gain_at, db_to_gain, compile, ducking_intervals, loop_segments,
    wrap_playback_position,
};

fn video_with_bgm(default_pause_sec: f64, bgm: BgmConfig) -> VideoConfig {
    VideoConfig {
        fps: 30.0,
        width: 1920,
        height: 1080,
        default_pause_sec,
        bgm: Some(bgm),
        audio_profile: None,
    }
}

fn bgm(src: &str, preset: Option<BgmPreset>) -> BgmConfig {
    BgmConfig {
        src: src.to_string(),
        preset,
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

fn cast_a() -> BTreeMap<String, CastMember> {
    let mut cast = BTreeMap::new();
    cast.insert(
        "a".to_string(),
        CastMember {
            voice: VoiceConfig {
                engine: "voicevox".to_string(),
                speaker_id: 3,
            },
            assets: None,
        },
    );
    cast
}

fn dialogue(text: &str, pause_sec: Option<f64>) -> Block {
    Block::Dialogue(DialogueBlock {
        speaker: "a".to_string(),
        text: text.to_string(),
        pause_sec,
        id: None,
        audio_key: None,
        file_name: None,
    })
}

fn scene(id: &str, bgm: Option<SceneBgmOverride>, blocks: Vec<Block>) -> Scene {
    Scene {
        id: id.to_string(),
        style: bgm.map(|b| SceneStyle {
            bg: None,
            subtitle_style: None,
            bgm: Some(b),
        }),
        blocks,
    }
}

fn entry(key: &str, src: &str, seconds: f64) -> AudioManifestEntry {
    AudioManifestEntry {
        audio_key: key.to_string(),
        speaker_id: 3,
        text: "t".to_string(),
        audio_src: src.to_string(),
        duration_in_seconds: seconds,
        file_name: None,
    }
}

#[test]
fn single_scene_with_talk_preset() {
    let script = Script {
        version: "0.1".to_string(),
        video: video_with_bgm(0.5, bgm("bgm/main.mp3", Some(BgmPreset::Talk))),
        cast: cast_a(),
        scenes: vec![scene("s0", None, vec![dialogue("hello", None)])],
    };
    let asset_id = bgm_asset_id("bgm/main.mp3");
    let mut durations = BTreeMap::new();
    durations.insert(asset_id.clone(), 900u64);
    let inputs = CompileInputs {
        audio_manifest: vec![entry("s0:0", "audio/001.wav", 2.0)],
        bgm_duration_frames: durations,
        ..CompileInputs::default()
    };

    let out = compile(&script, &inputs).unwrap();
    let tl = &out.timeline;
    assert_eq!(tl.meta.total_frames, 75);

    let clips = tl.bgm_track().unwrap();
    assert_eq!(clips.len(), 1);
    let clip = &clips[0];
    assert_eq!(clip.asset_id, asset_id);
    assert_eq!((clip.start, clip.duration), (0, 75));
    assert!(clip.loop_enabled);
    assert_eq!(clip.fade_in_frames, 30);
    assert_eq!(clip.fade_out_frames, 30);
    assert_eq!(clip.volume_db, Some(-12.0));
    assert_eq!(clip.max_gain_db, Some(-3.0));
    assert_eq!(clip.idle_boost_db, Some(3.0));

    let ducking = clip.ducking.as_ref().unwrap();
    assert!(ducking.enabled);
    assert_eq!(ducking.duck_delta_db, Some(-8.0));
    assert_eq!(ducking.attack_frames, 3);
    assert_eq!(ducking.release_frames, 8);
    assert_eq!(ducking.merge_gap_frames, Some(11));
    assert_eq!(ducking.min_hold_frames, Some(18));

    let asset = tl.bgm_asset(&asset_id).unwrap();
    assert_eq!(asset.src, "bgm/main.mp3");
    assert_eq!(asset.duration_frames, Some(900));
}

#[test]
fn source_change_crossfades_between_scenes() {
    let script = Script {
        version: "0.1".to_string(),
        video: video_with_bgm(0.5, bgm("a.mp3", None)),
        cast: cast_a(),
        scenes: vec![
            scene("s0", None, vec![dialogue("one", None)]),
            scene(
                "s1",
                Some(SceneBgmOverride {
                    src: Some("b.mp3".to_string()),
                    transition_sec: Some(1.0),
                    ..SceneBgmOverride::default()
                }),
                vec![dialogue("two", Some(0.0))],
            ),
        ],
    };
    let inputs = CompileInputs {
        audio_manifest: vec![
            entry("s0:0", "audio/001.wav", 2.0),
            entry("s1:0", "audio/002.wav", 1.0),
        ],
        ..CompileInputs::default()
    };

    let out = compile(&script, &inputs).unwrap();
    let tl = &out.timeline;
    assert_eq!(tl.meta.total_frames, 105);

    let clips = tl.bgm_track().unwrap();
    assert_eq!(clips.len(), 2);

    let a = &clips[0];
    assert_eq!(a.asset_id, bgm_asset_id("a.mp3"));
    assert_eq!((a.start, a.duration), (0, 105));
    assert_eq!(a.transition_out_frames, Some(30));
    assert_eq!(a.fade_in_frames, 30);
    assert_eq!(a.fade_out_frames, 1);

    let b = &clips[1];
    assert_eq!(b.asset_id, bgm_asset_id("b.mp3"));
    assert_eq!((b.start, b.duration), (75, 30));
    assert_eq!(b.transition_in_frames, Some(30));
    assert_eq!(b.audio_offset_frames, Some(0));
    assert_eq!(b.fade_in_frames, 1);
    assert_eq!(b.fade_out_frames, 30);

    // Transition windows agree on both sides of the seam.
    assert_eq!(a.transition_out_frames, b.transition_in_frames);
    assert_eq!(tl.assets.bgm.as_ref().unwrap().len(), 2);
}

#[test]
fn settings_change_preserves_continuous_playback() {
    // The first scene's length is driven by the manifest's voice duration.
    let script = Script {
        version: "0.1".to_string(),
        video: video_with_bgm(0.0, bgm("bgm/main.mp3", None)),
        cast: cast_a(),
        scenes: vec![
            scene("s0", None, vec![dialogue("one", None)]),
            scene(
                "s1",
                Some(SceneBgmOverride {
                    volume_db: Some(-6.0),
                    ..SceneBgmOverride::default()
                }),
                vec![dialogue("two", None)],
            ),
        ],
    };

    let asset_id = bgm_asset_id("bgm/main.mp3");
    let mut durations = BTreeMap::new();
    durations.insert(asset_id.clone(), 300u64);

    // Scene spans [0,60) and [60,120).
    let inputs = CompileInputs {
        audio_manifest: vec![
            entry("s0:0", "audio/001.wav", 2.0),
            entry("s1:0", "audio/002.wav", 2.0),
        ],
        bgm_duration_frames: durations.clone(),
        ..CompileInputs::default()
    };
    let tl = compile(&script, &inputs).unwrap().timeline;
    let clips = tl.bgm_track().unwrap();
    assert_eq!(clips.len(), 2);
    assert_eq!(clips[0].asset_id, clips[1].asset_id);
    assert_eq!(clips[0].duration, 60);
    assert_eq!(clips[1].start, 60);
    assert_eq!(clips[1].audio_offset_frames, Some(60));
    assert_eq!(clips[1].volume_db, Some(-6.0));

    // A 12 s first voice accumulates 360 frames: offset wraps mod 300.
    let inputs = CompileInputs {
        audio_manifest: vec![
            entry("s0:0", "audio/001.wav", 12.0),
            entry("s1:0", "audio/002.wav", 2.0),
        ],
        bgm_duration_frames: durations,
        ..CompileInputs::default()
    };
    let tl = compile(&script, &inputs).unwrap().timeline;
    let clips = tl.bgm_track().unwrap();
    assert_eq!(clips[1].start, 360);
    assert_eq!(clips[1].audio_offset_frames, Some(60));
}

#[test]
fn adjacent_same_asset_clips_satisfy_the_offset_law() {
    let script = Script {
        version: "0.1".to_string(),
        video: video_with_bgm(0.0, bgm("bgm/main.mp3", None)),
        cast: cast_a(),
        scenes: vec![
            scene("s0", None, vec![dialogue("one", None)]),
            scene(
                "s1",
                Some(SceneBgmOverride {
                    volume_db: Some(-6.0),
                    ..SceneBgmOverride::default()
                }),
                vec![dialogue("two", None)],
            ),
            scene(
                "s2",
                Some(SceneBgmOverride {
                    volume_db: Some(-9.0),
                    ..SceneBgmOverride::default()
                }),
                vec![dialogue("three", None)],
            ),
        ],
    };
    let asset_id = bgm_asset_id("bgm/main.mp3");
    let mut durations = BTreeMap::new();
    durations.insert(asset_id, 100u64);
    let inputs = CompileInputs {
        audio_manifest: vec![
            entry("s0:0", "audio/001.wav", 3.0),
            entry("s1:0", "audio/002.wav", 3.0),
            entry("s2:0", "audio/003.wav", 3.0),
        ],
        bgm_duration_frames: durations,
        ..CompileInputs::default()
    };

    let tl = compile(&script, &inputs).unwrap().timeline;
    let clips = tl.bgm_track().unwrap();
    assert_eq!(clips.len(), 3);

    let mut accumulated = 0u64;
    for pair in clips.windows(2) {
        accumulated += pair[0].duration;
        let expected = wrap_playback_position(
            accumulated,
            Some(100),
            true,
            pair[1].loop_start_frames,
            pair[1].loop_end_frames,
        );
        assert_eq!(pair[1].audio_offset_frames, Some(expected));
    }
    // 90 accumulated frames of a 100-frame file: second clip at 90,
    // third at 180 mod 100 = 80.
    assert_eq!(clips[1].audio_offset_frames, Some(90));
    assert_eq!(clips[2].audio_offset_frames, Some(80));
}

#[test]
fn missing_duration_disables_looping_with_warning() {
    let script = Script {
        version: "0.1".to_string(),
        video: video_with_bgm(0.0, bgm("bgm/main.mp3", Some(BgmPreset::Talk))),
        cast: cast_a(),
        scenes: vec![scene("s0", None, vec![dialogue("hello", None)])],
    };
    let inputs = CompileInputs {
        audio_manifest: vec![entry("s0:0", "audio/001.wav", 2.0)],
        ..CompileInputs::default()
    };

    let out = compile(&script, &inputs).unwrap();
    let clip = &out.timeline.bgm_track().unwrap()[0];
    assert!(!clip.loop_enabled);
    assert!(
        out.warnings
            .iter()
            .any(|w| matches!(w, CompileWarning::MissingBgmDuration { .. }))
    );
}

#[test]
fn loudness_gain_is_attached_and_scales_the_envelope() {
    let script = Script {
        version: "0.1".to_string(),
        video: video_with_bgm(0.0, bgm("bgm/main.mp3", Some(BgmPreset::Talk))),
        cast: cast_a(),
        scenes: vec![scene("s0", None, vec![dialogue("hello", None)])],
    };
    let asset_id = bgm_asset_id("bgm/main.mp3");
    let mut loudness = BTreeMap::new();
    loudness.insert(asset_id.clone(), -4.5f64);
    let inputs = CompileInputs {
        audio_manifest: vec![entry("s0:0", "audio/001.wav", 2.0)],
        bgm_loudness_gain_db: loudness,
        ..CompileInputs::default()
    };

    let tl = compile(&script, &inputs).unwrap().timeline;
    let asset = tl.bgm_asset(&asset_id).unwrap();
    assert_eq!(asset.loudness_gain_db, Some(-4.5));

    let clip = &tl.bgm_track().unwrap()[0];
    let intervals = ducking_intervals(&tl, clip);
    let with = clip_gain_at(clip, asset.loudness_gain_db, 40, &intervals);
    let without = clip_gain_at(clip, None, 40, &intervals);
    assert!((with / without - db_to_gain(-4.5)).abs() < 1e-9);
}

#[test]
fn envelope_ducks_while_the_character_talks() {
    let script = Script {
        version: "0.1".to_string(),
        video: video_with_bgm(1.0, bgm("bgm/main.mp3", Some(BgmPreset::Talk))),
        cast: cast_a(),
        scenes: vec![scene("s0", None, vec![dialogue("hello", None)])],
    };
    let asset_id = bgm_asset_id("bgm/main.mp3");
    let mut durations = BTreeMap::new();
    durations.insert(asset_id, 900u64);
    let inputs = CompileInputs {
        audio_manifest: vec![entry("s0:0", "audio/001.wav", 2.0)],
        bgm_duration_frames: durations,
        ..CompileInputs::default()
    };

    // 60 talking frames, then a 30-frame pause.
    let tl = compile(&script, &inputs).unwrap().timeline;
    let clip = &tl.bgm_track().unwrap()[0];
    let intervals = ducking_intervals(&tl, clip);
    assert_eq!(intervals.len(), 1);
    assert_eq!((intervals[0].start, intervals[0].end), (0, 60));

    let talking = clip_gain_at(clip, None, 45, &intervals);
    let expected_talk = db_to_gain(-12.0) * db_to_gain(-8.0);
    assert!((talking - expected_talk).abs() < 1e-9);

    // Well past the release window but inside the fade-out tail.
    let idle = clip_gain_at(clip, None, 70, &intervals);
    assert!(idle > talking);
}

#[test]
fn bgm_clip_splits_into_overlapping_loop_segments() {
    let script = Script {
        version: "0.1".to_string(),
        video: video_with_bgm(0.0, bgm("bgm/main.mp3", Some(BgmPreset::Talk))),
        cast: cast_a(),
        scenes: vec![scene("s0", None, vec![dialogue("hello", None)])],
    };
    let asset_id = bgm_asset_id("bgm/main.mp3");
    let mut durations = BTreeMap::new();
    durations.insert(asset_id.clone(), 45u64);
    let inputs = CompileInputs {
        audio_manifest: vec![entry("s0:0", "audio/001.wav", 2.0)],
        bgm_duration_frames: durations,
        ..CompileInputs::default()
    };

    let tl = compile(&script, &inputs).unwrap().timeline;
    let clip = &tl.bgm_track().unwrap()[0];
    assert!(clip.loop_enabled);
    let asset = tl.bgm_asset(&asset_id).unwrap();

    // A 60-frame clip over a 45-frame file needs a second segment.
    let segs = loop_segments(
        clip.duration,
        asset.duration_frames.unwrap(),
        clip.loop_start_frames,
        clip.loop_end_frames,
        clip.loop_crossfade_frames,
    );
    assert!(segs.len() >= 2);
    assert_eq!(segs[0].audio_start_frame, 0);
    let end = segs.last().map(|s| s.clip_offset + s.duration).unwrap();
    assert_eq!(end, clip.duration);
}
