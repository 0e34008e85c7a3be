//! Timeline compilation: the single entry point of the crate.

use std::collections::BTreeMap;
use std::fmt;

use crate::bgm_plan::{SceneSpan, plan_bgm_track};
use crate::dialogue::{BlockContext, compile_dialogue};
use crate::error::{ScriptlineError, ScriptlineResult};
use crate::manifest::AudioManifestEntry;
use crate::script::{Block, Script};
use crate::timeline::{
    TIMELINE_VERSION, Timeline, TimelineAssets, TimelineMeta, Track,
};

/// External collaborator outputs consumed by [`compile`].
#[derive(Clone, Debug, Default)]
pub struct CompileInputs {
    pub audio_manifest: Vec<AudioManifestEntry>,
    /// Probed audio lengths per BGM asset id; required for a clip to loop.
    pub bgm_duration_frames: BTreeMap<String, u64>,
    /// Measured loudness correction per BGM asset id, in dB.
    pub bgm_loudness_gain_db: BTreeMap<String, f64>,
}

#[derive(Clone, Debug)]
pub struct CompileOutput {
    pub timeline: Timeline,
    pub warnings: Vec<CompileWarning>,
}

/// Recoverable, data-driven problems observed during compilation. None of
/// these aborts the compile; the Timeline still validates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileWarning {
    UnboundAudio { scene_id: String, audio_key: String },
    UnknownSpeaker { scene_id: String, speaker: String },
    MissingBgmDuration { asset_id: String, src: String },
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundAudio {
                scene_id,
                audio_key,
            } => write!(
                f,
                "scene '{scene_id}': no manifest entry for '{audio_key}', using silent fallback"
            ),
            Self::UnknownSpeaker { scene_id, speaker } => {
                write!(f, "scene '{scene_id}': speaker '{speaker}' is not in cast")
            }
            Self::MissingBgmDuration { asset_id, src } => write!(
                f,
                "bgm asset '{asset_id}' ({src}) has no probed duration, looping disabled"
            ),
        }
    }
}

/// Compile a validated Script into a frame-precise Timeline.
///
/// Deterministic: the output is a pure function of the inputs. Data-driven
/// problems degrade into [`CompileWarning`]s; only structural corruption of
/// the input or the emitted document is an error.
#[tracing::instrument(skip(script, inputs))]
pub fn compile(script: &Script, inputs: &CompileInputs) -> ScriptlineResult<CompileOutput> {
    script.validate()?;

    let mut audio_clips = Vec::new();
    let mut subtitle_clips = Vec::new();
    let mut character_clips = Vec::new();
    let mut audio_assets = BTreeMap::new();
    let mut warnings = Vec::<CompileWarning>::new();
    let mut scene_spans = Vec::<SceneSpan<'_>>::new();

    let mut cursor = 0u64;
    let mut global_block_index = 0usize;
    for scene in &script.scenes {
        let scene_start = cursor;
        for (block_index, block) in scene.blocks.iter().enumerate() {
            let ctx = BlockContext {
                script,
                scene,
                audio_manifest: &inputs.audio_manifest,
                current_frame: cursor,
                block_index,
                global_block_index,
            };
            match block {
                Block::Dialogue(d) => {
                    let out = compile_dialogue(&ctx, d);
                    audio_assets.insert(out.audio_asset_id, out.audio_asset);
                    audio_clips.push(out.audio_clip);
                    subtitle_clips.push(out.subtitle_clip);
                    character_clips.extend(out.character_clips);
                    warnings.extend(out.warnings);
                    cursor += out.total_duration_frames;
                }
            }
            global_block_index += 1;
        }
        scene_spans.push(SceneSpan {
            scene,
            start_frame: scene_start,
            end_frame: cursor,
        });
    }

    let mut tracks = vec![
        Track::Audio { clips: audio_clips },
        Track::Subtitle {
            clips: subtitle_clips,
        },
        Track::Character {
            clips: character_clips,
        },
    ];

    let mut bgm_assets = None;
    if let Some(video_bgm) = &script.video.bgm {
        let plan = plan_bgm_track(
            video_bgm,
            &scene_spans,
            cursor,
            script.video.fps,
            &inputs.bgm_duration_frames,
            &inputs.bgm_loudness_gain_db,
        );
        warnings.extend(plan.warnings);
        if !plan.clips.is_empty() {
            bgm_assets = Some(plan.assets);
            tracks.push(Track::Bgm { clips: plan.clips });
        }
    }

    let timeline = Timeline {
        version: TIMELINE_VERSION.to_string(),
        meta: TimelineMeta {
            fps: script.video.fps,
            width: script.video.width,
            height: script.video.height,
            total_frames: cursor,
        },
        assets: TimelineAssets {
            audio: audio_assets,
            bgm: bgm_assets,
        },
        tracks,
    };
    timeline
        .validate()
        .map_err(|e| ScriptlineError::emission(format!("emitted timeline is invalid: {e}")))?;

    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    Ok(CompileOutput { timeline, warnings })
}
