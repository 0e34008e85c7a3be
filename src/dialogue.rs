//! Dialogue block rule: bind a block to its voice clip and emit the
//! audio, subtitle and character clips for one block.

use smallvec::{SmallVec, smallvec};

use crate::compile::CompileWarning;
use crate::manifest::{AudioManifestEntry, bind_entry};
use crate::script::{DialogueBlock, Scene, Script};
use crate::timeline::{
    AudioAssetDef, AudioClip, CharacterClip, CharacterState, SubtitleClip,
};
use crate::units::sec_to_frames;

// Fallback voice length when no usable manifest entry exists.
const FALLBACK_VOICE_SEC: f64 = 2.0;

pub(crate) struct BlockContext<'a> {
    pub script: &'a Script,
    pub scene: &'a Scene,
    pub audio_manifest: &'a [AudioManifestEntry],
    pub current_frame: u64,
    pub block_index: usize,
    pub global_block_index: usize,
}

pub(crate) struct DialogueEmission {
    pub audio_asset_id: String,
    pub audio_asset: AudioAssetDef,
    pub audio_clip: AudioClip,
    pub subtitle_clip: SubtitleClip,
    pub character_clips: SmallVec<[CharacterClip; 2]>,
    pub total_duration_frames: u64,
    pub warnings: SmallVec<[CompileWarning; 2]>,
}

pub(crate) fn compile_dialogue(ctx: &BlockContext<'_>, block: &DialogueBlock) -> DialogueEmission {
    let fps = ctx.script.video.fps;
    let mut warnings = SmallVec::new();

    let expected_key = format!("{}:{}", ctx.scene.id, ctx.block_index);
    let audio_key = block.audio_key.as_deref().unwrap_or(&expected_key);
    let entry = bind_entry(ctx.audio_manifest, block.file_name.as_deref(), audio_key);

    let (duration_frames, audio_src) = match entry {
        Some(e) if e.duration_in_seconds > 0.0 => {
            (sec_to_frames(e.duration_in_seconds, fps), e.audio_src.clone())
        }
        _ => {
            warnings.push(CompileWarning::UnboundAudio {
                scene_id: ctx.scene.id.clone(),
                audio_key: audio_key.to_string(),
            });
            (
                sec_to_frames(FALLBACK_VOICE_SEC, fps),
                format!("audio/{:03}.wav", ctx.global_block_index + 1),
            )
        }
    };

    if !ctx.script.cast.contains_key(&block.speaker) {
        warnings.push(CompileWarning::UnknownSpeaker {
            scene_id: ctx.scene.id.clone(),
            speaker: block.speaker.clone(),
        });
    }

    let pause_sec = block.pause_sec.unwrap_or(ctx.script.video.default_pause_sec);
    let pause_frames = sec_to_frames(pause_sec, fps);
    let total_duration_frames = duration_frames + pause_frames;

    let start = ctx.current_frame;
    let audio_asset_id = format!("audio_{:03}", ctx.global_block_index + 1);

    let mut character_clips: SmallVec<[CharacterClip; 2]> = smallvec![CharacterClip {
        start,
        duration: duration_frames,
        character_id: block.speaker.clone(),
        state: CharacterState { is_talking: true },
    }];
    if pause_frames > 0 {
        character_clips.push(CharacterClip {
            start: start + duration_frames,
            duration: pause_frames,
            character_id: block.speaker.clone(),
            state: CharacterState { is_talking: false },
        });
    }

    DialogueEmission {
        audio_asset: AudioAssetDef {
            src: audio_src,
            duration_frames,
        },
        audio_clip: AudioClip {
            asset_id: audio_asset_id.clone(),
            start,
            duration: duration_frames,
        },
        subtitle_clip: SubtitleClip {
            start,
            duration: total_duration_frames,
            text: block.text.clone(),
        },
        audio_asset_id,
        character_clips,
        total_duration_frames,
        warnings,
    }
}
