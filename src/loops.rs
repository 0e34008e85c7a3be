//! Loop-segment generation.
//!
//! A looping BGM clip is split into segments that each play a region of the
//! audio file. Adjacent segments intentionally overlap by the crossfade
//! length; the envelope's per-segment multipliers make the seam inaudible.

/// One loop segment, positioned clip-locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSegment {
    pub clip_offset: u64,
    pub duration: u64,
    pub audio_start_frame: u64,
    pub fade_in_frames: u64,
    pub fade_out_frames: u64,
}

/// Split a clip of `clip_duration` frames into overlapping loop segments of
/// an audio file of `audio_duration` frames.
///
/// The first segment plays the intro `[0, loopEnd)`; every later segment
/// plays the loop window. An out-of-range or empty window falls back to the
/// full audio, never to an error.
pub fn loop_segments(
    clip_duration: u64,
    audio_duration: u64,
    loop_start: Option<u64>,
    loop_end: Option<u64>,
    crossfade: Option<u64>,
) -> Vec<LoopSegment> {
    let mut ls = loop_start.unwrap_or(0);
    let mut le = loop_end.unwrap_or(audio_duration);
    if le <= ls || le > audio_duration {
        ls = 0;
        le = audio_duration;
    }
    let window = le - ls;

    if window == 0 {
        return vec![LoopSegment {
            clip_offset: 0,
            duration: clip_duration.min(audio_duration),
            audio_start_frame: 0,
            fade_in_frames: 0,
            fade_out_frames: 0,
        }];
    }

    let crossfade = crossfade.unwrap_or(0).min(window / 2);

    let mut out = Vec::new();
    let mut clip_offset = 0u64;
    let mut is_first = true;
    while clip_offset < clip_duration {
        let audio_start = if is_first { 0 } else { ls };
        let seg_len = if is_first { le } else { window };
        let remaining = clip_duration - clip_offset;
        let seg_dur = seg_len.min(remaining);
        if seg_dur == 0 {
            break;
        }
        let is_last = clip_offset + seg_dur >= clip_duration;
        out.push(LoopSegment {
            clip_offset,
            duration: seg_dur + if is_last { 0 } else { crossfade },
            audio_start_frame: audio_start,
            fade_in_frames: if is_first { 0 } else { crossfade },
            fade_out_frames: if is_last { 0 } else { crossfade },
        });
        clip_offset += seg_dur;
        is_first = false;
    }
    out
}
