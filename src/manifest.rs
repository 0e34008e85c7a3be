//! Audio manifest: the voice-engine collaborator's output, consumed as a
//! sequential, fully-realized input.

/// One pre-generated voice entry.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioManifestEntry {
    pub audio_key: String,
    pub speaker_id: u32,
    pub text: String,
    pub audio_src: String,
    pub duration_in_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Bind a dialogue block to a manifest entry.
///
/// Order: a `fileName` that equals or is a substring of an entry's
/// `audioSrc` wins, then an exact `audioKey` match. Never by text
/// (duplicate lines share texts).
pub fn bind_entry<'a>(
    manifest: &'a [AudioManifestEntry],
    file_name: Option<&str>,
    audio_key: &str,
) -> Option<&'a AudioManifestEntry> {
    if let Some(name) = file_name
        && !name.is_empty()
        && let Some(entry) = manifest
            .iter()
            .find(|e| e.audio_src == name || e.audio_src.contains(name))
    {
        return Some(entry);
    }
    manifest.iter().find(|e| e.audio_key == audio_key)
}
