//! Audio "conversion": the payload is passed through under the new extension.
//!
//! No decoder or encoder is available in-process, so the bytes are not
//! transcoded. The dispatcher reports that as a warning, not a failure.

use crate::output::Artifact;
use crate::registry::mime_for;
use crate::request::InputFile;
use tracing::warn;

/// Warning attached to every audio conversion.
pub const TRANSCODE_WARNING: &str =
    "Audio transcoding is unavailable client-side; the original stream was renamed, not re-encoded";

/// Copy `input` under `<base>.<target>`, typed as the target format.
pub fn passthrough(input: &InputFile, target: &str) -> Artifact {
    let target = target.trim_start_matches('.').to_lowercase();
    if input.extension().as_deref() != Some(target.as_str()) {
        warn!("{} → {target}: container changed without transcoding", input.name);
    }
    Artifact::new(
        format!("{}.{target}", input.base_name()),
        mime_for(&target),
        input.bytes.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_unchanged() {
        let input = InputFile::new("song.wav", b"RIFF....WAVEfmt ".to_vec());
        let out = passthrough(&input, "mp3");
        assert_eq!(out.name, "song.mp3");
        assert_eq!(out.mime, "audio/mpeg");
        assert_eq!(out.bytes, input.bytes);
    }

    #[test]
    fn ogg_target() {
        let out = passthrough(&InputFile::new("a.b.flac", vec![1]), ".OGG");
        assert_eq!(out.name, "a.b.ogg");
        assert_eq!(out.mime, "audio/ogg");
    }
}
