//! Audio remux: combine the silent blurred video with the source audio.

use std::path::Path;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Mux the audio track of `source` onto `silent_video`, writing `output`.
///
/// The audio map uses the optional `1:a?` selector, so a source with no
/// audio track produces a silent final video instead of an error. A
/// failing FFmpeg process is still an error and fails the job.
pub async fn mux_audio(
    silent_video: impl AsRef<Path>,
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    preset: &str,
    crf: u8,
) -> MediaResult<()> {
    let silent_video = silent_video.as_ref();
    let source = source.as_ref();
    let output = output.as_ref();

    info!(
        "Muxing audio from {} onto {} -> {}",
        source.display(),
        silent_video.display(),
        output.display()
    );

    let cmd = FfmpegCommand::new(silent_video, output)
        .extra_input(source)
        .map("0:v:0")
        .map("1:a?")
        .video_codec("libx264")
        .preset(preset)
        .crf(crf)
        .audio_codec("copy");

    FfmpegRunner::new().run(&cmd).await
}
