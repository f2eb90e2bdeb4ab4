//! Command line of a single conversion job.

use super::settings::AudioProcessingSettings;

/// Build the engine arguments for one job.
///
/// Order matters: inputs, filters, trim bounds (after the input so the seek is
/// accurate), codec, bitrate, sample rate, tags, cover mapping, output.
/// `cover` is ignored for formats that cannot carry a picture.
pub fn build_command_args(
    input: &str,
    cover: Option<&str>,
    output: &str,
    settings: &AudioProcessingSettings,
) -> Vec<String> {
    let format = settings.format;
    let cover = cover.filter(|_| format.supports_cover());
    let mut args: Vec<String> = Vec::new();

    args.extend(["-i".to_string(), input.to_string()]);
    if let Some(cover) = cover {
        args.extend(["-i".to_string(), cover.to_string()]);
    }

    if settings.normalize {
        args.extend(["-af".to_string(), "loudnorm".to_string()]);
    }

    if let Some(start) = settings.trim_start.as_deref() {
        args.extend(["-ss".to_string(), start.to_string()]);
    }
    if let Some(end) = settings.trim_end.as_deref() {
        args.extend(["-to".to_string(), end.to_string()]);
    }

    args.extend(["-c:a".to_string(), format.codec().to_string()]);

    if !format.is_lossless() {
        if let Some(bitrate) = settings.bitrate.as_deref() {
            args.extend(["-b:a".to_string(), bitrate.to_string()]);
        }
    }

    if let Some(rate) = settings.sample_rate.as_deref() {
        args.extend(["-ar".to_string(), rate.to_string()]);
    }

    if let Some(metadata) = &settings.metadata {
        for (key, value) in metadata.tags() {
            args.extend(["-metadata".to_string(), format!("{}={}", key, value)]);
        }
    }

    if cover.is_some() {
        let cover_codec = if format.reencodes_cover() { "mjpeg" } else { "copy" };
        args.extend(
            [
                "-map", "0:a", "-map", "1:v", "-c:v", cover_codec, "-disposition:v", "attached_pic",
            ]
            .map(String::from),
        );
    } else {
        // Без обложки отбрасываем видеопотоки входа (встроенные картинки и т.п.)
        args.push("-vn".to_string());
    }

    args.push(output.to_string());
    args
}
