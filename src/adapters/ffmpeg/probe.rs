//! `ffprobe` JSON output, folded into a [`File`].

use crate::domain::job::{AudioSpec, File, VideoSpec};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Probe {
    #[serde(default)]
    format: Option<Format>,
    #[serde(default)]
    streams: Vec<Stream>,
}

#[derive(Debug, Deserialize)]
struct Format {
    #[serde(default)]
    format_name: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Stream {
    codec_type: String,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    sample_rate: Option<String>,
}

pub fn args(uri: &str) -> Vec<String> {
    [
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        uri,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Describe `source` from ffprobe's JSON. Splice, downmix and keyframe hints
/// are carried over from the source as declared.
pub fn parse(source: &File, json: &str) -> Result<File, serde_json::Error> {
    let probe: Probe = serde_json::from_str(json)?;
    let mut file = File {
        splice: source.splice.clone(),
        downmix: source.downmix.clone(),
        keyframe_offsets: source.keyframe_offsets.clone(),
        ..File::new(source.uri.clone())
    };

    if let Some(format) = probe.format {
        file.container = format
            .format_name
            .and_then(|names| names.split(',').next().map(str::to_string));
        file.duration = number(format.duration.as_deref()).unwrap_or(0.0);
        file.size = number(format.size.as_deref()).map_or(0, |v| v as u64);
    }
    if file.container.is_none() {
        file.container = source.container.clone();
    }

    if let Some(video) = probe.streams.iter().find(|s| s.codec_type == "video") {
        file.video = Some(VideoSpec {
            codec: video.codec_name.clone().unwrap_or_default(),
            width: video.width.unwrap_or(0),
            height: video.height.unwrap_or(0),
            frame_rate: video.r_frame_rate.as_deref().and_then(frame_rate),
            bitrate: number(video.bit_rate.as_deref()).map_or(0, |v| v as u64),
        });
    }
    if let Some(audio) = probe.streams.iter().find(|s| s.codec_type == "audio") {
        file.audio = Some(AudioSpec {
            codec: audio.codec_name.clone().unwrap_or_default(),
            channels: audio.channels.unwrap_or(0),
            sample_rate: number(audio.sample_rate.as_deref()).map_or(0, |v| v as u32),
            bitrate: number(audio.bit_rate.as_deref()).map_or(0, |v| v as u64),
        });
    }
    Ok(file)
}

fn number(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

/// `"30000/1001"` -> `29.97..`
fn frame_rate(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}
