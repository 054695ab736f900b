//! ffmpeg argument lists for a single rendition.

use crate::domain::downmix::Downmix;
use crate::domain::job::File;
use crate::domain::preset::{AudioPreset, GopMode, GopUnit, Preset, VideoPreset};
use crate::ports::provider::ProviderError;
use std::collections::BTreeMap;
use std::path::Path;

/// ffmpeg's channel layouts stop at 64 channels.
const MAX_CHANNELS: u32 = 64;

pub fn video_encoder(codec: &str) -> Option<&'static str> {
    match codec {
        "h264" => Some("libx264"),
        "hevc" | "h265" => Some("libx265"),
        "vp8" => Some("libvpx"),
        "vp9" => Some("libvpx-vp9"),
        "av1" => Some("libaom-av1"),
        _ => None,
    }
}

pub fn audio_encoder(codec: &str) -> Option<&'static str> {
    match codec {
        "aac" => Some("aac"),
        "opus" => Some("libopus"),
        "mp3" => Some("libmp3lame"),
        _ => None,
    }
}

pub fn muxer(container: &str) -> Option<&'static str> {
    match container {
        "mp4" => Some("mp4"),
        "mov" => Some("mov"),
        "webm" => Some("webm"),
        "mkv" => Some("matroska"),
        "ts" => Some("mpegts"),
        _ => None,
    }
}

/// Reject presets this provider cannot render.
pub fn check_preset(preset: &Preset) -> Result<(), ProviderError> {
    let unsupported = |what: String| ProviderError::Unsupported(format!("preset {}: {}", preset.name, what));

    if muxer(&preset.container).is_none() {
        return Err(unsupported(format!("container {}", preset.container)));
    }
    if let Some(video) = &preset.video {
        if video_encoder(&video.codec).is_none() {
            return Err(unsupported(format!("video codec {}", video.codec)));
        }
        if video.dolby_vision {
            return Err(unsupported("Dolby Vision".to_string()));
        }
        if video.hdr10.is_some() && video_encoder(&video.codec) != Some("libx265") {
            return Err(unsupported(format!("HDR10 with {}", video.codec)));
        }
    }
    if let Some(audio) = &preset.audio {
        if audio_encoder(&audio.codec).is_none() {
            return Err(unsupported(format!("audio codec {}", audio.codec)));
        }
    }
    Ok(())
}

/// Arguments turning `input` into `output` with `preset`.
///
/// `source` supplies the per-file hints: keyframe offsets and the downmix.
pub fn transcode(
    input: &str,
    output: &Path,
    preset: &Preset,
    source: &File,
) -> Result<Vec<String>, ProviderError> {
    check_preset(preset)?;

    let mut args = strings(&["-y", "-i", input]);
    let mut graph = Vec::new();
    let mut maps = Vec::new();
    let mut out = Vec::new();

    match &preset.video {
        Some(video) => {
            for overlay in &video.overlays {
                args.push("-i".to_string());
                args.push(overlay.uri.clone());
            }
            match video_chain(video)? {
                Some(chain) => {
                    graph.push(chain);
                    maps.push("[vout]".to_string());
                }
                None => maps.push("0:v:0".to_string()),
            }
            out.extend(video_options(video, &source.keyframe_offsets));
        }
        None => out.push("-vn".to_string()),
    }

    match &preset.audio {
        Some(audio) => {
            match &source.downmix {
                Some(downmix) => {
                    graph.push(downmix_chain(downmix)?);
                    maps.push("[aout]".to_string());
                }
                None => maps.push("0:a:0?".to_string()),
            }
            out.extend(audio_options(audio));
        }
        None => out.push("-an".to_string()),
    }

    if !graph.is_empty() {
        args.push("-filter_complex".to_string());
        args.push(graph.join(";"));
        for map in maps {
            args.push("-map".to_string());
            args.push(map);
        }
    }
    args.extend(out);

    let format = muxer(&preset.container).unwrap_or("mp4");
    args.extend(strings(&["-f", format]));
    if matches!(format, "mp4" | "mov") {
        args.extend(strings(&["-movflags", "+faststart"]));
    }
    args.push(output.to_string_lossy().into_owned());
    Ok(args)
}

/// Crop, scale and overlays as one labelled chain ending in `[vout]`.
fn video_chain(video: &VideoPreset) -> Result<Option<String>, ProviderError> {
    let mut filters = Vec::new();
    if let Some(crop) = video.crop.filter(|c| !c.is_empty()) {
        let (Some(horizontal), Some(vertical)) = (crop.horizontal(), crop.vertical()) else {
            return Err(unsupported(format!("crop {:?}", crop)));
        };
        filters.push(format!(
            "crop=iw-{}:ih-{}:{}:{}",
            horizontal, vertical, crop.left, crop.top
        ));
    }
    if video.width > 0 || video.height > 0 {
        filters.push(format!(
            "scale={}:{}",
            dimension(video.width),
            dimension(video.height)
        ));
    }

    let steps = usize::from(!filters.is_empty()) + video.overlays.len();
    if steps == 0 {
        return Ok(None);
    }
    let label = |i: usize| {
        if i + 1 == steps {
            "[vout]".to_string()
        } else {
            format!("[v{}]", i)
        }
    };

    let mut chain = Vec::with_capacity(steps);
    let mut input = "[0:v]".to_string();
    if !filters.is_empty() {
        chain.push(format!("{}{}{}", input, filters.join(","), label(0)));
        input = label(0);
    }
    for (k, overlay) in video.overlays.iter().enumerate() {
        let i = chain.len();
        chain.push(format!(
            "{}[{}:v]overlay={}:{}{}",
            input,
            k + 1,
            overlay.x,
            overlay.y,
            label(i)
        ));
        input = label(i);
    }
    Ok(Some(chain.join(";")))
}

/// Zero keeps the aspect ratio; -2 also keeps the dimension even.
fn dimension(value: u32) -> String {
    if value == 0 {
        "-2".to_string()
    } else {
        value.to_string()
    }
}

fn video_options(video: &VideoPreset, keyframe_offsets: &[f64]) -> Vec<String> {
    let encoder = video_encoder(&video.codec).unwrap_or("libx264");
    let mut out = strings(&["-c:v", encoder]);
    let mut x265 = Vec::new();

    if video.bitrate > 0 {
        out.extend(["-b:v".to_string(), video.bitrate.to_string()]);
    }
    if let Some(profile) = &video.profile {
        out.extend(["-profile:v".to_string(), profile.clone()]);
    }
    if let Some(level) = &video.level {
        out.extend(["-level:v".to_string(), level.clone()]);
    }

    if !keyframe_offsets.is_empty() {
        let times: Vec<String> = keyframe_offsets.iter().map(|t| t.to_string()).collect();
        out.extend(["-force_key_frames".to_string(), times.join(",")]);
    } else if let Some(gop) = &video.gop {
        match gop.unit {
            GopUnit::Frames => {
                out.extend(["-g".to_string(), (gop.size.round() as u64).to_string()]);
            }
            GopUnit::Seconds => {
                out.extend([
                    "-force_key_frames".to_string(),
                    format!("expr:gte(t,n_forced*{})", gop.size),
                ]);
            }
        }
    }

    if video.gop.map(|g| g.mode) == Some(GopMode::Fixed) {
        match encoder {
            "libx265" => x265.push("scenecut=0".to_string()),
            "libx264" => out.extend(strings(&["-sc_threshold", "0"])),
            _ => {}
        }
    }

    if let Some(hdr) = &video.hdr10 {
        out.extend(strings(&["-pix_fmt", "yuv420p10le"]));
        x265.extend(
            [
                "hdr-opt=1",
                "repeat-headers=1",
                "colorprim=bt2020",
                "transfer=smpte2084",
                "colormatrix=bt2020nc",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        if let Some(master) = &hdr.master_display {
            x265.push(format!("master-display={}", master));
        }
        x265.push(format!("max-cll={},{}", hdr.max_cll, hdr.max_fall));
    }

    if !x265.is_empty() {
        out.extend(["-x265-params".to_string(), x265.join(":")]);
    }
    out
}

fn audio_options(audio: &AudioPreset) -> Vec<String> {
    let mut out = strings(&["-c:a", audio_encoder(&audio.codec).unwrap_or("aac")]);
    if audio.bitrate > 0 {
        out.extend(["-b:a".to_string(), audio.bitrate.to_string()]);
    }
    out
}

/// Merge the source tracks the downmix reads from and pan them down.
///
/// Tracks are merged in ascending index order and each is assumed to carry
/// as many channels as the highest channel index declared for it.
fn downmix_chain(downmix: &Downmix) -> Result<String, ProviderError> {
    if downmix.src.is_empty() {
        return Err(ProviderError::Unsupported(
            "downmix without source channels".to_string(),
        ));
    }
    let matrix = downmix.matrix()?;

    let mut widths: BTreeMap<u32, u32> = BTreeMap::new();
    for channel in &downmix.src {
        if channel.channel_index >= MAX_CHANNELS {
            return Err(unsupported(format!(
                "downmix channel index {}",
                channel.channel_index
            )));
        }
        let width = widths.entry(channel.track_index).or_insert(0);
        *width = (*width).max(channel.channel_index + 1);
    }
    let mut offsets = BTreeMap::new();
    let mut next: u32 = 0;
    for (track, width) in &widths {
        offsets.insert(*track, next);
        next += width;
    }
    if next > MAX_CHANNELS {
        return Err(unsupported(format!("downmix over {} merged channels", next)));
    }

    let pan = matrix.pan_filter_with(|s| {
        let channel = &downmix.src[s];
        let offset = offsets.get(&channel.track_index).copied().unwrap_or(0);
        (offset + channel.channel_index) as usize
    });
    let inputs: String = widths.keys().map(|t| format!("[0:a:{}]", t)).collect();

    Ok(if widths.len() > 1 {
        format!("{}amerge=inputs={},{}[aout]", inputs, widths.len(), pan)
    } else {
        format!("{}{}[aout]", inputs, pan)
    })
}

fn unsupported(what: String) -> ProviderError {
    ProviderError::Unsupported(what)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
