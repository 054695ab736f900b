//! Audio channel downmix.
//!
//! Maps a list of source channels onto a list of destination channels through
//! a fixed table chosen by the destination channel count. The result is a
//! boolean contribution matrix, `enabled[dst][src]`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DownmixError {
    #[error("unsupported downmix from {src} to {dst} channels")]
    Unsupported { src: usize, dst: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    #[serde(rename = "C")]
    Center,
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
    #[serde(rename = "Ls")]
    LeftSurround,
    #[serde(rename = "Rs")]
    RightSurround,
    #[serde(rename = "Lb")]
    LeftBack,
    #[serde(rename = "Rb")]
    RightBack,
    #[serde(rename = "Lt")]
    LeftTotal,
    #[serde(rename = "Rt")]
    RightTotal,
    #[serde(rename = "LFE")]
    Lfe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChannel {
    pub track_index: u32,
    pub channel_index: u32,
    pub layout: ChannelLayout,
}

impl AudioChannel {
    pub fn new(track_index: u32, channel_index: u32, layout: ChannelLayout) -> Self {
        Self {
            track_index,
            channel_index,
            layout,
        }
    }
}

/// Source and destination channel lists carried on a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Downmix {
    pub src: Vec<AudioChannel>,
    pub dst: Vec<AudioChannel>,
}

impl Downmix {
    pub fn matrix(&self) -> Result<DownmixMatrix, DownmixError> {
        map(&self.src, &self.dst)
    }
}

/// `enabled[d][s]` is true when source channel `s` feeds destination `d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownmixMatrix {
    enabled: Vec<Vec<bool>>,
}

impl DownmixMatrix {
    pub fn rows(&self) -> usize {
        self.enabled.len()
    }

    pub fn cols(&self) -> usize {
        self.enabled.first().map_or(0, Vec::len)
    }

    pub fn is_enabled(&self, dst: usize, src: usize) -> bool {
        self.enabled
            .get(dst)
            .and_then(|row| row.get(src))
            .copied()
            .unwrap_or(false)
    }

    pub fn as_rows(&self) -> &[Vec<bool>] {
        &self.enabled
    }

    /// Render as an ffmpeg `pan` filter, assuming source channels are laid
    /// out in matrix column order.
    pub fn pan_filter(&self) -> String {
        self.pan_filter_with(|s| s)
    }

    /// Render as an ffmpeg `pan` filter; `input_channel` maps a matrix column
    /// to the channel index of the filter input.
    pub fn pan_filter_with<F: Fn(usize) -> usize>(&self, input_channel: F) -> String {
        let layout = match self.rows() {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            n => format!("{}c", n),
        };
        let mut filter = format!("pan={}", layout);
        for (d, row) in self.enabled.iter().enumerate() {
            let inputs: Vec<String> = row
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(|(s, _)| format!("c{}", input_channel(s)))
                .collect();
            let expr = if inputs.is_empty() {
                "0*c0".to_string()
            } else {
                inputs.join("+")
            };
            filter.push_str(&format!("|c{}={}", d, expr));
        }
        filter
    }
}

/// Destination indices a layout contributes to, for a given table.
type Table = fn(ChannelLayout) -> &'static [usize];

fn stereo(layout: ChannelLayout) -> &'static [usize] {
    use ChannelLayout::*;
    match layout {
        Left | LeftSurround | LeftBack | LeftTotal => &[0],
        Right | RightSurround | RightBack | RightTotal => &[1],
        Center => &[0, 1],
        Lfe => &[],
    }
}

fn table_for(dst_channels: usize) -> Option<Table> {
    match dst_channels {
        2 => Some(stereo),
        _ => None,
    }
}

/// Build the contribution matrix for `src -> dst`.
pub fn map(src: &[AudioChannel], dst: &[AudioChannel]) -> Result<DownmixMatrix, DownmixError> {
    let table = table_for(dst.len()).ok_or(DownmixError::Unsupported {
        src: src.len(),
        dst: dst.len(),
    })?;

    let mut enabled = vec![vec![false; src.len()]; dst.len()];
    for (s, channel) in src.iter().enumerate() {
        for &d in table(channel.layout) {
            if let Some(row) = enabled.get_mut(d) {
                row[s] = true;
            }
        }
    }
    Ok(DownmixMatrix { enabled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChannelLayout::*;

    fn channels(layouts: &[ChannelLayout]) -> Vec<AudioChannel> {
        layouts
            .iter()
            .enumerate()
            .map(|(i, l)| AudioChannel::new(i as u32, 0, *l))
            .collect()
    }

    fn five_one() -> Vec<AudioChannel> {
        channels(&[Left, Right, Center, Lfe, LeftSurround, RightSurround])
    }

    #[test]
    fn test_five_one_to_stereo() {
        let matrix = map(&five_one(), &channels(&[Left, Right])).unwrap();
        assert_eq!(
            matrix.as_rows(),
            &[
                vec![true, false, true, false, true, false],
                vec![false, true, true, false, false, true],
            ]
        );
    }

    #[test]
    fn test_unsupported_destination_count() {
        let err = map(&five_one(), &channels(&[Left, Right, Center])).unwrap_err();
        assert_eq!(err, DownmixError::Unsupported { src: 6, dst: 3 });

        let err = map(&five_one(), &[]).unwrap_err();
        assert_eq!(err, DownmixError::Unsupported { src: 6, dst: 0 });
    }

    #[test]
    fn test_shape_follows_inputs() {
        for n in 0..8 {
            let src = channels(&vec![Center; n]);
            let matrix = map(&src, &channels(&[Left, Right])).unwrap();
            assert_eq!(matrix.rows(), 2);
            assert_eq!(matrix.as_rows().iter().map(Vec::len).max().unwrap_or(0), n);
        }
    }

    #[test]
    fn test_lfe_contributes_nothing() {
        let matrix = map(&channels(&[Lfe]), &channels(&[Left, Right])).unwrap();
        assert!(!matrix.is_enabled(0, 0));
        assert!(!matrix.is_enabled(1, 0));
    }

    #[test]
    fn test_deterministic() {
        let dst = channels(&[Left, Right]);
        let first = map(&five_one(), &dst).unwrap();
        for _ in 0..10 {
            assert_eq!(map(&five_one(), &dst).unwrap(), first);
        }
    }

    #[test]
    fn test_pan_filter() {
        let matrix = map(&five_one(), &channels(&[Left, Right])).unwrap();
        assert_eq!(
            matrix.pan_filter(),
            "pan=stereo|c0=c0+c2+c4|c1=c1+c2+c5"
        );

        let swapped = matrix.pan_filter_with(|s| 5 - s);
        assert_eq!(swapped, "pan=stereo|c0=c5+c3+c1|c1=c4+c3+c0");

        let silent = map(&channels(&[Lfe]), &channels(&[Left, Right])).unwrap();
        assert_eq!(silent.pan_filter(), "pan=stereo|c0=0*c0|c1=0*c0");
    }

    #[test]
    fn test_layout_labels() {
        let channel: AudioChannel =
            serde_json::from_str(r#"{"track_index": 1, "channel_index": 0, "layout": "Ls"}"#)
                .unwrap();
        assert_eq!(channel.layout, LeftSurround);
        assert!(serde_json::from_str::<ChannelLayout>(r#""Cs""#).is_err());
    }
}
