use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PresetError {
    #[error("preset name is required")]
    MissingName,
    #[error("preset {0}: container is required")]
    MissingContainer(String),
    #[error("preset {0}: gop size must be positive")]
    InvalidGopSize(String),
    #[error("preset {name}: invalid crop {crop:?}")]
    InvalidCrop { name: String, crop: Crop },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GopUnit {
    #[default]
    Frames,
    Seconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GopMode {
    #[default]
    Variable,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gop {
    pub size: f64,
    #[serde(default)]
    pub unit: GopUnit,
    #[serde(default)]
    pub mode: GopMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hdr10 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_display: Option<String>,
    #[serde(default)]
    pub max_cll: u32,
    #[serde(default)]
    pub max_fall: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    /// Image to burn in.
    pub uri: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// Pixels removed from each edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub bottom: u32,
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub right: u32,
}

impl Crop {
    pub fn is_empty(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }

    /// Pixels removed horizontally, or `None` if the sum overflows.
    pub fn horizontal(&self) -> Option<u32> {
        self.left.checked_add(self.right)
    }

    /// Pixels removed vertically, or `None` if the sum overflows.
    pub fn vertical(&self) -> Option<u32> {
        self.top.checked_add(self.bottom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoPreset {
    pub codec: String,
    /// Zero keeps the aspect ratio against the other dimension.
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Bits per second.
    #[serde(default)]
    pub bitrate: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gop: Option<Gop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hdr10: Option<Hdr10>,
    #[serde(default)]
    pub dolby_vision: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<Overlay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioPreset {
    pub codec: String,
    #[serde(default)]
    pub bitrate: u64,
}

/// Named bundle of codec and container parameters for one output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioPreset>,
}

impl Preset {
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.name.trim().is_empty() {
            return Err(PresetError::MissingName);
        }
        if self.container.trim().is_empty() {
            return Err(PresetError::MissingContainer(self.name.clone()));
        }
        if let Some(video) = &self.video {
            if let Some(gop) = &video.gop {
                if !(gop.size > 0.0) {
                    return Err(PresetError::InvalidGopSize(self.name.clone()));
                }
            }
            if let Some(crop) = video.crop {
                let too_wide = match crop.horizontal() {
                    Some(total) => video.width > 0 && total >= video.width,
                    None => true,
                };
                let too_tall = match crop.vertical() {
                    Some(total) => video.height > 0 && total >= video.height,
                    None => true,
                };
                if too_wide || too_tall {
                    return Err(PresetError::InvalidCrop {
                        name: self.name.clone(),
                        crop,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset() -> Preset {
        Preset {
            name: "720p".to_string(),
            container: "mp4".to_string(),
            video: Some(VideoPreset {
                codec: "h264".to_string(),
                height: 720,
                bitrate: 2_500_000,
                gop: Some(Gop {
                    size: 2.0,
                    unit: GopUnit::Seconds,
                    mode: GopMode::Fixed,
                }),
                ..VideoPreset::default()
            }),
            audio: Some(AudioPreset {
                codec: "aac".to_string(),
                bitrate: 128_000,
            }),
            ..Preset::default()
        }
    }

    #[test]
    fn test_valid_preset() {
        assert_eq!(preset().validate(), Ok(()));
    }

    #[test]
    fn test_missing_name_and_container() {
        let mut p = preset();
        p.name = " ".to_string();
        assert_eq!(p.validate(), Err(PresetError::MissingName));

        let mut p = preset();
        p.container.clear();
        assert_eq!(
            p.validate(),
            Err(PresetError::MissingContainer("720p".to_string()))
        );
    }

    #[test]
    fn test_zero_gop_rejected() {
        let mut p = preset();
        p.video.as_mut().unwrap().gop.as_mut().unwrap().size = 0.0;
        assert!(matches!(p.validate(), Err(PresetError::InvalidGopSize(_))));
    }

    #[test]
    fn test_crop_wider_than_frame_rejected() {
        let mut p = preset();
        let video = p.video.as_mut().unwrap();
        video.width = 1280;
        video.crop = Some(Crop {
            left: 640,
            right: 640,
            ..Crop::default()
        });
        assert!(matches!(p.validate(), Err(PresetError::InvalidCrop { .. })));
    }

    #[test]
    fn test_overflowing_crop_rejected() {
        let mut p = preset();
        let video = p.video.as_mut().unwrap();
        video.width = 1920;
        video.height = 1080;
        video.crop = Some(Crop {
            left: u32::MAX,
            right: 1,
            ..Crop::default()
        });
        assert!(matches!(p.validate(), Err(PresetError::InvalidCrop { .. })));

        // no frame size to compare against, still no panic
        let mut p = preset();
        let video = p.video.as_mut().unwrap();
        video.width = 0;
        video.height = 0;
        video.crop = Some(Crop {
            top: u32::MAX,
            bottom: u32::MAX,
            ..Crop::default()
        });
        assert!(matches!(p.validate(), Err(PresetError::InvalidCrop { .. })));
    }

    #[test]
    fn test_gop_unit_only_accepts_two_values() {
        let ok: Gop = serde_json::from_str(r#"{"size": 48, "unit": "frames"}"#).unwrap();
        assert_eq!(ok.unit, GopUnit::Frames);
        assert_eq!(ok.mode, GopMode::Variable);

        let bad = serde_json::from_str::<Gop>(r#"{"size": 48, "unit": "minutes"}"#);
        assert!(bad.is_err());
    }
}
