use std::path::Path;

use serde::Deserialize;

use crate::error::ConvertError;

/// One target encoding specification. Immutable once a run starts.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub video_bitrate: usize,
    pub audio_bitrate: usize,
    pub h264_profile: String,
    pub h264_level: String,
    pub keyframe_interval: u32,
    pub preset: String,
    /// Bandwidth hint for downstream playlist generation. Estimated from
    /// the bitrates when absent.
    #[serde(default)]
    pub bandwidth: Option<u64>,
}

impl Profile {
    pub fn bandwidth(&self) -> u64 {
        self.bandwidth
            .unwrap_or_else(|| (self.video_bitrate + self.audio_bitrate) as u64 * 110 / 100)
    }
}

/// Validated set of output profiles. Built-in ladder or loaded from a
/// JSON file; either way every profile is checked before any pipeline
/// work starts.
pub struct ProfileRegistry {
    profiles: Vec<Profile>,
}

impl ProfileRegistry {
    /// The default three-rung H.264 ABR ladder.
    pub fn builtin() -> Self {
        Self {
            profiles: vec![
                Profile {
                    name: "high".to_string(),
                    width: 1920,
                    height: 1080,
                    video_bitrate: 4_000_000,
                    audio_bitrate: 128_000,
                    h264_profile: "high".to_string(),
                    h264_level: "4.1".to_string(),
                    keyframe_interval: 120,
                    preset: "slow".to_string(),
                    bandwidth: None,
                },
                Profile {
                    name: "medium".to_string(),
                    width: 1280,
                    height: 720,
                    video_bitrate: 2_500_000,
                    audio_bitrate: 96_000,
                    h264_profile: "main".to_string(),
                    h264_level: "3.1".to_string(),
                    keyframe_interval: 120,
                    preset: "medium".to_string(),
                    bandwidth: None,
                },
                Profile {
                    name: "low".to_string(),
                    width: 854,
                    height: 480,
                    video_bitrate: 1_200_000,
                    audio_bitrate: 64_000,
                    h264_profile: "baseline".to_string(),
                    h264_level: "3.0".to_string(),
                    keyframe_interval: 120,
                    preset: "faster".to_string(),
                    bandwidth: None,
                },
            ],
        }
    }

    pub fn new(profiles: Vec<Profile>) -> Result<Self, ConvertError> {
        if profiles.is_empty() {
            return Err(ConvertError::Config("no profiles defined".to_string()));
        }
        for profile in &profiles {
            if profile.name.is_empty() {
                return Err(ConvertError::Config("profile with empty name".to_string()));
            }
            if profile.width == 0 || profile.height == 0 {
                return Err(ConvertError::Config(format!(
                    "profile '{}' has invalid geometry {}x{}",
                    profile.name, profile.width, profile.height
                )));
            }
            if profile.video_bitrate == 0 {
                return Err(ConvertError::Config(format!(
                    "profile '{}' has zero video bitrate",
                    profile.name
                )));
            }
        }
        let mut names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != profiles.len() {
            return Err(ConvertError::Config("duplicate profile names".to_string()));
        }
        Ok(Self { profiles })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConvertError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConvertError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let profiles: Vec<Profile> = serde_json::from_str(&text).map_err(|e| {
            ConvertError::Config(format!("malformed profile file {}: {}", path.display(), e))
        })?;
        Self::new(profiles)
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Resolves a profile selector (`high`, `medium`, `low` or `all`) into
    /// the profiles to encode.
    pub fn select(&self, selector: &str) -> Result<Vec<Profile>, ConvertError> {
        if selector == "all" {
            return Ok(self.profiles.clone());
        }
        match self.profiles.iter().find(|p| p.name == selector) {
            Some(profile) => Ok(vec![profile.clone()]),
            None => {
                let available: Vec<&str> = self.profiles.iter().map(|p| p.name.as_str()).collect();
                Err(ConvertError::Config(format!(
                    "unknown profile: {} (available: {}, all)",
                    selector,
                    available.join(", ")
                )))
            }
        }
    }
}
