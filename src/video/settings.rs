use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::*;

/// Overrides the pixel-shader-version check that decides whether a Direct3D
/// device gets the legacy primitive path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyDetection {
    Default,
    ForceLegacy,
    ForceModern,
}

impl Default for LegacyDetection {
    fn default() -> Self {
        LegacyDetection::Default
    }
}

/// The settings of the video system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    #[serde(alias = "prim_d3d_legacy_detection")]
    pub legacy_detection: LegacyDetection,
    /// Capacity of the transient framebuffer pool of each OpenGL display.
    pub max_fbos: usize,
    /// Bounded wait for device resets and resize acknowledgements.
    pub reset_timeout_ms: u64,
    /// Use the default shader sources without alpha testing.
    pub minimal_default_shader: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        VideoSettings {
            legacy_detection: LegacyDetection::Default,
            max_fbos: 8,
            reset_timeout_ms: 1000,
            minimal_default_shader: false,
        }
    }
}

impl VideoSettings {
    /// Parses settings from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: VideoSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_fbos == 0 {
            return Err(Error::Settings("max_fbos must be at least 1".into()));
        }

        Ok(())
    }

    #[inline]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let settings = VideoSettings::from_json("{}").unwrap();
        assert_eq!(settings, VideoSettings::default());
        assert_eq!(settings.reset_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn legacy_detection_alias() {
        let settings =
            VideoSettings::from_json(r#"{ "prim_d3d_legacy_detection": "force_legacy" }"#)
                .unwrap();
        assert_eq!(settings.legacy_detection, LegacyDetection::ForceLegacy);

        let settings = VideoSettings::from_json(r#"{ "legacy_detection": "force_modern" }"#)
            .unwrap();
        assert_eq!(settings.legacy_detection, LegacyDetection::ForceModern);
    }

    #[test]
    fn rejects_empty_pool() {
        assert!(VideoSettings::from_json(r#"{ "max_fbos": 0 }"#).is_err());
        assert!(VideoSettings::from_json(r#"{ "legacy_detection": "sometimes" }"#).is_err());
    }
}
