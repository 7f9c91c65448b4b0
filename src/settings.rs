use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::BufferUsage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreSettings {
    /// Hint passed to the device for every vertex, index and uniform buffer.
    #[serde(default)]
    pub buffer_usage: BufferUsage,
    /// Defines added to every shader variant.
    #[serde(default)]
    pub program_defines: BTreeMap<String, String>,
    /// Frames a replaced buffer is kept before it may be released.
    #[serde(default = "CoreSettings::default_release_delay_frames")]
    pub release_delay_frames: u32,
    #[serde(default = "CoreSettings::default_suppress_repeated_diagnostics")]
    pub suppress_repeated_diagnostics: bool,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            buffer_usage: BufferUsage::default(),
            program_defines: BTreeMap::new(),
            release_delay_frames: Self::default_release_delay_frames(),
            suppress_repeated_diagnostics: Self::default_suppress_repeated_diagnostics(),
        }
    }
}

impl CoreSettings {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<CoreSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded core settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default core settings.",
                        path, err
                    );
                    CoreSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Core settings file {:?} not found. Using default settings.", path);
                CoreSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default core settings.",
                    path, err
                );
                CoreSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.release_delay_frames == 0 {
            warn!("Release delay must be at least one frame. Using default value.");
            self.release_delay_frames = Self::default_release_delay_frames();
        }

        let before = self.program_defines.len();
        self.program_defines.retain(|name, _| !name.is_empty() && !name.contains(char::is_whitespace));
        if self.program_defines.len() != before {
            warn!("Dropped {} program defines with invalid names.", before - self.program_defines.len());
        }

        self
    }

    const fn default_release_delay_frames() -> u32 {
        2
    }

    const fn default_suppress_repeated_diagnostics() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let settings: CoreSettings = serde_json::from_str(r#"{ "buffer_usage": "dynamic_draw" }"#).unwrap();
        assert_eq!(settings.buffer_usage, BufferUsage::DynamicDraw);
        assert_eq!(settings.release_delay_frames, 2);
        assert!(settings.suppress_repeated_diagnostics);
    }

    #[test]
    fn validate_repairs_bad_values() {
        let mut settings = CoreSettings {
            release_delay_frames: 0,
            ..CoreSettings::default()
        };
        settings.program_defines.insert("HAS_OVERDRAW".into(), "1".into());
        settings.program_defines.insert("BAD NAME".into(), "1".into());
        let settings = settings.validate();
        assert_eq!(settings.release_delay_frames, 2);
        assert_eq!(settings.program_defines.len(), 1);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = CoreSettings::load_from_path("does/not/exist/core_settings.json");
        assert_eq!(settings, CoreSettings::default());
    }
}
