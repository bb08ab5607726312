//! Navigator configuration, read from `config.toml` in the platform config
//! directory. A missing file means defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotate::HighlightStyle;
use crate::error::{NavError, Result};
use crate::widget::Rgb;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    pub highlight: HighlightConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Upper bound on waiting for the viewer before a highlight is abandoned.
    pub ready_timeout_ms: u64,
    pub color: Rgb,
    pub opacity: f32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        let style = HighlightStyle::default();
        Self {
            ready_timeout_ms: 10_000,
            color: style.color,
            opacity: style.opacity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Directory or file of the Pdfium shared library. Falls back to the
    /// system library when unset.
    pub pdfium_library_path: Option<PathBuf>,
}

impl NavigatorConfig {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "pdfnav", "pdfnav")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads from the platform config directory, or defaults.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(NavError::Config(format!("{}: {err}", path.display())));
            }
        };
        Self::from_toml(&raw).map_err(|err| match err {
            NavError::Config(msg) => NavError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|err| NavError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| NavError::Config(err.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let opacity = self.highlight.opacity;
        if !(0.0..=1.0).contains(&opacity) {
            return Err(NavError::Config(format!(
                "highlight.opacity must be between 0 and 1, got {opacity}"
            )));
        }
        if self.highlight.ready_timeout_ms == 0 {
            return Err(NavError::Config(
                "highlight.ready_timeout_ms must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.highlight.ready_timeout_ms)
    }

    pub fn highlight_style(&self) -> HighlightStyle {
        HighlightStyle {
            color: self.highlight.color,
            opacity: self.highlight.opacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NavigatorConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, NavigatorConfig::default());
        assert_eq!(config.highlight_style(), HighlightStyle::default());
        assert_eq!(config.ready_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[highlight]\nready_timeout_ms = 2500\ncolor = [255, 0, 0]\n\n[render]\npdfium_library_path = \"/opt/pdfium/lib\"\n",
        )
        .unwrap();

        let config = NavigatorConfig::load(&path).unwrap();
        assert_eq!(config.ready_timeout(), Duration::from_millis(2500));
        assert_eq!(config.highlight.color, Rgb(255, 0, 0));
        assert_eq!(config.highlight.opacity, 0.5);
        assert_eq!(
            config.render.pdfium_library_path,
            Some(PathBuf::from("/opt/pdfium/lib"))
        );
    }

    #[test]
    fn out_of_range_opacity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[highlight]\nopacity = 1.5\n").unwrap();

        let err = NavigatorConfig::load(&path).unwrap_err();
        assert!(matches!(err, NavError::Config(ref msg) if msg.contains("opacity")));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            NavigatorConfig::from_toml("highlight = ["),
            Err(NavError::Config(_))
        ));
    }

    #[test]
    fn written_config_reads_back() {
        let mut config = NavigatorConfig::default();
        config.highlight.ready_timeout_ms = 750;
        let raw = config.to_toml().unwrap();
        assert_eq!(NavigatorConfig::from_toml(&raw).unwrap(), config);
    }
}
