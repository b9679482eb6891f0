//! # Configuration
//!
//! Settings that are usually chosen per application rather than per object. Everything else is configured
//! through the builders of the individual wrappers (like [InstanceBuilder](crate::context::InstanceBuilder) or
//! [SwapchainBuilder](crate::swapchain::SwapchainBuilder)).
//!
//! A config can be loaded from a TOML file. Missing fields fall back to their defaults:
//!
//! ```toml
//! application_name = "my app"
//! validation = true
//! frames_in_flight = 2
//! present_modes = ["Mailbox", "Fifo"]
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//! ```

use std::path::Path;

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

///Present modes that can be requested from the config. Maps 1:1 to [vk::PresentModeKHR].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

impl From<PresentMode> for vk::PresentModeKHR {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

///Surface format the swapchain should prefer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceFormat {
    ///`B8G8R8A8_SRGB` with `SRGB_NONLINEAR` color space.
    Bgra8Srgb,
    ///`B8G8R8A8_UNORM` with `SRGB_NONLINEAR` color space.
    Bgra8Unorm,
    ///`R8G8B8A8_SRGB` with `SRGB_NONLINEAR` color space.
    Rgba8Srgb,
}

impl From<SurfaceFormat> for vk::SurfaceFormatKHR {
    fn from(format: SurfaceFormat) -> Self {
        let format = match format {
            SurfaceFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            SurfaceFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            SurfaceFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        };
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub application_name: String,
    ///Enables `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
    ///Also forwards info and verbose validation messages.
    pub verbose_validation: bool,
    ///How many frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    ///Ordered present mode preference. FIFO is used if none of them is supported.
    pub present_modes: Vec<PresentMode>,
    pub surface_format: SurfaceFormat,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            application_name: String::from("ashlar"),
            validation: cfg!(debug_assertions),
            verbose_validation: false,
            frames_in_flight: 2,
            present_modes: vec![PresentMode::Mailbox, PresentMode::Fifo],
            surface_format: SurfaceFormat::Bgra8Srgb,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RendererConfig {
    ///Loads the config from `path`. Only `.toml` files are understood.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    ///Frames in flight, never less than one.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.max(1)
    }

    pub fn present_mode_preference(&self) -> Vec<vk::PresentModeKHR> {
        self.present_modes.iter().map(|m| (*m).into()).collect()
    }

    pub fn clear_value(&self) -> vk::ClearValue {
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, RendererConfig::default());
        assert_eq!(cfg.frames_in_flight(), 2);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let cfg = RendererConfig::from_toml_str(
            r#"
            application_name = "triangle"
            validation = false
            frames_in_flight = 3
            present_modes = ["Immediate", "Fifo"]
            surface_format = "Bgra8Unorm"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.application_name, "triangle");
        assert!(!cfg.validation);
        assert_eq!(cfg.frames_in_flight(), 3);
        assert_eq!(
            cfg.present_mode_preference(),
            vec![vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]
        );
        assert_eq!(
            vk::SurfaceFormatKHR::from(cfg.surface_format).format,
            vk::Format::B8G8R8A8_UNORM
        );
        assert_eq!(cfg.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        let cfg = RendererConfig::from_toml_str("frames_in_flight = 0").unwrap();
        assert_eq!(cfg.frames_in_flight(), 1);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err = RendererConfig::from_toml_str("frames_in_flight = \"two\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_non_toml_paths() {
        let err = RendererConfig::load_from_file("settings.ron").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn roundtrips_through_file() {
        let path = std::env::temp_dir().join(format!("ashlar-config-{}.toml", std::process::id()));
        let cfg = RendererConfig {
            application_name: String::from("roundtrip"),
            clear_color: [0.25, 0.5, 0.75, 1.0],
            ..Default::default()
        };
        cfg.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, cfg);
    }
}
