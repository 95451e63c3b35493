use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where raw frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// HTTP `multipart/x-mixed-replace` camera stream.
    Mjpeg,
    /// Single-JPEG endpoint polled at `fps`.
    Snapshot,
    /// Generated moving-square test pattern.
    Synthetic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_source")]
    pub source: SourceKind,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Frames are resized to this width before detection and transform.
    #[serde(default = "default_working_width")]
    pub working_width: u32,
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    /// Warm-up frames fed to the background model before motion is reported.
    #[serde(default = "default_frame_count")]
    pub frame_count: u64,
    #[serde(default = "default_accum_weight")]
    pub accum_weight: f32,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default = "default_min_area")]
    pub min_area: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            url: String::new(),
            fps: default_fps(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            working_width: default_working_width(),
            blur_sigma: default_blur_sigma(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            frame_count: default_frame_count(),
            accum_weight: default_accum_weight(),
            threshold: default_threshold(),
            min_area: default_min_area(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Upper bound on `camera.fps`; keeps the frame interval well above zero.
pub const MAX_FPS: f64 = 1000.0;

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.motion.accum_weight > 0.0 && self.motion.accum_weight <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "motion.accum_weight must be in (0, 1], got {}",
                self.motion.accum_weight
            )));
        }
        if self.pipeline.working_width == 0 {
            return Err(ConfigError::Invalid("pipeline.working_width must be > 0".into()));
        }
        if !(self.pipeline.blur_sigma.is_finite() && self.pipeline.blur_sigma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.blur_sigma must be finite and > 0, got {}",
                self.pipeline.blur_sigma
            )));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "stream.jpeg_quality must be in 1..=100, got {}",
                self.stream.jpeg_quality
            )));
        }
        if self.camera.source != SourceKind::Synthetic && self.camera.url.is_empty() {
            return Err(ConfigError::Invalid(
                "camera.url is required for mjpeg and snapshot sources".into(),
            ));
        }
        if !(self.camera.fps > 0.0 && self.camera.fps <= MAX_FPS) {
            return Err(ConfigError::Invalid(format!(
                "camera.fps must be in (0, {MAX_FPS}], got {}",
                self.camera.fps
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_source() -> SourceKind {
    SourceKind::Synthetic
}
fn default_fps() -> f64 {
    10.0
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_working_width() -> u32 {
    400
}
fn default_blur_sigma() -> f32 {
    1.4
}
fn default_frame_count() -> u64 {
    32
}
fn default_accum_weight() -> f32 {
    0.1
}
fn default_threshold() -> u8 {
    25
}
fn default_min_area() -> u32 {
    50
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_log_level() -> String {
    "info".into()
}
