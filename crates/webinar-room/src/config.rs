//! Configuration types for a webinar session

use crate::media::{CaptureConstraints, MediaVariant};
use crate::signaling::{Participant, ParticipantRole};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for a [`WebinarSession`](crate::WebinarSession)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// Room to join
    pub room_id: String,

    /// Local participant (role decides createRoom vs joinRoom)
    pub user: Participant,

    /// Local capture constraints
    pub capture: CaptureConfig,

    /// Per-request timeout in milliseconds (default: none, wait forever)
    pub request_timeout_ms: Option<u64>,
}

/// Capture constraints for local media
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Width / height ratio for camera and screen (default: 16/9)
    pub aspect_ratio: f64,

    /// Camera target height (default: 720)
    pub camera_height: u32,

    /// Screen share target height (default: 1080)
    pub screen_height: u32,

    /// Target frame rate (default: 30)
    pub frame_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:3016".to_string(),
            room_id: String::new(),
            user: Participant {
                id: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                role: ParticipantRole::Attendee,
            },
            capture: CaptureConfig::default(),
            request_timeout_ms: None,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: 16.0 / 9.0,
            camera_height: 720,
            screen_height: 1080,
            frame_rate: 30,
        }
    }
}

impl SessionConfig {
    /// Configuration for joining `room_id` as `user`
    pub fn new(signaling_url: &str, room_id: &str, user: Participant) -> Self {
        Self {
            signaling_url: signaling_url.to_string(),
            room_id: room_id.to_string(),
            user,
            ..Self::default()
        }
    }

    /// Set a per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a WebSocket URL
    /// - `room_id` or `user.id` is empty
    /// - `capture.aspect_ratio` is not positive
    /// - a capture height is not in range 120-2160
    /// - `capture.frame_rate` is not in range 1-60
    /// - `request_timeout_ms` is zero
    pub fn validate(&self) -> Result<()> {
        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.room_id.trim().is_empty() {
            return Err(Error::InvalidConfig("room_id is required".to_string()));
        }

        if self.user.id.trim().is_empty() {
            return Err(Error::InvalidConfig("user.id is required".to_string()));
        }

        if !(self.capture.aspect_ratio > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "capture.aspect_ratio must be positive, got {}",
                self.capture.aspect_ratio
            )));
        }

        for (name, height) in [
            ("camera_height", self.capture.camera_height),
            ("screen_height", self.capture.screen_height),
        ] {
            if !(120..=2160).contains(&height) {
                return Err(Error::InvalidConfig(format!(
                    "capture.{} must be in range 120-2160, got {}",
                    name, height
                )));
            }
        }

        if self.capture.frame_rate == 0 || self.capture.frame_rate > 60 {
            return Err(Error::InvalidConfig(format!(
                "capture.frame_rate must be in range 1-60, got {}",
                self.capture.frame_rate
            )));
        }

        if self.request_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Request timeout, if configured
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Capture constraints for a local slot
    pub fn constraints_for(&self, slot: MediaVariant) -> CaptureConstraints {
        let capture = &self.capture;
        match slot {
            MediaVariant::Audio => CaptureConstraints::audio(),
            MediaVariant::Video => CaptureConstraints::video(
                capture.aspect_ratio,
                capture.camera_height,
                capture.frame_rate,
            ),
            MediaVariant::Screen => CaptureConstraints::video(
                capture.aspect_ratio,
                capture.screen_height,
                capture.frame_rate,
            ),
        }
    }
}
