//! Bridge configuration.
//!
//! [`BridgeConfig`] is the JSON configuration file; it splits into the
//! per-component configs ([`StreamConfig`], [`LivenessConfig`],
//! [`PipelineConfig`]). Every field has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use onvif_liveness::LivenessConfig;
use onvif_stream::StreamConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::template::TemplateRule;

pub const DEFAULT_TOPIC_PREFIX: &str = "onvif2mqtt";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "fatal"];

/// Settings of the [`NotificationPipeline`](crate::NotificationPipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// First topic segment of every outbound message
    /// Default: "onvif2mqtt"
    pub topic_prefix: String,

    /// Clock skew beyond which a Desynchronization event is published first
    /// Default: 1 hour
    pub desync_threshold: Duration,

    /// User templates, applied to every event in order
    pub templates: Vec<TemplateRule>,

    /// Also publish to `{prefix}/{device}/{eventType}`
    /// Default: true
    pub default_topics: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            desync_threshold: Duration::from_secs(60 * 60),
            templates: Vec::new(),
            default_topics: true,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic_prefix.is_empty() {
            return Err(ConfigError::EmptyTopicPrefix);
        }
        if self.desync_threshold.is_zero() {
            return Err(ConfigError::ZeroDuration("timing.desyncThreshold"));
        }
        if let Some(index) = self.templates.iter().position(|rule| rule.subtopic.is_empty()) {
            return Err(ConfigError::MissingSubtopic(index));
        }
        Ok(())
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn with_desync_threshold(mut self, threshold: Duration) -> Self {
        self.desync_threshold = threshold;
        self
    }

    pub fn with_templates(mut self, templates: Vec<TemplateRule>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_default_topics(mut self, enabled: bool) -> Self {
        self.default_topics = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub templates: Vec<TemplateRule>,
}

/// All durations, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    pub reconnect: u64,
    pub silence: u64,
    pub subscribe_jitter: u64,
    pub probe_interval: u64,
    pub connect_timeout: u64,
    pub desync_threshold: u64,
    pub heartbeat_interval: u64,
    pub roster_poll: u64,
    pub shutdown_timeout: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect: 10,
            silence: 24 * 60 * 60,
            subscribe_jitter: 5,
            probe_interval: 10,
            connect_timeout: 2,
            desync_threshold: 60 * 60,
            heartbeat_interval: 30,
            roster_poll: 5,
            shutdown_timeout: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Key prefix, `{prefix}:total` etc.
    pub prefix: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_TOPIC_PREFIX.to_string(),
        }
    }
}

/// The configuration file.
///
/// ```json
/// {
///   "log": "info",
///   "onvifDevicesJson": "/config/devices.json",
///   "api": { "templates": [{ "subtopic": "alarm", "template": "${eventState}", "retain": false }] },
///   "timing": { "silence": 3600 }
/// }
/// ```
///
/// Keys not listed here (e.g. the bus connection settings) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub log: String,
    pub topic_prefix: String,
    /// Inline roster, used when `onvifDevicesJson` is absent
    pub onvif: Option<Value>,
    /// Roster file, watched for changes
    pub onvif_devices_json: Option<PathBuf>,
    pub api: ApiConfig,
    pub timing: TimingConfig,
    pub heartbeat: HeartbeatConfig,
    pub default_topics: bool,
    pub event_buffer_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log: "info".to_string(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            onvif: None,
            onvif_devices_json: None,
            api: ApiConfig::default(),
            timing: TimingConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            default_topics: true,
            event_buffer_size: 1000,
        }
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log.clone()));
        }

        let timing = &self.timing;
        let positive = [
            (timing.reconnect, "timing.reconnect"),
            (timing.silence, "timing.silence"),
            (timing.probe_interval, "timing.probeInterval"),
            (timing.connect_timeout, "timing.connectTimeout"),
            (timing.heartbeat_interval, "timing.heartbeatInterval"),
            (timing.roster_poll, "timing.rosterPoll"),
            (timing.shutdown_timeout, "timing.shutdownTimeout"),
        ];
        if let Some((_, name)) = positive.iter().find(|(secs, _)| *secs == 0) {
            return Err(ConfigError::ZeroDuration(*name));
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::ZeroDuration("eventBufferSize"));
        }

        self.pipeline_config().validate()?;
        self.stream_config().validate()?;
        self.liveness_config().validate()?;
        Ok(())
    }

    pub fn with_templates(mut self, templates: Vec<TemplateRule>) -> Self {
        self.api.templates = templates;
        self
    }

    pub fn with_roster_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.onvif_devices_json = Some(path.into());
        self
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::default()
            .with_default_reconnect(Duration::from_secs(self.timing.reconnect))
            .with_silence_window(Duration::from_secs(self.timing.silence))
            .with_subscribe_jitter(Duration::from_secs(self.timing.subscribe_jitter))
            .with_shutdown_timeout(self.shutdown_timeout())
    }

    pub fn liveness_config(&self) -> LivenessConfig {
        LivenessConfig::default()
            .with_probe_interval(Duration::from_secs(self.timing.probe_interval))
            .with_connect_timeout(Duration::from_secs(self.timing.connect_timeout))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_topic_prefix(self.topic_prefix.clone())
            .with_desync_threshold(Duration::from_secs(self.timing.desync_threshold))
            .with_templates(self.api.templates.clone())
            .with_default_topics(self.default_topics)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.timing.heartbeat_interval)
    }

    pub fn roster_poll_interval(&self) -> Duration {
        Duration::from_secs(self.timing.roster_poll)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.shutdown_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.topic_prefix, "onvif2mqtt");
        assert_eq!(config.heartbeat.prefix, "onvif2mqtt");

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.desync_threshold, Duration::from_secs(3600));
        assert!(pipeline.default_topics);

        let stream = config.stream_config();
        assert_eq!(stream.silence_window, Duration::from_secs(86_400));
        assert_eq!(stream.default_reconnect, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_full_document() {
        let config = BridgeConfig::from_json(
            r#"{
                "log": "debug",
                "mqtt": { "host": "broker", "port": 1883 },
                "onvif": [{ "name": "porch", "hostname": "10.0.0.2", "port": 80 }],
                "api": {
                    "templates": [
                        { "subtopic": "${eventType}/raw", "template": "${eventState}", "retain": false },
                        { "subtopic": "last" }
                    ]
                },
                "timing": { "silence": 600, "probeInterval": 30 },
                "heartbeat": { "prefix": "cams" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.log, "debug");
        assert!(config.onvif.is_some());
        assert_eq!(config.api.templates.len(), 2);
        assert!(!config.api.templates[0].retain);
        assert!(config.api.templates[1].retain);
        assert_eq!(config.timing.silence, 600);
        assert_eq!(config.timing.reconnect, 10);
        assert_eq!(config.liveness_config().probe_interval, Duration::from_secs(30));
        assert_eq!(config.heartbeat.prefix, "cams");
    }

    #[test]
    fn test_fatal_log_level_is_accepted() {
        let config = BridgeConfig::from_json(r#"{"log": "fatal"}"#).unwrap();
        assert_eq!(config.log, "fatal");
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            BridgeConfig::from_json(r#"{"log": "verbose"}"#),
            Err(ConfigError::InvalidLogLevel(_))
        ));
        assert!(matches!(
            BridgeConfig::from_json(r#"{"timing": {"probeInterval": 0}}"#),
            Err(ConfigError::ZeroDuration("timing.probeInterval"))
        ));
        assert!(matches!(
            BridgeConfig::from_json(r#"{"api": {"templates": [{"template": "x"}]}}"#),
            Err(ConfigError::MissingSubtopic(0))
        ));
        assert!(matches!(
            BridgeConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"onvifDevicesJson": "/config/devices.json"}}"#).unwrap();

        let config = BridgeConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.onvif_devices_json.as_deref(),
            Some(Path::new("/config/devices.json"))
        );

        assert!(matches!(
            BridgeConfig::from_file("/nonexistent/config.json"),
            Err(ConfigError::Read { .. })
        ));
    }
}
