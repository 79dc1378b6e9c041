use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TimelapserConfig {
    pub printer: PrinterConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub video: VideoConfig,
    pub control: ControlConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrinterConfig {
    /// Printer (MQTT broker) host name or IP address
    #[serde(default = "default_printer_host")]
    pub host: String,

    /// MQTT broker port
    #[serde(default = "default_printer_port")]
    pub port: u16,

    /// Printer serial number, used to build the report topic
    #[serde(default = "default_printer_serial")]
    pub serial: String,

    /// LAN access code, used as the MQTT password
    #[serde(default = "default_access_code")]
    pub access_code: String,

    /// MQTT user name
    #[serde(default = "default_printer_username")]
    pub username: String,

    /// Connect over TLS (the printer presents a self-signed certificate)
    #[serde(default = "default_printer_tls")]
    pub tls: bool,

    /// MQTT keep-alive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Delay before polling again after a connection error
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Request channel capacity of the MQTT client
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// RTSP stream URL
    #[serde(default = "default_rtsp_url")]
    pub rtsp_url: String,

    /// RTSP lower transport (tcp, udp)
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Socket I/O timeout in seconds
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,

    /// Per-grab timeout of the preview loop
    #[serde(default = "default_grab_timeout_ms")]
    pub grab_timeout_ms: u64,

    /// Delay before the preview loop reopens the stream
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Overall budget of a fallback still capture (connect + grab)
    #[serde(default = "default_still_timeout_ms")]
    pub still_timeout_ms: u64,

    /// JPEG quality of captured frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Directory holding the numbered frames of the running job
    #[serde(default = "default_frames_dir")]
    pub frames_dir: String,

    /// Directory receiving finished videos
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Delay between observing job completion and the final capture
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Number of candidate output names tried before giving up
    #[serde(default = "default_max_name_attempts")]
    pub max_name_attempts: u32,

    /// Overwrite the base output name once every suffix is taken
    #[serde(default = "default_overwrite_when_exhausted")]
    pub overwrite_when_exhausted: bool,

    /// Start capturing automatically when the printer reports layer 0
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VideoConfig {
    /// Encoder program followed by any leading arguments (e.g. ["nice", "ffmpeg"])
    #[serde(default = "default_encoder_command")]
    pub encoder_command: Vec<String>,

    /// Frame rate of the numbered frame sequence and of the output
    #[serde(default = "default_source_fps")]
    pub source_fps: u32,

    /// Rendered duration of the timelapse segment
    #[serde(default = "default_target_duration_secs")]
    pub target_duration_secs: f64,

    /// Duration of the held last frame
    #[serde(default = "default_hold_duration_secs")]
    pub hold_duration_secs: f64,

    /// Video codec passed to the encoder
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Output pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControlConfig {
    /// Serve the HTTP control surface
    #[serde(default = "default_control_enabled")]
    pub enabled: bool,

    /// IP address to bind to
    #[serde(default = "default_control_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_control_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl TimelapserConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("timelapser.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("printer.host", default_printer_host())?
            .set_default("printer.port", default_printer_port())?
            .set_default("printer.serial", default_printer_serial())?
            .set_default("printer.access_code", default_access_code())?
            .set_default("printer.username", default_printer_username())?
            .set_default("printer.tls", default_printer_tls())?
            .set_default("printer.keep_alive_secs", default_keep_alive_secs())?
            .set_default("printer.reconnect_delay_ms", default_reconnect_delay_ms())?
            .set_default(
                "printer.channel_capacity",
                default_channel_capacity() as i64,
            )?
            .set_default("camera.rtsp_url", default_rtsp_url())?
            .set_default("camera.transport", default_transport())?
            .set_default("camera.io_timeout_secs", default_io_timeout_secs())?
            .set_default("camera.grab_timeout_ms", default_grab_timeout_ms())?
            .set_default("camera.reconnect_backoff_ms", default_reconnect_backoff_ms())?
            .set_default("camera.still_timeout_ms", default_still_timeout_ms())?
            .set_default("camera.jpeg_quality", default_jpeg_quality())?
            .set_default("capture.frames_dir", default_frames_dir())?
            .set_default("capture.output_dir", default_output_dir())?
            .set_default("capture.grace_period_secs", default_grace_period_secs())?
            .set_default("capture.max_name_attempts", default_max_name_attempts())?
            .set_default(
                "capture.overwrite_when_exhausted",
                default_overwrite_when_exhausted(),
            )?
            .set_default("capture.auto_start", default_auto_start())?
            .set_default("video.encoder_command", default_encoder_command())?
            .set_default("video.source_fps", default_source_fps())?
            .set_default("video.target_duration_secs", default_target_duration_secs())?
            .set_default("video.hold_duration_secs", default_hold_duration_secs())?
            .set_default("video.codec", default_codec())?
            .set_default("video.pixel_format", default_pixel_format())?
            .set_default("control.enabled", default_control_enabled())?
            .set_default("control.ip", default_control_ip())?
            .set_default("control.port", default_control_port())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // TIMELAPSER__CAMERA__RTSP_URL style overrides; field names contain underscores
            .add_source(Environment::with_prefix("TIMELAPSER").separator("__"))
            .build()?;

        let config: TimelapserConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config.redacted());

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.printer.serial.trim().is_empty() {
            return Err(ConfigError::Message(
                "Printer serial must not be empty".to_string(),
            ));
        }

        if self.camera.rtsp_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Camera rtsp_url must not be empty".to_string(),
            ));
        }

        if self.camera.grab_timeout_ms == 0
            || self.camera.still_timeout_ms == 0
            || self.camera.io_timeout_secs == 0
        {
            return Err(ConfigError::Message(
                "Camera timeouts must be greater than 0".to_string(),
            ));
        }

        // Zero would spin reconnects against an unreachable camera
        if self.camera.reconnect_backoff_ms == 0 {
            return Err(ConfigError::Message(
                "Camera reconnect_backoff_ms must be greater than 0".to_string(),
            ));
        }

        if self.camera.jpeg_quality == 0 || self.camera.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Camera jpeg_quality must be within 1..=100".to_string(),
            ));
        }

        if self.capture.max_name_attempts == 0 {
            return Err(ConfigError::Message(
                "Capture max_name_attempts must be greater than 0".to_string(),
            ));
        }

        if self.video.encoder_command.is_empty() {
            return Err(ConfigError::Message(
                "Video encoder_command must name a program".to_string(),
            ));
        }

        if self.video.source_fps == 0 {
            return Err(ConfigError::Message(
                "Video source_fps must be greater than 0".to_string(),
            ));
        }

        if !(self.video.target_duration_secs > 0.0) || !(self.video.hold_duration_secs > 0.0) {
            return Err(ConfigError::Message(
                "Video durations must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Copy with the access code masked, for logging
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.printer.access_code.is_empty() {
            copy.printer.access_code = "********".to_string();
        }
        copy
    }
}

impl PrinterConfig {
    /// Topic the printer publishes its status reports on
    pub fn report_topic(&self) -> String {
        format!("device/{}/report", self.serial)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl CameraConfig {
    pub fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.grab_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn still_timeout(&self) -> Duration {
        Duration::from_millis(self.still_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

impl CaptureConfig {
    pub fn frames_path(&self) -> PathBuf {
        PathBuf::from(&self.frames_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for TimelapserConfig {
    fn default() -> Self {
        Self {
            printer: PrinterConfig {
                host: default_printer_host(),
                port: default_printer_port(),
                serial: default_printer_serial(),
                access_code: default_access_code(),
                username: default_printer_username(),
                tls: default_printer_tls(),
                keep_alive_secs: default_keep_alive_secs(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
                channel_capacity: default_channel_capacity(),
            },
            camera: CameraConfig {
                rtsp_url: default_rtsp_url(),
                transport: default_transport(),
                io_timeout_secs: default_io_timeout_secs(),
                grab_timeout_ms: default_grab_timeout_ms(),
                reconnect_backoff_ms: default_reconnect_backoff_ms(),
                still_timeout_ms: default_still_timeout_ms(),
                jpeg_quality: default_jpeg_quality(),
            },
            capture: CaptureConfig {
                frames_dir: default_frames_dir(),
                output_dir: default_output_dir(),
                grace_period_secs: default_grace_period_secs(),
                max_name_attempts: default_max_name_attempts(),
                overwrite_when_exhausted: default_overwrite_when_exhausted(),
                auto_start: default_auto_start(),
            },
            video: VideoConfig {
                encoder_command: default_encoder_command(),
                source_fps: default_source_fps(),
                target_duration_secs: default_target_duration_secs(),
                hold_duration_secs: default_hold_duration_secs(),
                codec: default_codec(),
                pixel_format: default_pixel_format(),
            },
            control: ControlConfig {
                enabled: default_control_enabled(),
                ip: default_control_ip(),
                port: default_control_port(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_printer_host() -> String {
    "192.168.0.1".to_string()
}
fn default_printer_port() -> u16 {
    8883
}
fn default_printer_serial() -> String {
    "SERIAL".to_string()
}
fn default_access_code() -> String {
    String::new()
}
fn default_printer_username() -> String {
    "bblp".to_string()
}
fn default_printer_tls() -> bool {
    true
}
fn default_keep_alive_secs() -> u64 {
    30
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}
fn default_channel_capacity() -> usize {
    64
}

fn default_rtsp_url() -> String {
    "rtsp://192.168.0.2:554/ch0".to_string()
}
fn default_transport() -> String {
    "tcp".to_string()
}
fn default_io_timeout_secs() -> u64 {
    5
}
fn default_grab_timeout_ms() -> u64 {
    2000
}
fn default_reconnect_backoff_ms() -> u64 {
    300
}
fn default_still_timeout_ms() -> u64 {
    6000
}
fn default_jpeg_quality() -> u32 {
    90
}

fn default_frames_dir() -> String {
    "frames".to_string()
}
fn default_output_dir() -> String {
    "output".to_string()
}
fn default_grace_period_secs() -> u64 {
    5
}
fn default_max_name_attempts() -> u32 {
    1000
}
fn default_overwrite_when_exhausted() -> bool {
    false
}
fn default_auto_start() -> bool {
    true
}

fn default_encoder_command() -> Vec<String> {
    vec!["ffmpeg".to_string()]
}
fn default_source_fps() -> u32 {
    30
}
fn default_target_duration_secs() -> f64 {
    5.0
}
fn default_hold_duration_secs() -> f64 {
    5.0
}
fn default_codec() -> String {
    "libx264".to_string()
}
fn default_pixel_format() -> String {
    "yuv420p".to_string()
}

fn default_control_enabled() -> bool {
    true
}
fn default_control_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_control_port() -> u16 {
    9090
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TimelapserConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.printer.report_topic(), "device/SERIAL/report");
        assert_eq!(config.camera.grab_timeout(), Duration::from_secs(2));
        assert_eq!(config.camera.reconnect_backoff(), Duration::from_millis(300));
        assert_eq!(config.camera.still_timeout(), Duration::from_secs(6));
        assert_eq!(config.video.source_fps, 30);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[printer]
serial = "01S00C123456789"
access_code = "12345678"

[camera]
rtsp_url = "rtsp://camera.local:554/ch0"

[capture]
grace_period_secs = 20
"#
        )
        .unwrap();

        let config = TimelapserConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.printer.serial, "01S00C123456789");
        assert_eq!(config.camera.rtsp_url, "rtsp://camera.local:554/ch0");
        assert_eq!(config.capture.grace_period(), Duration::from_secs(20));
        // Untouched keys keep their defaults
        assert_eq!(config.printer.port, 8883);
        assert_eq!(config.video.encoder_command, vec!["ffmpeg".to_string()]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TimelapserConfig::default();
        config.video.source_fps = 0;
        assert!(config.validate().is_err());

        config.video.source_fps = 30;
        config.video.encoder_command.clear();
        assert!(config.validate().is_err());

        config.video.encoder_command = vec!["ffmpeg".to_string()];
        config.camera.rtsp_url = "  ".to_string();
        assert!(config.validate().is_err());

        config.camera.rtsp_url = "rtsp://camera.local/ch0".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_camera_timing_must_be_nonzero() {
        let mut config = TimelapserConfig::default();
        config.camera.io_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.camera.io_timeout_secs = 5;
        config.camera.reconnect_backoff_ms = 0;
        assert!(config.validate().is_err());

        config.camera.reconnect_backoff_ms = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redacted_masks_access_code() {
        let mut config = TimelapserConfig::default();
        config.printer.access_code = "secret".to_string();

        let redacted = config.redacted();
        assert_eq!(redacted.printer.access_code, "********");
        assert_eq!(config.printer.access_code, "secret");
    }
}
