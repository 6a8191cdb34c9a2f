//! Persistent application configuration model and defaults.

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Audio output and device preferences.
    #[serde(default)]
    pub output: OutputConfig,
    /// Playback preferences.
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Output device and format preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub output_device_name: String,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_channel_count")]
    pub channel_count: u16,
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,
    #[serde(default = "default_true")]
    pub dither_on_bitdepth_reduce: bool,
}

/// Playback preferences persisted between runs.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_device_name: String::new(),
            sample_rate_hz: default_sample_rate_hz(),
            channel_count: default_channel_count(),
            bits_per_sample: default_bits_per_sample(),
            dither_on_bitdepth_reduce: true,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sample_rate_hz() -> u32 {
    44_100
}

fn default_channel_count() -> u16 {
    2
}

fn default_bits_per_sample() -> u16 {
    24
}

fn default_volume() -> f32 {
    1.0
}

/// Clamps persisted values into supported ranges.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        output: OutputConfig {
            output_device_name: config.output.output_device_name,
            sample_rate_hz: config.output.sample_rate_hz.clamp(8_000, 192_000),
            channel_count: config.output.channel_count.clamp(1, 8),
            bits_per_sample: config.output.bits_per_sample.clamp(8, 32),
            dither_on_bitdepth_reduce: config.output.dither_on_bitdepth_reduce,
        },
        playback: PlaybackConfig {
            volume: config.playback.volume.clamp(0.0, 2.0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_survives_sanitization_unchanged() {
        let config = Config::default();
        assert_eq!(sanitize_config(config.clone()), config);
    }

    #[test]
    fn test_sanitize_clamps_out_of_range_values() {
        let config = Config {
            output: OutputConfig {
                output_device_name: "USB DAC".to_string(),
                sample_rate_hz: 1_000_000,
                channel_count: 0,
                bits_per_sample: 64,
                dither_on_bitdepth_reduce: false,
            },
            playback: PlaybackConfig { volume: -3.0 },
        };
        let sanitized = sanitize_config(config);
        assert_eq!(sanitized.output.sample_rate_hz, 192_000);
        assert_eq!(sanitized.output.channel_count, 1);
        assert_eq!(sanitized.output.bits_per_sample, 32);
        assert_eq!(sanitized.output.output_device_name, "USB DAC");
        assert_eq!(sanitized.playback.volume, 0.0);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let config = Config {
            output: OutputConfig {
                sample_rate_hz: 7,
                ..OutputConfig::default()
            },
            playback: PlaybackConfig { volume: 9.0 },
        };
        let once = sanitize_config(config);
        assert_eq!(sanitize_config(once.clone()), once);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[output]\nsample_rate_hz = 48000\n")
            .expect("partial config should parse");
        assert_eq!(config.output.sample_rate_hz, 48_000);
        assert_eq!(config.output.channel_count, 2);
        assert!(config.output.dither_on_bitdepth_reduce);
        assert_eq!(config.playback.volume, 1.0);
    }
}
