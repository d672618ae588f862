//! Configuration system using Figment.
//!
//! This module provides strongly-typed configuration loading for the trigger
//! sequencing system. Configuration is loaded from:
//! 1. A TOML file (base configuration)
//! 2. Environment variables (prefixed with `BEAMLINE_DAQ_`)
//!
//! Everything that used to be a module-level constant in older control-system
//! code lives here instead: the encoder scale, trigger safety buffer, cutoff
//! leeway, poll interval and timeouts are all injected into the components
//! that need them, so tests can vary them without touching process state.
//!
//! # Example
//! ```no_run
//! use beamline_daq::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load_from("config/beamline.toml")?;
//! println!("Encoder scale: {} counts/mm", settings.encoder.counts_per_mm);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level settings for the trigger sequencing system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationSettings,
    /// Encoder hardware constants
    #[serde(default)]
    pub encoder: EncoderSettings,
    /// Timing translation tunables
    #[serde(default)]
    pub timing: TimingSettings,
    /// Sequencer table tunables
    #[serde(default)]
    pub sequencer: SequencerSettings,
    /// Device I/O layer tunables
    #[serde(default)]
    pub io: IoSettings,
    /// Arm/disarm controller tunables
    #[serde(default)]
    pub arming: ArmingSettings,
    /// Beam-refill admission tunables
    #[serde(default)]
    pub admission: AdmissionSettings,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Encoder hardware constants.
///
/// The encoder scale is fixed by the axis hardware and enters every position
/// threshold written to a trigger controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Encoder resolution of the sweep axis in counts per millimetre
    #[serde(default = "default_counts_per_mm")]
    pub counts_per_mm: i64,
}

/// Tunables consumed by the timing translator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Extra slack added to each trigger period beyond the exposure time,
    /// covering controller-internal latency. The effective slack per period
    /// is the larger of this and the detector dead time.
    #[serde(default = "default_trigger_safety_buffer_s")]
    pub trigger_safety_buffer_s: f64,
    /// Time the sweep axis needs to reach constant velocity
    #[serde(default = "default_accel_ramp_time_s")]
    pub accel_ramp_time_s: f64,
    /// Time the fast shutter needs to open fully
    #[serde(default = "default_shutter_opening_time_s")]
    pub shutter_opening_time_s: f64,
}

/// Tunables consumed by the sequencer table builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerSettings {
    /// Sequencer clock rate in Hz (sets the size of one hold tick)
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u64,
    /// Cutoff leeway as a fraction of the step size, applied symmetrically
    /// to both cutoff rows. Absorbs encoder jitter at the row ends; the
    /// right value depends on encoder resolution, hence a tunable.
    #[serde(default = "default_leeway_fraction")]
    pub leeway_fraction: f64,
}

/// Tunables for the device I/O layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoSettings {
    /// Bound on waiting for a group of setup writes to complete
    #[serde(with = "humantime_serde", default = "default_group_timeout")]
    pub group_timeout: Duration,
}

/// Tunables consumed by the arm/disarm controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmingSettings {
    /// Interval between "armed" read-back polls
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Default bound on waiting for arm confirmation
    #[serde(with = "humantime_serde", default = "default_arm_timeout")]
    pub arm_timeout: Duration,
    /// Default bound on waiting for disarm confirmation
    #[serde(with = "humantime_serde", default = "default_arm_timeout")]
    pub disarm_timeout: Duration,
}

/// Tunables for the beam-refill admission gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionSettings {
    /// Safety margin added to the planned exposure when checking the refill
    /// countdown
    #[serde(with = "humantime_serde", default = "default_admission_margin")]
    pub margin: Duration,
    /// Machine refill period (reference provider only)
    #[serde(with = "humantime_serde", default = "default_topup_period")]
    pub topup_period: Duration,
    /// Duration of one refill event (reference provider only)
    #[serde(with = "humantime_serde", default = "default_topup_duration")]
    pub topup_duration: Duration,
}

// Default value functions

fn default_app_name() -> String {
    "beamline_daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_counts_per_mm() -> i64 {
    200_000
}

fn default_trigger_safety_buffer_s() -> f64 {
    1e-6
}

fn default_accel_ramp_time_s() -> f64 {
    0.1
}

fn default_shutter_opening_time_s() -> f64 {
    0.06
}

fn default_tick_hz() -> u64 {
    125_000_000
}

fn default_leeway_fraction() -> f64 {
    0.5
}

fn default_group_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_arm_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_admission_margin() -> Duration {
    Duration::from_secs(5)
}

fn default_topup_period() -> Duration {
    Duration::from_secs(600)
}

fn default_topup_duration() -> Duration {
    Duration::from_secs(15)
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            counts_per_mm: default_counts_per_mm(),
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            trigger_safety_buffer_s: default_trigger_safety_buffer_s(),
            accel_ramp_time_s: default_accel_ramp_time_s(),
            shutter_opening_time_s: default_shutter_opening_time_s(),
        }
    }
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            leeway_fraction: default_leeway_fraction(),
        }
    }
}

impl Default for IoSettings {
    fn default() -> Self {
        Self {
            group_timeout: default_group_timeout(),
        }
    }
}

impl Default for ArmingSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            arm_timeout: default_arm_timeout(),
            disarm_timeout: default_arm_timeout(),
        }
    }
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            margin: default_admission_margin(),
            topup_period: default_topup_period(),
            topup_duration: default_topup_duration(),
        }
    }
}

impl Settings {
    /// Load configuration from the default file and environment variables.
    ///
    /// Environment variables can override configuration with prefix
    /// `BEAMLINE_DAQ_` and `__` as the section separator, e.g.
    /// `BEAMLINE_DAQ_ENCODER__COUNTS_PER_MM=100000`.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("config/beamline.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error: defaults apply, and the environment
    /// can still override them.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BEAMLINE_DAQ_").split("__"))
            .extract()
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.encoder.counts_per_mm <= 0 {
            return Err("encoder.counts_per_mm must be positive".to_string());
        }

        if self.sequencer.tick_hz == 0 {
            return Err("sequencer.tick_hz must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.sequencer.leeway_fraction)
            || self.sequencer.leeway_fraction == 0.0
        {
            return Err(format!(
                "sequencer.leeway_fraction must be in (0, 1], got {}",
                self.sequencer.leeway_fraction
            ));
        }

        if self.timing.trigger_safety_buffer_s < 0.0 {
            return Err("timing.trigger_safety_buffer_s must be non-negative".to_string());
        }

        if self.admission.topup_duration >= self.admission.topup_period {
            return Err(format!(
                "admission.topup_duration ({:?}) must be shorter than topup_period ({:?})",
                self.admission.topup_duration, self.admission.topup_period
            ));
        }

        Ok(())
    }
}
