pub mod capture;
pub mod device;
pub mod display;
pub mod pipeline;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use capture::format::{ColorSpace, PixelFormat, TransferFunction};

pub use capture::timecode::{Timecode, FLICKS_PER_SECOND};
pub use device::{DeviceState, InputDevice};
pub use display::{FieldPass, FrameSink, SampleStatus};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub synthetic: SyntheticConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Frames kept in flight between the capture and render clocks.
    pub queue_length: usize,
    pub pixel_format: PixelFormat,
    pub color_space: ColorSpace,
    pub transfer_function: TransferFunction,
    /// Shift applied to externally supplied presentation times, in flicks.
    pub presentation_offset: i64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            queue_length: 3,
            pixel_format: PixelFormat::UseBestQuality,
            color_space: ColorSpace::UseDeviceSignal,
            transfer_function: TransferFunction::UseDeviceSignal,
            presentation_offset: 0,
        }
    }
}

/// Signal produced by the built-in generator when no hardware is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Render loop rate, deliberately decoupled from the capture rate.
    pub render_fps: u32,
    /// Seconds between stats reports.
    pub stats_interval_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            render_fps: 60,
            stats_interval_secs: 1,
        }
    }
}
