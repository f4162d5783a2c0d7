//! The seam between the device controller and the capture hardware layer

use thiserror::Error;

use crate::capture::format::{ColorSpace, PixelFormat, TransferFunction, VideoFormat};
use crate::pipeline::ingest::IngestHandle;

/// Error codes reported by the hardware layer alongside frame delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputError {
    #[default]
    NoError,
    IncompatiblePixelFormatAndVideoMode,
    AudioPacketInvalid,
    DeviceAlreadyUsed,
    NoInputSource,
}

/// How serious a reported condition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSeverity {
    Info,
    Warning,
    Error,
}

/// Failure to bring up a capture stream.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("capture device already in use")]
    DeviceAlreadyUsed,

    #[error("no input source detected on the selected connector")]
    NoInputSource,

    #[error("the requested pixel format is incompatible with the video mode")]
    IncompatibleMode,

    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// The input error code surfaced to status consumers.
    pub fn input_error(&self) -> InputError {
        match self {
            Self::DeviceAlreadyUsed => InputError::DeviceAlreadyUsed,
            Self::NoInputSource => InputError::NoInputSource,
            Self::IncompatibleMode => InputError::IncompatiblePixelFormatAndVideoMode,
            Self::Other(_) => InputError::NoError,
        }
    }
}

/// What the device controller asks the hardware for when a stream starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Index of the logical input to open.
    pub device_selection: u32,
    pub pixel_format: PixelFormat,
    pub color_space: ColorSpace,
    pub transfer_function: TransferFunction,
}

/// A push-based frame producer, typically backed by a hardware capture card.
///
/// `start` hands the source an [`IngestHandle`]; from then on the source's own
/// delivery thread feeds frames through it until `stop`. The handle carries
/// the queue lock, so delivery and presentation can never race.
pub trait CaptureSource: Send {
    /// Starts delivery and returns the negotiated stream format.
    fn start(
        &mut self,
        request: &CaptureRequest,
        ingest: IngestHandle,
    ) -> Result<VideoFormat, SourceError>;

    /// Stops delivery. Must not return while a delivery callback is running.
    fn stop(&mut self);

    /// Whether a signal is present on the selected input.
    fn has_input_source(&self) -> bool {
        true
    }
}
