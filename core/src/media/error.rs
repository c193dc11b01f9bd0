//! Camera / microphone acquisition errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Camera and microphone access was denied. Allow access and try again.")]
    PermissionDenied,

    #[error("No camera or microphone was found. Connect a device and try again.")]
    DeviceNotFound,

    #[error("The camera or microphone is already in use by another application.")]
    DeviceBusy,

    #[error("Could not start video chat: {0}")]
    StartFailed(String),
}

impl MediaError {
    /// Map a capture failure by its error name (`NotAllowedError`,
    /// `NotFoundError`, `NotReadableError`, ...).
    pub fn from_name(name: &str, detail: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
                MediaError::PermissionDenied
            }
            "NotFoundError" | "DevicesNotFoundError" => MediaError::DeviceNotFound,
            "NotReadableError" | "TrackStartError" => MediaError::DeviceBusy,
            _ if detail.is_empty() => MediaError::StartFailed(name.to_string()),
            _ => MediaError::StartFailed(detail.to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MediaError::PermissionDenied => "permission-denied",
            MediaError::DeviceNotFound => "device-not-found",
            MediaError::DeviceBusy => "device-busy",
            MediaError::StartFailed(_) => "start-failed",
        }
    }
}

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => MediaError::PermissionDenied,
            std::io::ErrorKind::NotFound => MediaError::DeviceNotFound,
            std::io::ErrorKind::AddrInUse | std::io::ErrorKind::WouldBlock => MediaError::DeviceBusy,
            _ => MediaError::StartFailed(e.to_string()),
        }
    }
}
