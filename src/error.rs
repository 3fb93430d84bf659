//! Error types for the panel control core.

/// Errors that can occur while driving the panel.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    /// An argument or request was out of range or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The panel or its configuration lacks the requested capability.
    #[error("Operation not supported")]
    NotSupported,

    /// A required device (display mode, backlight device, CRTC) is missing.
    #[error("No such device")]
    NoDevice,

    /// A buffer could not be allocated.
    #[error("Out of memory")]
    NoMemory,

    /// The host or the panel did not answer in time.
    #[error("Timed out waiting for {0}")]
    IoTimeout(&'static str),

    /// The request conflicts with the current panel state.
    #[error("Device or resource busy")]
    Busy,

    /// No HBM or notifier range covers the requested brightness.
    #[error("No range matches brightness {0}")]
    NoMatchingRange(u32),

    /// User input could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Linear interpolation was asked to map an inverted range.
    #[error("Invalid interpolation range [{x1}, {x2}] -> [{y1}, {y2}]")]
    InvalidRange {
        /// Source range start.
        x1: u32,
        /// Source range end.
        x2: u32,
        /// Target range start.
        y1: u32,
        /// Target range end.
        y2: u32,
    },

    /// A device-tree property violates a registration invariant.
    #[error("Invalid config `{key}`: {reason}")]
    Config {
        /// The offending property or node name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The DSI host reported a transfer failure.
    #[error("DSI transfer failed (cmd 0x{cmd:02X}): {reason}")]
    Transfer {
        /// The DCS command byte of the failed message.
        cmd: u8,
        /// Host-provided reason.
        reason: String,
    },

    /// The device-tree JSON could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred (e.g., reading a device-tree file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PanelError {
    /// Build a [`PanelError::Config`] for `key`.
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// The negative errno an attribute write reports for this error.
    pub fn errno(&self) -> isize {
        const EIO: isize = 5;
        const ENOMEM: isize = 12;
        const EBUSY: isize = 16;
        const ENODEV: isize = 19;
        const EINVAL: isize = 22;
        const ETIMEDOUT: isize = 110;
        const EOPNOTSUPP: isize = 95;

        let code = match self {
            Self::InvalidArgument(_)
            | Self::ParseError(_)
            | Self::Config { .. }
            | Self::InvalidRange { .. }
            | Self::NoMatchingRange(_) => EINVAL,
            Self::NotSupported => EOPNOTSUPP,
            Self::NoDevice => ENODEV,
            Self::NoMemory => ENOMEM,
            Self::IoTimeout(_) => ETIMEDOUT,
            Self::Busy => EBUSY,
            Self::Transfer { .. } | Self::Json(_) | Self::Io(_) => EIO,
        };
        -code
    }
}
