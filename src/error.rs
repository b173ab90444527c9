use std::fmt;

#[derive(Debug)]
pub enum CaptureError {
    DisplayNotFound(u32),

    NoPrimaryDisplay,

    BackendUnavailable(String),

    InvalidConfig(String),

    BufferOverflow,

    /// The static-scene preflight gate did not observe a stable scene
    /// within its timeout. Contains the last observed diff ratio.
    GateTimeout { last_diff_ratio: f64 },

    /// A sink rejected a write. Contains the destination description so
    /// the orchestrator can report which output went dark.
    SinkWrite(String),

    /// The recording directory could not be created at startup.
    RecordDirUnavailable(String),

    Platform(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureErrorClass {
    InvalidInput,
    Transient,
    Startup,
    Fatal,
}

impl CaptureError {
    pub fn class(&self) -> CaptureErrorClass {
        match self {
            Self::InvalidConfig(_) => CaptureErrorClass::InvalidInput,
            Self::SinkWrite(_) => CaptureErrorClass::Transient,
            Self::DisplayNotFound(_)
            | Self::NoPrimaryDisplay
            | Self::BackendUnavailable(_)
            | Self::GateTimeout { .. }
            | Self::RecordDirUnavailable(_) => CaptureErrorClass::Startup,
            Self::BufferOverflow | Self::Platform(_) => CaptureErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), CaptureErrorClass::Transient)
    }

    /// Process exit status for startup failures: 2 for a failed static
    /// gate, 1 for everything else that aborts before the loop runs.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::GateTimeout { .. } => 2,
            _ => 1,
        }
    }

    /// Create a string-based copy of this error suitable for sending
    /// through channels. The `Platform` variant loses its inner
    /// `anyhow::Error` chain and becomes a formatted string.
    pub fn to_sendable(&self) -> Self {
        match self {
            Self::DisplayNotFound(index) => Self::DisplayNotFound(*index),
            Self::NoPrimaryDisplay => Self::NoPrimaryDisplay,
            Self::BackendUnavailable(s) => Self::BackendUnavailable(s.clone()),
            Self::InvalidConfig(s) => Self::InvalidConfig(s.clone()),
            Self::BufferOverflow => Self::BufferOverflow,
            Self::GateTimeout { last_diff_ratio } => Self::GateTimeout {
                last_diff_ratio: *last_diff_ratio,
            },
            Self::SinkWrite(s) => Self::SinkWrite(s.clone()),
            Self::RecordDirUnavailable(s) => Self::RecordDirUnavailable(s.clone()),
            Self::Platform(inner) => Self::Platform(anyhow::anyhow!("{inner:#}")),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DisplayNotFound(index) => {
                write!(f, "requested display index {index} is not available")
            }
            Self::NoPrimaryDisplay => write!(f, "no primary display found"),
            Self::BackendUnavailable(message) => {
                write!(f, "no available capture backend: {message}")
            }
            Self::InvalidConfig(message) => write!(f, "invalid configuration: {message}"),
            Self::BufferOverflow => write!(f, "frame buffer size overflow"),
            Self::GateTimeout { last_diff_ratio } => write!(
                f,
                "scene did not become static before timeout (last diff ratio {last_diff_ratio:.4})"
            ),
            Self::SinkWrite(dest) => write!(f, "sink write failed: {dest}"),
            Self::RecordDirUnavailable(dir) => {
                write!(f, "recording directory could not be created: {dir}")
            }
            Self::Platform(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Platform(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        Self::Platform(anyhow::Error::new(err))
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;
