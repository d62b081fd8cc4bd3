use std::{error, fmt};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by waveforge.
#[derive(Debug)]
pub enum Error {
    /// Raw wavetable source data could not be turned into a table set. The previously
    /// active table set stays in place when this is returned.
    WavetableError(String),
    /// An invalid parameter id or an out of range parameter value was passed.
    ParameterError(String),
    /// The bounded control queue towards the audio thread is full.
    SendError(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WavetableError(str) => write!(f, "Invalid wavetable source: {str}"),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SendError(str) => write!(f, "Failed to send control message: {str}"),
        }
    }
}
