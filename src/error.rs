use thiserror::Error;

/// Main error type for the conversion engine
///
/// Every failure is classified into one of four kinds. The variant carries the
/// underlying cause captured at the failure site.
#[derive(Error, Debug)]
pub enum ConverterError {
    /// Reading the source or writing the destination failed
    #[error("File error: {0}")]
    File(Cause),

    /// Unsupported or inconsistent PCM/AAC parameters
    #[error("Format error: {0}")]
    Format(Cause),

    /// The encoding session was lost during an interruption and could not be restored
    #[error("Unrecoverable interruption: {0}")]
    UnrecoverableInterruption(Cause),

    /// Construction-time misuse or an unavailable codec
    #[error("Initialisation error: {0}")]
    Initialisation(Cause),
}

/// The classification of a [`ConverterError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    File,
    Format,
    UnrecoverableInterruption,
    Initialisation,
}

/// Underlying cause attached to a [`ConverterError`]
#[derive(Error, Debug)]
pub enum Cause {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("{0}")]
    Message(String),
}

impl From<String> for Cause {
    fn from(msg: String) -> Self {
        Cause::Message(msg)
    }
}

impl From<&str> for Cause {
    fn from(msg: &str) -> Self {
        Cause::Message(msg.to_string())
    }
}

impl ConverterError {
    pub fn file(cause: impl Into<Cause>) -> Self {
        ConverterError::File(cause.into())
    }

    pub fn format(cause: impl Into<Cause>) -> Self {
        ConverterError::Format(cause.into())
    }

    pub fn interruption(cause: impl Into<Cause>) -> Self {
        ConverterError::UnrecoverableInterruption(cause.into())
    }

    pub fn init(cause: impl Into<Cause>) -> Self {
        ConverterError::Initialisation(cause.into())
    }

    /// The kind of failure, independent of its cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConverterError::File(_) => ErrorKind::File,
            ConverterError::Format(_) => ErrorKind::Format,
            ConverterError::UnrecoverableInterruption(_) => ErrorKind::UnrecoverableInterruption,
            ConverterError::Initialisation(_) => ErrorKind::Initialisation,
        }
    }

    /// The underlying cause.
    pub fn cause(&self) -> &Cause {
        match self {
            ConverterError::File(c)
            | ConverterError::Format(c)
            | ConverterError::UnrecoverableInterruption(c)
            | ConverterError::Initialisation(c) => c,
        }
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// Failure during global FFmpeg initialization
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    /// Failure opening an input media file
    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    /// The input contains no decodable audio stream
    #[error("No audio stream found: {0}")]
    NoAudioStream(String),

    /// Failure instantiating a decoder
    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    /// The requested encoder was not found in this FFmpeg build
    #[error("Failed to find encoder: {0}")]
    EncoderNotFound(String),

    /// Failure opening or configuring an encoder
    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    /// Failure creating an audio resampler
    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    /// Failure decoding a packet into a frame
    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    /// Failure encoding a frame into packets
    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    /// Failure resampling a decoded frame
    #[error("Failed to resample frame: {0}")]
    Resample(String),

    /// Failure seeking within the input
    #[error("Failed to seek: {0}")]
    Seek(String),

    /// Failure creating an output format muxer
    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    /// Failure writing the container header
    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    /// Failure writing a packet to the container
    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    /// Failure writing the container trailer
    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ConverterError>;
