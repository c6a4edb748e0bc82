//! Asynchronous PCM to AAC conversion
//!
//! Converts an audio file, or PCM pulled from an application callback, into
//! an AAC file on a background thread. Jobs report progress and their single
//! outcome through a [`ConversionObserver`], can be cancelled at any time and
//! survive audio session interruptions posted on an [`AudioSession`].

pub mod backend;
pub mod config;
pub mod config_file;
pub mod converter;
pub mod error;
pub mod ffmpeg;
pub mod format;
pub mod notify;
pub mod pcm;
pub mod session;
pub mod source;
pub mod transcode;

#[cfg(test)]
pub(crate) mod integration;

pub use backend::{CodecBackend, FfmpegBackend};
pub use config::{ConverterConfig, EncoderSettings};
pub use converter::{AacConverter, ConversionJob, ConversionState, JobId, JobSource};
pub use error::{ConverterError, ErrorKind, FfmpegError, Result};
pub use ffmpeg::{init, install_log_filter, version_info as ffmpeg_version_info};
pub use format::FormatDescriptor;
pub use notify::{ChannelObserver, ConversionEvent, ConversionObserver};
pub use session::{AudioSession, SessionEvent};
pub use source::DataSource;
