//! FFmpeg module - provides wrappers and utilities for FFmpeg library access
//!
//! This module handles:
//! - FFmpeg initialization
//! - Log filtering
//! - Safe wrappers for raw struct field access

pub mod helpers;

pub use ffmpeg_next as ffmpeg;

use std::sync::OnceLock;

use crate::error::FfmpegError;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize the FFmpeg library.
///
/// Returns an error if the underlying C library fails to initialize.
pub fn init() -> Result<(), FfmpegError> {
    ffmpeg::init()
        .map_err(|e| FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e)))?;

    tracing::info!("FFmpeg initialized");

    Ok(())
}

/// Initialize FFmpeg once per process; later calls return the first outcome.
pub fn ensure_init() -> Result<(), FfmpegError> {
    INIT.get_or_init(|| init().map_err(|e| e.to_string()))
        .clone()
        .map_err(FfmpegError::InitFailed)
}

/// Install a custom FFmpeg log callback that suppresses known-noisy messages.
///
/// Must be called after `init()` and before any conversion starts, because
/// altering the global log callback is not thread-safe.
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state. They are called once
    // at startup before any worker thread exists.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that are expected while decoding arbitrary inputs and should be suppressed.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Estimating duration from bitrate",
    "Could not update timestamps for skipped samples",
    "Could not update timestamps for discarded samples",
    "Too many bits",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    // Respect the configured log level
    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    // Format the message using FFmpeg's own vsnprintf helper
    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();

    if SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s)) {
        return;
    }

    tracing::warn!(target: "ffmpeg", "{}", msg.trim_end());
}

/// Get the version information of the linked FFmpeg libraries.
pub fn version_info() -> String {
    let v = ffmpeg::util::version();
    format!("libavutil {}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}
