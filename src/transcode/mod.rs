//! Audio transcoding module
//!
//! FFmpeg-backed building blocks of a conversion:
//! - Audio decoder for file sources
//! - Resampler that converts decoded frames to packed 16-bit PCM
//! - AAC encoder fed with raw PCM bytes
//! - Container writer for the destination file

pub mod decoder;
pub mod encoder;
pub mod resampler;
pub mod writer;

use ffmpeg_next::util::channel_layout::ChannelLayout;

/// Default channel layout for a channel count.
pub fn layout_for_channels(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        3 => ChannelLayout::SURROUND,
        4 => ChannelLayout::QUAD,
        5 => ChannelLayout::_5POINT0,
        6 => ChannelLayout::_5POINT1,
        7 => ChannelLayout::_6POINT1,
        _ => ChannelLayout::_7POINT1,
    }
}
