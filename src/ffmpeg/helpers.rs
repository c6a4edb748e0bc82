//! Safe wrappers around FFmpeg FFI calls.
//!
//! All `unsafe` blocks are contained here with explicit safety arguments.
//! Callers outside this module should never need to write `unsafe` for
//! routine FFmpeg access.

use ffmpeg_next as ffmpeg;

// ── Codec-parameter field accessors ─────────────────────────────────────────

/// Read `sample_rate` from an `AVCodecParameters` struct.
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: `params.as_ptr()` returns a valid non-null pointer for the
    // lifetime of `params`.  `sample_rate` is a plain i32 field.
    unsafe { (*params.as_ptr()).sample_rate as u32 }
}

/// Read `ch_layout.nb_channels` from an `AVCodecParameters` struct.
pub fn codec_params_channels(params: &ffmpeg::codec::parameters::Parameters) -> u16 {
    // SAFETY: same as `codec_params_sample_rate`.
    unsafe { (*params.as_ptr()).ch_layout.nb_channels as u16 }
}

/// Build `AVCodecParameters` describing an AAC stream.
///
/// The muxer needs the AudioSpecificConfig in `extradata` for MP4-family
/// containers; ADTS ignores it.
pub fn aac_codec_parameters(
    sample_rate: u32,
    channels: u16,
    bit_rate: u64,
    frame_size: u32,
    extradata: &[u8],
) -> ffmpeg::codec::Parameters {
    use std::rc::Rc;
    // SAFETY: `avcodec_parameters_alloc` returns a zeroed struct owned by the
    // returned `Parameters`. Every write targets a plain scalar field, the
    // channel layout is filled by libavutil itself, and `extradata` is a fresh
    // padded `av_mallocz` buffer that `avcodec_parameters_free` releases.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        (*params).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
        (*params).codec_id = ffmpeg::ffi::AVCodecID::AV_CODEC_ID_AAC;
        (*params).sample_rate = sample_rate as i32;
        (*params).bit_rate = bit_rate as i64;
        (*params).frame_size = frame_size as i32;
        ffmpeg::ffi::av_channel_layout_default(&mut (*params).ch_layout, channels as i32);

        if !extradata.is_empty() {
            let padding = ffmpeg::ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buf = ffmpeg::ffi::av_mallocz(extradata.len() + padding) as *mut u8;
            if !buf.is_null() {
                std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
                (*params).extradata = buf;
                (*params).extradata_size = extradata.len() as i32;
            }
        }

        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

/// Copy the `extradata` of an opened encoder.
pub fn encoder_extradata(encoder: &ffmpeg::codec::encoder::Audio) -> Vec<u8> {
    use std::ops::Deref;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: the context is live for the borrow. `extradata` is either null
    // or points to `extradata_size` initialised bytes owned by the context.
    unsafe {
        let raw = ctx.as_ptr();
        let data = (*raw).extradata;
        let size = (*raw).extradata_size;
        if data.is_null() || size <= 0 {
            return Vec::new();
        }
        std::slice::from_raw_parts(data, size as usize).to_vec()
    }
}

// ── Audio plane access ──────────────────────────────────────────────────────

/// Extract an audio plane slice from an `AVFrame`.
///
/// Works around `ffmpeg-next`'s `Audio::data(index)` stopping at planes whose
/// `linesize` is 0. FFmpeg only populates `linesize[0]` for planar audio, and
/// that value applies to every plane.
pub fn audio_plane_data(frame: &ffmpeg::util::frame::Audio, index: usize) -> &[u8] {
    // SAFETY: the plane pointer comes from the frame's own `extended_data`
    // table, bounds-checked against the channel count, and each plane holds
    // `linesize[0]` bytes.
    unsafe {
        let f = frame.as_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;

        if frame.format().is_planar() {
            if index >= channels {
                return &[];
            }
        } else if index > 0 {
            return &[];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &[];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &[];
        }

        let size = (*f).linesize[0] as usize;
        std::slice::from_raw_parts(plane_ptr, size)
    }
}

/// Mutable version of `audio_plane_data`.
pub fn audio_plane_data_mut(frame: &mut ffmpeg::util::frame::Audio, index: usize) -> &mut [u8] {
    // SAFETY: as for `audio_plane_data`; the exclusive borrow of `frame`
    // guarantees no other view of the plane exists.
    unsafe {
        let f = frame.as_mut_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;

        if frame.format().is_planar() {
            if index >= channels {
                return &mut [];
            }
        } else if index > 0 {
            return &mut [];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &mut [];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &mut [];
        }

        let size = (*f).linesize[0] as usize;
        std::slice::from_raw_parts_mut(plane_ptr, size)
    }
}

/// Reinterpret a mutable raw byte slice from an FLTP audio plane as `&mut [f32]`.
///
/// Returns `None` if the pointer is not 4-byte aligned or the slice is
/// shorter than `sample_count * 4` bytes.
pub fn fltp_plane_as_f32_mut(byte_slice: &mut [u8], sample_count: usize) -> Option<&mut [f32]> {
    let expected_bytes = sample_count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_mut_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: alignment and length are verified above.  FLTP planes are
    // native-endian f32 values laid out contiguously.
    Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut f32, sample_count) })
}

/// Number of valid bytes in a packed (interleaved) audio frame.
pub fn packed_frame_len(frame: &ffmpeg::util::frame::Audio) -> usize {
    frame.samples() * frame.channels() as usize * frame.format().bytes()
}
