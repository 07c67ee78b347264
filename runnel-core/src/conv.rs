// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `conv` module provides per-sample codecs between the native sample type and each
//! PCM wire format.
//!
//! Integer samples map to the native range by scaling with `2^(bits-1)`: the most
//! negative integer maps to -1.0, and encoding clamps so that +1.0 maps to the most
//! positive integer.

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};

use crate::sample::{PcmFormat, Sample};

/// Decode one encoded sample into a native sample. The input slice holds exactly one
/// sample of one channel.
pub type DecodeFn = fn(&[u8]) -> Sample;

/// Encode one native sample. The output slice holds exactly one sample of one channel.
pub type EncodeFn = fn(Sample, &mut [u8]);

const S8_SCALE: f32 = 128.0;
const S16_SCALE: f32 = 32768.0;
const S24_SCALE: f32 = 8_388_608.0;
const S32_SCALE: f32 = 2_147_483_648.0;

#[inline]
fn clamp(s: Sample) -> Sample {
    s.clamp(-1.0, 1.0)
}

fn decode_raw(buf: &[u8]) -> Sample {
    NativeEndian::read_f32(buf)
}

fn encode_raw(s: Sample, buf: &mut [u8]) {
    NativeEndian::write_f32(buf, s);
}

fn decode_s8(buf: &[u8]) -> Sample {
    buf[0] as i8 as f32 / S8_SCALE
}

fn encode_s8(s: Sample, buf: &mut [u8]) {
    buf[0] = (clamp(s) * S8_SCALE).round().clamp(i8::MIN as f32, i8::MAX as f32) as i8
        as u8;
}

macro_rules! int_codec {
    ($dec:ident, $enc:ident, $order:ident, $read:ident, $write:ident, $scale:expr,
     $min:expr, $max:expr, $ty:ty) => {
        fn $dec(buf: &[u8]) -> Sample {
            $order::$read(buf) as f32 / $scale
        }

        fn $enc(s: Sample, buf: &mut [u8]) {
            let v = (clamp(s) * $scale).round().clamp($min as f32, $max as f32) as $ty;
            $order::$write(buf, v);
        }
    };
}

int_codec!(decode_s16le, encode_s16le, LittleEndian, read_i16, write_i16, S16_SCALE,
    i16::MIN, i16::MAX, i16);
int_codec!(decode_s16be, encode_s16be, BigEndian, read_i16, write_i16, S16_SCALE,
    i16::MIN, i16::MAX, i16);
int_codec!(decode_s24le, encode_s24le, LittleEndian, read_i24, write_i24, S24_SCALE,
    -8_388_608, 8_388_607, i32);
int_codec!(decode_s24be, encode_s24be, BigEndian, read_i24, write_i24, S24_SCALE,
    -8_388_608, 8_388_607, i32);
int_codec!(decode_s32le, encode_s32le, LittleEndian, read_i32, write_i32, S32_SCALE,
    i32::MIN, i32::MAX, i32);
int_codec!(decode_s32be, encode_s32be, BigEndian, read_i32, write_i32, S32_SCALE,
    i32::MIN, i32::MAX, i32);

fn decode_f32le(buf: &[u8]) -> Sample {
    LittleEndian::read_f32(buf)
}

fn encode_f32le(s: Sample, buf: &mut [u8]) {
    LittleEndian::write_f32(buf, s);
}

fn decode_f32be(buf: &[u8]) -> Sample {
    BigEndian::read_f32(buf)
}

fn encode_f32be(s: Sample, buf: &mut [u8]) {
    BigEndian::write_f32(buf, s);
}

fn decode_f64le(buf: &[u8]) -> Sample {
    LittleEndian::read_f64(buf) as f32
}

fn encode_f64le(s: Sample, buf: &mut [u8]) {
    LittleEndian::write_f64(buf, s as f64);
}

fn decode_f64be(buf: &[u8]) -> Sample {
    BigEndian::read_f64(buf) as f32
}

fn encode_f64be(s: Sample, buf: &mut [u8]) {
    BigEndian::write_f64(buf, s as f64);
}

/// Get the decoder for a PCM format.
pub fn decode_fn(format: PcmFormat) -> DecodeFn {
    match format {
        PcmFormat::Raw => decode_raw,
        PcmFormat::S8 => decode_s8,
        PcmFormat::S16Le => decode_s16le,
        PcmFormat::S16Be => decode_s16be,
        PcmFormat::S24Le => decode_s24le,
        PcmFormat::S24Be => decode_s24be,
        PcmFormat::S32Le => decode_s32le,
        PcmFormat::S32Be => decode_s32be,
        PcmFormat::F32Le => decode_f32le,
        PcmFormat::F32Be => decode_f32be,
        PcmFormat::F64Le => decode_f64le,
        PcmFormat::F64Be => decode_f64be,
    }
}

/// Get the encoder for a PCM format.
pub fn encode_fn(format: PcmFormat) -> EncodeFn {
    match format {
        PcmFormat::Raw => encode_raw,
        PcmFormat::S8 => encode_s8,
        PcmFormat::S16Le => encode_s16le,
        PcmFormat::S16Be => encode_s16be,
        PcmFormat::S24Le => encode_s24le,
        PcmFormat::S24Be => encode_s24be,
        PcmFormat::S32Le => encode_s32le,
        PcmFormat::S32Be => encode_s32be,
        PcmFormat::F32Le => encode_f32le,
        PcmFormat::F32Be => encode_f32be,
        PcmFormat::F64Le => encode_f64le,
        PcmFormat::F64Be => encode_f64be,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_s16le() {
        let dec = decode_fn(PcmFormat::S16Le);
        let enc = encode_fn(PcmFormat::S16Le);

        assert_eq!(dec(&(-32768i16).to_le_bytes()), -1.0);
        assert_eq!(dec(&16384i16.to_le_bytes()), 0.5);

        let mut buf = [0u8; 2];

        enc(0.5, &mut buf);
        assert_eq!(i16::from_le_bytes(buf), 16384);

        enc(-1.0, &mut buf);
        assert_eq!(i16::from_le_bytes(buf), -32768);

        // Positive full scale clamps to the largest representable value.
        enc(1.0, &mut buf);
        assert_eq!(i16::from_le_bytes(buf), 32767);
    }

    #[test]
    fn verify_s24_endianness() {
        let dec_le = decode_fn(PcmFormat::S24Le);
        let dec_be = decode_fn(PcmFormat::S24Be);

        // 0x400000 = 2^22 = half scale.
        assert_eq!(dec_le(&[0x00, 0x00, 0x40]), 0.5);
        assert_eq!(dec_be(&[0x40, 0x00, 0x00]), 0.5);

        let enc_le = encode_fn(PcmFormat::S24Le);
        let mut buf = [0u8; 3];

        enc_le(-1.0, &mut buf);
        assert_eq!(buf, [0x00, 0x00, 0x80]);
    }

    #[test]
    fn verify_float_round_trip() {
        for format in [PcmFormat::F32Le, PcmFormat::F32Be, PcmFormat::Raw] {
            let dec = decode_fn(format);
            let enc = encode_fn(format);

            let mut buf = [0u8; 4];

            enc(0.12345, &mut buf);
            assert_eq!(dec(&buf), 0.12345);
        }

        for format in [PcmFormat::F64Le, PcmFormat::F64Be] {
            let dec = decode_fn(format);
            let enc = encode_fn(format);

            let mut buf = [0u8; 8];

            enc(0.12345, &mut buf);
            assert_eq!(dec(&buf), 0.12345);
        }
    }

    #[test]
    fn verify_int_round_trip_monotonic() {
        let dec = decode_fn(PcmFormat::S8);
        let enc = encode_fn(PcmFormat::S8);

        let mut prev = -2.0;
        for i in -128..=127i32 {
            let mut buf = [0u8; 1];
            enc(i as f32 / 128.0, &mut buf);
            let s = dec(&buf);

            assert!(s > prev);
            prev = s;
        }
    }
}
