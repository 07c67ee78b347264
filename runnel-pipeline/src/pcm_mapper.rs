// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `pcm_mapper` module converts interleaved frames between PCM sample formats.

use log::debug;

use runnel_core::conv::{decode_fn, encode_fn, DecodeFn, EncodeFn};
use runnel_core::errors::{Error, ReadStatus, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::frame::{Frame, FrameFlags};
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::spec::SampleSpec;

/// PCM mapper element of a reading pipeline.
///
/// Reads frames in the input sample format from the underlying reader and converts them
/// to the output format: integer to and from float, endianness, and bit depth. Sample
/// rates and channel sets must match; only the encodings differ.
pub struct PcmMapperReader {
    factory: FrameFactory,
    reader: Box<dyn FrameReader>,

    in_frame: Frame,

    decode: DecodeFn,
    encode: EncodeFn,

    in_spec: SampleSpec,
    out_spec: SampleSpec,
}

impl PcmMapperReader {
    /// Create a PCM mapper reader over an underlying reader.
    pub fn new(
        reader: Box<dyn FrameReader>,
        factory: FrameFactory,
        in_spec: &SampleSpec,
        out_spec: &SampleSpec,
    ) -> Result<Self> {
        if !in_spec.is_complete() || !out_spec.is_complete() {
            return Err(Error::BadConfig(
                "pcm mapper reader requires complete sample specs",
            ));
        }

        if in_spec.rate() != out_spec.rate()
            || in_spec.channels() != out_spec.channels()
        {
            return Err(Error::BadConfig(
                "pcm mapper reader requires equal rates and channel sets",
            ));
        }

        if in_spec.format() == out_spec.format() {
            return Err(Error::BadConfig(
                "pcm mapper reader requires different input and output formats",
            ));
        }

        debug!(
            "pcm mapper reader: initializing: in_spec={} out_spec={}",
            in_spec, out_spec
        );

        let in_frame = factory.allocate_frame_no_buffer();

        Ok(PcmMapperReader {
            factory,
            reader,
            in_frame,
            decode: decode_fn(in_spec.format()),
            encode: encode_fn(out_spec.format()),
            in_spec: *in_spec,
            out_spec: *out_spec,
        })
    }
}

impl FrameReader for PcmMapperReader {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        let capped = self
            .in_spec
            .cap_frame_duration(duration, self.factory.byte_buffer_size())
            .min(
                self.out_spec
                    .cap_frame_duration(duration, self.factory.byte_buffer_size()),
            );

        self.factory
            .reallocate_frame(frame, self.out_spec.duration_to_bytes(capped))?;
        frame.set_raw(self.out_spec.is_raw());

        let mut out_duration = 0;
        let mut flags = FrameFlags::empty();
        let mut cts = 0;

        while out_duration < capped {
            self.factory.reallocate_frame(
                &mut self.in_frame,
                self.in_spec.duration_to_bytes(capped - out_duration),
            )?;

            let status =
                self.reader.read(&mut self.in_frame, capped - out_duration, mode)?;

            if status == ReadStatus::Finished || status == ReadStatus::Drained {
                if out_duration == 0 {
                    return Ok(status);
                }
                break;
            }

            self.in_spec.validate_frame(&self.in_frame);

            let n = self.in_frame.duration();
            let n_samples = n * self.in_spec.num_channels();

            let in_size = self.in_spec.sample_size();
            let out_size = self.out_spec.sample_size();

            {
                let out_base = out_duration * self.out_spec.num_channels() * out_size;
                let out_bytes = &mut frame.bytes_mut()
                    [out_base..out_base + n_samples * out_size];
                let in_bytes = self.in_frame.bytes();

                for i in 0..n_samples {
                    let sample = (self.decode)(&in_bytes[i * in_size..(i + 1) * in_size]);
                    (self.encode)(
                        sample,
                        &mut out_bytes[i * out_size..(i + 1) * out_size],
                    );
                }
            }

            flags |= self.in_frame.flags();
            if out_duration == 0 {
                cts = self.in_frame.capture_ts();
            }

            out_duration += n;

            if status == ReadStatus::Partial && mode == ReadMode::Soft {
                break;
            }
        }

        if out_duration < duration {
            flags |= FrameFlags::NOT_COMPLETE;
        }

        frame.set_num_bytes(self.out_spec.duration_to_bytes(out_duration));
        frame.set_duration(out_duration);
        frame.set_flags(flags);
        frame.set_capture_ts(cts);

        if out_duration == duration {
            Ok(ReadStatus::Complete)
        }
        else {
            Ok(ReadStatus::Partial)
        }
    }
}
