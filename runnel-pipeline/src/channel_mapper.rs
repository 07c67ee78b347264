// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `channel_mapper` module remaps interleaved frames between channel masks.

use log::debug;

use runnel_core::errors::{Error, ReadStatus, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::frame::{Frame, FrameFlags};
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::sample::Sample;
use runnel_core::spec::SampleSpec;

/// Pure channel-mask remapping of interleaved raw samples.
///
/// Every output channel takes the matching input channel when present; channels absent
/// from the input are up-mixed by duplicating the mean of all input channels; input
/// channels absent from the output are down-mixed by averaging them into the retained
/// channels.
pub struct ChannelMapper {
    // Input channel indexes contributing to each output channel, plus the averaging
    // gain (1/len).
    mapping: Vec<(Vec<usize>, Sample)>,
    num_in_ch: usize,
    num_out_ch: usize,
}

impl ChannelMapper {
    /// Build a mapper between two channel sets.
    pub fn new(in_spec: &SampleSpec, out_spec: &SampleSpec) -> Self {
        let in_mask = in_spec.channels().mask();
        let out_mask = out_spec.channels().mask();

        let in_positions: Vec<u32> =
            (0u32..64).filter(|&b| in_mask.bits() & (1u64 << b) != 0).collect();
        let out_positions: Vec<u32> =
            (0u32..64).filter(|&b| out_mask.bits() & (1u64 << b) != 0).collect();

        // Input channels that have no counterpart in the output.
        let discarded: Vec<usize> = in_positions
            .iter()
            .enumerate()
            .filter(|(_, &b)| out_mask.bits() & (1u64 << b) == 0)
            .map(|(i, _)| i)
            .collect();

        let all_in: Vec<usize> = (0..in_positions.len()).collect();

        let mapping = out_positions
            .iter()
            .map(|&b| {
                let direct = in_positions.iter().position(|&i| i == b);

                let contributors = match direct {
                    // Matching channel, averaged with the discarded ones.
                    Some(i) => {
                        let mut v = vec![i];
                        v.extend_from_slice(&discarded);
                        v
                    }
                    // No matching channel: duplicate the mean of all inputs.
                    None => all_in.clone(),
                };

                let gain = 1.0 / contributors.len() as Sample;

                (contributors, gain)
            })
            .collect();

        ChannelMapper {
            mapping,
            num_in_ch: in_positions.len(),
            num_out_ch: out_positions.len(),
        }
    }

    /// Remap interleaved input samples into interleaved output samples of the same
    /// duration.
    pub fn map(&self, in_samples: &[Sample], out_samples: &mut [Sample]) {
        debug_assert!(in_samples.len() % self.num_in_ch == 0);
        debug_assert!(out_samples.len() % self.num_out_ch == 0);
        debug_assert_eq!(
            in_samples.len() / self.num_in_ch,
            out_samples.len() / self.num_out_ch
        );

        let n_frames = in_samples.len() / self.num_in_ch;

        for n in 0..n_frames {
            let in_frame = &in_samples[n * self.num_in_ch..(n + 1) * self.num_in_ch];
            let out_frame =
                &mut out_samples[n * self.num_out_ch..(n + 1) * self.num_out_ch];

            for (out_ch, (contributors, gain)) in self.mapping.iter().enumerate() {
                let mut acc = 0.0;
                for &in_ch in contributors {
                    acc += in_frame[in_ch];
                }
                out_frame[out_ch] = acc * gain;
            }
        }
    }
}

/// Channel mapper element of a reading pipeline.
///
/// Reads frames from the underlying reader in the input channel set and remaps them to
/// the output channel set. Input and output sample rates must be equal.
pub struct ChannelMapperReader {
    factory: FrameFactory,
    reader: Box<dyn FrameReader>,

    in_frame: Frame,

    mapper: ChannelMapper,
    mapper_enabled: bool,

    in_spec: SampleSpec,
    out_spec: SampleSpec,
}

impl ChannelMapperReader {
    /// Create a channel mapper reader over an underlying reader.
    pub fn new(
        reader: Box<dyn FrameReader>,
        factory: FrameFactory,
        in_spec: &SampleSpec,
        out_spec: &SampleSpec,
    ) -> Result<Self> {
        if !in_spec.is_complete() || !out_spec.is_complete() || !in_spec.is_raw()
            || !out_spec.is_raw()
        {
            return Err(Error::BadConfig(
                "channel mapper reader requires complete sample specs with raw format",
            ));
        }

        if in_spec.rate() != out_spec.rate() {
            return Err(Error::BadConfig(
                "channel mapper reader requires equal input and output sample rates",
            ));
        }

        let mapper_enabled = in_spec.channels() != out_spec.channels();

        if mapper_enabled {
            debug!(
                "channel mapper reader: initializing: in_spec={} out_spec={}",
                in_spec, out_spec
            );
        }

        let in_frame = factory.allocate_frame_no_buffer();

        Ok(ChannelMapperReader {
            factory,
            reader,
            in_frame,
            mapper: ChannelMapper::new(in_spec, out_spec),
            mapper_enabled,
            in_spec: *in_spec,
            out_spec: *out_spec,
        })
    }
}

impl FrameReader for ChannelMapperReader {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        if !self.mapper_enabled {
            return self.reader.read(frame, duration, mode);
        }

        // The chunk must fit both the input scratch frame and the output frame.
        let capped = self
            .in_spec
            .cap_frame_duration(duration, self.factory.byte_buffer_size())
            .min(
                self.out_spec
                    .cap_frame_duration(duration, self.factory.byte_buffer_size()),
            );

        self.factory
            .reallocate_frame(frame, self.out_spec.duration_to_bytes(capped))?;
        frame.set_raw(true);

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

            {
                let num_out_ch = self.out_spec.num_channels();
                let out_samples = &mut frame.samples_mut()
                    [out_duration * num_out_ch..(out_duration + n) * num_out_ch];

                self.mapper.map(self.in_frame.samples(), out_samples);
            }

            // Flags are merged across all internal reads; the capture timestamp is that
            // of the first one.
            flags |= self.in_frame.flags();
            if out_duration == 0 {
                cts = self.in_frame.capture_ts();
            }

            out_duration += n;

            if status == ReadStatus::Partial && mode == ReadMode::Soft {
                // A soft read stopped early; hand out what was gathered.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{expect_frame, MockReader};
    use runnel_core::channels::{ChannelMask, ChannelSet};
    use runnel_core::sample::PcmFormat;

    const RATE: u32 = 48_000;

    fn spec(channels: ChannelSet) -> SampleSpec {
        SampleSpec::new(RATE, PcmFormat::Raw, channels)
    }

    fn factory() -> FrameFactory {
        FrameFactory::new(16 * 1024, 32)
    }

    #[test]
    fn verify_mono_to_stereo_duplicates() {
        let factory = factory();

        let mock = MockReader::new(factory.clone(), spec(ChannelSet::mono()));
        let handle = mock.handle();
        handle.add(100, 0.4, FrameFlags::HAS_SIGNAL);

        let mut reader = ChannelMapperReader::new(
            Box::new(mock),
            factory.clone(),
            &spec(ChannelSet::mono()),
            &spec(ChannelSet::stereo()),
        )
        .unwrap();

        let frame = expect_frame(
            &mut reader,
            &factory,
            &spec(ChannelSet::stereo()),
            200,
            ReadStatus::Complete,
            200,
            ReadMode::Hard,
        );

        for &s in frame.samples() {
            assert!((s - 0.4).abs() < 1e-6);
        }
    }

    #[test]
    fn verify_stereo_to_mono_averages() {
        let factory = factory();

        let mock = MockReader::new(factory.clone(), spec(ChannelSet::stereo()));
        let handle = mock.handle();
        // Interleaved L/R get distinct values via two queued runs of one sample each,
        // repeated: L=0.2, R=0.6 -> mono mean 0.4.
        for _ in 0..100 {
            handle.add(1, 0.2, FrameFlags::HAS_SIGNAL);
            handle.add(1, 0.6, FrameFlags::HAS_SIGNAL);
        }

        let mut reader = ChannelMapperReader::new(
            Box::new(mock),
            factory.clone(),
            &spec(ChannelSet::stereo()),
            &spec(ChannelSet::mono()),
        )
        .unwrap();

        let frame = expect_frame(
            &mut reader,
            &factory,
            &spec(ChannelSet::mono()),
            100,
            ReadStatus::Complete,
            100,
            ReadMode::Hard,
        );

        for &s in frame.samples() {
            assert!((s - 0.4).abs() < 1e-6);
        }
    }

    #[test]
    fn verify_flags_merged_and_cts_first() {
        let factory = factory();

        let in_spec = spec(ChannelSet::mono());
        let out_spec = spec(ChannelSet::stereo());

        let mock = MockReader::new(factory.clone(), in_spec);
        let handle = mock.handle();

        handle.set_start_cts(1_000_000_000);
        handle.add(50, 0.1, FrameFlags::HAS_SIGNAL);
        handle.add(50, 0.0, FrameFlags::HAS_GAPS);

        let mut reader =
            ChannelMapperReader::new(Box::new(mock), factory.clone(), &in_spec, &out_spec)
                .unwrap();

        let frame = expect_frame(
            &mut reader,
            &factory,
            &out_spec,
            200,
            ReadStatus::Complete,
            200,
            ReadMode::Hard,
        );

        // Both runs were consumed: flags are merged, the timestamp is the first one's.
        assert!(frame.has_flags(FrameFlags::HAS_SIGNAL));
        assert!(frame.has_flags(FrameFlags::HAS_GAPS));
        assert_eq!(frame.capture_ts(), 1_000_000_000);
    }

    #[test]
    fn verify_rate_mismatch_rejected() {
        let factory = factory();

        let mock = MockReader::new(factory.clone(), spec(ChannelSet::mono()));

        let result = ChannelMapperReader::new(
            Box::new(mock),
            factory,
            &SampleSpec::new(44_100, PcmFormat::Raw, ChannelSet::mono()),
            &SampleSpec::new(48_000, PcmFormat::Raw, ChannelSet::stereo()),
        );

        assert!(matches!(result, Err(Error::BadConfig(_))));
    }

    #[test]
    fn verify_surround_downmix_folds_discarded() {
        let factory = factory();

        // 2.1 (L, R, LFE) -> stereo: LFE is averaged into both L and R.
        let in_set = ChannelSet::surround(
            ChannelMask::FRONT_LEFT | ChannelMask::FRONT_RIGHT | ChannelMask::LFE,
        );

        let mapper = ChannelMapper::new(
            &spec(in_set),
            &spec(ChannelSet::stereo()),
        );

        let input = [0.3, 0.6, 0.9];
        let mut output = [0.0; 2];

        mapper.map(&input, &mut output);

        assert!((output[0] - (0.3 + 0.9) / 2.0).abs() < 1e-6);
        assert!((output[1] - (0.6 + 0.9) / 2.0).abs() < 1e-6);
    }
}
