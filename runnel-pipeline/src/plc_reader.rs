// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `plc_reader` module hides gaps in the stream using a [`Plc`] backend.

use log::debug;

use runnel_core::errors::{Error, ReadStatus, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::frame::{Frame, FrameFlags};
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::spec::SampleSpec;

use crate::plc::Plc;

/// Packet loss concealment reader.
///
/// Reads and forwards frames from the underlying reader:
///  - a frame with the signal flag (a good frame with samples decoded from packets) is
///    forwarded as-is;
///  - a frame with the gap flag (a silence frame caused by packet loss) is filled with
///    interpolated data by the [`Plc`] backend.
///
/// Every signal frame is also passed to the PLC so that it can remember recent history.
/// When a gap frame is retrieved, the reader performs read-ahead using a soft read,
/// which returns samples only if the next packets have already arrived. This allows
/// providing the PLC with the frame following the loss when possible, without
/// increasing latency requirements.
///
/// Look-ahead samples are not discarded: they are kept in a pending frame and served to
/// the caller by subsequent reads, until the pending frame is exhausted and normal
/// reads resume.
///
/// The reader relies on the depacketizer never mixing signal and gaps within one frame,
/// which the depacketizer guarantees using partial reads. Any PCM format is supported.
pub struct PlcReader {
    factory: FrameFactory,
    reader: Box<dyn FrameReader>,

    plc: Box<dyn Plc>,

    // PLC window lengths.
    lookbehind_duration: usize,
    lookbehind_byte_size: usize,
    lookahead_duration: usize,
    lookahead_byte_size: usize,

    // History remembered from previous reads, in a byte ring.
    prev_frame: Frame,
    ring_frame: Frame,
    ring_frame_pos: usize,
    ring_frame_size: usize,

    // Unread frame remembered from the last read-ahead. Subsequent reads return
    // samples from it until it's empty, then switch back to normal reads.
    pending_next_frame: bool,
    next_frame_pos: usize,
    next_frame: Frame,
    temp_frame: Frame,

    // Set when we got the very first frame with signal.
    got_first_signal: bool,

    sample_spec: SampleSpec,
}

impl PlcReader {
    /// Create a PLC reader over an underlying reader.
    pub fn new(
        reader: Box<dyn FrameReader>,
        factory: FrameFactory,
        plc: Box<dyn Plc>,
        sample_spec: &SampleSpec,
    ) -> Result<Self> {
        if !sample_spec.is_complete() {
            return Err(Error::BadConfig(
                "plc reader requires a complete sample spec",
            ));
        }

        if *sample_spec != plc.sample_spec() {
            return Err(Error::BadConfig(
                "plc reader and plc backend sample specs differ",
            ));
        }

        let lookbehind_duration = plc.lookbehind_len();
        let lookbehind_byte_size = sample_spec.duration_to_bytes(lookbehind_duration);
        let lookahead_duration = plc.lookahead_len();
        let lookahead_byte_size = sample_spec.duration_to_bytes(lookahead_duration);

        debug!(
            "plc reader: initializing: lookbehind={}({:.3}ms) lookahead={}({:.3}ms) \
             sample_spec={}",
            lookbehind_duration,
            sample_spec.duration_to_ns(lookbehind_duration) as f64 / 1_000_000.0,
            lookahead_duration,
            sample_spec.duration_to_ns(lookahead_duration) as f64 / 1_000_000.0,
            sample_spec
        );

        if lookbehind_byte_size > factory.byte_buffer_size()
            || lookahead_byte_size > factory.byte_buffer_size()
        {
            return Err(Error::NoMemory);
        }

        let mut prev_frame = Frame::default();
        let mut ring_frame = Frame::default();

        if lookbehind_duration > 0 {
            prev_frame = factory.allocate_frame(lookbehind_byte_size)?;
            ring_frame = factory.allocate_frame(lookbehind_byte_size)?;
        }

        let mut next_frame = Frame::default();
        let mut temp_frame = Frame::default();

        if lookahead_duration > 0 {
            next_frame = factory.allocate_frame(lookahead_byte_size)?;
            temp_frame = factory.allocate_frame(lookahead_byte_size)?;
        }

        Ok(PlcReader {
            factory,
            reader,
            plc,
            lookbehind_duration,
            lookbehind_byte_size,
            lookahead_duration,
            lookahead_byte_size,
            prev_frame,
            ring_frame,
            ring_frame_pos: 0,
            ring_frame_size: 0,
            pending_next_frame: false,
            next_frame_pos: 0,
            next_frame,
            temp_frame,
            got_first_signal: false,
            sample_spec: *sample_spec,
        })
    }

    fn read_from_memory(
        &mut self,
        frame: &mut Frame,
        requested_duration: usize,
    ) -> Result<ReadStatus> {
        let avail_duration = requested_duration.min(
            self.sample_spec
                .bytes_to_duration(self.next_frame.num_bytes() - self.next_frame_pos),
        );
        let avail_bytes = self.sample_spec.duration_to_bytes(avail_duration);

        debug_assert!(avail_duration > 0 && avail_bytes > 0);
        debug_assert!(self.next_frame_pos + avail_bytes <= self.next_frame.num_bytes());

        frame.set_flags(self.next_frame.flags());
        frame.set_raw(self.sample_spec.is_raw());
        frame.set_duration(avail_duration);
        frame.set_num_bytes(avail_bytes);

        if self.next_frame.capture_ts() != 0 {
            frame.set_capture_ts(
                self.next_frame.capture_ts()
                    + self.sample_spec.bytes_to_ns(self.next_frame_pos),
            );
        }

        frame.bytes_mut().copy_from_slice(
            &self.next_frame.bytes()[self.next_frame_pos..self.next_frame_pos + avail_bytes],
        );

        // Give the frame to the PLC for history.
        self.plc.process_history(frame);

        self.next_frame_pos += avail_bytes;
        if self.next_frame_pos == self.next_frame.num_bytes() {
            // The saved frame is fully read out, switch back to normal reads.
            self.pending_next_frame = false;
            self.next_frame_pos = 0;
        }

        if avail_duration == requested_duration {
            Ok(ReadStatus::Complete)
        }
        else {
            Ok(ReadStatus::Partial)
        }
    }

    fn read_from_reader(
        &mut self,
        frame: &mut Frame,
        requested_duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        let status = self.reader.read(frame, requested_duration, mode)?;
        if status != ReadStatus::Complete && status != ReadStatus::Partial {
            return Ok(status);
        }

        // We rely on the depacketizer returning frames that are either entirely signal
        // or entirely gap. In release builds a mixed frame is treated as signal.
        debug_assert!(
            frame.has_flags(FrameFlags::HAS_SIGNAL)
                != frame.has_flags(FrameFlags::HAS_GAPS),
            "plc reader: frame must have either signal or gaps"
        );

        self.sample_spec.validate_frame(frame);

        if !frame.has_flags(FrameFlags::HAS_GAPS) {
            // Good frame, give it to the PLC for history.
            self.plc.process_history(frame);
            self.got_first_signal = true;
        }
        else if self.got_first_signal {
            // Gap frame (with zeros), ask the PLC to fill it with interpolated data.
            let mut have_next = false;

            if self.lookahead_duration != 0 {
                let status = self.try_read_next_frame()?;
                if status != ReadStatus::Complete
                    && status != ReadStatus::Partial
                    && status != ReadStatus::Drained
                {
                    return Ok(status);
                }
                // The next frame may be unavailable if packets haven't arrived yet.
                have_next = self.pending_next_frame;
            }

            let mut have_prev = false;

            if self.lookbehind_duration != 0 {
                // The prev frame is always available, built from the history ring.
                self.build_prev_frame();
                have_prev = true;
            }

            self.plc.process_loss(
                frame,
                if have_prev { Some(&self.prev_frame) } else { None },
                if have_next { Some(&self.next_frame) } else { None },
            );
        }

        if frame.duration() == requested_duration {
            Ok(ReadStatus::Complete)
        }
        else {
            Ok(ReadStatus::Partial)
        }
    }

    // Perform a soft read to get the next frame, but only while there are no gaps.
    fn try_read_next_frame(&mut self) -> Result<ReadStatus> {
        debug_assert!(self.lookahead_duration != 0);
        debug_assert!(!self.pending_next_frame);

        self.factory
            .reallocate_frame(&mut self.next_frame, self.lookahead_byte_size)?;

        let mut frame_duration = 0;
        let mut frame_size = 0;
        let mut frame_flags = FrameFlags::empty();
        let mut frame_cts = 0;

        // If the soft read is partial, repeat it and concatenate the results. Partial
        // reads may be caused by buffering limitations, but we want to gather the full
        // look-ahead length when possible.
        while frame_duration < self.lookahead_duration {
            self.factory
                .reallocate_frame(&mut self.temp_frame, self.lookahead_byte_size)?;

            let status = self.reader.read(
                &mut self.temp_frame,
                self.lookahead_duration - frame_duration,
                ReadMode::Soft,
            )?;

            if status == ReadStatus::Finished {
                // Stream terminated during read-ahead.
                return Ok(status);
            }

            if status == ReadStatus::Drained {
                // The packets after the loss haven't arrived yet.
                break;
            }

            debug_assert!(
                self.temp_frame.has_flags(FrameFlags::HAS_SIGNAL)
                    && !self.temp_frame.has_flags(FrameFlags::HAS_GAPS),
                "plc reader: soft read-ahead must produce signal frames"
            );

            self.sample_spec.validate_frame(&self.temp_frame);

            if status == ReadStatus::Complete && frame_size == 0 {
                // Happy path: the whole frame was read at once and no concatenation is
                // needed. Swap the frames to keep the second buffer cached and avoid an
                // allocation later.
                std::mem::swap(&mut self.next_frame, &mut self.temp_frame);

                self.pending_next_frame = true;
                return Ok(ReadStatus::Complete);
            }

            self.next_frame.bytes_mut()
                [frame_size..frame_size + self.temp_frame.num_bytes()]
                .copy_from_slice(self.temp_frame.bytes());

            if frame_size == 0 {
                frame_cts = self.temp_frame.capture_ts();
            }
            frame_duration += self.temp_frame.duration();
            frame_size += self.temp_frame.num_bytes();
            frame_flags |= self.temp_frame.flags();
        }

        if frame_duration == 0 {
            return Ok(ReadStatus::Drained);
        }

        self.next_frame.set_flags(frame_flags);
        self.next_frame.set_raw(self.sample_spec.is_raw());
        self.next_frame.set_duration(frame_duration);
        self.next_frame.set_num_bytes(frame_size);
        self.next_frame.set_capture_ts(frame_cts);

        self.pending_next_frame = true;

        Ok(ReadStatus::Complete)
    }

    // Copy samples from the history ring into a contiguous frame.
    fn build_prev_frame(&mut self) {
        debug_assert!(self.lookbehind_duration != 0);
        debug_assert!(self.ring_frame_pos <= self.lookbehind_byte_size);
        debug_assert!(
            self.ring_frame_size > 0 && self.ring_frame_size <= self.lookbehind_byte_size
        );

        let dst_size = self.ring_frame_size;

        self.prev_frame.clear();
        self.prev_frame.set_num_bytes(dst_size);

        let lo_size = (self.lookbehind_byte_size - self.ring_frame_pos).min(dst_size);

        self.prev_frame.bytes_mut()[..lo_size].copy_from_slice(
            &self.ring_frame.bytes()[self.ring_frame_pos..self.ring_frame_pos + lo_size],
        );

        if lo_size < dst_size {
            let hi_size = dst_size - lo_size;

            self.prev_frame.bytes_mut()[lo_size..dst_size]
                .copy_from_slice(&self.ring_frame.bytes()[..hi_size]);
        }

        self.prev_frame
            .set_duration(self.sample_spec.bytes_to_duration(dst_size));
        self.prev_frame.set_raw(self.sample_spec.is_raw());
    }

    // Add a frame to the history ring.
    fn append_history(&mut self, frame: &Frame) {
        debug_assert!(self.lookbehind_duration != 0);
        debug_assert!(self.ring_frame_pos <= self.lookbehind_byte_size);
        debug_assert!(self.ring_frame_size <= self.lookbehind_byte_size);

        let src_size = frame.num_bytes().min(self.lookbehind_byte_size);
        let src_data = &frame.bytes()[frame.num_bytes() - src_size..];

        let lo_pos = (self.ring_frame_pos + self.ring_frame_size)
            % self.lookbehind_byte_size;
        let lo_size = (self.lookbehind_byte_size - lo_pos).min(src_size);

        self.ring_frame.bytes_mut()[lo_pos..lo_pos + lo_size]
            .copy_from_slice(&src_data[..lo_size]);

        if lo_size < src_size {
            let hi_size = src_size - lo_size;

            self.ring_frame.bytes_mut()[..hi_size].copy_from_slice(&src_data[lo_size..]);
        }

        self.ring_frame_size += src_size;
        if self.ring_frame_size > self.lookbehind_byte_size {
            self.ring_frame_pos = (self.ring_frame_pos
                + (self.ring_frame_size - self.lookbehind_byte_size))
                % self.lookbehind_byte_size;
            self.ring_frame_size = self.lookbehind_byte_size;
        }
    }
}

impl FrameReader for PlcReader {
    fn read(
        &mut self,
        frame: &mut Frame,
        requested_duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        let capped_duration = self
            .sample_spec
            .cap_frame_duration(requested_duration, self.factory.byte_buffer_size());

        self.factory.reallocate_frame(
            frame,
            self.sample_spec.duration_to_bytes(capped_duration),
        )?;

        let status = if self.pending_next_frame {
            // A recent read-ahead succeeded. Samples are returned from the saved frame
            // until it becomes empty.
            self.read_from_memory(frame, capped_duration)?
        }
        else {
            // Normal read from the underlying reader.
            self.read_from_reader(frame, capped_duration, mode)?
        };

        if status != ReadStatus::Complete && status != ReadStatus::Partial {
            return Ok(status);
        }

        if self.lookbehind_duration > 0 {
            // Update the history ring.
            self.append_history(frame);
        }

        if frame.duration() == requested_duration {
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
    use crate::testing::{expect_frame, expect_samples, MockPlc, MockReader};
    use runnel_core::channels::ChannelSet;
    use runnel_core::sample::PcmFormat;
    use runnel_core::units::SECOND;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    const MAX_SAMPLES: usize = 8 * 1024;

    fn spec() -> SampleSpec {
        SampleSpec::new(MAX_SAMPLES as u32, PcmFormat::Raw, ChannelSet::mono())
    }

    fn factory() -> FrameFactory {
        FrameFactory::new(MAX_SAMPLES * 4, 32)
    }

    struct Fixture {
        factory: FrameFactory,
        reader: PlcReader,
        mock_reader: crate::testing::MockReaderHandle,
        mock_plc: crate::testing::MockPlcHandle,
    }

    fn fixture(lookbehind: usize, lookahead: usize, fill: f32) -> Fixture {
        let factory = factory();

        let mock = MockReader::new(factory.clone(), spec());
        let mock_reader = mock.handle();

        let plc = MockPlc::new(spec(), lookbehind, lookahead, fill);
        let mock_plc = plc.handle();

        let reader =
            PlcReader::new(Box::new(mock), factory.clone(), Box::new(plc), &spec())
                .unwrap();

        Fixture { factory, reader, mock_reader, mock_plc }
    }

    #[test]
    fn verify_transparent_on_signal() {
        let mut fix = fixture(500, 500, 0.22);

        let start_cts = 1_000 * SECOND;
        fix.mock_reader.set_start_cts(start_cts);

        for n in 0..4 {
            fix.mock_reader.add(250, 0.1 + n as f32 / 10.0, FrameFlags::HAS_SIGNAL);
        }

        for n in 0..4 {
            let frame = expect_frame(
                &mut fix.reader,
                &fix.factory,
                &spec(),
                250,
                ReadStatus::Complete,
                250,
                ReadMode::Hard,
            );

            // Frames pass through unchanged: samples, flags, and timestamps.
            expect_samples(&frame, 250, 0.1 + n as f32 / 10.0);
            assert_eq!(frame.flags(), FrameFlags::HAS_SIGNAL);
            assert_eq!(frame.capture_ts(), start_cts + spec().duration_to_ns(n * 250));
        }

        fix.mock_plc.with(|s| {
            assert_eq!(s.n_history_samples, 1000);
            assert_eq!(s.n_lost_samples, 0);
        });
    }

    #[test]
    fn verify_initial_gap_forwarded() {
        let mut fix = fixture(500, 500, 0.22);

        fix.mock_reader.add(500, 0.0, FrameFlags::HAS_GAPS);
        fix.mock_reader.add(500, 0.33, FrameFlags::HAS_SIGNAL);

        // A gap before the very first signal frame is forwarded unchanged, and the PLC
        // is not invoked.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.0);
        assert_eq!(frame.flags(), FrameFlags::HAS_GAPS);

        fix.mock_plc.with(|s| {
            assert_eq!(s.n_history_samples, 0);
            assert_eq!(s.n_lost_samples, 0);
        });

        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.33);
    }

    #[test]
    fn verify_simple_gap() {
        let mut fix = fixture(500, 500, 0.22);

        fix.mock_reader.add(500, 0.11, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(500, 0.00, FrameFlags::HAS_GAPS);
        fix.mock_reader.add(500, 0.33, FrameFlags::HAS_SIGNAL);

        // Frame 1: signal.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.11);

        assert_eq!(fix.mock_reader.total_reads(), 1);

        // Frame 2: gap, filled by the PLC, which sees both context windows.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.22);
        assert!(frame.has_flags(FrameFlags::HAS_GAPS));

        // One normal read plus one read-ahead happened underneath.
        assert_eq!(fix.mock_reader.total_reads(), 3);

        fix.mock_plc.with(|s| {
            assert_eq!(s.n_lost_samples, 500);
            assert_eq!(s.n_prev_samples, 500);
            assert_eq!(s.n_next_samples, 500);
            assert!(s.last_prev.iter().all(|&v| (v - 0.11).abs() < 1e-6));
            assert!(s.last_next.iter().all(|&v| (v - 0.33).abs() < 1e-6));
        });

        // Frame 3: served from the look-ahead cache, without touching the reader.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.33);

        assert_eq!(fix.mock_reader.total_reads(), 3);

        // History saw all three frames.
        fix.mock_plc.with(|s| assert_eq!(s.n_history_samples, 1000));
    }

    #[test]
    fn verify_lookahead_cache_split_reads() {
        let mut fix = fixture(500, 500, 0.22);

        fix.mock_reader.add(500, 0.11, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(500, 0.00, FrameFlags::HAS_GAPS);
        fix.mock_reader.add(500, 0.33, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(500, 0.44, FrameFlags::HAS_SIGNAL);

        let _ = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        let _ = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );

        // The cached look-ahead is served across two half-size reads.
        for _ in 0..2 {
            let frame = expect_frame(
                &mut fix.reader,
                &fix.factory,
                &spec(),
                250,
                ReadStatus::Complete,
                250,
                ReadMode::Hard,
            );
            expect_samples(&frame, 250, 0.33);
            assert_eq!(fix.mock_reader.total_reads(), 3);
        }

        // Cache exhausted: the next read goes to the reader again.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.44);
        assert_eq!(fix.mock_reader.total_reads(), 4);

        fix.mock_plc.with(|s| assert_eq!(s.n_history_samples, 1500));
    }

    #[test]
    fn verify_readahead_drained() {
        let mut fix = fixture(500, 500, 0.22);

        fix.mock_reader.add(500, 0.11, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(500, 0.00, FrameFlags::HAS_GAPS);

        let _ = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );

        // Gap with no next frame delivered yet: the PLC gets no look-ahead.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.22);

        assert_eq!(fix.mock_reader.total_reads(), 3);
        assert_eq!(fix.mock_reader.last_status(), Some(ReadStatus::Drained));

        fix.mock_plc.with(|s| {
            assert_eq!(s.n_prev_samples, 500);
            assert_eq!(s.n_next_samples, 0);
        });

        // Frame 3 arrives later and is read normally.
        fix.mock_reader.add(500, 0.33, FrameFlags::HAS_SIGNAL);

        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.33);
        assert_eq!(fix.mock_reader.total_reads(), 4);
    }

    #[test]
    fn verify_readahead_disabled() {
        let mut fix = fixture(500, 0, 0.22);

        fix.mock_reader.add(500, 0.11, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(500, 0.00, FrameFlags::HAS_GAPS);
        fix.mock_reader.add(500, 0.33, FrameFlags::HAS_SIGNAL);

        let _ = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );

        // With zero look-ahead, no read-ahead happens at all.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.22);

        assert_eq!(fix.mock_reader.total_reads(), 2);

        fix.mock_plc.with(|s| {
            assert_eq!(s.n_prev_samples, 500);
            assert_eq!(s.n_next_samples, 0);
        });
    }

    #[test]
    fn verify_lookbehind_disabled() {
        let mut fix = fixture(0, 500, 0.22);

        fix.mock_reader.add(500, 0.11, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(500, 0.00, FrameFlags::HAS_GAPS);
        fix.mock_reader.add(500, 0.33, FrameFlags::HAS_SIGNAL);

        let _ = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            500,
            ReadStatus::Complete,
            500,
            ReadMode::Hard,
        );
        expect_samples(&frame, 500, 0.22);

        fix.mock_plc.with(|s| {
            assert_eq!(s.n_prev_samples, 0);
            assert_eq!(s.n_next_samples, 500);
        });
    }

    #[test]
    fn verify_variable_frame_sizes() {
        // Frame sizes 3, 10, 5 (lost), 10, 5 (lost), 20, with lookbehind=15 and
        // lookahead=13, exercising truncation of both windows, mid-frame look-ahead,
        // and serving a partially consumed cache.
        let mut fix = fixture(15, 13, 0.99);

        fix.mock_reader.add(3, 0.01, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(10, 0.02, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(5, 0.00, FrameFlags::HAS_GAPS);
        fix.mock_reader.add(10, 0.04, FrameFlags::HAS_SIGNAL);
        fix.mock_reader.add(5, 0.00, FrameFlags::HAS_GAPS);
        fix.mock_reader.add(20, 0.06, FrameFlags::HAS_SIGNAL);

        // Reads split at frame boundaries.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            20,
            ReadStatus::Partial,
            3,
            ReadMode::Hard,
        );
        expect_samples(&frame, 3, 0.01);

        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            20,
            ReadStatus::Partial,
            10,
            ReadMode::Hard,
        );
        expect_samples(&frame, 10, 0.02);

        // First loss: history holds only 13 samples, and the look-ahead is cut short
        // by the second gap after 10 samples.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            20,
            ReadStatus::Partial,
            5,
            ReadMode::Hard,
        );
        expect_samples(&frame, 5, 0.99);

        fix.mock_plc.with(|s| {
            assert_eq!(s.n_prev_samples, 13);
            assert_eq!(s.n_next_samples, 10);

            assert!(s.last_prev[..3].iter().all(|&v| (v - 0.01).abs() < 1e-6));
            assert!(s.last_prev[3..].iter().all(|&v| (v - 0.02).abs() < 1e-6));
            assert!(s.last_next.iter().all(|&v| (v - 0.04).abs() < 1e-6));
        });

        // Cached look-ahead (frame 4) is served next.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            20,
            ReadStatus::Partial,
            10,
            ReadMode::Hard,
        );
        expect_samples(&frame, 10, 0.04);

        // Second loss: history is full now, and the look-ahead ends mid-frame-6.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            20,
            ReadStatus::Partial,
            5,
            ReadMode::Hard,
        );
        expect_samples(&frame, 5, 0.99);

        fix.mock_plc.with(|s| {
            assert_eq!(s.n_prev_samples, 15);
            assert_eq!(s.n_next_samples, 13);

            // Last 15 samples before the loss: 5 concealed + 10 from frame 4.
            assert!(s.last_prev[..5].iter().all(|&v| (v - 0.99).abs() < 1e-6));
            assert!(s.last_prev[5..].iter().all(|&v| (v - 0.04).abs() < 1e-6));
            assert!(s.last_next.iter().all(|&v| (v - 0.06).abs() < 1e-6));
        });

        // The cache holds 13 samples of frame 6: a large read is satisfied partially
        // from the cache, and the remaining 7 samples come from a fresh read.
        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            20,
            ReadStatus::Partial,
            13,
            ReadMode::Hard,
        );
        expect_samples(&frame, 13, 0.06);

        let frame = expect_frame(
            &mut fix.reader,
            &fix.factory,
            &spec(),
            7,
            ReadStatus::Complete,
            7,
            ReadMode::Hard,
        );
        expect_samples(&frame, 7, 0.06);

        assert_eq!(fix.mock_reader.num_unread(), 0);
    }

    #[test]
    fn verify_large_gap_split_by_buffer() {
        // The factory buffer holds only 64 samples: a lost frame bigger than that is
        // split via partial reads.
        let factory = FrameFactory::new(64 * 4, 32);

        let mock = MockReader::new(factory.clone(), spec());
        let mock_reader = mock.handle();

        let plc = MockPlc::new(spec(), 16, 0, 0.5);
        let mock_plc = plc.handle();

        let mut reader =
            PlcReader::new(Box::new(mock), factory.clone(), Box::new(plc), &spec())
                .unwrap();

        mock_reader.add(64, 0.11, FrameFlags::HAS_SIGNAL);
        mock_reader.add(100, 0.00, FrameFlags::HAS_GAPS);

        let _ = expect_frame(
            &mut reader,
            &factory,
            &spec(),
            64,
            ReadStatus::Complete,
            64,
            ReadMode::Hard,
        );

        let frame = expect_frame(
            &mut reader,
            &factory,
            &spec(),
            100,
            ReadStatus::Partial,
            64,
            ReadMode::Hard,
        );
        expect_samples(&frame, 64, 0.5);

        let frame = expect_frame(
            &mut reader,
            &factory,
            &spec(),
            36,
            ReadStatus::Complete,
            36,
            ReadMode::Hard,
        );
        expect_samples(&frame, 36, 0.5);

        mock_plc.with(|s| assert_eq!(s.n_lost_samples, 100));
    }

    #[test]
    fn verify_ring_history_order() {
        // For any sequence of writes totaling T samples into a ring of capacity C, the
        // look-behind window holds the last min(T, C) samples in order.
        const CAPACITY: usize = 15;

        let mut rng = SmallRng::seed_from_u64(42);

        for total in [4usize, 15, 16, 40, 153] {
            let mut fix = fixture(CAPACITY, 0, 0.5);

            for n in 0..total {
                fix.mock_reader.add(1, n as f32 / 1000.0, FrameFlags::HAS_SIGNAL);
            }

            // Drain the queued signal with random-size reads.
            let mut read = 0;
            while read < total {
                let n = rng.gen_range(1..=7).min(total - read);
                let frame = expect_frame(
                    &mut fix.reader,
                    &fix.factory,
                    &spec(),
                    n,
                    ReadStatus::Complete,
                    n,
                    ReadMode::Hard,
                );
                assert!(frame.has_flags(FrameFlags::HAS_SIGNAL));
                read += n;
            }

            // Trigger a loss and inspect the reconstructed look-behind window.
            fix.mock_reader.add(1, 0.0, FrameFlags::HAS_GAPS);
            let _ = expect_frame(
                &mut fix.reader,
                &fix.factory,
                &spec(),
                1,
                ReadStatus::Complete,
                1,
                ReadMode::Hard,
            );

            fix.mock_plc.with(|s| {
                let expected = total.min(CAPACITY);
                assert_eq!(s.n_prev_samples, expected);

                for (i, &v) in s.last_prev.iter().enumerate() {
                    let n = total - expected + i;
                    assert!((v - n as f32 / 1000.0).abs() < 1e-6);
                }
            });
        }
    }
}
