// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `wav` module implements a file-backed source and sink for WAV files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use runnel_core::errors::{bad_config_error, Error, ReadStatus, Result};
use runnel_core::frame::{Frame, FrameFlags};
use runnel_core::reader::ReadMode;
use runnel_core::sample::{PcmFormat, Sample};
use runnel_core::channels::{ChannelLayout, ChannelMask, ChannelOrder, ChannelSet};
use runnel_core::spec::SampleSpec;

use crate::device::{Device, DeviceType, Sink, Source};

fn map_hound_error(err: hound::Error) -> Error {
    match err {
        hound::Error::IoError(err) => Error::IoError(err),
        hound::Error::FormatError(msg) => Error::DeviceError(msg),
        hound::Error::Unsupported => Error::NoFormat,
        _ => Error::DeviceError("wav codec failure"),
    }
}

fn channel_set_for(channels: u16) -> ChannelSet {
    match channels {
        1 => ChannelSet::mono(),
        2 => ChannelSet::stereo(),
        n => ChannelSet::new(
            ChannelLayout::Multitrack,
            ChannelOrder::Smpte,
            ChannelMask::multitrack(n as u32),
        ),
    }
}

/// An unclocked source reading raw frames from a WAV file.
pub struct WavSource {
    reader: Option<WavReader<BufReader<File>>>,
    path: PathBuf,
    spec: SampleSpec,
    wav_spec: WavSpec,
}

impl WavSource {
    /// Open a WAV file.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path).map_err(map_hound_error)?;
        let wav_spec = reader.spec();

        let spec = SampleSpec::new(
            wav_spec.sample_rate,
            PcmFormat::Raw,
            channel_set_for(wav_spec.channels),
        );

        debug!("wav source: opened: path={:?} spec={}", path, spec);

        Ok(WavSource { reader: Some(reader), path: path.to_path_buf(), spec, wav_spec })
    }

    fn next_sample(&mut self) -> Result<Option<Sample>> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return bad_config_error("wav source is closed"),
        };

        match self.wav_spec.sample_format {
            SampleFormat::Float => match reader.samples::<f32>().next() {
                Some(sample) => Ok(Some(sample.map_err(map_hound_error)?)),
                None => Ok(None),
            },
            SampleFormat::Int => {
                let scale = (1u32 << (self.wav_spec.bits_per_sample - 1)) as f32;

                match reader.samples::<i32>().next() {
                    Some(sample) => {
                        Ok(Some(sample.map_err(map_hound_error)? as f32 / scale))
                    }
                    None => Ok(None),
                }
            }
        }
    }
}

impl Device for WavSource {
    fn device_type(&self) -> DeviceType {
        DeviceType::Source
    }

    fn sample_spec(&self) -> SampleSpec {
        self.spec
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;

        Ok(())
    }
}

impl Source for WavSource {
    fn rewind(&mut self) -> Result<()> {
        debug!("wav source: rewinding: path={:?}", self.path);

        self.reader = Some(WavReader::open(&self.path).map_err(map_hound_error)?);

        Ok(())
    }

    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        _mode: ReadMode,
    ) -> Result<ReadStatus> {
        // Files are always "buffered", so soft reads behave like hard reads.
        let num_channels = self.spec.num_channels();

        let capacity = frame.byte_capacity() / std::mem::size_of::<Sample>();
        if capacity < num_channels {
            return Err(Error::BadBuffer("wav source requires a pre-attached buffer"));
        }

        let capped = duration.min(capacity / num_channels);
        let max_samples = capped * num_channels;

        frame.set_raw(true);
        frame.set_num_bytes(max_samples * std::mem::size_of::<Sample>());

        let mut n_read = 0;
        while n_read < max_samples {
            match self.next_sample()? {
                Some(sample) => {
                    frame.samples_mut()[n_read] = sample;
                    n_read += 1;
                }
                None => break,
            }
        }

        if n_read == 0 {
            return Ok(ReadStatus::Finished);
        }

        frame.set_num_bytes(n_read * std::mem::size_of::<Sample>());
        frame.set_duration(n_read / num_channels);
        frame.set_capture_ts(0);

        if n_read == duration * num_channels {
            frame.set_flags(FrameFlags::HAS_SIGNAL);
            Ok(ReadStatus::Complete)
        }
        else {
            frame.set_flags(FrameFlags::HAS_SIGNAL | FrameFlags::NOT_COMPLETE);
            Ok(ReadStatus::Partial)
        }
    }
}

/// A sink writing raw frames into a 32-bit float WAV file.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    spec: SampleSpec,
}

impl WavSink {
    /// Create (or overwrite) a WAV file accepting frames of the given spec.
    pub fn create(path: &Path, spec: &SampleSpec) -> Result<Self> {
        if !spec.is_complete() || !spec.is_raw() {
            return bad_config_error("wav sink requires a complete raw sample spec");
        }

        let wav_spec = WavSpec {
            channels: spec.num_channels() as u16,
            sample_rate: spec.rate(),
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let writer = WavWriter::create(path, wav_spec).map_err(map_hound_error)?;

        debug!("wav sink: created: path={:?} spec={}", path, spec);

        Ok(WavSink { writer: Some(writer), spec: *spec })
    }
}

impl Device for WavSink {
    fn device_type(&self) -> DeviceType {
        DeviceType::Sink
    }

    fn sample_spec(&self) -> SampleSpec {
        self.spec
    }

    fn close(&mut self) -> Result<()> {
        // Finalization rewrites the WAV header with the final data length.
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(map_hound_error)?;
        }

        Ok(())
    }
}

impl Sink for WavSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return bad_config_error("wav sink is closed"),
        };

        for &sample in frame.samples() {
            writer.write_sample(sample).map_err(map_hound_error)?;
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush().map_err(map_hound_error),
            None => Ok(()),
        }
    }
}
