// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `registry` module dispatches PLC and resampler backends, including
//! user-registered plugins.

use std::collections::HashMap;

use log::debug;

use runnel_core::errors::{Error, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::spec::SampleSpec;

use crate::beep_plc::BeepPlc;
use crate::builtin_resampler::BuiltinResampler;
use crate::decimation_resampler::DecimationResampler;
use crate::plc::{Plc, PlcBackend, PlcConfig, MIN_BACKEND_ID};
use crate::resampler::{Resampler, ResamplerBackend, ResamplerConfig};
use crate::rubato_resampler::RubatoResampler;

/// Factory function producing a user PLC backend.
pub type PlcFactory =
    Box<dyn Fn(&SampleSpec, &FrameFactory) -> Result<Box<dyn Plc>> + Send + Sync>;

/// Registry of processing backends.
///
/// Holds user-registered PLC plugins and constructs PLC and resampler instances
/// according to their configurations.
#[derive(Default)]
pub struct ProcessorRegistry {
    plc_factories: HashMap<u32, PlcFactory>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user PLC backend under the given id.
    ///
    /// The id must be at least [`MIN_BACKEND_ID`] and not registered yet.
    pub fn register_plc(&mut self, id: u32, factory: PlcFactory) -> Result<()> {
        if id < MIN_BACKEND_ID {
            return Err(Error::BadConfig("plc plugin id below the minimum backend id"));
        }

        if self.plc_factories.contains_key(&id) {
            return Err(Error::BadConfig("plc plugin id already registered"));
        }

        debug!("processor registry: registering plc plugin: id={}", id);

        self.plc_factories.insert(id, factory);

        Ok(())
    }

    /// Instantiate the PLC backend selected by the config, or `None` when PLC is
    /// disabled.
    pub fn new_plc(
        &self,
        config: &PlcConfig,
        sample_spec: &SampleSpec,
        frame_factory: &FrameFactory,
    ) -> Result<Option<Box<dyn Plc>>> {
        let mut config = *config;
        config.deduce_defaults();

        match config.backend {
            PlcBackend::None => Ok(None),
            PlcBackend::Beep => Ok(Some(Box::new(BeepPlc::new(sample_spec)?))),
            PlcBackend::Plugin(id) => match self.plc_factories.get(&id) {
                Some(factory) => Ok(Some(factory(sample_spec, frame_factory)?)),
                None => Err(Error::NoPlugin),
            },
            PlcBackend::Default => unreachable!("deduced above"),
        }
    }

    /// Instantiate the resampler backend selected by the config.
    pub fn new_resampler(
        &self,
        config: &ResamplerConfig,
        in_spec: &SampleSpec,
        out_spec: &SampleSpec,
        frame_factory: &FrameFactory,
    ) -> Result<Box<dyn Resampler>> {
        match config.backend {
            ResamplerBackend::Builtin => {
                Ok(Box::new(BuiltinResampler::new(config, in_spec, out_spec,
                    frame_factory)?))
            }
            ResamplerBackend::Rubato => {
                Ok(Box::new(RubatoResampler::new(config, in_spec, out_spec)?))
            }
            ResamplerBackend::Auto | ResamplerBackend::RubatoDecim => {
                // Decimation handles the dynamic multiplier; an inner resampler is
                // needed only when the nominal rates differ.
                let inner: Option<Box<dyn Resampler>> =
                    if in_spec.rate() != out_spec.rate() {
                        Some(Box::new(RubatoResampler::new(config, in_spec, out_spec)?))
                    }
                    else {
                        None
                    };

                Ok(Box::new(DecimationResampler::new(inner, in_spec, out_spec,
                    frame_factory)?))
            }
        }
    }
}
