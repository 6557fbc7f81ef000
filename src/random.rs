// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Reproducible random streams.
//!
//! Each chooser gets its own generator, seeded from the run seed, the name of the channel (the
//! model step) and the identifier of the chooser. The draws of a chooser therefore do not depend
//! on the other choosers processed in the same batch.
use rand::prelude::*;
use rand_xorshift::XorShiftRng;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Random streams of a model step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomStreams {
    seed: u64,
    channel: u64,
}

impl RandomStreams {
    /// Creates the random streams of the channel with the given name.
    pub fn new(seed: u64, channel: &str) -> Self {
        // FNV-1a hash, stable across platforms and compiler versions.
        let channel = channel
            .bytes()
            .fold(FNV_OFFSET, |h, b| (h ^ b as u64).wrapping_mul(FNV_PRIME));
        RandomStreams { seed, channel }
    }

    /// Returns the generator of the given chooser.
    pub fn rng_for(&self, id: u64) -> XorShiftRng {
        XorShiftRng::seed_from_u64(self.seed ^ self.channel ^ id.wrapping_mul(GOLDEN_GAMMA))
    }

    /// Returns the first uniform draw in `[0, 1)` of the given chooser.
    pub fn uniform(&self, id: u64) -> f64 {
        self.rng_for(id).gen::<f64>()
    }
}
