// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Progress bar and spinner for the library.
use std::borrow::Cow;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{log_enabled, Level};

/// Interval in milliseconds when spinners are automatically ticked.
const UPDATE_MS: Duration = Duration::from_millis(1000);

/// A progress bar over the choosers of a step, advanced one chunk at a time.
#[derive(Debug, Clone)]
pub struct ChunkProgressBar(ProgressBar);

impl ChunkProgressBar {
    /// Returns a [ChunkProgressBar] over the given number of choosers.
    ///
    /// The bar is hidden when info logs are disabled.
    pub fn new(length: usize) -> Self {
        let bp = if log_enabled!(Level::Info) {
            ProgressBar::new(length as u64)
        } else {
            ProgressBar::hidden()
        };
        bp.set_style(
            ProgressStyle::default_bar()
                .template("{bar:60} {pos}/{len} ETA: {eta}")
                .unwrap(),
        );
        ChunkProgressBar(bp)
    }

    /// Adds a message to the [ChunkProgressBar].
    pub fn with_message(self, msg: impl Into<Cow<'static, str>>) -> Self {
        let bp = self.0.with_message(msg);
        bp.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40} {msg} {pos}/{len} ({eta})")
                .unwrap(),
        );
        ChunkProgressBar(bp)
    }

    /// Advances the bar by the number of choosers of a chunk.
    pub fn inc(&self, nb_choosers: usize) {
        self.0.inc(nb_choosers as u64);
    }

    /// Sets the progress bar to finished.
    pub fn finish(&self) {
        self.0.finish_and_clear();
    }
}

/// A spinner.
#[derive(Debug)]
pub struct Spinner(ProgressBar);

impl Spinner {
    /// Starts a [Spinner] with the given message.
    pub fn new(msg: &str) -> Self {
        let bp = if log_enabled!(Level::Info) {
            ProgressBar::new(1).with_message(msg.to_owned())
        } else {
            ProgressBar::hidden()
        };
        bp.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .unwrap(),
        );
        bp.enable_steady_tick(UPDATE_MS);
        Spinner(bp)
    }

    /// Sets the spinner to finished.
    pub fn finish(&mut self) {
        self.0.finish_and_clear();
    }
}
