// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Splitting of the choosers into memory-bounded chunks.
use std::ops::Range;

use log::debug;

/// Bytes used by one value of an interaction or probability row.
const VALUE_BYTES: usize = std::mem::size_of::<f64>();

/// Estimated bytes of one chooser in the interaction evaluator: one utility plus one value per
/// term for each alternative, and the index of each alternative.
pub fn interaction_row_size(nb_alternatives: usize, nb_terms: usize) -> usize {
    let per_row = (nb_terms + 1) * VALUE_BYTES + std::mem::size_of::<usize>();
    nb_alternatives.max(1) * per_row
}

/// Estimated bytes of one chooser in the probabilistic scheduler: its probability row and its
/// join key.
pub fn probabilistic_row_size(nb_codes: usize, nb_join_columns: usize) -> usize {
    (nb_codes.max(1) + nb_join_columns) * VALUE_BYTES
}

fn chunk_length(budget: usize, row_size: usize) -> usize {
    if budget == 0 {
        usize::MAX
    } else {
        (budget / row_size.max(1)).max(1)
    }
}

/// Returns consecutive ranges covering `0..len`, each one using at most `budget` bytes (a chunk
/// has at least one row).
///
/// A `budget` of 0 means no limit: everything is in a single chunk.
pub fn chunks(len: usize, budget: usize, row_size: usize) -> Vec<Range<usize>> {
    AdaptiveChunker::new(len, budget, row_size).collect()
}

/// Iterator over chunks whose length adapts to the memory actually observed in the previous
/// chunks.
#[derive(Clone, Debug)]
pub struct AdaptiveChunker {
    len: usize,
    next: usize,
    budget: usize,
    row_size: usize,
}

impl AdaptiveChunker {
    /// Creates a chunker over `0..len` with an initial estimate of the bytes per row.
    pub fn new(len: usize, budget: usize, row_size: usize) -> Self {
        AdaptiveChunker {
            len,
            next: 0,
            budget,
            row_size: row_size.max(1),
        }
    }

    /// Returns the current estimate of the bytes per row.
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Returns the next chunk, or `None` if all rows have been yielded.
    pub fn next_chunk(&mut self) -> Option<Range<usize>> {
        if self.next >= self.len {
            return None;
        }
        let length = chunk_length(self.budget, self.row_size).min(self.len - self.next);
        let range = self.next..self.next + length;
        self.next = range.end;
        debug!(
            "Chunk {}..{} of {} ({} bytes per row)",
            range.start, range.end, self.len, self.row_size
        );
        Some(range)
    }

    /// Updates the estimate of the bytes per row from the bytes used by the last chunk.
    pub fn observe(&mut self, rows: usize, bytes: usize) {
        if rows == 0 {
            return;
        }
        let observed = bytes.div_ceil(rows).max(1);
        if observed != self.row_size {
            debug!(
                "Adjusting row size from {} to {} bytes",
                self.row_size, observed
            );
            self.row_size = observed;
        }
    }
}

impl Iterator for AdaptiveChunker {
    type Item = Range<usize>;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}
