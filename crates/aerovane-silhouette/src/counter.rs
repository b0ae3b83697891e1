// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CPU pixel counting.
//!
//! Tallies how many pixels each tag index owns in a read-back tag grid.
//! The scan is chunked over scoped worker threads with one local histogram
//! per chunk, merged at the end; the math is identical to the GPU compute
//! kernel so both paths satisfy the same property tests.

/// Counts occurrences of each tag in `tags` into `counts`.
///
/// `counts` must already be sized to cover every valid tag plus the
/// background slot 0; out-of-range tags are ignored with a logged warning
/// (they indicate a stale render target, not a caller error).
pub fn count_pixels(tags: &[u32], counts: &mut [u32]) {
    counts.fill(0);
    if tags.is_empty() || counts.is_empty() {
        return;
    }

    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(tags.len());

    if threads <= 1 {
        tally(tags, counts);
        return;
    }

    let chunk_len = tags.len().div_ceil(threads);
    let mut partials: Vec<Vec<u32>> = Vec::new();

    std::thread::scope(|scope| {
        let handles: Vec<_> = tags
            .chunks(chunk_len)
            .map(|chunk| {
                let len = counts.len();
                scope.spawn(move || {
                    let mut local = vec![0u32; len];
                    tally(chunk, &mut local);
                    local
                })
            })
            .collect();
        for handle in handles {
            match handle.join() {
                Ok(local) => partials.push(local),
                Err(_) => log::error!("count_pixels: counting worker panicked; chunk dropped"),
            }
        }
    });

    for local in partials {
        for (total, part) in counts.iter_mut().zip(local) {
            *total += part;
        }
    }
}

fn tally(tags: &[u32], counts: &mut [u32]) {
    let mut overflow = 0usize;
    for &tag in tags {
        match counts.get_mut(tag as usize) {
            Some(slot) => *slot += 1,
            None => overflow += 1,
        }
    }
    if overflow > 0 {
        log::warn!("count_pixels: {overflow} pixel(s) carried tags outside the index range");
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_match_naive_tally() {
        let tags: Vec<u32> = (0..10_000).map(|i| (i * 7 + i / 13) % 5).collect();
        let mut counts = vec![0u32; 5];
        count_pixels(&tags, &mut counts);

        let mut expected = vec![0u32; 5];
        for &t in &tags {
            expected[t as usize] += 1;
        }
        assert_eq!(counts, expected);
        assert_eq!(counts.iter().sum::<u32>() as usize, tags.len());
    }

    #[test]
    fn test_recount_clears_previous_results() {
        let mut counts = vec![9u32; 3];
        count_pixels(&[1, 1, 2], &mut counts);
        assert_eq!(counts, vec![0, 2, 1]);
    }

    #[test]
    fn test_out_of_range_tags_ignored() {
        let mut counts = vec![0u32; 2];
        count_pixels(&[0, 1, 7, 7], &mut counts);
        assert_eq!(counts, vec![1, 1]);
    }

    #[test]
    fn test_empty_inputs() {
        let mut counts = vec![1u32; 4];
        count_pixels(&[], &mut counts);
        assert_eq!(counts, vec![0; 4]);
    }
}
