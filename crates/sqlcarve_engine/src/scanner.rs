//! Candidate enumeration.
//!
//! Every start offset is tried independently, so matches may overlap.
//! Iteration is restartable: cloning a fresh [`Matches`] over the same
//! buffer yields the same sequence.

use crate::pattern::CompiledMatcher;
use crate::scenario::Scenario;
use std::ops::Range;
use std::sync::Arc;

/// A header span accepted by a matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMatch {
    pub table: Arc<str>,
    pub scenario: Scenario,
    pub start: usize,
    /// Exclusive end of the header span.
    pub end: usize,
    pub source_file: Arc<str>,
}

impl CandidateMatch {
    pub fn span(&self) -> usize {
        self.end - self.start
    }
}

/// Iterator over the matches of one matcher in one buffer.
#[derive(Debug, Clone)]
pub struct Matches<'a> {
    matcher: &'a CompiledMatcher,
    buf: &'a [u8],
    next: usize,
    stop: usize,
    source_file: Arc<str>,
}

impl<'a> Iterator for Matches<'a> {
    type Item = CandidateMatch;

    fn next(&mut self) -> Option<CandidateMatch> {
        while self.next < self.stop {
            let start = self.next;
            self.next += 1;
            if let Some(end) = self.matcher.match_at(self.buf, start) {
                return Some(CandidateMatch {
                    table: Arc::clone(self.matcher.table_name()),
                    scenario: self.matcher.scenario(),
                    start,
                    end,
                    source_file: Arc::clone(&self.source_file),
                });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.stop.saturating_sub(self.next)))
    }
}

/// All matches in `buf`, ascending by start offset.
pub fn scan<'a>(matcher: &'a CompiledMatcher, buf: &'a [u8], source_file: Arc<str>) -> Matches<'a> {
    scan_range(matcher, buf, 0..buf.len(), source_file)
}

/// Matches whose start offset lies in `starts`. Spans may extend past the
/// range end.
pub fn scan_range<'a>(
    matcher: &'a CompiledMatcher,
    buf: &'a [u8],
    starts: Range<usize>,
    source_file: Arc<str>,
) -> Matches<'a> {
    Matches {
        matcher,
        buf,
        next: starts.start,
        stop: starts.end.min(buf.len()),
        source_file,
    }
}
