//! Pluggable equality between a local and a remote content source.

use std::io::{self, BufReader, Bytes, Read};

use triad_core::{ContentSource, ContentStream, ProgressMonitor, SubMonitor};

/// Equality predicate between a local and a remote entity.
pub trait ComparisonCriteria: Send + Sync {
    fn name(&self) -> &str;

    fn compare(
        &self,
        local: &dyn ContentSource,
        remote: &dyn ContentSource,
        monitor: &mut dyn ProgressMonitor,
    ) -> bool;
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Equal when both sides report the same modification stamp.
///
/// Cheap; mostly useful as a precondition in front of [`ContentComparison`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampComparison;

impl ComparisonCriteria for TimestampComparison {
    fn name(&self) -> &str {
        "timestamp"
    }

    fn compare(
        &self,
        local: &dyn ContentSource,
        remote: &dyn ContentSource,
        _monitor: &mut dyn ProgressMonitor,
    ) -> bool {
        match (local.modified(), remote.modified()) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

const TOTAL_WORK: u32 = 100;
const PRECONDITION_WORK: u32 = 10;
const SIDE_WORK: u32 = 45;

/// Byte-wise content comparison with an optional precondition chain.
///
/// Preconditions run first, in order; the first one that reports equal
/// short-circuits the content read.
#[derive(Default)]
pub struct ContentComparison {
    ignore_whitespace: bool,
    preconditions: Vec<Box<dyn ComparisonCriteria>>,
}

impl ContentComparison {
    pub fn new(ignore_whitespace: bool) -> Self {
        Self {
            ignore_whitespace,
            preconditions: Vec::new(),
        }
    }

    pub fn with_precondition(mut self, criteria: impl ComparisonCriteria + 'static) -> Self {
        self.preconditions.push(Box::new(criteria));
        self
    }

    fn preconditions_hold(
        &self,
        local: &dyn ContentSource,
        remote: &dyn ContentSource,
        monitor: &mut dyn ProgressMonitor,
    ) -> bool {
        let mut sub = SubMonitor::new(monitor, PRECONDITION_WORK);
        sub.begin_task("", self.preconditions.len() as u32);
        let hit = self.preconditions.iter().any(|criteria| {
            let equal = criteria.compare(local, remote, &mut sub);
            sub.worked(1);
            equal
        });
        sub.done();
        hit
    }
}

impl ComparisonCriteria for ContentComparison {
    fn name(&self) -> &str {
        "content"
    }

    fn compare(
        &self,
        local: &dyn ContentSource,
        remote: &dyn ContentSource,
        monitor: &mut dyn ProgressMonitor,
    ) -> bool {
        monitor.begin_task("Comparing contents", TOTAL_WORK);
        let equal = if self.preconditions_hold(local, remote, monitor) {
            true
        } else {
            match self.compare_streams(local, remote, monitor) {
                Ok(equal) => equal,
                Err(err) => {
                    tracing::warn!(
                        local = local.name(),
                        remote = remote.name(),
                        error = %err,
                        "content comparison failed; treating as different",
                    );
                    false
                }
            }
        };
        monitor.done();
        equal
    }
}

impl ContentComparison {
    /// Streams are dropped, and so closed, on every return path.
    fn compare_streams(
        &self,
        local: &dyn ContentSource,
        remote: &dyn ContentSource,
        monitor: &mut dyn ProgressMonitor,
    ) -> io::Result<bool> {
        let left = open_side(local, monitor, "local")?;
        let right = open_side(remote, monitor, "remote")?;
        match (left, right) {
            (None, None) => Ok(true),
            (Some(_), None) | (None, Some(_)) => Ok(false),
            (Some(left), Some(right)) => contents_equal(left, right, self.ignore_whitespace),
        }
    }
}

fn open_side(
    source: &dyn ContentSource,
    monitor: &mut dyn ProgressMonitor,
    side: &str,
) -> io::Result<Option<ContentStream>> {
    let mut sub = SubMonitor::new(monitor, SIDE_WORK);
    sub.sub_task(&format!("Opening {side} {}", source.name()));
    let stream = source.open();
    sub.done();
    stream
}

/// Compare two readers byte by byte.
///
/// With `ignore_whitespace`, runs of ASCII whitespace are skipped on each
/// side independently before every step, so `"a b"` equals `"ab"`. I/O
/// failures are returned as such; callers that must fold them into
/// "different" do so themselves.
pub fn contents_equal<L: Read, R: Read>(left: L, right: R, ignore_whitespace: bool) -> io::Result<bool> {
    let mut left = BufReader::new(left).bytes();
    let mut right = BufReader::new(right).bytes();
    loop {
        let l = next_byte(&mut left, ignore_whitespace)?;
        let r = next_byte(&mut right, ignore_whitespace)?;
        match (l, r) {
            (None, None) => return Ok(true),
            (Some(a), Some(b)) if a == b => continue,
            _ => return Ok(false),
        }
    }
}

fn next_byte<R: Read>(bytes: &mut Bytes<BufReader<R>>, ignore_whitespace: bool) -> io::Result<Option<u8>> {
    for byte in bytes.by_ref() {
        let byte = byte?;
        if ignore_whitespace && byte.is_ascii_whitespace() {
            continue;
        }
        return Ok(Some(byte));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{DateTime, TimeZone, Utc};
    use rstest::rstest;
    use triad_core::NullMonitor;

    struct Source {
        bytes: Option<&'static str>,
        modified: Option<DateTime<Utc>>,
        opened: AtomicBool,
    }

    impl Source {
        fn new(bytes: Option<&'static str>) -> Self {
            Self {
                bytes,
                modified: None,
                opened: AtomicBool::new(false),
            }
        }

        fn stamped(bytes: &'static str, secs: i64) -> Self {
            Self {
                modified: Utc.timestamp_opt(secs, 0).single(),
                ..Self::new(Some(bytes))
            }
        }
    }

    impl ContentSource for Source {
        fn name(&self) -> &str {
            "source"
        }

        fn open(&self) -> io::Result<Option<ContentStream>> {
            self.opened.store(true, Ordering::SeqCst);
            Ok(self
                .bytes
                .map(|b| Box::new(Cursor::new(b.as_bytes().to_vec())) as ContentStream))
        }

        fn modified(&self) -> Option<DateTime<Utc>> {
            self.modified
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    struct BrokenSource;

    impl ContentSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        fn open(&self) -> io::Result<Option<ContentStream>> {
            Ok(Some(Box::new(Broken)))
        }
    }

    fn compare(criteria: &ContentComparison, l: &Source, r: &Source) -> bool {
        criteria.compare(l, r, &mut NullMonitor::new())
    }

    #[rstest]
    #[case("a b", "ab", true, true)]
    #[case("a b", "ab", false, false)]
    #[case("a b", "a  b", true, true)]
    #[case("a\n\tb ", " ab", true, true)]
    #[case("a", "b", true, false)]
    #[case("abc", "abc", false, true)]
    #[case("abc", "abcd", false, false)]
    #[case("", "   ", true, true)]
    fn content_pairs(#[case] l: &'static str, #[case] r: &'static str, #[case] ignore: bool, #[case] equal: bool) {
        let criteria = ContentComparison::new(ignore);
        assert_eq!(compare(&criteria, &Source::new(Some(l)), &Source::new(Some(r))), equal);
    }

    #[test]
    fn absent_sides() {
        let criteria = ContentComparison::new(false);
        assert!(compare(&criteria, &Source::new(None), &Source::new(None)));
        assert!(!compare(&criteria, &Source::new(None), &Source::new(Some("x"))));
        assert!(!compare(&criteria, &Source::new(Some("x")), &Source::new(None)));
    }

    #[test]
    fn read_failure_counts_as_different() {
        let criteria = ContentComparison::new(false);
        assert!(!criteria.compare(&BrokenSource, &Source::new(Some("")), &mut NullMonitor::new()));
        assert!(contents_equal(Broken, Cursor::new(b"".to_vec()), false).is_err());
    }

    #[test]
    fn matching_precondition_skips_content_read() {
        let criteria = ContentComparison::new(false).with_precondition(TimestampComparison);
        let local = Source::stamped("old", 100);
        let remote = Source::stamped("new", 100);
        assert!(compare(&criteria, &local, &remote));
        assert!(!local.opened.load(Ordering::SeqCst));
        assert!(!remote.opened.load(Ordering::SeqCst));
    }

    #[test]
    fn failed_precondition_falls_through_to_content() {
        let criteria = ContentComparison::new(false).with_precondition(TimestampComparison);
        let local = Source::stamped("same", 100);
        let remote = Source::stamped("same", 200);
        assert!(compare(&criteria, &local, &remote));
        assert!(local.opened.load(Ordering::SeqCst));
    }

    #[test]
    fn timestamp_needs_both_stamps() {
        let mut monitor = NullMonitor::new();
        let stamped = Source::stamped("x", 5);
        assert!(!TimestampComparison.compare(&stamped, &Source::new(Some("x")), &mut monitor));
        assert!(TimestampComparison.compare(&stamped, &Source::stamped("y", 5), &mut monitor));
    }
}
