//! Coalescing of data records into contiguous write segments.
//!
//! Each USB control transfer carries fixed overhead, so neighbouring records
//! are merged into one segment and written in as few transfers as possible.
//! The merge is bounded by [`MAX_SEGMENT_SIZE`] to keep the in-memory buffer
//! and the device's writable window per request in check.

use std::io::BufRead;

use crate::error::Result;
use crate::record::{Record, RecordKind};

/// Default ceiling for a single coalesced segment. Matches the size of the
/// FX2's on-chip code RAM, so a full image still fits in one segment.
pub const MAX_SEGMENT_SIZE: usize = 0x4000;

/// A maximal run of contiguous firmware bytes destined for one address range.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Segment {
    /// Device address of the first byte.
    pub start_address: u16,

    /// The bytes, in address order: the byte at offset `i` targets
    /// `start_address + i`.
    pub bytes: Vec<u8>,
}

impl Segment {
    /// Number of bytes in the segment.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the segment holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Device address one past the last byte.
    pub fn end_address(&self) -> u16 {
        self.start_address.wrapping_add(self.bytes.len() as u16)
    }
}

/// Folds a stream of records into contiguous, size-bounded segments.
///
/// Feed records in file order; every call returns at most one finished
/// segment. Call [`finish`] after the last record to flush a trailing
/// segment of a file which lacks an end-of-file record.
///
/// [`finish`]: SegmentAccumulator::finish
#[derive(Debug)]
pub struct SegmentAccumulator {
    current: Option<Segment>,
    next_address: u16,
    max_segment_size: usize,
    finished: bool,
}

impl Default for SegmentAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentAccumulator {
    /// Creates an accumulator with the [`MAX_SEGMENT_SIZE`] ceiling.
    pub fn new() -> Self {
        Self::with_max_segment_size(MAX_SEGMENT_SIZE)
    }

    /// Creates an accumulator with a custom segment size ceiling.
    pub fn with_max_segment_size(max_segment_size: usize) -> Self {
        Self {
            current: None,
            next_address: 0,
            max_segment_size,
            finished: false,
        }
    }

    /// Consumes one record, returning a segment when one is complete.
    ///
    /// A data record is appended to the open segment if it continues it
    /// directly and the ceiling allows; otherwise the open segment is
    /// flushed and a new one started at the record's address. An
    /// end-of-file record flushes the open segment and finishes the stream.
    /// The remaining record kinds are accepted but have no effect.
    pub fn feed(&mut self, record: &Record) -> Option<Segment> {
        match record.kind {
            RecordKind::EndOfFile => {
                self.finished = true;
                self.take_current()
            }
            RecordKind::Data => {
                if self.finished {
                    log::warn!(
                        "ignoring data record at 0x{:04x} after end-of-file record",
                        record.address
                    );
                    return None;
                }

                let mut flushed = None;
                if let Some(current) = &self.current {
                    if record.address != self.next_address
                        || current.bytes.len() + record.payload.len() > self.max_segment_size
                    {
                        flushed = self.take_current();
                    }
                }

                let current = self.current.get_or_insert_with(|| Segment {
                    start_address: record.address,
                    bytes: Vec::new(),
                });
                current.bytes.extend_from_slice(&record.payload);
                self.next_address = record.address.wrapping_add(record.payload.len() as u16);

                flushed
            }
            kind => {
                log::debug!("ignoring unhandled {:?} record at 0x{:04x}", kind, record.address);
                None
            }
        }
    }

    /// Flushes the trailing segment once the input is exhausted.
    pub fn finish(&mut self) -> Option<Segment> {
        self.finished = true;
        self.take_current()
    }

    /// Whether an end-of-file record has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn take_current(&mut self) -> Option<Segment> {
        self.current.take().filter(|segment| !segment.is_empty())
    }
}

/// Reads an Intel HEX image line by line into flush-ordered segments.
///
/// Blank lines are skipped; reading stops at the first end-of-file record.
pub fn read_segments<R: BufRead>(reader: R) -> Result<Vec<Segment>> {
    let mut accumulator = SegmentAccumulator::new();
    let mut segments = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = Record::parse(&line)?;
        if let Some(segment) = accumulator.feed(&record) {
            segments.push(segment);
        }
        if accumulator.is_finished() {
            break;
        }
    }

    if let Some(segment) = accumulator.finish() {
        segments.push(segment);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ParseError};

    fn data_record(address: u16, payload: &[u8]) -> Record {
        Record {
            address,
            kind: RecordKind::Data,
            payload: payload.to_vec(),
        }
    }

    fn end_of_file() -> Record {
        Record {
            address: 0,
            kind: RecordKind::EndOfFile,
            payload: Vec::new(),
        }
    }

    #[test]
    fn coalesces_contiguous_records() {
        let mut accumulator = SegmentAccumulator::new();
        assert_eq!(accumulator.feed(&data_record(0x0000, &[1, 2, 3, 4])), None);
        assert_eq!(accumulator.feed(&data_record(0x0004, &[5, 6, 7, 8])), None);

        let segment = accumulator.finish().unwrap();
        assert_eq!(segment.start_address, 0x0000);
        assert_eq!(segment.bytes, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(segment.end_address(), 0x0008);
    }

    #[test]
    fn splits_at_address_gap() {
        let mut accumulator = SegmentAccumulator::new();
        assert_eq!(accumulator.feed(&data_record(0x0000, &[1, 2, 3, 4])), None);

        let first = accumulator.feed(&data_record(0x0010, &[5, 6, 7, 8])).unwrap();
        assert_eq!(first.start_address, 0x0000);
        assert_eq!(first.bytes, [1, 2, 3, 4]);

        let second = accumulator.finish().unwrap();
        assert_eq!(second.start_address, 0x0010);
        assert_eq!(second.bytes, [5, 6, 7, 8]);
    }

    #[test]
    fn splits_at_size_ceiling() {
        let mut accumulator = SegmentAccumulator::with_max_segment_size(8);
        assert_eq!(accumulator.feed(&data_record(0x0000, &[0; 4])), None);
        assert_eq!(accumulator.feed(&data_record(0x0004, &[0; 4])), None);

        // Still contiguous, but appending would exceed the ceiling.
        let first = accumulator.feed(&data_record(0x0008, &[0; 4])).unwrap();
        assert_eq!(first.start_address, 0x0000);
        assert_eq!(first.len(), 8);

        let second = accumulator.finish().unwrap();
        assert_eq!(second.start_address, 0x0008);
        assert_eq!(second.len(), 4);
    }

    #[test]
    fn never_emits_segments_above_the_ceiling() {
        let mut accumulator = SegmentAccumulator::with_max_segment_size(10);
        let mut emitted = Vec::new();
        for i in 0..16u16 {
            emitted.extend(accumulator.feed(&data_record(i * 4, &[i as u8; 4])));
        }
        emitted.extend(accumulator.finish());

        assert!(emitted.iter().all(|segment| segment.len() <= 10));
        let total: usize = emitted.iter().map(Segment::len).sum();
        assert_eq!(total, 64);
    }

    #[test]
    fn end_of_file_flushes_and_finishes() {
        let mut accumulator = SegmentAccumulator::new();
        accumulator.feed(&data_record(0x0100, &[0xAA, 0xBB]));

        let segment = accumulator.feed(&end_of_file()).unwrap();
        assert_eq!(segment.start_address, 0x0100);
        assert!(accumulator.is_finished());

        // Data after the end-of-file record is dropped.
        assert_eq!(accumulator.feed(&data_record(0x0200, &[1])), None);
        assert_eq!(accumulator.finish(), None);
    }

    #[test]
    fn unhandled_kinds_do_not_break_contiguity() {
        let mut accumulator = SegmentAccumulator::new();
        accumulator.feed(&data_record(0x0000, &[1, 2]));
        let extended = Record {
            address: 0,
            kind: RecordKind::ExtendedSegmentAddress,
            payload: vec![0x10, 0x00],
        };
        assert_eq!(accumulator.feed(&extended), None);
        assert_eq!(accumulator.feed(&data_record(0x0002, &[3, 4])), None);

        let segment = accumulator.finish().unwrap();
        assert_eq!(segment.bytes, [1, 2, 3, 4]);
    }

    #[test]
    fn reads_segments_from_hex_text() {
        let image = ":0400000001020304F2\n\n:0400040005060708DE\n:00000001FF\n";
        let segments = read_segments(image.as_bytes()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_address, 0x0000);
        assert_eq!(segments[0].bytes, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn empty_image_yields_no_segments() {
        let segments = read_segments(":00000001FF\n".as_bytes()).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn propagates_parse_errors() {
        let result = read_segments("garbage\n".as_bytes());
        assert!(matches!(
            result,
            Err(Error::Parse(ParseError::MalformedLine))
        ));
    }
}
