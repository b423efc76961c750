//! Firmware load orchestration.
//!
//! Loading is a strict single pass: halt the CPU, write every segment in
//! emission order as control-transfer sized chunks, release the CPU. There
//! is no retry and no partial-chunk resume; a half-written instruction
//! stream must never be started, so the first short transfer aborts the
//! whole load. A failure while releasing the CPU can leave the device
//! halted, in which case the caller has to issue another reset itself.

use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::transport::{
    Transport, CPU_CONTROL_ADDRESS, CPU_HALT, CPU_RUN, MAX_CTRL_LEN, REQ_RW_INTERNAL,
};

/// A stepwise device operation yielding progress in bytes.
///
/// Iterating performs the operation one transfer at a time, which allows
/// progress feedback; [`execute`] drives it to completion in one call.
///
/// [`execute`]: Operation::execute
pub trait Operation: Iterator<Item = Result<usize>> {
    /// Total number of payload bytes the operation will move.
    fn total(&self) -> usize;

    /// Runs the operation to completion and returns the bytes written.
    fn execute(&mut self) -> Result<usize> {
        let mut written = 0;
        while let Some(progress) = self.next() {
            written = progress?;
        }
        Ok(written)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    Halt,
    Write,
    Resume,
    Done,
}

/// A firmware load over a sequence of segments.
///
/// Each iteration step performs one control transfer and yields the
/// cumulative number of firmware bytes written: `Ok(0)` for the CPU halt,
/// one item per chunk, and the final total again for the CPU release. The
/// iterator is fused by the first error; no further transfer is attempted
/// afterwards.
pub struct Load<'a, T: Transport> {
    transport: &'a mut T,
    segments: Vec<Segment>,
    state: State,
    segment: usize,
    offset: usize,
    written: usize,
}

impl<'a, T: Transport> Load<'a, T> {
    /// Prepares a load of `segments` through `transport`.
    pub fn new(transport: &'a mut T, segments: Vec<Segment>) -> Self {
        Self {
            transport,
            segments,
            state: State::Halt,
            segment: 0,
            offset: 0,
            written: 0,
        }
    }

    fn fail(&mut self, error: Error) -> Option<Result<usize>> {
        self.state = State::Done;
        Some(Err(error))
    }
}

impl<T: Transport> Operation for Load<'_, T> {
    fn total(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }
}

impl<T: Transport> Iterator for Load<'_, T> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                State::Done => return None,
                State::Halt => {
                    log::debug!("stopping CPU");
                    return match cpu_control(self.transport, CPU_HALT) {
                        Ok(()) => {
                            self.state = State::Write;
                            Some(Ok(0))
                        }
                        Err(error) => self.fail(error),
                    };
                }
                State::Write => {
                    // Skip to the segment holding unwritten bytes.
                    while self
                        .segments
                        .get(self.segment)
                        .is_some_and(|segment| self.offset >= segment.len())
                    {
                        self.segment += 1;
                        self.offset = 0;
                    }
                    let Some(segment) = self.segments.get(self.segment) else {
                        self.state = State::Resume;
                        continue;
                    };

                    let length = (segment.len() - self.offset).min(MAX_CTRL_LEN);
                    let address = segment.start_address.wrapping_add(self.offset as u16);
                    let chunk = &segment.bytes[self.offset..self.offset + length];

                    log::info!("0x{:04x} loading {:4} bytes", address, length);
                    return match self.transport.write(REQ_RW_INTERNAL, address, 0, chunk) {
                        Ok(wrote) if wrote == length => {
                            self.offset += length;
                            self.written += length;
                            Some(Ok(self.written))
                        }
                        Ok(wrote) => self.fail(Error::Transfer {
                            address,
                            expected: length,
                            wrote,
                        }),
                        Err(error) => self.fail(error),
                    };
                }
                State::Resume => {
                    log::debug!("starting CPU");
                    return match cpu_control(self.transport, CPU_RUN) {
                        Ok(()) => {
                            self.state = State::Done;
                            Some(Ok(self.written))
                        }
                        Err(error) => self.fail(error),
                    };
                }
            }
        }
    }
}

/// Writes the CPU control register. A short write means the device did not
/// take the reset request.
pub(crate) fn cpu_control<T: Transport>(transport: &mut T, value: u8) -> Result<()> {
    let wrote = transport.write(REQ_RW_INTERNAL, CPU_CONTROL_ADDRESS, 0, &[value])?;
    if wrote != 1 {
        return Err(Error::CpuReset);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::transport::REQ_RW_EEPROM;

    fn segment(start_address: u16, bytes: Vec<u8>) -> Segment {
        Segment {
            start_address,
            bytes,
        }
    }

    #[test]
    fn writes_segments_between_cpu_transitions() {
        let mut transport = MockTransport::new();
        let segments = vec![
            segment(0x0000, vec![1, 2, 3, 4]),
            segment(0x0100, vec![5, 6]),
        ];

        let written = Load::new(&mut transport, segments).execute().unwrap();
        assert_eq!(written, 6);

        assert_eq!(transport.writes.len(), 4);
        assert_eq!(
            transport.writes[0],
            (REQ_RW_INTERNAL, CPU_CONTROL_ADDRESS, 0, vec![CPU_HALT])
        );
        assert_eq!(
            transport.writes[1],
            (REQ_RW_INTERNAL, 0x0000, 0, vec![1, 2, 3, 4])
        );
        assert_eq!(transport.writes[2], (REQ_RW_INTERNAL, 0x0100, 0, vec![5, 6]));
        assert_eq!(
            transport.writes[3],
            (REQ_RW_INTERNAL, CPU_CONTROL_ADDRESS, 0, vec![CPU_RUN])
        );
        assert!(!transport
            .writes
            .iter()
            .any(|(request, ..)| *request == REQ_RW_EEPROM));
    }

    #[test]
    fn splits_large_segments_into_chunks() {
        let mut transport = MockTransport::new();
        let segments = vec![segment(0x0100, vec![0xA5; MAX_CTRL_LEN + 100])];

        let written = Load::new(&mut transport, segments).execute().unwrap();
        assert_eq!(written, MAX_CTRL_LEN + 100);

        // Halt, two chunks at increasing addresses, resume.
        assert_eq!(transport.writes.len(), 4);
        assert_eq!(transport.writes[1].1, 0x0100);
        assert_eq!(transport.writes[1].3.len(), MAX_CTRL_LEN);
        assert_eq!(transport.writes[2].1, 0x0100 + MAX_CTRL_LEN as u16);
        assert_eq!(transport.writes[2].3.len(), 100);
    }

    #[test]
    fn short_chunk_write_aborts_remaining_chunks() {
        let mut transport = MockTransport::new();
        // Five chunks; the third one (write index 3, after the halt) comes
        // up one byte short.
        transport.short_write_at = Some(3);
        let segments = vec![segment(0x0000, vec![0; MAX_CTRL_LEN * 4 + 16])];

        let result = Load::new(&mut transport, segments).execute();
        assert!(matches!(
            result,
            Err(Error::Transfer {
                expected,
                wrote,
                ..
            }) if expected == MAX_CTRL_LEN && wrote == MAX_CTRL_LEN - 1
        ));

        // Halt plus three chunk attempts; chunks four and five and the CPU
        // release were never issued.
        assert_eq!(transport.writes.len(), 4);
    }

    #[test]
    fn empty_image_still_toggles_cpu() {
        let mut transport = MockTransport::new();
        let written = Load::new(&mut transport, Vec::new()).execute().unwrap();
        assert_eq!(written, 0);

        assert_eq!(transport.writes.len(), 2);
        assert_eq!(transport.writes[0].3, vec![CPU_HALT]);
        assert_eq!(transport.writes[1].3, vec![CPU_RUN]);
    }

    #[test]
    fn short_halt_write_is_a_cpu_reset_error() {
        let mut transport = MockTransport::new();
        transport.short_write_at = Some(0);
        let segments = vec![segment(0x0000, vec![1, 2])];

        let result = Load::new(&mut transport, segments).execute();
        assert!(matches!(result, Err(Error::CpuReset)));
        assert_eq!(transport.writes.len(), 1);
    }

    #[test]
    fn short_resume_write_is_a_cpu_reset_error() {
        let mut transport = MockTransport::new();
        // Halt, one chunk, then the resume write comes up short.
        transport.short_write_at = Some(2);
        let segments = vec![segment(0x0000, vec![1, 2])];

        let result = Load::new(&mut transport, segments).execute();
        assert!(matches!(result, Err(Error::CpuReset)));
        assert_eq!(transport.writes.len(), 3);
    }

    #[test]
    fn total_is_the_sum_of_segment_lengths() {
        let mut transport = MockTransport::new();
        let segments = vec![segment(0x0000, vec![0; 7]), segment(0x0100, vec![0; 9])];
        let load = Load::new(&mut transport, segments);
        assert_eq!(load.total(), 16);
    }

    #[test]
    fn yields_cumulative_progress() {
        let mut transport = MockTransport::new();
        let segments = vec![segment(0x0000, vec![0; 4]), segment(0x0100, vec![0; 2])];
        let progress: Vec<usize> = Load::new(&mut transport, segments)
            .collect::<Result<Vec<usize>>>()
            .unwrap();
        assert_eq!(progress, [0, 4, 6, 6]);
    }
}
