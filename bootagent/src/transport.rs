//! Byte transport between the agent and the host.

use crate::error::{Error, Result};
use log::trace;
use std::io::{self, Read, Write};

/// Blocking byte channel with no framing knowledge.
pub trait Transport {
    /// Fill `buf` completely, waiting as long as needed.
    fn receive(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Queue `data` for sending.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Wait until everything sent has left.
    fn flush(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).receive(buf)
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// [`Transport`] over any `Read + Write` stream.
///
/// Read timeouts are treated as "nothing yet" and retried, which turns a
/// polling serial port into a blocking receive. Between retries the
/// interrupt check is consulted so the embedding application can stop the
/// loop. End of stream means the host went away.
pub struct StreamTransport<S> {
    stream: S,
    interrupted: fn() -> bool,
}

impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .finish_non_exhaustive()
    }
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap a stream, using the global interrupt checker.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            interrupted: crate::is_interrupted_requested,
        }
    }

    /// Use a different interrupt check.
    #[must_use]
    pub fn with_interrupt_check(mut self, interrupted: fn() -> bool) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// The wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self
                .stream
                .read(&mut buf[filled..])
            {
                Ok(0) => return Err(Error::Disconnected),
                Ok(n) => filled += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    if (self.interrupted)() {
                        return Err(Error::Interrupted);
                    }
                },
                Err(e) => return Err(e.into()),
            }
        }
        trace!("RX {:02X?}", buf);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        trace!("TX {:02X?}", data);
        self.stream
            .write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream
            .flush()?;
        Ok(())
    }
}

/// A stream built from separate read and write halves, such as stdin and
/// stdout.
#[derive(Debug)]
pub struct Duplex<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> Duplex<R, W> {
    /// Join two halves.
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Split back into halves.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: Read, W> Read for Duplex<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader
            .read(buf)
    }
}

impl<R, W: Write> Write for Duplex<R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer
            .flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Serves scripted reads; `None` entries time out once.
    struct ScriptedSerial {
        reads: VecDeque<Option<Vec<u8>>>,
        write_buf: Vec<u8>,
    }

    impl ScriptedSerial {
        fn new(reads: Vec<Option<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into(),
                write_buf: Vec::new(),
            }
        }
    }

    impl Read for ScriptedSerial {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Ok(0),
                Some(None) => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
                Some(Some(mut chunk)) => {
                    let n = buf.len().min(chunk.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.reads
                            .push_front(Some(chunk.split_off(n)));
                    }
                    Ok(n)
                },
            }
        }
    }

    impl Write for ScriptedSerial {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.write_buf
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn never() -> bool {
        false
    }

    fn always() -> bool {
        true
    }

    #[test]
    fn test_receive_assembles_chunks_across_timeouts() {
        let serial = ScriptedSerial::new(vec![
            Some(vec![0x01, 0x02]),
            None,
            None,
            Some(vec![0x03, 0x04, 0x05]),
        ]);
        let mut transport = StreamTransport::new(serial).with_interrupt_check(never);

        let mut buf = [0u8; 4];
        transport
            .receive(&mut buf)
            .unwrap();
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04]);

        let mut rest = [0u8; 1];
        transport
            .receive(&mut rest)
            .unwrap();
        assert_eq!(rest, [0x05]);
    }

    #[test]
    fn test_receive_end_of_stream_is_disconnect() {
        let serial = ScriptedSerial::new(vec![Some(vec![0x01])]);
        let mut transport = StreamTransport::new(serial).with_interrupt_check(never);

        let mut buf = [0u8; 2];
        assert!(matches!(
            transport.receive(&mut buf),
            Err(Error::Disconnected)
        ));
    }

    #[test]
    fn test_receive_stops_when_interrupted() {
        let serial = ScriptedSerial::new(vec![None, Some(vec![0x01])]);
        let mut transport = StreamTransport::new(serial).with_interrupt_check(always);

        let mut buf = [0u8; 1];
        assert!(matches!(
            transport.receive(&mut buf),
            Err(Error::Interrupted)
        ));
    }

    #[test]
    fn test_send_writes_through() {
        let mut transport =
            StreamTransport::new(ScriptedSerial::new(Vec::new())).with_interrupt_check(never);
        transport
            .send(&[0xCC, 0x40])
            .unwrap();
        transport
            .flush()
            .unwrap();
        assert_eq!(
            transport
                .get_ref()
                .write_buf,
            vec![0xCC, 0x40]
        );
    }

    #[test]
    fn test_duplex_joins_halves() {
        let reader = io::Cursor::new(vec![0x01, 0x02]);
        let mut transport =
            StreamTransport::new(Duplex::new(reader, Vec::new())).with_interrupt_check(never);

        let mut buf = [0u8; 2];
        transport
            .receive(&mut buf)
            .unwrap();
        transport
            .send(&buf)
            .unwrap();
        let (_, written) = transport
            .into_inner()
            .into_parts();
        assert_eq!(written, vec![0x01, 0x02]);
    }
}
