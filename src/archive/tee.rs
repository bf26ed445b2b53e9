use std::io::{self, Read, Write};

/// reader that copies every byte it yields into a side sink
///
/// used to checksum entry bodies while they stream to their destination.
pub struct TeeReader<R, W> {
    inner: R,
    sink: W,
    count: u64,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    pub fn new(inner: R, sink: W) -> Self {
        Self {
            inner,
            sink,
            count: 0,
        }
    }

    /// bytes read so far
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sink.write_all(&buf[..n])?;
        self.count += n as u64;
        Ok(n)
    }
}
