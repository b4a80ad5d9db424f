use std::io;
use tracing::info;

/// An audit sink that logs each newline-terminated record as a tracing event,
/// so records follow the configured log filter and format.
#[derive(Debug, Default)]
pub(crate) struct TraceSink {
    buf: Vec<u8>,
}

impl TraceSink {
    /// Removes and returns the complete lines buffered so far.
    fn take_lines(&mut self) -> Vec<String> {
        let Some(end) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buf.split_off(end + 1);
        let lines = std::mem::replace(&mut self.buf, rest);
        String::from_utf8_lossy(&lines)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for TraceSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        for record in self.take_lines() {
            info!(%record, "Admission decision");
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
