//! Output Capture
//!
//! Ambient output stream with a stack of capture buffers. Text written while
//! a buffer is open lands in the innermost buffer; otherwise it goes straight
//! to the sink.
//!
//! ```text
//!   write("a") ──▶ [sink]                 depth 0
//!   begin()        [sink] ◀─ [buf1]       depth 1
//!   write("b") ──▶ [buf1 = "b"]
//!   begin()        [sink] ◀─ [buf1] ◀─ [buf2]
//!   flush_top()    buf2 contents appended to buf1
//!   end()  ──▶ "b…" returned, nothing reaches the sink
//! ```

use std::io::Write;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::Result;

enum Sink {
    Stdout,
    Memory(Vec<u8>),
    Writer(Box<dyn Write + Send>),
}

struct State {
    sink: Sink,
    buffers: Vec<BytesMut>,
}

impl State {
    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(buffer) = self.buffers.last_mut() {
            buffer.extend_from_slice(bytes);
            return Ok(());
        }
        match &mut self.sink {
            Sink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(bytes)?;
                stdout.flush()?;
            }
            Sink::Memory(written) => written.extend_from_slice(bytes),
            Sink::Writer(writer) => {
                writer.write_all(bytes)?;
                writer.flush()?;
            }
        }
        Ok(())
    }
}

/// Output stream with nested capture buffers
pub struct Output {
    state: Mutex<State>,
}

impl Default for Output {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Output {
    fn with_sink(sink: Sink) -> Self {
        Self {
            state: Mutex::new(State {
                sink,
                buffers: Vec::new(),
            }),
        }
    }

    /// Output going to the process stdout
    pub fn stdout() -> Self {
        Self::with_sink(Sink::Stdout)
    }

    /// Output kept in memory, readable with [`Output::written`]
    pub fn memory() -> Self {
        Self::with_sink(Sink::Memory(Vec::new()))
    }

    /// Output going to an arbitrary writer
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self::with_sink(Sink::Writer(Box::new(writer)))
    }

    /// Write text to the innermost open buffer, or the sink
    pub fn write(&self, text: &str) -> Result<()> {
        self.state.lock().emit(text.as_bytes())
    }

    /// Open a capture buffer
    pub fn begin(&self) {
        self.state.lock().buffers.push(BytesMut::new());
    }

    /// Close the innermost buffer and return what it captured
    pub fn end(&self) -> Option<String> {
        let buffer = self.state.lock().buffers.pop()?;
        Some(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Close the innermost buffer, passing its content one level down.
    ///
    /// Returns false when no buffer was open.
    pub fn flush_top(&self) -> Result<bool> {
        let mut state = self.state.lock();
        match state.buffers.pop() {
            Some(buffer) => {
                state.emit(&buffer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of open buffers
    pub fn depth(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Everything that reached a memory sink, `None` for other sinks
    pub fn written(&self) -> Option<String> {
        match &self.state.lock().sink {
            Sink::Memory(written) => Some(String::from_utf8_lossy(written).into_owned()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        let sink = match state.sink {
            Sink::Stdout => "stdout",
            Sink::Memory(_) => "memory",
            Sink::Writer(_) => "writer",
        };
        f.debug_struct("Output")
            .field("sink", &sink)
            .field("depth", &state.buffers.len())
            .finish()
    }
}
