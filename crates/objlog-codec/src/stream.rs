use std::io::{BufRead, Write};

use crate::error::{CodecError, CodecResult};
use crate::record::Record;

/// Writes records as newline-terminated JSON lines.
pub struct RecordWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Append one record.
    pub fn write(&mut self, record: &Record) -> CodecResult<()> {
        let line = record.to_line()?;
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> CodecResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Number of records written through this writer.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Iterates the records of a line-oriented stream in file order.
///
/// Blank lines are skipped. Every error carries the line it occurred on.
pub struct RecordReader<R: BufRead> {
    inner: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            buf: String::new(),
        }
    }

    /// 1-based number of the line read last.
    pub fn line(&self) -> usize {
        self.line
    }

    fn next_record(&mut self) -> Option<CodecResult<Record>> {
        loop {
            self.buf.clear();
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(CodecError::from(e).at_line(self.line + 1))),
            }
            self.line += 1;
            let text = self.buf.trim_end_matches(['\r', '\n']);
            if text.trim().is_empty() {
                continue;
            }
            return Some(Record::from_line(text).map_err(|e| e.at_line(self.line)));
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = CodecResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}
