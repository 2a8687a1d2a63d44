use std::io::BufRead;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

/// Four-line FASTQ reader (no line-wrapped sequences).
pub struct FastqReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: usize,
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), line_no: 0 }
    }

    fn next_line(&mut self) -> Result<Option<&str>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(self.buf.trim_end()))
    }

    fn expect_line(&mut self, what: &str) -> Result<String> {
        let line_no = self.line_no + 1;
        match self.next_line()? {
            Some(l) => Ok(l.to_string()),
            None => Err(Error::Format(format!("unexpected EOF: missing {} at line {}", what, line_no))),
        }
    }

    pub fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some("") => continue,
                Some(l) => break l.to_string(),
            }
        };
        let Some(name) = header.strip_prefix('@') else {
            return Err(Error::Format(format!("FASTQ header not starting with '@' at line {}", self.line_no)));
        };
        let id = name.split_whitespace().next().unwrap_or("").to_string();

        let seq = self.expect_line("sequence")?.into_bytes();
        if !self.expect_line("'+' line")?.starts_with('+') {
            return Err(Error::Format(format!("missing '+' line at line {}", self.line_no)));
        }
        let qual = self.expect_line("quality line")?.into_bytes();
        if qual.len() != seq.len() {
            return Err(Error::Format(format!("seq/qual length mismatch for read '{}'", id)));
        }

        Ok(Some(FastqRecord { id, seq, qual }))
    }
}
