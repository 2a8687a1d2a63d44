use std::io::BufRead;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub seq: Vec<u8>,
}

/// Streaming multi-line FASTA reader. Sequence bytes are upper-cased and
/// whitespace is dropped; everything else (including `N`) is passed through.
pub struct FastaReader<R: BufRead> {
    reader: R,
    line: String,
    pending: Option<String>,
    done: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: String::new(), pending: None, done: false }
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        Ok(self.reader.read_line(&mut self.line)? != 0)
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.done {
            return Ok(None);
        }

        let header = match self.pending.take() {
            Some(h) => h,
            None => loop {
                if !self.read_line()? {
                    self.done = true;
                    return Ok(None);
                }
                if let Some(h) = self.line.strip_prefix('>') {
                    break h.trim().to_string();
                }
            },
        };
        let id = header.split_whitespace().next().unwrap_or("").to_string();

        let mut seq = Vec::new();
        loop {
            if !self.read_line()? {
                self.done = true;
                break;
            }
            if let Some(h) = self.line.strip_prefix('>') {
                self.pending = Some(h.trim().to_string());
                break;
            }
            seq.extend(
                self.line
                    .bytes()
                    .filter(|b| !b.is_ascii_whitespace())
                    .map(|b| b.to_ascii_uppercase()),
            );
        }

        Ok(Some(FastaRecord { id, seq }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_multiline_records() {
        let data = b"\n>chr1 first\nACgTNN\nac\n>chr2\nAAA\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.seq, b"ACGTNNAC");

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.id, "chr2");
        assert_eq!(r2.seq, b"AAA");

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn parse_crlf_and_inner_whitespace() {
        let data = b">chr1 desc\r\nAC g t n\r\n acgt\r\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));
        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.seq, b"ACGTNACGT");
        assert!(r.next_record().unwrap().is_none());
    }
}
