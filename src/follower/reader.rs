// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};

use super::FileId;

/// A complete line read from the followed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Line text without the terminator
    pub text: String,
    /// Byte offset just after the line terminator
    pub end_offset: u64,
    /// Identity of the file generation the line came from
    pub file_id: Option<FileId>,
}

/// Reads newline-terminated lines from one open file generation.
///
/// Bytes of a line that has no terminator yet are held back, so a partial
/// last line is only returned once the writer finishes it. Lines longer than
/// `max_line_size` are cut; the offset still advances over the whole line.
pub struct LineReader {
    reader: BufReader<File>,
    file_id: Option<FileId>,
    /// End of the last complete line
    offset: u64,
    /// Kept bytes of the unfinished line
    partial: Vec<u8>,
    /// Raw bytes consumed for the unfinished line, including cut bytes
    partial_len: u64,
    truncated: bool,
    max_line_size: usize,
}

impl LineReader {
    pub fn new(mut file: File, offset: u64, max_line_size: usize) -> io::Result<Self> {
        let file_id = FileId::from_file(&file).ok();
        file.seek(SeekFrom::Start(offset))?;

        Ok(Self {
            reader: BufReader::new(file),
            file_id,
            offset,
            partial: Vec::new(),
            partial_len: 0,
            truncated: false,
            max_line_size,
        })
    }

    pub fn file_id(&self) -> Option<FileId> {
        self.file_id
    }

    /// End offset of the last complete line returned
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Position in the file including bytes of an unfinished line
    pub fn consumed(&self) -> u64 {
        self.offset + self.partial_len
    }

    /// Current length of the open file handle
    pub fn file_len(&self) -> io::Result<u64> {
        Ok(self.reader.get_ref().metadata()?.len())
    }

    /// Seek to `offset`, dropping any unfinished line
    pub fn reset_to(&mut self, offset: u64) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        self.clear_partial();
        Ok(())
    }

    /// Bytes of an unfinished line that will never be completed
    pub fn pending_bytes(&self) -> u64 {
        self.partial_len
    }

    /// Read the next complete line, `None` at EOF.
    pub fn read_line(&mut self) -> io::Result<Option<Line>> {
        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(None);
            }

            let (chunk_len, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (i, true),
                None => (available.len(), false),
            };

            let room = self.max_line_size.saturating_sub(self.partial.len());
            if chunk_len > room {
                self.truncated = true;
            }
            self.partial
                .extend_from_slice(&available[..chunk_len.min(room)]);

            let consumed = if complete { chunk_len + 1 } else { chunk_len };
            self.reader.consume(consumed);
            self.partial_len += consumed as u64;

            if complete {
                return Ok(Some(self.finish_line()));
            }
        }
    }

    fn finish_line(&mut self) -> Line {
        let mut bytes = std::mem::take(&mut self.partial);
        if !self.truncated && bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        if self.truncated {
            // don't leave a multi-byte character cut in half at the end
            if let Err(e) = std::str::from_utf8(&bytes) {
                if e.error_len().is_none() {
                    bytes.truncate(e.valid_up_to());
                }
            }
        }

        self.offset += self.partial_len;
        let line = Line {
            text: String::from_utf8_lossy(&bytes).into_owned(),
            end_offset: self.offset,
            file_id: self.file_id,
        };
        self.clear_partial();
        line
    }

    fn clear_partial(&mut self) {
        self.partial.clear();
        self.partial_len = 0;
        self.truncated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reader_for(content: &[u8], offset: u64, max: usize) -> (tempfile::NamedTempFile, LineReader) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        let reader = LineReader::new(file.reopen().unwrap(), offset, max).unwrap();
        (file, reader)
    }

    fn read_all(reader: &mut LineReader) -> Vec<Line> {
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_reads_lines_with_offsets() {
        let (_f, mut reader) = reader_for(b"line1\nline2\r\n", 0, 1024);
        let lines = read_all(&mut reader);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "line1");
        assert_eq!(lines[0].end_offset, 6);
        assert_eq!(lines[1].text, "line2");
        assert_eq!(lines[1].end_offset, 13);
        assert_eq!(reader.offset(), 13);
    }

    #[test]
    fn test_starts_at_offset() {
        let (_f, mut reader) = reader_for(b"line1\nline2\n", 6, 1024);
        let lines = read_all(&mut reader);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "line2");
    }

    #[test]
    fn test_partial_line_held_until_terminated() {
        let (mut f, mut reader) = reader_for(b"done\nhalf", 0, 1024);
        assert_eq!(read_all(&mut reader).len(), 1);
        assert_eq!(reader.offset(), 5);
        assert_eq!(reader.consumed(), 9);

        f.write_all(b"-finished\n").unwrap();
        f.flush().unwrap();

        let line = reader.read_line().unwrap().unwrap();
        assert_eq!(line.text, "half-finished");
        assert_eq!(line.end_offset, 19);
        assert_eq!(reader.pending_bytes(), 0);
    }

    #[test]
    fn test_empty_lines_are_emitted() {
        let (_f, mut reader) = reader_for(b"\n\nx\n", 0, 1024);
        let texts: Vec<String> = read_all(&mut reader).into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["", "", "x"]);
    }

    #[test]
    fn test_long_line_is_cut_but_offset_covers_it() {
        let (_f, mut reader) = reader_for(b"abcdefghij\nok\n", 0, 4);
        let lines = read_all(&mut reader);
        assert_eq!(lines[0].text, "abcd");
        assert_eq!(lines[0].end_offset, 11);
        assert_eq!(lines[1].text, "ok");
    }

    #[test]
    fn test_cut_does_not_split_characters() {
        // "é" is two bytes, the cut lands in the middle of it
        let (_f, mut reader) = reader_for("abé\n".as_bytes(), 0, 3);
        let line = reader.read_line().unwrap().unwrap();
        assert_eq!(line.text, "ab");
        assert_eq!(line.end_offset, 5);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let (_f, mut reader) = reader_for(b"bad \xff byte\n", 0, 1024);
        let line = reader.read_line().unwrap().unwrap();
        assert_eq!(line.text, "bad \u{FFFD} byte");
    }

    #[test]
    fn test_reset_drops_partial() {
        let (_f, mut reader) = reader_for(b"one\ntwo", 0, 1024);
        read_all(&mut reader);
        reader.reset_to(0).unwrap();
        assert_eq!(reader.consumed(), 0);
        assert_eq!(reader.read_line().unwrap().unwrap().text, "one");
    }
}
