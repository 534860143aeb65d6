//! Streaming CSV tokenizer
//!
//! A byte-at-a-time state machine that splits input into fields and lines.
//! Field bytes are copied into a single growable stream, each field followed
//! by a NUL byte. Parallel arrays record where every field starts and how
//! lines group fields:
//!
//! * `word_starts[w]` is the stream offset of field `w`
//! * `line_start[l]` is the index of the first field of line `l`
//! * `line_fields[l]` is the number of fields of line `l`
//!
//! so `line_start[l + 1] == line_start[l] + line_fields[l]` holds for every
//! committed line. The last entry of `line_start`/`line_fields` describes the
//! line being built.
//!
//! Lines removed by the skip settings or by the bad-line policy are rolled
//! back, leaving no fields behind.

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::source::{ByteSource, ReadStatus};

use super::options::{BadLinePolicy, Dialect, DEFAULT_CHUNK_SIZE, Quoting};

const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StartRecord,
    StartField,
    EscapedChar,
    InField,
    InQuotedField,
    EscapeInQuotedField,
    QuoteInQuotedField,
    EatCrnl,
    EatCrnlNop,
    EatWhitespace,
    EatComment,
    EatLineComment,
    WhitespaceLine,
    StartFieldInSkipLine,
    InFieldInSkipLine,
    InQuotedFieldInSkipLine,
    QuoteInQuotedFieldInSkipLine,
    Finished,
}

impl State {
    fn is_skip(self) -> bool {
        matches!(
            self,
            State::StartFieldInSkipLine
                | State::InFieldInSkipLine
                | State::InQuotedFieldInSkipLine
                | State::QuoteInQuotedFieldInSkipLine
        )
    }
}

/// Grow `buf` so that `additional` more elements fit, doubling its capacity
fn reserve_doubling<T>(buf: &mut Vec<T>, additional: usize, what: &str) -> Result<()> {
    let needed = buf
        .len()
        .checked_add(additional)
        .ok_or_else(|| Error::Overflow(format!("{what} length exceeds usize")))?;
    if needed <= buf.capacity() {
        return Ok(());
    }
    let mut cap = buf.capacity().max(2);
    while cap < needed {
        cap = cap
            .checked_mul(2)
            .ok_or_else(|| Error::Overflow(format!("{what} capacity exceeds usize")))?;
    }
    buf.try_reserve_exact(cap - buf.len())
        .map_err(|e| Error::Memory(format!("growing {what} to {cap} entries: {e}")))?;
    trace!(buffer = what, capacity = cap, "grew tokenizer buffer");
    Ok(())
}

/// Per-read tokenizing session
pub struct Tokenizer<'d> {
    dialect: &'d Dialect,
    header_rows: usize,
    column_subset: bool,
    chunk_size: usize,

    stream: Vec<u8>,
    word_starts: Vec<usize>,
    word_start: usize,
    line_start: Vec<usize>,
    line_fields: Vec<usize>,
    line_numbers: Vec<u64>,
    lines: usize,
    file_lines: u64,
    max_words_cap: usize,

    state: State,
    chunk: Vec<u8>,
    datapos: usize,
    at_eof: bool,
    bom_checked: bool,
    bom_matched: usize,
    pending_blanks: Vec<u8>,
    warnings: Vec<String>,
}

impl<'d> Tokenizer<'d> {
    /// Create a session for `dialect`
    pub fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            header_rows: 0,
            column_subset: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            stream: Vec::new(),
            word_starts: Vec::new(),
            word_start: 0,
            line_start: vec![0],
            line_fields: vec![0],
            line_numbers: Vec::new(),
            lines: 0,
            file_lines: 0,
            max_words_cap: 0,
            state: State::StartRecord,
            chunk: Vec::new(),
            datapos: 0,
            at_eof: false,
            bom_checked: false,
            bom_matched: 0,
            pending_blanks: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Treat the first `n` good lines as headings, exempt from field-count checks
    pub fn with_header_rows(mut self, n: usize) -> Self {
        self.header_rows = n;
        self
    }

    /// Only some columns will be read: disable padding and too-many-fields rejection
    pub fn with_column_subset(mut self, subset: bool) -> Self {
        self.column_subset = subset;
        self
    }

    /// Bytes requested from the source per read
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Number of committed lines
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Number of physical lines seen, including skipped and bad ones
    pub fn file_lines(&self) -> u64 {
        self.file_lines
    }

    /// Number of fields in committed lines
    pub fn words_len(&self) -> usize {
        self.word_starts.len()
    }

    /// Fields in committed line `line`
    pub fn line_fields(&self, line: usize) -> usize {
        self.line_fields[line]
    }

    /// Index of the first field of line `line`; valid up to `lines()`
    pub fn line_start(&self, line: usize) -> usize {
        self.line_start[line]
    }

    /// 1-based physical line number of committed line `line`
    pub fn file_line_number(&self, line: usize) -> u64 {
        self.line_numbers[line]
    }

    /// Bytes of field `word`, without the terminating NUL
    pub fn field(&self, word: usize) -> &[u8] {
        let start = self.word_starts[word];
        let end = self.word_starts.get(word + 1).copied().unwrap_or(self.word_start);
        &self.stream[start..end - 1]
    }

    /// Fields of committed line `line`
    pub fn line(&self, line: usize) -> impl Iterator<Item = &[u8]> + '_ {
        let start = self.line_start[line];
        (start..start + self.line_fields[line]).map(move |w| self.field(w))
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether the input has been consumed to the end
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Tokenize until the source is exhausted
    pub fn tokenize_all_rows(&mut self, source: &mut dyn ByteSource) -> Result<()> {
        self.tokenize(source, None)
    }

    /// Tokenize until `nrows` more lines are committed or the source is exhausted
    pub fn tokenize_nrows(&mut self, source: &mut dyn ByteSource, nrows: usize) -> Result<()> {
        if nrows == 0 {
            return Ok(());
        }
        self.tokenize(source, Some(self.lines + nrows))
    }

    fn tokenize(&mut self, source: &mut dyn ByteSource, until: Option<usize>) -> Result<()> {
        while self.state != State::Finished {
            if until.is_some_and(|n| self.lines >= n) {
                break;
            }
            if self.datapos == self.chunk.len() {
                if !self.at_eof {
                    self.fill(source)?;
                }
                if self.at_eof && self.datapos == self.chunk.len() {
                    if !self.bom_checked {
                        // a truncated byte-order mark is ordinary data
                        self.chunk.extend_from_slice(&BOM[..self.bom_matched]);
                        self.bom_matched = 0;
                        self.bom_checked = true;
                    }
                    if self.datapos == self.chunk.len() {
                        debug!(lines = self.lines, file_lines = self.file_lines, "reached end of input");
                        self.finish()?;
                        self.state = State::Finished;
                        break;
                    }
                }
            }
            if !self.bom_checked && !self.skip_bom() {
                continue;
            }
            let chunk = std::mem::take(&mut self.chunk);
            let result = self.tokenize_bytes(&chunk, until);
            self.chunk = chunk;
            result?;
        }
        Ok(())
    }

    fn fill(&mut self, source: &mut dyn ByteSource) -> Result<()> {
        self.chunk.clear();
        self.datapos = 0;
        let status = source.read(&mut self.chunk, self.chunk_size).map_err(Error::ReadFailed)?;
        if status == ReadStatus::Eof || self.chunk.is_empty() {
            self.at_eof = true;
        } else {
            trace!(bytes = self.chunk.len(), "read chunk");
        }
        Ok(())
    }

    /// Match a leading byte-order mark, possibly split over several chunks
    ///
    /// Returns false while the unread input is a proper prefix of the mark.
    fn skip_bom(&mut self) -> bool {
        let avail = &self.chunk[self.datapos..];
        let want = &BOM[self.bom_matched..];
        let n = want.len().min(avail.len());
        if avail[..n] == want[..n] {
            self.bom_matched += n;
            self.datapos += n;
            if self.bom_matched < BOM.len() {
                return false;
            }
        } else {
            // not a mark after all: put the matched bytes back in front
            let mut chunk = BOM[..self.bom_matched].to_vec();
            chunk.extend_from_slice(&self.chunk[self.datapos..]);
            self.chunk = chunk;
            self.datapos = 0;
        }
        self.bom_matched = 0;
        self.bom_checked = true;
        true
    }

    /// Feed the blanks held back by a possibly blank line into its first field
    fn replay_blanks(&mut self) -> Result<()> {
        self.state = State::StartField;
        let blanks = std::mem::take(&mut self.pending_blanks);
        for &b in &blanks {
            if self.state == State::StartField && b == b' ' && self.dialect.skip_initial_space {
                continue;
            }
            self.push_char(b)?;
            self.state = State::InField;
        }
        self.pending_blanks = blanks;
        self.pending_blanks.clear();
        Ok(())
    }

    fn make_space(&mut self, nbytes: usize) -> Result<()> {
        reserve_doubling(&mut self.stream, nbytes, "stream")?;
        let words = nbytes.max(self.max_words_cap.saturating_sub(self.word_starts.len()));
        reserve_doubling(&mut self.word_starts, words, "words")?;
        reserve_doubling(&mut self.line_start, nbytes, "line starts")?;
        reserve_doubling(&mut self.line_fields, nbytes, "line fields")?;
        reserve_doubling(&mut self.line_numbers, nbytes, "line numbers")
    }

    #[inline]
    fn push_char(&mut self, c: u8) -> Result<()> {
        if self.stream.len() == self.stream.capacity() {
            reserve_doubling(&mut self.stream, 1, "stream")?;
        }
        self.stream.push(c);
        Ok(())
    }

    fn end_field(&mut self) -> Result<()> {
        self.push_char(0)?;
        if self.word_starts.len() == self.word_starts.capacity() {
            reserve_doubling(&mut self.word_starts, 1, "words")?;
        }
        self.word_starts.push(self.word_start);
        self.line_fields[self.lines] += 1;
        self.word_start = self.stream.len();
        Ok(())
    }

    /// Remove the fields of the line being built
    fn discard_line(&mut self) {
        let fields = self.line_fields[self.lines];
        if fields > 0 {
            let first = self.word_starts.len() - fields;
            self.stream.truncate(self.word_starts[first]);
            self.word_starts.truncate(first);
        }
        self.line_fields[self.lines] = 0;
        self.word_start = self.stream.len();
    }

    fn end_line(&mut self) -> Result<()> {
        let fields = self.line_fields[self.lines];

        if self.state.is_skip() {
            self.file_lines += 1;
            self.discard_line();
            return Ok(());
        }

        let checked = self.lines >= self.header_rows && !self.column_subset;
        let expected = self
            .dialect
            .expected_fields
            .or_else(|| self.lines.checked_sub(1).map(|prev| self.line_fields[prev]));

        if let (true, Some(ex)) = (checked, expected) {
            if fields > ex {
                self.file_lines += 1;
                self.discard_line();
                match self.dialect.on_bad_lines {
                    BadLinePolicy::Error => {
                        return Err(Error::Tokenize(format!(
                            "Expected {ex} fields in line {}, saw {fields}",
                            self.file_lines
                        )));
                    }
                    BadLinePolicy::Warn => {
                        let msg = format!(
                            "Skipping line {}: expected {ex} fields, saw {fields}",
                            self.file_lines
                        );
                        warn!("{msg}");
                        self.warnings.push(msg);
                    }
                    BadLinePolicy::Skip => {}
                }
                return Ok(());
            }
            if fields < ex {
                // pad short lines with empty fields
                reserve_doubling(&mut self.word_starts, ex - fields, "words")?;
                for _ in fields..ex {
                    self.end_field()?;
                }
            }
        }

        self.file_lines += 1;
        self.lines += 1;
        let next = self.line_start[self.lines - 1] + self.line_fields[self.lines - 1];
        self.line_start.push(next);
        self.line_fields.push(0);
        self.line_numbers.push(self.file_lines);
        Ok(())
    }

    /// Commit the current line, then enter `state`; true when the line limit is reached
    fn end_line_to(&mut self, state: State, until: Option<usize>) -> Result<bool> {
        self.end_line()?;
        self.state = state;
        Ok(until.is_some_and(|n| self.lines >= n))
    }

    fn finish(&mut self) -> Result<()> {
        match self.state {
            State::StartRecord
            | State::WhitespaceLine
            | State::EatCrnlNop
            | State::EatLineComment
            | State::Finished => Ok(()),
            State::InQuotedField | State::EscapeInQuotedField => Err(Error::Tokenize(format!(
                "EOF inside string starting at row {}",
                self.file_lines + 1
            ))),
            State::EscapedChar => Err(Error::Tokenize("EOF following escape character".into())),
            State::InField | State::StartField | State::QuoteInQuotedField => {
                self.end_field()?;
                self.end_line()
            }
            _ => self.end_line(),
        }
    }

    fn tokenize_bytes(&mut self, chunk: &[u8], until: Option<usize>) -> Result<()> {
        let d = self.dialect;
        let terminator = d.line_terminator.unwrap_or(b'\n');
        let carriage = if d.line_terminator.is_none() { Some(b'\r') } else { None };
        let quoting = d.quoting != Quoting::None;
        let is_delimiter = |c: u8| {
            if d.delim_whitespace {
                c == b' ' || c == b'\t'
            } else {
                c == d.delimiter
            }
        };
        let is_blank = |c: u8| c == b' ' || c == b'\t';
        let is_quote = |c: u8| quoting && c == d.quote_char;
        let is_escape = |c: u8| d.escape_char == Some(c);
        let is_comment = |c: u8| d.comment_char == Some(c);
        let is_carriage = |c: u8| carriage == Some(c);
        let is_skippable_space = |c: u8| !d.delim_whitespace && c == b' ' && d.skip_initial_space;
        let after_delimiter = if d.delim_whitespace { State::EatWhitespace } else { State::StartField };

        self.make_space(chunk.len() - self.datapos)?;

        let mut i = self.datapos;

        while i < chunk.len() {
            let c = chunk[i];
            let mut next = i + 1;

            // a state may hand the same byte to the next state
            loop {
                match self.state {
                    State::StartFieldInSkipLine => {
                        if c == terminator {
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            self.file_lines += 1;
                            self.discard_line();
                            self.state = State::EatCrnlNop;
                        } else if is_quote(c) {
                            self.state = State::InQuotedFieldInSkipLine;
                        } else if !is_delimiter(c) {
                            self.state = State::InFieldInSkipLine;
                        }
                    }

                    State::InFieldInSkipLine => {
                        if c == terminator {
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            self.file_lines += 1;
                            self.discard_line();
                            self.state = State::EatCrnlNop;
                        } else if is_delimiter(c) {
                            self.state = State::StartFieldInSkipLine;
                        }
                    }

                    State::InQuotedFieldInSkipLine => {
                        if is_quote(c) {
                            self.state = if d.double_quote {
                                State::QuoteInQuotedFieldInSkipLine
                            } else {
                                State::InFieldInSkipLine
                            };
                        }
                    }

                    State::QuoteInQuotedFieldInSkipLine => {
                        if is_quote(c) {
                            self.state = State::InQuotedFieldInSkipLine;
                        } else if c == terminator {
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            self.file_lines += 1;
                            self.discard_line();
                            self.state = State::EatCrnlNop;
                        } else if is_delimiter(c) {
                            self.state = State::StartFieldInSkipLine;
                        } else {
                            self.state = State::InFieldInSkipLine;
                        }
                    }

                    State::WhitespaceLine => {
                        if c == terminator {
                            self.file_lines += 1;
                            self.pending_blanks.clear();
                            self.state = State::StartRecord;
                        } else if is_carriage(c) {
                            self.file_lines += 1;
                            self.pending_blanks.clear();
                            self.state = State::EatCrnlNop;
                        } else if d.delim_whitespace {
                            if is_comment(c) {
                                self.state = State::EatComment;
                            } else if !is_blank(c) {
                                self.state = State::StartField;
                                continue;
                            }
                        } else if is_blank(c) && c != d.delimiter {
                            self.pending_blanks.push(c);
                        } else {
                            // the line has content after all
                            self.replay_blanks()?;
                            continue;
                        }
                    }

                    State::StartRecord => {
                        if d.skips_line(self.file_lines) {
                            if is_quote(c) {
                                self.state = State::InQuotedFieldInSkipLine;
                            } else {
                                self.state = State::InFieldInSkipLine;
                                if c == terminator
                                    && self.end_line_to(State::StartRecord, until)?
                                {
                                    self.datapos = next;
                                    return Ok(());
                                }
                            }
                        } else if c == terminator {
                            if d.skip_empty_lines {
                                self.file_lines += 1;
                            } else if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            if d.skip_empty_lines {
                                self.file_lines += 1;
                                self.state = State::EatCrnlNop;
                            } else {
                                self.state = State::EatCrnl;
                            }
                        } else if is_comment(c) {
                            self.state = State::EatLineComment;
                        } else if is_blank(c) {
                            if d.delim_whitespace {
                                self.state = if d.skip_empty_lines {
                                    State::WhitespaceLine
                                } else {
                                    State::EatWhitespace
                                };
                            } else if c != d.delimiter && d.skip_empty_lines {
                                self.pending_blanks.clear();
                                self.pending_blanks.push(c);
                                self.state = State::WhitespaceLine;
                            } else {
                                self.state = State::StartField;
                                continue;
                            }
                        } else {
                            self.state = State::StartField;
                            continue;
                        }
                    }

                    State::StartField => {
                        if c == terminator {
                            self.end_field()?;
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            self.end_field()?;
                            self.state = State::EatCrnl;
                        } else if is_quote(c) {
                            self.state = State::InQuotedField;
                        } else if is_escape(c) {
                            self.state = State::EscapedChar;
                        } else if is_skippable_space(c) {
                            // ignore
                        } else if is_delimiter(c) {
                            if d.delim_whitespace {
                                self.state = State::EatWhitespace;
                            } else {
                                self.end_field()?;
                            }
                        } else if is_comment(c) {
                            self.end_field()?;
                            self.state = State::EatComment;
                        } else {
                            self.push_char(c)?;
                            self.state = State::InField;
                        }
                    }

                    State::EscapedChar => {
                        self.push_char(c)?;
                        self.state = State::InField;
                    }

                    State::EatLineComment => {
                        if c == terminator {
                            self.file_lines += 1;
                            self.state = State::StartRecord;
                        } else if is_carriage(c) {
                            self.file_lines += 1;
                            self.state = State::EatCrnlNop;
                        }
                    }

                    State::InField => {
                        if c == terminator {
                            self.end_field()?;
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            self.end_field()?;
                            self.state = State::EatCrnl;
                        } else if is_escape(c) {
                            self.state = State::EscapedChar;
                        } else if is_delimiter(c) {
                            self.end_field()?;
                            self.state = after_delimiter;
                        } else if is_comment(c) {
                            self.end_field()?;
                            self.state = State::EatComment;
                        } else {
                            self.push_char(c)?;
                        }
                    }

                    State::InQuotedField => {
                        if is_escape(c) {
                            self.state = State::EscapeInQuotedField;
                        } else if is_quote(c) {
                            self.state = if d.double_quote {
                                State::QuoteInQuotedField
                            } else {
                                State::InField
                            };
                        } else {
                            self.push_char(c)?;
                        }
                    }

                    State::EscapeInQuotedField => {
                        self.push_char(c)?;
                        self.state = State::InQuotedField;
                    }

                    State::QuoteInQuotedField => {
                        if is_quote(c) {
                            self.push_char(c)?;
                            self.state = State::InQuotedField;
                        } else if is_delimiter(c) {
                            self.end_field()?;
                            self.state = after_delimiter;
                        } else if c == terminator {
                            self.end_field()?;
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            self.end_field()?;
                            self.state = State::EatCrnl;
                        } else {
                            self.push_char(c)?;
                            self.state = State::InField;
                        }
                    }

                    State::EatComment => {
                        if c == terminator {
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            self.state = State::EatCrnl;
                        }
                    }

                    State::EatCrnl => {
                        if c == b'\n' {
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_delimiter(c) && !d.delim_whitespace {
                            // "\r," starts a new line with an empty first field
                            let stop = self.end_line_to(State::StartField, until)?;
                            self.end_field()?;
                            if stop {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else {
                            // a lone '\r' ends the line; rescan this byte
                            next = i;
                            let state = if is_delimiter(c) {
                                State::EatWhitespace
                            } else {
                                State::StartRecord
                            };
                            if self.end_line_to(state, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        }
                    }

                    State::EatCrnlNop => {
                        self.state = State::StartRecord;
                        if c != b'\n' && !is_delimiter(c) {
                            next = i;
                        }
                    }

                    State::EatWhitespace => {
                        if c == terminator {
                            if self.end_line_to(State::StartRecord, until)? {
                                self.datapos = next;
                                return Ok(());
                            }
                        } else if is_carriage(c) {
                            self.state = State::EatCrnl;
                        } else if is_comment(c) {
                            self.state = State::EatComment;
                        } else if !is_blank(c) {
                            self.state = State::StartField;
                            continue;
                        }
                    }

                    State::Finished => {}
                }
                break;
            }
            i = next;
        }

        self.datapos = chunk.len();
        Ok(())
    }

    /// Drop the first `nrows` committed lines, shifting the remaining ones down
    pub fn consume_rows(&mut self, nrows: usize) {
        let n = nrows.min(self.lines);
        if n == 0 {
            return;
        }
        let words = self.line_start[n];
        let bytes = if words == 0 {
            0
        } else {
            self.word_starts.get(words).copied().unwrap_or(self.word_start)
        };

        self.stream.drain(..bytes);
        self.word_starts.drain(..words);
        for start in &mut self.word_starts {
            *start -= bytes;
        }
        self.word_start -= bytes;

        self.line_start.drain(..n);
        for start in &mut self.line_start {
            *start -= words;
        }
        self.line_fields.drain(..n);
        self.line_numbers.drain(..n);
        self.lines -= n;
        self.header_rows = self.header_rows.saturating_sub(n);
        debug!(rows = n, words, bytes, "consumed tokenized rows");
    }

    /// Shrink buffers whose capacity is far beyond their length
    pub fn trim_buffers(&mut self) {
        fn trim<T>(buf: &mut Vec<T>) {
            let target = buf.len().next_power_of_two() + 1;
            if target < buf.capacity() {
                buf.shrink_to(target);
            }
        }
        self.max_words_cap = self.max_words_cap.max(self.word_starts.capacity());
        trim(&mut self.stream);
        trim(&mut self.word_starts);
        trim(&mut self.line_start);
        trim(&mut self.line_fields);
        trim(&mut self.line_numbers);
    }
}
