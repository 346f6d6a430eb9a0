//! Forward-only cursor over a character buffer
//!
//! `SequenceReader` is shared by the handshake body parser and the packet
//! decoder. Lengths are counted in characters, not bytes, because Engine.IO
//! length prefixes count characters.
//!
//! Delimiter scans pick the left-most occurrence of any delimiter in the
//! unconsumed tail. Delimiters are single characters, so two different
//! delimiters can never tie at the same position.

use crate::error::PacketError;

/// Forward-only reader over a string slice
#[derive(Debug, Clone)]
pub struct SequenceReader<'a> {
    data: &'a str,
    /// Byte offset of the first unconsumed character
    pos: usize,
}

impl<'a> SequenceReader<'a> {
    /// Wrap a buffer
    pub fn new(data: &'a str) -> Self {
        Self { data, pos: 0 }
    }

    /// Consume and return the next `n` characters
    pub fn read(&mut self, n: usize) -> Result<&'a str, PacketError> {
        let rest = self.remaining();
        let end = match rest.char_indices().nth(n) {
            Some((index, _)) => index,
            None => {
                let available = rest.chars().count();
                if available != n {
                    return Err(PacketError::EndOfData {
                        wanted: n,
                        remaining: available,
                    });
                }
                rest.len()
            }
        };
        self.pos += end;
        Ok(&rest[..end])
    }

    /// Consume up to the left-most character found in `delimiters`
    ///
    /// Returns the text before the delimiter and moves past the delimiter,
    /// unless that delimiter also appears in `no_skip`, in which case it is
    /// left for the next read. Returns `None` and consumes nothing when no
    /// delimiter occurs in the tail.
    pub fn read_until(&mut self, delimiters: &str, no_skip: &str) -> Option<&'a str> {
        let rest = self.remaining();
        let (index, delimiter) = rest.char_indices().find(|(_, c)| delimiters.contains(*c))?;
        self.pos += index;
        if !no_skip.contains(delimiter) {
            self.pos += delimiter.len_utf8();
        }
        Some(&rest[..index])
    }

    /// Consume the whole tail
    pub fn read_to_end(&mut self) -> &'a str {
        let rest = self.remaining();
        self.pos = self.data.len();
        rest
    }

    /// Next character without consuming it
    pub fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Unconsumed tail
    pub fn remaining(&self) -> &'a str {
        &self.data[self.pos..]
    }

    /// Whether every character has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }
}
