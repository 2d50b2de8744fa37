//! Byte encoding and buffering policy for the file sink

use std::borrow::Cow;

use crate::error::{ConfigError, SinkError};

/// Character encoding of log files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEncoding {
    Utf8,
    Ascii,
    Latin1,
}

impl FileEncoding {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(FileEncoding::Utf8),
            "ascii" | "us-ascii" => Ok(FileEncoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(FileEncoding::Latin1),
            _ => Err(ConfigError::UnsupportedEncoding(name.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FileEncoding::Utf8 => "utf-8",
            FileEncoding::Ascii => "ascii",
            FileEncoding::Latin1 => "latin-1",
        }
    }

    fn max_code_point(&self) -> u32 {
        match self {
            FileEncoding::Utf8 => u32::from(char::MAX),
            FileEncoding::Ascii => 0x7f,
            FileEncoding::Latin1 => 0xff,
        }
    }

    /// Encode text, applying `errors` to characters outside the encoding
    pub fn encode<'a>(
        &self,
        text: &'a str,
        errors: EncodingErrors,
    ) -> Result<Cow<'a, [u8]>, SinkError> {
        if *self == FileEncoding::Utf8 {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }

        if text.is_ascii() {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }

        let max = self.max_code_point();
        let mut out = Vec::with_capacity(text.len());
        for ch in text.chars() {
            let code = u32::from(ch);
            if code <= max {
                // Both single-byte encodings share their code points with Unicode
                out.push(code as u8);
                continue;
            }
            match errors {
                EncodingErrors::Strict => {
                    return Err(SinkError::Encode {
                        ch,
                        encoding: self.name(),
                    })
                }
                EncodingErrors::Replace => out.push(b'?'),
                EncodingErrors::Ignore => {}
            }
        }
        Ok(Cow::Owned(out))
    }
}

/// Handling of characters the file encoding cannot represent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingErrors {
    /// Drop the whole write
    Strict,
    /// Substitute `?`
    Replace,
    /// Skip the character
    Ignore,
}

impl EncodingErrors {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(EncodingErrors::Strict),
            "replace" => Ok(EncodingErrors::Replace),
            "ignore" => Ok(EncodingErrors::Ignore),
            _ => Err(ConfigError::UnsupportedEncodingErrors(name.to_string())),
        }
    }
}

/// When the file sink pushes bytes to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileBuffering {
    /// Flush after every write
    Unbuffered,
    /// Flush whenever a write ends a line
    Line,
    /// Buffer up to this many bytes
    Block(usize),
}

impl FileBuffering {
    pub fn from_size(size: usize) -> Self {
        match size {
            0 => FileBuffering::Unbuffered,
            1 => FileBuffering::Line,
            n => FileBuffering::Block(n),
        }
    }

    /// Capacity of the in-memory buffer in front of the file
    pub fn capacity(&self) -> usize {
        match self {
            FileBuffering::Unbuffered => 0,
            FileBuffering::Line => 8 * 1024,
            FileBuffering::Block(n) => *n,
        }
    }

    /// Whether a write of `text` must be followed by a flush
    pub fn flush_after(&self, text: &str) -> bool {
        match self {
            FileBuffering::Unbuffered => true,
            FileBuffering::Line => text.contains('\n'),
            FileBuffering::Block(_) => false,
        }
    }
}
