use std::io::{Read, Write};

use crate::error::NetError;
use crate::math::Matrix;

// Tagged token-stream framing shared by layer configs and persisted models.
// Tokens look like `<MaxGrad>` and are written as their ASCII bytes plus a
// single space in both encodings, so a reader can always decide whether an
// optional tag is present by peeking one byte for `<`. Matrix and vector
// frames start with the `FM`/`FV` markers instead.

const MATRIX_MARKER: &str = "FM";
const VECTOR_MARKER: &str = "FV";

fn is_separator(b: u8) -> bool {
    b == b' ' || b == b'\n' || b == b'\t' || b == b'\r'
}

pub struct TokenWriter<W: Write> {
    inner: W,
    binary: bool,
}

impl<W: Write> TokenWriter<W> {
    pub fn text(inner: W) -> Self {
        TokenWriter {
            inner,
            binary: false,
        }
    }

    pub fn binary(inner: W) -> Self {
        TokenWriter {
            inner,
            binary: true,
        }
    }

    pub fn write_token(&mut self, token: &str) -> Result<(), NetError> {
        self.inner.write_all(token.as_bytes())?;
        self.inner.write_all(b" ")?;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), NetError> {
        if self.binary {
            self.inner.write_all(&value.to_le_bytes())?;
        } else {
            write!(self.inner, "{} ", value)?;
        }
        Ok(())
    }

    fn write_u64(&mut self, value: u64) -> Result<(), NetError> {
        if self.binary {
            self.inner.write_all(&value.to_le_bytes())?;
        } else {
            write!(self.inner, "{} ", value)?;
        }
        Ok(())
    }

    pub fn write_matrix(&mut self, m: &Matrix) -> Result<(), NetError> {
        self.write_token(MATRIX_MARKER)?;
        self.write_u64(m.rows as u64)?;
        self.write_u64(m.cols as u64)?;
        for &v in &m.data {
            self.write_f32(v)?;
        }
        Ok(())
    }

    pub fn write_vector(&mut self, v: &[f32]) -> Result<(), NetError> {
        self.write_token(VECTOR_MARKER)?;
        self.write_u64(v.len() as u64)?;
        for &x in v {
            self.write_f32(x)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), NetError> {
        self.inner.flush()?;
        Ok(())
    }
}

pub struct TokenReader<R: Read> {
    inner: R,
    binary: bool,
    peeked: Option<u8>,
}

impl<R: Read> TokenReader<R> {
    pub fn text(inner: R) -> Self {
        TokenReader {
            inner,
            binary: false,
            peeked: None,
        }
    }

    pub fn binary(inner: R) -> Self {
        TokenReader {
            inner,
            binary: true,
            peeked: None,
        }
    }

    /// Look at the next byte without consuming it. `None` at end of stream.
    pub fn peek_byte(&mut self) -> Result<Option<u8>, NetError> {
        if self.peeked.is_none() {
            let mut buf = [0u8; 1];
            match self.inner.read(&mut buf)? {
                0 => return Ok(None),
                _ => self.peeked = Some(buf[0]),
            }
        }
        Ok(self.peeked)
    }

    fn next_byte(&mut self) -> Result<Option<u8>, NetError> {
        let b = self.peek_byte()?;
        self.peeked = None;
        Ok(b)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
        let mut start = 0;
        if let Some(b) = self.peeked.take() {
            buf[0] = b;
            start = 1;
        }
        self.inner.read_exact(&mut buf[start..])?;
        Ok(())
    }

    /// True once only separators remain before the end of the stream.
    pub fn at_eof(&mut self) -> Result<bool, NetError> {
        while let Some(b) = self.peek_byte()? {
            if !is_separator(b) {
                return Ok(false);
            }
            self.next_byte()?;
        }
        Ok(true)
    }

    /// True if the next field is a `<...>` tag.
    pub fn peek_tag(&mut self) -> Result<bool, NetError> {
        Ok(self.peek_byte()? == Some(b'<'))
    }

    /// Read one separator-terminated token, consuming the terminator.
    pub fn read_token(&mut self) -> Result<String, NetError> {
        let mut bytes = Vec::new();
        while let Some(b) = self.peek_byte()? {
            if is_separator(b) {
                if bytes.is_empty() {
                    self.next_byte()?;
                    continue;
                }
                self.next_byte()?;
                break;
            }
            bytes.push(b);
            self.next_byte()?;
        }
        if bytes.is_empty() {
            return Err(NetError::CorruptState(String::from(
                "unexpected end of stream while reading a token",
            )));
        }
        String::from_utf8(bytes)
            .map_err(|_| NetError::CorruptState(String::from("token is not valid utf-8")))
    }

    pub fn expect_token(&mut self, expected: &str) -> Result<(), NetError> {
        let token = self.read_token()?;
        if token != expected {
            return Err(NetError::CorruptState(format!(
                "expected token {expected}, got {token}"
            )));
        }
        Ok(())
    }

    pub fn read_f32(&mut self) -> Result<f32, NetError> {
        if self.binary {
            let mut buf = [0u8; 4];
            self.read_exact(&mut buf)?;
            Ok(f32::from_le_bytes(buf))
        } else {
            let token = self.read_token()?;
            token
                .parse::<f32>()
                .map_err(|_| NetError::CorruptState(format!("malformed float value {token}")))
        }
    }

    fn read_u64(&mut self) -> Result<u64, NetError> {
        if self.binary {
            let mut buf = [0u8; 8];
            self.read_exact(&mut buf)?;
            Ok(u64::from_le_bytes(buf))
        } else {
            let token = self.read_token()?;
            token
                .parse::<u64>()
                .map_err(|_| NetError::CorruptState(format!("malformed count value {token}")))
        }
    }

    pub fn read_matrix(&mut self) -> Result<Matrix, NetError> {
        self.expect_token(MATRIX_MARKER)?;
        let rows = self.read_u64()? as usize;
        let cols = self.read_u64()? as usize;
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            data.push(self.read_f32()?);
        }
        Ok(Matrix::from_vec(rows, cols, data))
    }

    pub fn read_vector(&mut self) -> Result<Vec<f32>, NetError> {
        self.expect_token(VECTOR_MARKER)?;
        let len = self.read_u64()? as usize;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(self.read_f32()?);
        }
        Ok(data)
    }
}
