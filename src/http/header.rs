//! Locate the end of an HTTP header block inside a live stream.
//!
//! The scanner reads one byte at a time so that nothing after the blank-line
//! terminator is consumed. Those bytes belong to whatever protocol runs next.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, TunnelError};

const TERMINATOR_LEN: u8 = 4;

/// A complete header block, terminator included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock(Vec<u8>);

impl HeaderBlock {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// First line without its line ending
    pub fn status_line(&self) -> Option<&str> {
        let text = std::str::from_utf8(&self.0).ok()?;
        text.lines().next()
    }

    /// Status code of a response block: `HTTP/1.x <code> <reason>`
    pub fn status_code(&self) -> Option<u16> {
        let line = self.status_line()?;
        let mut parts = line.split_whitespace();

        let version = parts.next()?;
        if !version.starts_with("HTTP/1.") {
            return None;
        }

        let code = parts.next()?;
        if code.len() != 3 {
            return None;
        }
        code.parse().ok()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status_code(), Some(200..=299))
    }
}

impl std::fmt::Display for HeaderBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

// Match progress over CR LF CR LF. Even progress waits for '\r', odd for
// '\n'. Any other byte drops progress back to 0, including a '\r' seen at odd
// progress: it does not count as the start of a new match.
fn advance(progress: u8, byte: u8) -> u8 {
    match byte {
        b'\r' if progress % 2 == 0 => progress + 1,
        b'\n' if progress % 2 == 1 => progress + 1,
        _ => 0,
    }
}

/// Read up to and including the first CRLFCRLF.
///
/// Any read failure, including EOF before the terminator, is returned as
/// [`TunnelError::HeaderRead`] and the partial block is discarded.
pub async fn read_header_block<R>(stream: &mut R) -> Result<HeaderBlock>
where
    R: AsyncRead + Unpin,
{
    let mut block = Vec::new();
    let mut progress = 0u8;

    while progress < TERMINATOR_LEN {
        let byte = stream.read_u8().await.map_err(TunnelError::HeaderRead)?;
        block.push(byte);
        progress = advance(progress, byte);
    }

    Ok(HeaderBlock(block))
}
