use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const BUFFER_SIZE: usize = 16 * 1024;

/// Completion record of one copy direction.
#[derive(Debug, Default)]
pub struct Transfer {
    pub bytes: u64,
    /// I/O error that ended the direction, if it did not end on EOF or peer shutdown
    pub error: Option<io::Error>,
}

/// Both completion records of a finished relay
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Bytes copied from the first stream into the second
    pub sent: Transfer,
    /// Bytes copied from the second stream into the first
    pub received: Transfer,
}

impl RelayStats {
    pub fn is_clean(&self) -> bool {
        self.sent.error.is_none() && self.received.error.is_none()
    }
}

// Relay bytes between `a` and `b` until either side ends, then shut both down.
// Returns only after both directions have stopped.
pub async fn relay<A, B>(a: A, b: B) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    let finished = CancellationToken::new();

    let (sent, received) = tokio::join!(
        pipe(a_read, b_write, &finished, "a->b"),
        pipe(b_read, a_write, &finished, "b->a"),
    );

    debug!(
        sent = sent.bytes,
        received = received.bytes,
        "relay finished"
    );
    RelayStats { sent, received }
}

// Copy `src` into `dst` until EOF, an error, or the other direction finishing.
// Whichever way it ends, `dst` is shut down exactly once here.
async fn pipe<R, W>(mut src: R, mut dst: W, finished: &CancellationToken, label: &str) -> Transfer
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut bytes = 0u64;

    let error = loop {
        let n = tokio::select! {
            _ = finished.cancelled() => break None,
            result = src.read(&mut buf) => match result {
                Ok(0) => break None,
                Ok(n) => n,
                Err(e) => break Some(e),
            },
        };

        let written = tokio::select! {
            _ = finished.cancelled() => break None,
            result = dst.write_all(&buf[..n]) => result,
        };
        if let Err(e) = written {
            break Some(e);
        }
        bytes += n as u64;
    };

    if let Some(e) = &error {
        debug!(direction = label, error = %e, "relay direction failed");
    }

    // Unblock the peer direction before waiting on our own shutdown
    finished.cancel();
    if let Err(e) = dst.shutdown().await {
        debug!(direction = label, error = %e, "shutdown failed");
    }

    Transfer { bytes, error }
}
