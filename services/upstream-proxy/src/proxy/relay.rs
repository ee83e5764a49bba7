//! Bidirectional byte relay between a frontend and its backend.
//!
//! The relay forwards the already-consumed first chunk, then copies both
//! directions until one of these happens:
//! - either side reaches end-of-stream
//! - either direction fails
//! - the connection's termination handle fires or is dropped
//!
//! Both sides are shut down on every exit.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

/// Buffer size for each copy direction.
const RELAY_BUFFER_SIZE: usize = 8192;

/// Any duplex byte stream the proxy can accept from or forward to.
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + ?Sized> ProxyStream for T {}

/// Type-erased stream, used for backend connections of either transport.
pub type BoxedStream = Box<dyn ProxyStream>;

/// How a relay ended.
#[derive(Debug)]
pub enum RelayEnd {
    /// The frontend reached end-of-stream.
    ClientClosed,
    /// The backend reached end-of-stream.
    BackendClosed,
    /// The termination handle fired.
    Disconnected,
    /// A read or write failed in either direction.
    Failed(io::Error),
}

/// Result of a finished relay.
#[derive(Debug)]
pub struct RelayOutcome {
    /// Bytes written to the backend, first chunk included.
    pub bytes_to_backend: u64,
    /// Bytes written to the frontend.
    pub bytes_from_backend: u64,
    pub end: RelayEnd,
}

/// Relay bytes between `frontend` and `backend` until teardown.
///
/// Both streams are closed when this returns.
pub async fn relay<F, B>(
    frontend: F,
    mut backend: B,
    first_chunk: &[u8],
    mut terminate: oneshot::Receiver<()>,
) -> RelayOutcome
where
    F: ProxyStream,
    B: ProxyStream,
{
    if let Err(e) = backend.write_all(first_chunk).await {
        return RelayOutcome {
            bytes_to_backend: 0,
            bytes_from_backend: 0,
            end: RelayEnd::Failed(e),
        };
    }

    let mut bytes_to_backend = first_chunk.len() as u64;
    let mut bytes_from_backend = 0u64;

    let (mut front_read, mut front_write) = tokio::io::split(frontend);
    let (mut back_read, mut back_write) = tokio::io::split(backend);

    let end = {
        let upstream = pump(&mut front_read, &mut back_write, &mut bytes_to_backend);
        let downstream = pump(&mut back_read, &mut front_write, &mut bytes_from_backend);
        tokio::pin!(upstream, downstream);

        tokio::select! {
            result = &mut upstream => match result {
                Ok(()) => RelayEnd::ClientClosed,
                Err(e) => RelayEnd::Failed(e),
            },
            result = &mut downstream => match result {
                Ok(()) => RelayEnd::BackendClosed,
                Err(e) => RelayEnd::Failed(e),
            },
            _ = &mut terminate => RelayEnd::Disconnected,
        }
    };

    let _ = back_write.shutdown().await;
    let _ = front_write.shutdown().await;

    RelayOutcome {
        bytes_to_backend,
        bytes_from_backend,
        end,
    }
}

/// Copy until EOF, then shut down the writer.
async fn pump<R, W>(reader: &mut R, writer: &mut W, total: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        *total += n as u64;
    }
    writer.shutdown().await
}
