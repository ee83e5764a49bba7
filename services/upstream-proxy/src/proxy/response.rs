//! Fixed status responses written to frontends that cannot be relayed.
//!
//! The body is always empty. Protocols other than HTTP/1.x receive the same
//! bytes; the response is best-effort and the socket is closed afterwards.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const BAD_REQUEST: u16 = 400;
pub const NOT_FOUND: u16 = 404;
pub const INTERNAL_SERVER_ERROR: u16 = 500;
pub const BAD_GATEWAY: u16 = 502;
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Reason phrase for the codes this proxy emits.
pub fn reason_phrase(status: u16) -> Option<&'static str> {
    match status {
        BAD_REQUEST => Some("Bad Request"),
        NOT_FOUND => Some("Not Found"),
        INTERNAL_SERVER_ERROR => Some("Internal Server Error"),
        BAD_GATEWAY => Some("Bad Gateway"),
        SERVICE_UNAVAILABLE => Some("Service Unavailable"),
        _ => None,
    }
}

/// Render a bare status line. Unknown codes render as 500.
pub fn status_line(status: u16) -> String {
    let (code, reason) = match reason_phrase(status) {
        Some(reason) => (status, reason),
        None => (INTERNAL_SERVER_ERROR, "Internal Server Error"),
    };
    format!("HTTP/1.1 {code} {reason}\r\n\r\n")
}

/// Write the status line and close the write side.
///
/// Write errors are ignored; the peer may already be gone.
pub async fn respond<W>(writer: &mut W, status: u16)
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let line = status_line(status);
    if let Err(e) = writer.write_all(line.as_bytes()).await {
        debug!(status, error = %e, "Failed to write status response");
        return;
    }
    let _ = writer.shutdown().await;
}
