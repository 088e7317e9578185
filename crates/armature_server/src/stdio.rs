//! Newline-delimited JSON-RPC over a byte stream.
//!
//! One message per line in, one response per line out. Stdout carries
//! protocol traffic only; logs go to stderr.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::mcp::McpHandler;

/// Serve `handler` until `reader` reaches end of input
///
/// # Errors
///
/// Returns an I/O error if reading or writing fails
pub async fn run_stdio<R, W>(handler: &McpHandler, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0usize;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        handled += 1;
        if let Some(response) = handler.handle_message(line).await {
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        } else {
            debug!("No response for notification");
        }
    }
    info!(messages = handled, "Stdio input closed");
    Ok(())
}
