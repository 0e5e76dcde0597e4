//! JSON-lines request loop for `mender session`.

use anyhow::Result;
use mender_tools::Session;
use mender_types::ToolResult;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

#[derive(Debug, Deserialize)]
struct Request {
    name: String,
    #[serde(default)]
    input: Value,
}

/// Answer one `ToolResult` line per request line until `reader` hits EOF.
pub async fn run<R, W>(session: &Session, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let result = match serde_json::from_str::<Request>(line) {
            Ok(request) => session.dispatch(&request.name, &request.input).await,
            Err(e) => {
                tracing::warn!("Rejected session request: {e}");
                ToolResult::error(format!("Invalid request: {e}"))
            }
        };
        let mut out = serde_json::to_vec(&result)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }
    Ok(())
}
