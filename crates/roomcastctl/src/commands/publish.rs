//! Publish command implementation.

use anyhow::{Context, Result};
use roomcast::client::RoomcastClient;
use roomcast::NotificationPayload;
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct PublishOutput {
    code: String,
    room: String,
    #[serde(rename = "type")]
    kind: String,
}

pub async fn run(
    client: &RoomcastClient,
    payload: NotificationPayload,
    format: OutputFormat,
) -> Result<()> {
    let status = client.publish(&payload).await.context("publish failed")?;

    let output = PublishOutput {
        code: status.code,
        room: payload.room,
        kind: payload.kind,
    };

    match format {
        OutputFormat::Text => {
            println!(
                "Queued '{}' notification for '{}' ({})",
                output.kind, output.room, output.code
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
