//! Send command implementation.

use anyhow::{Context, Result};
use roomcast::client::RoomcastClient;
use roomcast::NotificationPayload;

use crate::OutputFormat;

pub async fn run(
    client: &RoomcastClient,
    payload: NotificationPayload,
    format: OutputFormat,
) -> Result<()> {
    let created = client.create(&payload).await.context("send failed")?;

    match format {
        OutputFormat::Text => {
            println!("Created notification in '{}'", created.room);
            println!("  ID:         {}", created.id);
            println!("  Type:       {}", created.kind);
            println!("  Created at: {}", created.created_at.to_rfc3339());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
    }

    Ok(())
}
