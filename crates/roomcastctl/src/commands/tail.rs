//! Tail command implementation.

use anyhow::{Context, Result};
use roomcast::client::{RoomcastClient, StreamEvent};
use tokio::signal;

use super::print_notification;
use crate::OutputFormat;

pub async fn run(
    client: &RoomcastClient,
    room: &str,
    limit: Option<usize>,
    count: u64,
    format: OutputFormat,
) -> Result<()> {
    let mut subscription = client
        .subscribe(room, limit)
        .await
        .context("failed to open stream")?;

    if format == OutputFormat::Text {
        eprintln!("Following '{}' on {}", room, client.endpoint());
        eprintln!("Press Ctrl+C to stop...\n");
    }

    let mut received: u64 = 0;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                if format == OutputFormat::Text {
                    eprintln!("\nReceived {} notification(s)", received);
                }
                break;
            }
            result = subscription.next_event() => {
                match result {
                    Ok(Some(StreamEvent::Notification(notification))) => {
                        received += 1;
                        print_notification(&notification, format)?;

                        if count > 0 && received >= count {
                            if format == OutputFormat::Text {
                                eprintln!("\nReached notification limit ({})", count);
                            }
                            break;
                        }
                    }
                    Ok(Some(StreamEvent::Heartbeat)) => {
                        tracing::debug!("Heartbeat");
                    }
                    Ok(None) => {
                        if format == OutputFormat::Text {
                            eprintln!("Stream ended");
                        }
                        break;
                    }
                    Err(e) => {
                        eprintln!("Error reading stream: {}", e);
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
