//! Subcommand implementations.

pub mod publish;
pub mod send;
pub mod tail;

use roomcast::Notification;

use crate::OutputFormat;

/// Print one notification in the chosen format.
pub fn print_notification(notification: &Notification, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "[{}] #{} {} {}: {}",
                notification.room,
                notification.id,
                notification.kind,
                notification.title,
                notification.body
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(notification)?);
        }
    }
    Ok(())
}
