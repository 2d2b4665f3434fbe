//! Log setup.  Everything goes to `daemon.log`; WARN and ERROR lines are also
//! forwarded to connected popups through the core.

use std::path::Path;

use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::DaemonEvent;

pub const DEFAULT_FILTER: &str = "info,soundtab_daemon=debug";

/// A tracing layer that forwards warnings to popups as `DaemonEvent::Log`.
pub struct PopupLogLayer {
    sender: mpsc::Sender<DaemonEvent>,
}

impl PopupLogLayer {
    pub fn new(sender: mpsc::Sender<DaemonEvent>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for PopupLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let meta = event.metadata();
        if !matches!(*meta.level(), tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }
        // Delivery warnings from the hub would feed back into the hub.
        if meta.target().starts_with("soundtab_daemon::sync") {
            return;
        }

        let mut message = format!(
            "{} [{}] ",
            chrono::Local::now().format("%H:%M:%S"),
            meta.level()
        );
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // Never block the logging thread; a full core queue drops the line.
        let _ = self.sender.try_send(DaemonEvent::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// Install the global subscriber: file writer + popup forwarding, filtered by
/// `RUST_LOG` or `DEFAULT_FILTER`.
pub fn init(log_path: &Path, event_tx: mpsc::Sender<DaemonEvent>) -> anyhow::Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(PopupLogLayer::new(event_tx))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .try_init()?;
    Ok(())
}
