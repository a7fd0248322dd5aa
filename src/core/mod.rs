// src/core/mod.rs
pub mod dispatcher;
pub mod monitor;
pub mod notifier;
pub mod registry;

pub use dispatcher::{Command, Dispatcher};
pub use monitor::{ExitReason, MonitorReport, MonitorSettings, PositionMonitor, Step};
pub use notifier::{ChannelNotifier, Notifier};
pub use registry::SnapshotRegistry;
