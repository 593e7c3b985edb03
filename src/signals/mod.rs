//! Signal persistence, export and notification.

pub mod export;
pub mod repository;
pub mod sender;

pub use repository::{SignalQuery, SignalRepository};
pub use sender::{LogSender, SignalSender};
