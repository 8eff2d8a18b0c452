//! Generic UPnP callback server for receiving GENA event notifications.
//!
//! This crate provides a lightweight HTTP server for handling UPnP `NOTIFY`
//! requests. It has no knowledge of device-specific services or variables.
//!
//! # Overview
//!
//! - [`CallbackServer`]: HTTP server that binds to a local port in a range and
//!   accepts `NOTIFY` requests on any path.
//! - [`EventRouter`]: forwards each accepted notification to a channel.
//! - [`NotificationPayload`]: subscription ID, event sequence number and the raw
//!   XML property set.
//!
//! Notifications are forwarded whether or not their subscription ID is known
//! to the consumer; attributing them to a device is the consumer's job.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackServer, NotificationPayload};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::ServerError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
//!     let server = CallbackServer::new((3400, 3500), tx).await?;
//!
//!     println!("Callback URL: {}", server.callback_url());
//!
//!     while let Some(notification) = rx.recv().await {
//!         println!("SEQ {} for {}", notification.event_key, notification.subscription_id);
//!     }
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

mod error;
pub mod router;
mod server;

pub use error::ServerError;
pub use router::{EventRouter, NotificationPayload};
pub use server::CallbackServer;
