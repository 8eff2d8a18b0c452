//! # Tizen Control Point
//!
//! A sync-first UPnP control point for Tizen televisions.
//!
//! ## Overview
//!
//! The control point discovers TVs over SSDP, subscribes to their Control
//! and Picture services over GENA, keeps a local copy of every evented state
//! variable, and sends SOAP actions and variable queries to them. All network
//! work happens on background threads; the API is blocking.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tizen_control_point::{init_logging_from_env, ControlPoint, ControlPointConfig, StateUpdate};
//!
//! init_logging_from_env().ok();
//! let control_point = ControlPoint::start(ControlPointConfig::from_env()?)?;
//!
//! for update in control_point.updates() {
//!     match update {
//!         StateUpdate::DeviceAdded { udn } => println!("+ {udn}"),
//!         StateUpdate::VariableChanged { udn, variable, value, .. } => {
//!             println!("{udn}: {variable} = {value}")
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok::<(), tizen_control_point::ControlPointError>(())
//! ```
//!
//! ## Architecture
//!
//! 1. **Transport**: the [`Transport`] trait issues searches, subscriptions,
//!    actions and queries without blocking; outcomes come back as
//!    [`ProtocolEvent`]s. [`UpnpTransport`] talks to the network,
//!    [`RecordingTransport`] records calls for tests.
//! 2. **Router**: a dedicated thread feeds every [`ProtocolEvent`] to the
//!    [`CallbackRouter`], which applies it to the registry.
//! 3. **Registry**: [`DeviceRegistry`] owns every [`Device`] behind one lock,
//!    with indexes from SID, event URL and control URL to the service.
//! 4. **Supervisor**: [`TimeoutSupervisor`] ages advertisements and drops
//!    devices that stopped announcing themselves.
//! 5. **Presentation**: [`StateUpdate`]s are published to a blocking
//!    [`StateUpdateIterator`].

pub mod applier;
pub mod config;
pub mod control_point;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod logging;
pub mod model;
pub mod notify;
pub mod registry;
pub mod router;
pub mod subscription;
pub mod supervisor;
pub mod transport;
pub mod upnp;

pub use applier::{apply_changes, ChangeDocument};
pub use config::ControlPointConfig;
pub use control_point::ControlPoint;
pub use dispatcher::Dispatcher;
pub use error::{ControlPointError, Result, TransportError};
pub use event::{Discovery, ProtocolEvent, SubscriptionNotice};
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use model::{Device, Service, ServiceKind, SERVICE_COUNT};
pub use notify::{Notifier, StateUpdate, StateUpdateIterator};
pub use registry::{AddOutcome, DeviceListing, DeviceRegistry, SweepReport};
pub use router::CallbackRouter;
pub use subscription::{SubscriptionManager, SubscriptionUpdate};
pub use supervisor::TimeoutSupervisor;
pub use transport::{ActionInvocation, OutboundCall, RecordingTransport, SearchTarget, Transport};
pub use upnp::UpnpTransport;

// Re-export the description type callers build discoveries from
pub use tizen_discovery::DeviceDescription;
