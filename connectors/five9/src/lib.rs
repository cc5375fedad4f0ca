//! FCP Five9 Connector
//!
//! Keeps a single supervised event socket open to Five9 on behalf of an
//! embedding application and turns the raw call events into normalized
//! notifications.
//!
//! ## Connection lifecycle
//!
//! 1. Poll the discovery endpoint until the agent's session metadata exists.
//! 2. Fetch the call-variable schema for the agent's organisation.
//! 3. Open `wss://<api host>/<socket path>/<user id>` and start a `ping`
//!    heartbeat.
//! 4. Revive (tear down and repeat from 1) when two heartbeats go
//!    unanswered or the server force-closes the socket with code 1003.
//!
//! ## Events
//!
//! - `1202` heartbeat acknowledgment
//! - `3` / `4` / `5` call created / updated / deleted

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod attributes;
pub mod config;
pub mod connector;
pub mod decoder;
pub mod discovery;
pub mod error;
pub mod heartbeat;
pub mod http;
pub mod sink;
pub mod supervisor;
pub mod transport;
pub mod types;

pub use config::{ConfigDocument, ConfigProvider, Five9Config, Settings, StaticConfigProvider};
pub use connector::Five9Connector;
pub use error::{Five9Error, Five9Result, LossCause};
pub use sink::{ChannelSink, JsonLinesSink, NotificationSink, SinkMessage};
pub use supervisor::{ConnectionSupervisor, Phase, SupervisorContext, SupervisorStatus};
pub use types::{AttributeSchema, ErrorReport, EventKind, NormalizedNotification, SessionMetadata};
