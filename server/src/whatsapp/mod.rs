//! WhatsApp Sessions
//!
//! Per-account session supervision, event normalization and the outbound
//! command facade, plus the registry that owns every instance.

pub mod bridge;
pub mod chat;
pub mod connection;
pub mod dto;
pub mod error;
pub mod groups;
pub mod instance;
pub mod media;
pub mod monitor;
pub mod normalizer;
pub mod qrcode;
pub mod sender;

pub use bridge::BridgeConnector;
pub use connection::{
    ConnectOptions, Connection, ConnectionEvent, Connector, MediaInput, MediaKind, OnWhatsApp,
    ParticipantAction, Session, UpsertType,
};
pub use error::{ConnectionError, WaError};
pub use instance::{
    ConnectionStatus, InstanceContext, InstanceInfo, ProfilePicture, QrPairing, RemovalReason,
    RemovalSignal, WaInstance,
};
pub use monitor::{ConnectResponse, InstanceState, MonitorDeps, WaMonitor};
