//! Peer synchronization: wire protocol, transport seam, channels and reconciliation

pub mod channel;
pub mod hub;
pub mod latency;
pub mod protocol;
pub mod reconciler;
pub mod transport;

pub use channel::{ChannelError, PeerChannels, PeerHandler, PublishOutcome, RoomTopics};
pub use hub::LocalHub;
pub use latency::{LatencySummary, LatencyTracker};
pub use protocol::{BroadcastMsg, PeerPresence, PlayerMove};
pub use reconciler::{CreationPolicy, Reconciler, RemoteEntityTable, RemoteEntry};
pub use transport::{Delivery, SubscribeOptions, Subscription, Transport, TransportError};
