//! Realtime notification channel.
//!
//! A push subscription speaking the JSON hub protocol over a websocket. It
//! reconnects on its own, re-announces the subject after every connect, and
//! hands typed [`RealtimeEvent`]s to an [`EventStream`]. The lists in
//! [`live`] absorb replays caused by reconnects.

mod backoff;
mod channel;
mod event;
pub mod live;
pub mod protocol;
mod transport;

pub use backoff::ReconnectPolicy;
pub use channel::{ChannelHandle, ChannelOptions, ChannelStatus, EventStream, RealtimeChannel};
pub use event::{ClinicRecord, NotificationEvent, RealtimeEvent, RecordId, TicketRecord};
pub use live::{ClinicFeed, Keyed, LiveList, NotificationInbox, TicketBoard};
pub use transport::{Connector, Transport, WsConnector};

#[cfg(test)]
pub(crate) use channel::testing;
