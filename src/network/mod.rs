//! Network Layer
//!
//! Authority/observer replication over reliable-ordered channels. Clients
//! send sequenced intents; the authority validates, commits and
//! broadcasts. No socket transport: channels model latency in ticks.

pub mod authority;
pub mod channel;
pub mod observer;
pub mod protocol;
pub mod session;

pub use authority::{Authority, Outgoing, Recipient};
pub use channel::{reliable_channel, ChannelError, ChannelReceiver, ChannelSender};
pub use observer::Observer;
pub use protocol::{ClientMessage, Intent, ServerMessage};
pub use session::{Session, SessionError};
