//! Proactive notifications for Teams bots.
//!
//! [`NotificationMiddleware`] keeps a registry of the conversations the bot is installed in,
//! [`NotificationBot`] turns that registry into validated [`TeamsBotInstallation`]s, and
//! installations fan out into [`Channel`] and [`Member`] targets.

mod bot;
mod error;
mod middleware;
mod options;
mod target;

pub use bot::{NotificationBot, SearchScope};
pub use error::{NotificationError, Result};
pub use middleware::{MessageOrigin, NotificationMiddleware, TurnSignal};
pub use options::NotificationOptions;
pub use tnb_store::store_path_from;
pub use target::{
    Channel, Member, MessageResponse, NotificationTarget, SendErrorHandler, TeamsBotInstallation,
    send_adaptive_card, send_message,
};
