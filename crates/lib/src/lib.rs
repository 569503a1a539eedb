//! msgbridge core library: Messenger webhook digestion, the bot and handoff
//! collaborators, the connector that ties them together, and the webhook gateway.

pub mod bot;
pub mod channels;
pub mod config;
pub mod connector;
pub mod digest;
pub mod gateway;
pub mod handoff;
pub mod init;
pub mod lang;
pub mod media;
pub mod session;
