// leiriposti_shared: data model and configuration shared by the scheduler, the CLI and the sim harness

pub mod config;
pub mod message;

pub use message::{MessageContent, MessageStatus, ParseStatusError, StatusFilter};
