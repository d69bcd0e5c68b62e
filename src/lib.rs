pub mod config;
pub mod device;
pub mod message;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod source;

pub use device::{DeviceError, DeviceGateway, JobHandle, RenderedDocument, SimulatedOutcome, SimulatedPrinter};
pub use leiriposti_shared::{MessageContent, MessageStatus, StatusFilter};
pub use message::{Message, MessageHandle, MessageStore};
pub use scheduler::{Scheduler, SchedulerError, SchedulerEvent, StartOutcome, Transition};
pub use session::{SessionProfile, SessionStore};
