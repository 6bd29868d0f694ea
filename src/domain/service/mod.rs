//! 领域服务

mod dispatch;
mod presence_registry;

pub use dispatch::{DispatchOutcome, MessageDispatchService};
pub use presence_registry::PresenceRegistry;
