//! Domain entities

mod content;
mod event;
mod flow;
mod session;

pub use content::*;
pub use event::*;
pub use flow::*;
pub use session::*;
