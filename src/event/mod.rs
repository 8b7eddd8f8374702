pub mod event;
pub mod id;
pub mod template;

pub use event::{Event, EventFull, EventStatus, format_time};
