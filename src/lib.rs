#![allow(clippy::uninlined_format_args)]

pub mod cache;
pub mod config;
pub mod extract;
pub mod fetcher;
pub mod interact;
pub mod reddit;
pub mod render;
pub mod resolver;
pub mod testing;
pub mod widget;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::{ConfigError, EmbedMode, WidgetOptions};
pub use extract::Comment;
pub use widget::{init, Frame, State, Widget};
