//! Terminal screens used by the command line tool.

mod error;
mod port_selector;

pub use error::GuiError;
pub use port_selector::{port_selector, SelectorState};
