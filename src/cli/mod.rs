pub mod commands;
pub mod progress;
pub mod ui;
pub mod util;

pub use progress::ConsoleRenderer;
pub use ui::Output;
pub use util::{CommandContext, cancel_on_ctrl_c, open_checkpoints, require_database, runtime};
