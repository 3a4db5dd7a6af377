mod history;
mod run;

pub use history::{handle_history_command, HistoryCommand};
pub use run::{handle_run_command, handle_show_command};
