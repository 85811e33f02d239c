mod progress;
mod select;
mod spinner;
mod status;
mod table;

pub use progress::{percent_bar, stacked_percent_bars, StackedBars};

pub use select::{fuzzy_select, text_input};

pub use spinner::with_spinner;

pub use status::{indicator, print_command_status, CommandStatus};

pub use table::{apply_column_padding, header, styled_table, truncate};
