use dialoguer::console::style;

pub enum CommandStatus {
    Success,
    Error,
    Warning,
    Pending,
}

/// One status line on stderr, prefixed with a coloured indicator.
pub fn print_command_status(status: CommandStatus, message: &str) {
    eprintln!("{} {message}", indicator(&status));
}

pub fn indicator(status: &CommandStatus) -> String {
    match status {
        CommandStatus::Success => style("✓").green().to_string(),
        CommandStatus::Error => style("✗").red().to_string(),
        CommandStatus::Warning => style("!").yellow().to_string(),
        CommandStatus::Pending => style("⏳").dim().to_string(),
    }
}
