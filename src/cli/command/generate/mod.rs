pub mod generate_command;
pub mod generate_report;
