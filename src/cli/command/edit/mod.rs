pub mod edit_command;
