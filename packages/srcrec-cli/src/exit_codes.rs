use srcrec_rs::{ErrorKind, SrcRecError};

pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
pub const TOOLKIT_NOT_FOUND: i32 = 3;
pub const PARTIAL_FAILURE: i32 = 4;

/// Exit code for an error that ends a command.
pub fn for_error(error: &SrcRecError) -> i32 {
    match error.kind() {
        ErrorKind::ToolkitUnavailable => TOOLKIT_NOT_FOUND,
        ErrorKind::MissingInput | ErrorKind::MalformedInput | ErrorKind::Configuration => {
            INPUT_ERROR
        }
        _ => EXECUTION_ERROR,
    }
}
