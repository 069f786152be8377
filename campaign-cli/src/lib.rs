// Campaign CLI Library
// Command implementations shared by the `campaign` and `submit-job` binaries

pub mod commands;
pub mod logging;
pub mod output;
