//! Process exit codes of the `chast` binary.
//! Scripts rely on them, so they only ever get added to.

use chast_core::ChastError;

pub const SUCCESS: i32 = 0;
pub const COMMAND_FAILED: i32 = 1; // A recipe command or recipe test failed
pub const CONFIG_ERROR: i32 = 2; // Bad settings, recipe or arguments
pub const INTERNAL_ERROR: i32 = 3;

/// Exit code for an error that reached `main`.
pub fn for_error(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<ChastError>()
        .map(ChastError::exit_code)
        .unwrap_or(INTERNAL_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn core_errors_keep_their_code_through_context() {
        let err = Err::<(), _>(ChastError::IllegalArgument("bad".into()))
            .context("while running")
            .unwrap_err();
        assert_eq!(for_error(&err), CONFIG_ERROR);

        let failed = anyhow::Error::new(ChastError::CommandFailed {
            command: "false".into(),
            status: 1,
        });
        assert_eq!(for_error(&failed), COMMAND_FAILED);

        assert_eq!(for_error(&anyhow::anyhow!("other")), INTERNAL_ERROR);
    }
}
