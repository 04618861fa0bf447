use std::convert::Infallible;
use std::ffi::CString;

use nix::unistd::execvp;

use crate::error::ExecError;

/// Replace the current process image with `argv`, resolving `argv[0]`
/// against `PATH`.
///
/// On success nothing returns: the command inherits this process's pid,
/// stdio, environment, working directory, and signal dispositions, and its
/// exit status is what the parent of this process observes. Callers should
/// make sure no runtime threads are alive when calling this.
pub fn exec_command(argv: &[String]) -> Result<Infallible, ExecError> {
    let program = argv.first().ok_or(ExecError::Empty)?;

    let mut args = Vec::with_capacity(argv.len());
    for arg in argv {
        args.push(CString::new(arg.as_str()).map_err(|_| ExecError::NulByte(arg.clone()))?);
    }

    match execvp(&args[0], &args) {
        Ok(never) => match never {},
        Err(errno) => Err(ExecError::Exec {
            program: program.clone(),
            errno,
        }),
    }
}

#[cfg(test)]
mod tests {
    use nix::errno::Errno;

    use super::*;

    #[test]
    fn missing_programs_report_enoent() {
        let argv = vec!["pgwait-no-such-program".to_string()];
        let err = exec_command(&argv).unwrap_err();

        assert!(matches!(
            err,
            ExecError::Exec {
                errno: Errno::ENOENT,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn empty_commands_are_rejected() {
        assert!(matches!(exec_command(&[]), Err(ExecError::Empty)));
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let argv = vec!["echo".to_string(), "a\0b".to_string()];
        assert!(matches!(
            exec_command(&argv),
            Err(ExecError::NulByte(arg)) if arg == "a\0b"
        ));
    }
}
