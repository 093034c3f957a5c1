//! Structured error types. The CPU never unwinds (runtime faults set the
//! Halt flag, per the CPU Core's design); only the assembler and image
//! loader return `Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: u32,
        message: String,
    },

    #[error("{file}: unresolved label `{label}`")]
    UnresolvedLabel { file: String, label: String },
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O failure reading image: {0}")]
    Io(#[from] std::io::Error),

    #[error("image too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}
