use std::{fmt, io, path::PathBuf};

/// Host-level failures: anything that stops the generator other than
/// problems inside the grammar itself, which go through the grammar's own
/// error counter instead.
#[derive(Debug)]
pub enum Error {
    FileRead(PathBuf, io::Error),
    FileWrite(PathBuf, io::Error),
    TemplateOpen(PathBuf, io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FileRead(path, cause) => {
                write!(f, "Can't read \"{}\": {}.", path.to_string_lossy(), cause)
            }
            Error::FileWrite(path, cause) => {
                write!(f, "Can't write \"{}\": {}.", path.to_string_lossy(), cause)
            }
            Error::TemplateOpen(path, cause) => write!(
                f,
                "Can't open the template file \"{}\": {}.",
                path.to_string_lossy(),
                cause
            ),
        }
    }
}

impl std::error::Error for Error {}
