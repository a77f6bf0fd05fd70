//! Error type shared by every stage of the generator.

use std::io;
use std::path::PathBuf;

use quick_error::quick_error;

use crate::types::ObjectKind;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// Network or authentication failure while opening the connection
        Connection { host: String, port: u16, err: mysql::Error } {
            display("cannot connect to MySQL at {}:{}: {}", host, port, err)
            source(err)
        }
        /// The named table or procedure is not in the catalog
        NotFound { kind: ObjectKind, name: String } {
            display("{} `{}` not found", kind, name)
        }
        /// The procedure rejected the synthesized probe arguments
        Probe { procedure: String, statement: String, err: mysql::Error } {
            display("probe call for procedure `{}` failed ({}): {}", procedure, statement, err)
            source(err)
        }
        /// Any other catalog query failure
        Query(err: mysql::Error) {
            from()
            display("catalog query failed: {}", err)
            source(err)
        }
        /// The object's name cannot be used as a file name
        InvalidFileName { kind: ObjectKind, name: String } {
            display("{} `{}` cannot be written to a file: the name contains a path separator or is reserved", kind, name)
        }
        Io { path: PathBuf, err: io::Error } {
            display("{}: {}", path.display(), err)
            source(err)
        }
        Config { path: PathBuf, message: String } {
            display("invalid configuration {}: {}", path.display(), message)
        }
        /// Summary of a keep-going run in which some procedures failed
        Batch { failed: Vec<String> } {
            display("failed to generate {} header(s): {}", failed.len(), failed.join(", "))
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        Error::Io { path: path.into(), err }
    }

    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Error::NotFound { kind, name: name.into() }
    }

    /// Format the error together with its chain of sources
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\n  Caused by ({}): {}", depth, err));
            source = err.source();
            depth += 1;
        }
        output
    }
}
