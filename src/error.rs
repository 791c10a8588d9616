//! Error types for MaxMind DB operations.

use std::io;

use thiserror::Error;

/// Error returned by database construction and lookup operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GeoIpError {
    /// The database file is malformed or corrupted.
    #[error("invalid database: {message}")]
    InvalidDatabase {
        /// Description of what is invalid.
        message: String,
    },

    /// A value in the data section could not be decoded.
    #[error("{}", format_decode_error(.message, .offset))]
    Decode {
        /// Description of the decoding error.
        message: String,
        /// Byte offset in the data section where the error was detected.
        offset: Option<usize>,
    },

    /// The provided input is invalid for this operation.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of what is invalid about the input.
        message: String,
    },

    /// An I/O error occurred while reading the database.
    #[error("i/o error: {0}")]
    Io(
        #[from]
        #[source]
        io::Error,
    ),
}

fn format_decode_error(message: &str, offset: &Option<usize>) -> String {
    match offset {
        Some(off) => format!("decoding error at offset {off}: {message}"),
        None => format!("decoding error: {message}"),
    }
}

impl GeoIpError {
    /// Creates an InvalidDatabase error.
    pub fn invalid_database(message: impl Into<String>) -> Self {
        GeoIpError::InvalidDatabase {
            message: message.into(),
        }
    }

    /// Creates a Decode error with just a message.
    pub fn decode(message: impl Into<String>) -> Self {
        GeoIpError::Decode {
            message: message.into(),
            offset: None,
        }
    }

    /// Creates a Decode error with message and offset.
    pub fn decode_at(message: impl Into<String>, offset: usize) -> Self {
        GeoIpError::Decode {
            message: message.into(),
            offset: Some(offset),
        }
    }

    /// Creates an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        GeoIpError::InvalidInput {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", GeoIpError::invalid_database("no metadata marker")),
            "invalid database: no metadata marker".to_owned(),
        );

        assert_eq!(
            format!("{}", GeoIpError::decode("unexpected type")),
            "decoding error: unexpected type".to_owned(),
        );
        assert_eq!(
            format!("{}", GeoIpError::decode_at("unexpected type", 100)),
            "decoding error at offset 100: unexpected type".to_owned(),
        );

        assert_eq!(
            format!("{}", GeoIpError::invalid_input("bad address")),
            "invalid input: bad address".to_owned(),
        );

        let io_err = Error::new(ErrorKind::NotFound, "file not found");
        assert_eq!(
            format!("{}", GeoIpError::from(io_err)),
            "i/o error: file not found".to_owned(),
        );
    }
}
