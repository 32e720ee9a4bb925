use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};
use std::io;

pub type Error = Box<dyn StdError + Send + Sync + 'static>;

/// Returned from `main`, so a failed startup prints the message chain instead of `Debug` output.
pub struct DisplayError(Error);

impl Debug for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.0, f)?;
        let mut source = self.0.source();
        while let Some(e) = source {
            // thiserror messages usually embed their source already
            if !self.0.to_string().contains(&e.to_string()) {
                write!(f, "\n  caused by: {}", e)?;
            }
            source = e.source();
        }
        Ok(())
    }
}

impl<T: Into<Error>> From<T> for DisplayError {
    fn from(display: T) -> Self {
        DisplayError(display.into())
    }
}

pub trait IoErrorExt {
    fn applies_to(&self) -> AppliesTo;
}

impl IoErrorExt for io::Error {
    fn applies_to(&self) -> AppliesTo {
        match self.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset => AppliesTo::Connection,
            _ => AppliesTo::Listener,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AppliesTo {
    Connection,
    Listener,
}
