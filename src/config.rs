use crate::opt::Options;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const FILE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Directory does not exist: {}", path.display())]
    MissingDirectory { path: PathBuf, source: io::Error },
    #[error("Not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },
}

/// Everything the server needs to start, resolved once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Absolute, canonical directory to serve
    pub root: PathBuf,
    pub addr: SocketAddr,
    pub secure: bool,
}

impl Config {
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let root = fs::canonicalize(&options.directory).map_err(|source| {
            ConfigError::MissingDirectory {
                path: options.directory.clone(),
                source,
            }
        })?;

        match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ConfigError::NotADirectory { path: root }),
            Err(source) => return Err(ConfigError::MissingDirectory { path: root, source }),
        }

        Ok(Self {
            root,
            addr: SocketAddr::new(options.bind, options.port),
            secure: options.secure,
        })
    }
}
