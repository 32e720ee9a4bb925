use crate::cert::TempIdentity;
use crate::config::Config;
use crate::err::Error;
use crate::routes::{self, State};
use crate::{http, shutdown, tls};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub async fn main(config: Config) -> Result<(), Error> {
    let identity = if config.secure {
        Some(TempIdentity::generate()?)
    } else {
        None
    };
    serve(config, identity).await
}

/// Runs the server with an already generated identity.
///
/// The identity is dropped on every path out of this function, which deletes the key from disk.
async fn serve(config: Config, identity: Option<TempIdentity>) -> Result<(), Error> {
    let Config { root, addr, .. } = config;

    let tls = match &identity {
        Some(identity) => {
            log::info!(
                "Certificate SHA-256 fingerprint: {}",
                identity.identity().fingerprint()
            );
            Some(tls::acceptor(identity.cert_path(), identity.key_path())?)
        }
        None => None,
    };

    let listener = TcpListener::bind(addr).await?;

    run(listener, root, tls, shutdown::signal()).await?;

    if let Some(identity) = identity {
        if let Err(e) = identity.close() {
            log::warn!("Failed to remove temporary certificate: {}", e);
        }
    }

    Ok(())
}

/// Serves `root` on a bound listener until `stop` resolves or the listener fails.
pub async fn run(
    listener: TcpListener,
    root: PathBuf,
    tls: Option<TlsAcceptor>,
    stop: impl Future<Output = Result<(), io::Error>>,
) -> Result<(), Error> {
    let scheme = match tls {
        Some(_) => "https",
        None => "http",
    };
    log::info!(
        "Serving {} on {}://{}",
        root.display(),
        scheme,
        listener.local_addr()?
    );

    let server =
        http::run_simple_server(listener, tls, State::new(root), routes::respond_to_request);

    tokio::select! {
        result = server => result?,
        result = stop => result?,
    }

    Ok(())
}
