use rustls::crypto::ring::default_provider;
use rustls::ServerConfig;
use rustls_pki_types::pem::{self, PemObject};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read certificate {}: {reason:?}", path.display())]
    Certificate { path: PathBuf, reason: pem::Error },
    #[error("no certificate found in {}", path.display())]
    EmptyChain { path: PathBuf },
    #[error("failed to read private key {}: {reason:?}", path.display())]
    PrivateKey { path: PathBuf, reason: pem::Error },
    #[error("failed to configure TLS: {0}")]
    Config(#[from] rustls::Error),
}

/// Builds an acceptor from a PEM certificate chain and PEM private key on disk.
pub fn acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = CertificateDer::pem_file_iter(cert_path)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|reason| TlsError::Certificate {
            path: cert_path.to_owned(),
            reason,
        })?;
    if certs.is_empty() {
        return Err(TlsError::EmptyChain {
            path: cert_path.to_owned(),
        });
    }

    let key = PrivateKeyDer::from_pem_file(key_path).map_err(|reason| TlsError::PrivateKey {
        path: key_path.to_owned(),
        reason,
    })?;

    Ok(TlsAcceptor::from(Arc::new(server_config(certs, key)?)))
}

pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, rustls::Error> {
    // safe defaults are TLS 1.2 and 1.3
    let mut config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::TempIdentity;
    use rustls::pki_types::ServerName;
    use rustls::{CertificateError, ClientConfig, RootCertStore};
    use std::fs;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_rustls::TlsConnector;

    fn client(roots: RootCertStore) -> TlsConnector {
        let config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    fn pinned(temp: &TempIdentity) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(temp.identity().cert_der().clone()).unwrap();
        roots
    }

    /// Accepts one connection, echoes a single read back, then closes.
    async fn spawn_echo(acceptor: TlsAcceptor) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            if let Ok(mut tls) = acceptor.accept(tcp).await {
                let mut buf = [0; 64];
                let n = tls.read(&mut buf).await.unwrap();
                tls.write_all(&buf[..n]).await.unwrap();
                tls.shutdown().await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn pinned_client_handshakes() {
        let temp = TempIdentity::generate().unwrap();
        let acceptor = acceptor(temp.cert_path(), temp.key_path()).unwrap();

        for name in ["localhost", "127.0.0.1"] {
            let addr = spawn_echo(acceptor.clone()).await;
            let tcp = TcpStream::connect(addr).await.unwrap();
            let mut tls = client(pinned(&temp))
                .connect(ServerName::try_from(name).unwrap(), tcp)
                .await
                .unwrap();
            tls.write_all(b"ping").await.unwrap();
            let mut out = Vec::new();
            tls.read_to_end(&mut out).await.unwrap();
            assert_eq!(out, b"ping");
        }
    }

    #[tokio::test]
    async fn public_roots_reject_certificate() {
        let temp = TempIdentity::generate().unwrap();
        let acceptor = acceptor(temp.cert_path(), temp.key_path()).unwrap();
        let addr = spawn_echo(acceptor).await;

        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let tcp = TcpStream::connect(addr).await.unwrap();
        let err = client(roots)
            .connect(ServerName::try_from("localhost").unwrap(), tcp)
            .await
            .unwrap_err();
        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<rustls::Error>())
            .unwrap();
        assert_eq!(
            *inner,
            rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)
        );
    }

    #[tokio::test]
    async fn other_names_are_rejected() {
        let temp = TempIdentity::generate().unwrap();
        let acceptor = acceptor(temp.cert_path(), temp.key_path()).unwrap();
        let addr = spawn_echo(acceptor).await;

        let tcp = TcpStream::connect(addr).await.unwrap();
        let err = client(pinned(&temp))
            .connect(ServerName::try_from("example.com").unwrap(), tcp)
            .await
            .unwrap_err();
        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<rustls::Error>())
            .unwrap();
        assert!(
            matches!(inner, rustls::Error::InvalidCertificate(_)),
            "{:?}",
            inner
        );
        assert_ne!(
            *inner,
            rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)
        );
    }

    #[test]
    fn missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        match acceptor(&cert, &key) {
            Err(TlsError::Certificate { path, .. }) => assert_eq!(path, cert),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn empty_certificate_file() {
        let temp = TempIdentity::generate().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        fs::write(&cert, b"").unwrap();
        match acceptor(&cert, temp.key_path()) {
            Err(TlsError::EmptyChain { path }) => assert_eq!(path, cert),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }
}
