// TLS acceptor for the notification listener.
//
// Devices must present a client certificate chaining to the configured CA
// bundle. A connection that fails the handshake never reaches the parser.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::error::Error;

/// PEM material for the listener's TLS endpoint.
#[derive(Debug, Clone)]
pub struct CatcherTls {
    /// Server certificate chain presented to devices.
    pub cert_chain: PathBuf,
    pub private_key: PathBuf,
    /// CA bundle device client certificates must chain to.
    pub client_ca: PathBuf,
}

impl CatcherTls {
    /// Build an acceptor that requires a verified client certificate.
    pub fn acceptor(&self) -> Result<TlsAcceptor, Error> {
        Ok(TlsAcceptor::from(build_server_config(self)?))
    }
}

fn build_server_config(tls: &CatcherTls) -> Result<Arc<ServerConfig>, Error> {
    let server_chain = load_cert_chain(&tls.cert_chain)?;
    let private_key = load_private_key(&tls.private_key)?;
    let roots = load_root_store(&tls.client_ca)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .build()
        .map_err(|err| {
            Error::Tls(format!(
                "failed to build client verifier from {}: {err}",
                tls.client_ca.display()
            ))
        })?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|err| Error::Tls(format!("unusable TLS provider: {err}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(server_chain, private_key)
        .map_err(|err| Error::Tls(format!("invalid listener certificate/key: {err}")))?;

    Ok(Arc::new(config))
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut reader = BufReader::new(File::open(path)?);
    let certificates = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            Error::Tls(format!(
                "failed to parse PEM certs from {}: {err}",
                path.display()
            ))
        })?;
    if certificates.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certificates)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| {
            Error::Tls(format!(
                "failed to parse private key {}: {err}",
                path.display()
            ))
        })?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}

fn load_root_store(path: &Path) -> Result<RootCertStore, Error> {
    let certificates = load_cert_chain(path)?;
    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(certificates);
    if added == 0 {
        return Err(Error::Tls(format!(
            "no valid CA certificates found in {}",
            path.display()
        )));
    }
    Ok(roots)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_files_surface_as_io_errors() {
        let tls = CatcherTls {
            cert_chain: "/nonexistent/server.pem".into(),
            private_key: "/nonexistent/server.key".into(),
            client_ca: "/nonexistent/ca.pem".into(),
        };
        assert!(matches!(tls.acceptor(), Err(Error::Io(_))));
    }

    #[test]
    fn pem_without_certificates_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();
        let err = load_cert_chain(file.path()).unwrap_err();
        assert!(err.to_string().contains("no certificates found"), "{err}");
    }
}
