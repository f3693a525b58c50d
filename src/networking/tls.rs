use std::{
    fs::File,
    io::BufReader,
    sync::Arc
};

use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer}
    }
};

use crate::{
    config::Keys,
    error::ConfigError
};

/// Builds a TLS acceptor from the pem/key pair registered under `name`.
pub fn load_acceptor(name: &str, keys: &Keys) -> Result<TlsAcceptor, ConfigError> {
    let tls_err = |reason: String| ConfigError::Tls { name: name.to_string(), reason };

    let cert_file = File::open(&keys.pem).map_err(|e| tls_err(format!("{}: {}", keys.pem, e)))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|e| tls_err(format!("{}: {}", keys.pem, e)))?;
    if certs.is_empty() {
        return Err(tls_err(format!("no certificates in {}", keys.pem)));
    }

    let key_file = File::open(&keys.key).map_err(|e| tls_err(format!("{}: {}", keys.key, e)))?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| tls_err(format!("{}: {}", keys.key, e)))?
        .ok_or_else(|| tls_err(format!("no private key in {}", keys.key)))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| tls_err(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
