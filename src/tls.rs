use std::sync::OnceLock;

/// rustls 0.23 needs a process-level CryptoProvider selection.
///
/// When a dependency tree enables both providers (`ring` and `aws-lc-rs`),
/// rustls cannot infer a default and panics on the first TLS config build.
/// Installing ring explicitly avoids that; if another part of the process
/// already installed a provider, the `Err` is ignored on purpose.
pub fn install_rustls_crypto_provider() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
