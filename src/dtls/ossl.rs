use openssl::ec::EcKey;
use openssl::nid::Nid;
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslMethod, SslOptions, SslVerifyMode};

use crate::config::DtlsConfig;

use super::{DtlsCert, DtlsError};

const DTLS_EC_CURVE: Nid = Nid::X9_62_PRIME256V1;

/// Create the OpenSSL context for one DTLS session.
///
/// Every [`Dtls`][super::Dtls] gets a context of its own, they are never shared.
pub fn dtls_create_ctx(cert: &DtlsCert, config: &DtlsConfig) -> Result<SslContext, DtlsError> {
    let mut ctx = SslContextBuilder::new(SslMethod::dtls())?;

    ctx.set_cipher_list(config.cipher_list())?;
    ctx.set_tlsext_use_srtp(config.srtp_profiles())?;

    // The remote certificate is verified by its fingerprint, which happens
    // out of band. Require one, but accept any.
    let mut mode = SslVerifyMode::empty();
    mode.insert(SslVerifyMode::PEER);
    mode.insert(SslVerifyMode::FAIL_IF_NO_PEER_CERT);
    ctx.set_verify_callback(mode, |_ok, _ctx| true);

    ctx.set_private_key(&cert.pkey)?;
    ctx.set_certificate(&cert.x509)?;
    ctx.check_private_key()?;

    let mut options = SslOptions::empty();
    options.insert(SslOptions::SINGLE_ECDH_USE);
    options.insert(SslOptions::NO_DTLSV1);
    ctx.set_options(options);

    Ok(ctx.build())
}

pub fn dtls_ssl_create(ctx: &SslContext, config: &DtlsConfig) -> Result<Ssl, DtlsError> {
    let mut ssl = Ssl::new(ctx)?;
    ssl.set_mtu(config.mtu() as u32)?;

    let eckey = EcKey::from_curve_name(DTLS_EC_CURVE)?;
    ssl.set_tmp_ecdh(&eckey)?;

    Ok(ssl)
}
