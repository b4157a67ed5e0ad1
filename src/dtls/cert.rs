use std::fs;
use std::path::Path;
use std::time::SystemTime;

use openssl::asn1::{Asn1Integer, Asn1Time, Asn1Type};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::{X509Name, X509Ref, X509};

use super::{DtlsError, Fingerprint};

// libWebRTC says "WebRTC" here when doing OpenSSL, for BoringSSL they seem
// to generate a random 8 characters.
// https://webrtc.googlesource.com/src/+/1568f1b1330f94494197696fe235094e6293b258/rtc_base/rtc_certificate_generator.cc#27
const DTLS_CERT_IDENTITY: &str = "WebRTC";

const DTLS_CERT_CURVE: Nid = Nid::X9_62_PRIME256V1;

/// Certificate and private key used for DTLS.
#[derive(Debug, Clone)]
pub struct DtlsCert {
    pub(crate) pkey: PKey<Private>,
    pub(crate) x509: X509,
    fingerprint: Fingerprint,
}

impl DtlsCert {
    /// Load a PEM encoded certificate and private key from two files.
    pub fn from_pem_files(
        cert_file: impl AsRef<Path>,
        key_file: impl AsRef<Path>,
    ) -> Result<Self, DtlsError> {
        let cert_pem = fs::read(cert_file)?;
        let key_pem = fs::read(key_file)?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Parse a PEM encoded certificate and private key.
    ///
    /// Fails with [`DtlsError::KeyMismatch`] if the key does not belong to the
    /// certificate.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, DtlsError> {
        let x509 = X509::from_pem(cert_pem)?;
        let pkey = PKey::private_key_from_pem(key_pem)?;

        let private: &PKeyRef<Private> = &pkey;
        if !x509.public_key()?.public_eq(private) {
            return Err(DtlsError::KeyMismatch);
        }

        Self::from_parts(pkey, x509)
    }

    /// Creates a new self signed certificate.
    ///
    /// ECDSA P-256, valid from one hour ago and 7 days on.
    pub fn new_self_signed() -> Result<Self, DtlsError> {
        let group = EcGroup::from_curve_name(DTLS_CERT_CURVE)?;
        let key = EcKey::generate(&group)?;
        let pkey = PKey::from_ec_key(key)?;

        let mut x509b = X509::builder()?;
        x509b.set_version(2)?; // X509.V3 (zero indexed)

        // For Firefox, the serial number must be unique across all certificates, including those of other
        // processes/machines! See https://github.com/versatica/mediasoup/issues/127#issuecomment-474460153
        let mut serial_buf = [0u8; 16];
        openssl::rand::rand_bytes(&mut serial_buf)?;

        let serial_bn = BigNum::from_slice(&serial_buf)?;
        let serial = Asn1Integer::from_bn(&serial_bn)?;
        x509b.set_serial_number(&serial)?;
        let before = Asn1Time::from_unix(unix_time() - 3600)?;
        x509b.set_not_before(&before)?;
        let after = Asn1Time::days_from_now(7)?;
        x509b.set_not_after(&after)?;
        x509b.set_pubkey(&pkey)?;

        let mut nameb = X509Name::builder()?;
        nameb.append_entry_by_nid_with_type(
            Nid::COMMONNAME,
            DTLS_CERT_IDENTITY,
            Asn1Type::UTF8STRING,
        )?;
        let name = nameb.build();

        x509b.set_subject_name(&name)?;
        x509b.set_issuer_name(&name)?;

        x509b.sign(&pkey, MessageDigest::sha256())?;
        let x509 = x509b.build();

        Self::from_parts(pkey, x509)
    }

    fn from_parts(pkey: PKey<Private>, x509: X509) -> Result<Self, DtlsError> {
        let fingerprint = fingerprint_of(&x509)?;
        Ok(DtlsCert {
            pkey,
            x509,
            fingerprint,
        })
    }

    /// Produce a (public) fingerprint of the cert.
    ///
    /// This is sent via SDP to the other peer to lock down the DTLS
    /// to this specific certificate.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The certificate and private key (PKCS#8), PEM encoded.
    pub fn to_pem(&self) -> Result<(Vec<u8>, Vec<u8>), DtlsError> {
        let cert_pem = self.x509.to_pem()?;
        let key_pem = self.pkey.private_key_to_pem_pkcs8()?;
        Ok((cert_pem, key_pem))
    }
}

/// SHA-256 digest of the DER encoded certificate.
pub(crate) fn fingerprint_of(x509: &X509Ref) -> Result<Fingerprint, DtlsError> {
    let digest: &[u8] = &x509.digest(MessageDigest::sha256())?;

    Ok(Fingerprint {
        hash_func: "sha-256".into(),
        bytes: digest.to_vec(),
    })
}

fn unix_time() -> libc::time_t {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as libc::time_t
}
