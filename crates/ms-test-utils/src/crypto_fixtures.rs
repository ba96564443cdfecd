//! Fixed cryptographic fixtures for testing
//!
//! Two RSA-2048 key pairs with self-signed certificates ("primary" and
//! "rotated") plus one P-256 certificate without a private key. The PEM files
//! live in `fixtures/` and are compiled in, so every test run signs with the
//! same keys.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

const RSA_PRIMARY_KEY_PEM: &str = include_str!("../fixtures/rsa_primary_key.pem");
const RSA_PRIMARY_CERT_PEM: &str = include_str!("../fixtures/rsa_primary_cert.pem");
const RSA_ROTATED_KEY_PEM: &str = include_str!("../fixtures/rsa_rotated_key.pem");
const RSA_ROTATED_CERT_PEM: &str = include_str!("../fixtures/rsa_rotated_cert.pem");
const EC_CERT_PEM: &str = include_str!("../fixtures/ec_cert.pem");

/// An RSA signing key paired with the certificate an issuer would publish.
#[derive(Debug, Clone)]
pub struct TestSigningKey {
    kid: String,
    private_key_pem: &'static str,
    certificate_pem: &'static str,
}

impl TestSigningKey {
    /// The primary issuer key, published under `kid`.
    pub fn primary(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            private_key_pem: RSA_PRIMARY_KEY_PEM,
            certificate_pem: RSA_PRIMARY_CERT_PEM,
        }
    }

    /// A second, unrelated issuer key, published under `kid`.
    pub fn rotated(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            private_key_pem: RSA_ROTATED_KEY_PEM,
            certificate_pem: RSA_ROTATED_CERT_PEM,
        }
    }

    /// Key ID placed in token headers and JWKS entries.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Same key material, different key ID.
    ///
    /// Signing with `TestSigningKey::rotated("a").with_kid("b")` produces a
    /// token that claims key `b` but is signed by another key: a forgery.
    pub fn with_kid(&self, kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            ..self.clone()
        }
    }

    /// Sign `claims` with RS256.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_algorithm(claims, Algorithm::RS256)
    }

    /// Sign `claims` with an RSA algorithm of the caller's choice.
    pub fn sign_with_algorithm(&self, claims: &Value, algorithm: Algorithm) -> String {
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .expect("fixture RSA key should parse");
        let mut header = Header::new(algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());

        encode(&header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Sign `claims` without a `kid` in the header.
    pub fn sign_without_kid(&self, claims: &Value) -> String {
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .expect("fixture RSA key should parse");
        let header = Header::new(Algorithm::RS256);

        encode(&header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Base64 (standard alphabet) DER of the certificate, as found in `x5c`.
    pub fn certificate_der_b64(&self) -> String {
        certificate_pem_to_der_b64(self.certificate_pem)
    }

    /// JWKS entry for this key.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "alg": "RS256",
            "use": "sig",
            "x5c": [self.certificate_der_b64()]
        })
    }
}

/// Convert a PEM certificate into the base64 DER form used by `x5c`.
///
/// The PEM body already is base64 DER, so this only strips armor lines.
pub fn certificate_pem_to_der_b64(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect()
}

/// Base64 DER of a P-256 (non-RSA) certificate.
pub fn ec_certificate_der_b64() -> String {
    certificate_pem_to_der_b64(EC_CERT_PEM)
}

/// JWKS entry for a P-256 certificate under `kid`.
pub fn ec_jwk_json(kid: &str) -> Value {
    json!({
        "kty": "EC",
        "kid": kid,
        "x5c": [ec_certificate_der_b64()]
    })
}

/// JWKS entry whose certificate is valid base64 but not DER.
pub fn corrupt_certificate_jwk_json(kid: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "x5c": [STANDARD.encode(b"definitely not a certificate")]
    })
}

/// Wrap entries in a `{"keys": [...]}` document.
pub fn jwks_document(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// Assemble a compact token from arbitrary header and claims with a junk signature.
///
/// Useful for algorithm-confusion and malformed-payload tests where no real
/// signature is needed.
pub fn unsigned_token(header: &Value, claims: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
    let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header_b64}.{claims_b64}.c2lnbmF0dXJl")
}
