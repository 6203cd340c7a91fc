use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use sha2::Sha256;

use crate::core::error::SigningError;

use super::{SignOptions, UrlSigner};

type HmacSha256 = Hmac<Sha256>;

/// Characters escaped inside an object key path. `/` is kept.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Characters escaped inside a query value.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// ---------------------------------------------------------------------------
// LocalUrlSigner
// ---------------------------------------------------------------------------

/// HMAC-SHA256 query-string signer.
///
/// Produces `GoogleAccessId`, `Expires` and `Signature` query parameters in
/// the shape of GCS V2 signed URLs, keyed with the configured private key.
/// Used with the in-memory backend and by any origin that verifies with
/// [`verify_signature`].
#[derive(Debug, Clone)]
pub struct LocalUrlSigner {
    base_url: String,
}

impl LocalUrlSigner {
    pub fn new(base_url: &str) -> Self {
        let base_url = if base_url.is_empty() {
            "http://localhost"
        } else {
            base_url.trim_end_matches('/')
        };
        Self {
            base_url: base_url.to_string(),
        }
    }
}

/// Canonical payload covered by the signature.
pub fn string_to_sign(method: &str, expires: i64, bucket: &str, key: &str) -> String {
    format!("{}\n{}\n/{}/{}", method, expires, bucket, key)
}

fn compute_signature(private_key: &[u8], payload: &str) -> Result<Vec<u8>, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(private_key).map_err(|e| SigningError::InvalidCredentials {
            reason: e.to_string(),
        })?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time check of a hex signature produced by [`LocalUrlSigner`].
pub fn verify_signature(
    private_key: &[u8],
    method: &str,
    expires: i64,
    bucket: &str,
    key: &str,
    signature_hex: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(private_key) else {
        return false;
    };
    mac.update(string_to_sign(method, expires, bucket, key).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

impl UrlSigner for LocalUrlSigner {
    async fn sign(
        &self,
        bucket: &str,
        key: &str,
        options: &SignOptions<'_>,
    ) -> Result<String, SigningError> {
        if options.access_id.is_empty() || options.private_key.is_empty() {
            return Err(SigningError::InvalidCredentials {
                reason: "access id and private key are required".to_string(),
            });
        }

        let expires = options.expires_at.timestamp();
        let payload = string_to_sign(options.method.as_str(), expires, bucket, key);
        let signature = hex::encode(compute_signature(options.private_key, &payload)?);

        Ok(format!(
            "{}/{}/{}?GoogleAccessId={}&Expires={}&Signature={}",
            self.base_url,
            utf8_percent_encode(bucket, PATH),
            utf8_percent_encode(key, PATH),
            utf8_percent_encode(options.access_id, QUERY_VALUE),
            expires,
            signature
        ))
    }
}
