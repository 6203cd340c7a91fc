use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tracing::trace;

use crate::core::config::SignerConfig;
use crate::core::error::{ConfigError, SigningError};
use crate::core::redact::{redact_signed_path, Redacted};
use crate::core::types::{Clip, ClipSource, Manifest, Sequence};
use crate::storage::{SignOptions, UrlSigner};

// ---------------------------------------------------------------------------
// Signing credentials
// ---------------------------------------------------------------------------

/// Decoded signer credentials. Present only when signing is enabled.
#[derive(Debug, Clone)]
pub struct SigningCredentials {
    pub access_id: String,
    pub private_key: Redacted<Vec<u8>>,
    pub expiration: Duration,
}

impl SigningCredentials {
    /// `Ok(None)` when the access id or the private key is missing.
    pub fn from_config(config: &SignerConfig) -> Result<Option<Self>, ConfigError> {
        if config.access_id.is_empty() {
            return Ok(None);
        }
        let Some(private_key) = config.decoded_private_key()? else {
            return Ok(None);
        };
        Ok(Some(Self {
            access_id: config.access_id.clone(),
            private_key: Redacted::new(private_key),
            expiration: config.expiration(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Signing stage
// ---------------------------------------------------------------------------

/// Path and query of an absolute URL, e.g. `/bucket/key?Expires=..`.
///
/// The URL is only parsed to validate it. The path is taken verbatim from
/// the signed string, so dot segments and backslashes in object keys are
/// not normalized away from what the signature covers.
pub fn request_uri(signed_url: &str) -> Result<String, SigningError> {
    let invalid = |reason: &str| SigningError::InvalidUrl {
        url: redact_signed_path(signed_url),
        reason: reason.to_string(),
    };

    let url = url::Url::parse(signed_url).map_err(|e| invalid(&e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("not a hierarchical URL"));
    }

    let Some((_, after_scheme)) = signed_url.split_once("://") else {
        return Err(invalid("missing authority"));
    };
    let rest = match after_scheme.find(['/', '?', '#']) {
        Some(start) => &after_scheme[start..],
        None => "",
    };
    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);

    Ok(if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    })
}

/// Replace every storage clip with the request URI of its signed URL.
///
/// Returns a new manifest; the input is never modified. Opaque clips pass
/// through untouched. Without credentials the manifest comes back unchanged.
/// The expiry is computed per clip at the moment it is signed.
pub async fn sign_manifest<S: UrlSigner>(
    signer: &S,
    credentials: Option<&SigningCredentials>,
    manifest: &Manifest,
) -> Result<Manifest, SigningError> {
    let Some(credentials) = credentials else {
        return Ok(manifest.clone());
    };

    let ttl = TimeDelta::from_std(credentials.expiration).map_err(|e| {
        SigningError::InvalidCredentials {
            reason: format!("expiration out of range: {}", e),
        }
    })?;

    let mut sequences = Vec::with_capacity(manifest.len());
    for sequence in &manifest.sequences {
        let mut clips = Vec::with_capacity(sequence.clips.len());
        for clip in &sequence.clips {
            let signed = match &clip.source {
                ClipSource::Storage(locator) => {
                    let expires_at = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
                        SigningError::InvalidCredentials {
                            reason: "expiration out of range".to_string(),
                        }
                    })?;
                    let options = SignOptions {
                        method: http::Method::GET,
                        access_id: &credentials.access_id,
                        private_key: credentials.private_key.expose(),
                        expires_at,
                    };
                    let url = signer.sign(&locator.bucket, &locator.key, &options).await?;
                    let uri = request_uri(&url)?;
                    trace!(locator = %locator, signed = %redact_signed_path(&uri), "clip signed");
                    Clip {
                        clip_type: clip.clip_type,
                        source: ClipSource::Opaque(uri),
                    }
                }
                ClipSource::Opaque(_) => clip.clone(),
            };
            clips.push(signed);
        }
        sequences.push(Sequence { clips });
    }
    Ok(Manifest::from_sequences(sequences))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ObjectLocator;
    use crate::storage::local_signer::LocalUrlSigner;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn credentials() -> SigningCredentials {
        SigningCredentials {
            access_id: "svc@proj".to_string(),
            private_key: Redacted::new(b"secret!".to_vec()),
            expiration: Duration::from_secs(20 * 60),
        }
    }

    fn mixed_manifest() -> Manifest {
        let mut manifest = Manifest::new();
        manifest.push(Sequence::single(Clip::storage(ObjectLocator::new(
            "media",
            "videos/asset/720p.mp4",
        ))));
        manifest.push(Sequence::single(Clip::opaque("/cdn/intro.mp4")));
        manifest
    }

    /// Fails on the n-th call.
    struct FailingSigner {
        fail_on: u32,
        calls: AtomicU32,
    }

    impl UrlSigner for FailingSigner {
        async fn sign(
            &self,
            bucket: &str,
            key: &str,
            _options: &SignOptions<'_>,
        ) -> Result<String, SigningError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(SigningError::SignFailed {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason: "backend unavailable".to_string(),
                });
            }
            Ok(format!("https://storage.example.com/{bucket}/{key}?sig={call}"))
        }
    }

    #[tokio::test]
    async fn test_disabled_signing_is_identity() {
        let manifest = mixed_manifest();
        let signed = sign_manifest(&LocalUrlSigner::new(""), None, &manifest)
            .await
            .unwrap();
        assert_eq!(signed, manifest);
    }

    #[tokio::test]
    async fn test_signs_storage_clips_only() {
        let manifest = mixed_manifest();
        let creds = credentials();
        let signed = sign_manifest(&LocalUrlSigner::new("https://cdn.example.com"), Some(&creds), &manifest)
            .await
            .unwrap();

        let paths = signed.paths();
        assert!(paths[0].starts_with("/media/videos/asset/720p.mp4?GoogleAccessId=svc%40proj&Expires="));
        assert!(paths[0].contains("&Signature="));
        assert!(!paths[0].contains("cdn.example.com"));
        assert_eq!(paths[1], "/cdn/intro.mp4");

        // The input manifest is untouched.
        assert_eq!(manifest.paths()[0], "/media/videos/asset/720p.mp4");
    }

    #[tokio::test]
    async fn test_expiry_is_in_the_future() {
        let creds = credentials();
        let before = Utc::now().timestamp();
        let signed = sign_manifest(&LocalUrlSigner::new(""), Some(&creds), &mixed_manifest())
            .await
            .unwrap();

        let path = &signed.paths()[0];
        let expires: i64 = path
            .split("Expires=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap()
            .parse()
            .unwrap();
        assert!(expires >= before + 20 * 60);
        assert!(expires <= Utc::now().timestamp() + 20 * 60);
    }

    #[tokio::test]
    async fn test_any_failure_aborts() {
        let mut manifest = mixed_manifest();
        manifest.push(Sequence::single(Clip::storage(ObjectLocator::new("media", "b.mp4"))));
        let signer = FailingSigner {
            fail_on: 2,
            calls: AtomicU32::new(0),
        };

        let err = sign_manifest(&signer, Some(&credentials()), &manifest)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::SignFailed { .. }));
        assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_request_uri() {
        assert_eq!(
            request_uri("https://h.example.com/media/a%20b.mp4?X-Amz-Expires=60&X-Amz-Signature=ff").unwrap(),
            "/media/a%20b.mp4?X-Amz-Expires=60&X-Amz-Signature=ff"
        );
        assert_eq!(request_uri("http://localhost/media/a.mp4").unwrap(), "/media/a.mp4");
        assert_eq!(request_uri("http://localhost?sig=1#frag").unwrap(), "/?sig=1");
        assert_eq!(request_uri("http://localhost:9000").unwrap(), "/");
        assert!(matches!(
            request_uri("not a url"),
            Err(SigningError::InvalidUrl { .. })
        ));
        assert!(request_uri("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_request_uri_keeps_dot_segments_and_backslashes() {
        assert_eq!(
            request_uri("http://localhost/media/a/../b.mp4?Signature=ff").unwrap(),
            "/media/a/../b.mp4?Signature=ff"
        );
        assert_eq!(
            request_uri("http://localhost/media/./x\\y.mp4").unwrap(),
            "/media/./x\\y.mp4"
        );
    }

    #[tokio::test]
    async fn test_dot_segment_key_signature_still_verifies() {
        let mut manifest = Manifest::new();
        manifest.push(Sequence::single(Clip::storage(ObjectLocator::new(
            "media",
            "videos/a/../b.mp4",
        ))));
        let signed = sign_manifest(&LocalUrlSigner::new("http://localhost"), Some(&credentials()), &manifest)
            .await
            .unwrap();

        let path = &signed.paths()[0];
        assert!(path.starts_with("/media/videos/a/../b.mp4?"), "{path}");
        let signature = path.rsplit("Signature=").next().unwrap();
        let expires: i64 = path
            .split("Expires=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap()
            .parse()
            .unwrap();
        assert!(crate::storage::local_signer::verify_signature(
            b"secret!",
            "GET",
            expires,
            "media",
            "videos/a/../b.mp4",
            signature
        ));
    }

    #[test]
    fn test_credentials_from_config() {
        let mut config = SignerConfig::default();
        assert!(SigningCredentials::from_config(&config).unwrap().is_none());

        config.access_id = "svc".to_string();
        assert!(SigningCredentials::from_config(&config).unwrap().is_none());

        config.private_key = Redacted::new("c2VjcmV0IQ==".to_string());
        let creds = SigningCredentials::from_config(&config).unwrap().unwrap();
        assert_eq!(creds.private_key.expose(), &b"secret!".to_vec());
        assert_eq!(creds.expiration, Duration::from_secs(1200));

        config.private_key = Redacted::new("***".to_string());
        assert!(SigningCredentials::from_config(&config).is_err());
    }
}
