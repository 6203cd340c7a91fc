use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::list_objects_v2::{ListObjectsV2Error, ListObjectsV2Output};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use chrono::Utc;
use tracing::debug;

use crate::core::config::StorageConfig;
use crate::core::error::{SigningError, StorageError};
use crate::core::redact::Redacted;

use super::{ListedObject, ObjectLister, ObjectPage, SignOptions, UrlSigner};

/// Error codes that fail the same way on every attempt.
const TERMINAL_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "NoSuchBucket",
    "AllAccessDisabled",
];

/// Longest expiry S3 accepts for a SigV4 presigned URL.
const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 3600);

fn base_config(config: &StorageConfig, credentials: Credentials) -> aws_sdk_s3::config::Builder {
    let timeouts = TimeoutConfig::builder()
        .operation_attempt_timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build();

    let mut builder = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .force_path_style(config.path_style)
        .timeout_config(timeouts);

    if !config.endpoint.is_empty() {
        builder = builder.endpoint_url(&config.endpoint);
    }
    builder
}

// ---------------------------------------------------------------------------
// S3ObjectStore
// ---------------------------------------------------------------------------

/// Listing backend wrapping `aws-sdk-s3`.
///
/// Supports AWS S3 and S3-compatible stores (MinIO, GCS interoperability
/// endpoint, etc.) via configurable endpoint and path-style addressing. The
/// client and its connection pool are built once and shared by all requests.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(config: &StorageConfig, bucket: &str) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            config.secret_access_key.expose(),
            None,
            None,
            "clipmap-storage",
        );
        let client = Client::from_conf(base_config(config, credentials).build());

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

/// Whether a service error will fail the same way on every attempt.
fn is_terminal(err: &ListObjectsV2Error) -> bool {
    err.is_no_such_bucket()
        || err
            .code()
            .map(|code| TERMINAL_ERROR_CODES.contains(&code))
            .unwrap_or(false)
}

/// Classify an SDK error; credential and bucket problems are terminal.
fn list_error(prefix: &str, err: SdkError<ListObjectsV2Error>) -> StorageError {
    let reason = DisplayErrorContext(&err).to_string();
    let terminal = err.as_service_error().map(is_terminal).unwrap_or(false);

    if terminal {
        StorageError::terminal(prefix, reason)
    } else {
        StorageError::transient(prefix, reason)
    }
}

/// Convert one `ListObjectsV2` response into a page of objects.
///
/// Common prefixes are sub-"directories", not objects. A continuation token
/// is only followed while the response is truncated.
fn page_from_output(bucket: &str, output: &ListObjectsV2Output) -> ObjectPage {
    let objects = output
        .contents()
        .iter()
        .filter_map(|obj| obj.key())
        .map(|key| ListedObject {
            bucket: bucket.to_string(),
            name: key.to_string(),
        })
        .collect();

    let next_continuation = if output.is_truncated().unwrap_or(false) {
        output.next_continuation_token().map(str::to_string)
    } else {
        None
    };

    ObjectPage {
        objects,
        next_continuation,
    }
}

impl ObjectLister for S3ObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .delimiter(delimiter);

        if let Some(token) = continuation {
            req = req.continuation_token(token);
        }

        let output = req.send().await.map_err(|e| list_error(prefix, e))?;
        Ok(page_from_output(&self.bucket, &output))
    }
}

// ---------------------------------------------------------------------------
// S3UrlSigner
// ---------------------------------------------------------------------------

/// SigV4 presigned GET URLs.
///
/// The access id and private key from [`SignOptions`] are used as the access
/// key id and secret access key. Presigning is local; no request is sent.
///
/// The signing client always uses path-style addressing so the returned
/// request URI is `/{bucket}/{key}?...`, the same shape as unsigned clips.
/// One client is kept per credential pair and rebuilt only when the pair
/// changes.
pub struct S3UrlSigner {
    storage: StorageConfig,
    client: Mutex<Option<SigningClient>>,
}

struct SigningClient {
    access_id: String,
    secret: Redacted<String>,
    client: Client,
}

impl S3UrlSigner {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            storage: config.clone(),
            client: Mutex::new(None),
        }
    }

    fn signing_client(&self, access_id: &str, secret: &str) -> Client {
        let mut cached = self.client.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = cached.as_ref() {
            if entry.access_id == access_id && entry.secret.expose() == secret {
                return entry.client.clone();
            }
        }

        let credentials = Credentials::new(access_id, secret, None, None, "clipmap-signer");
        let client = Client::from_conf(
            base_config(&self.storage, credentials)
                .force_path_style(true)
                .build(),
        );
        debug!(access_id, "built presigning client");
        *cached = Some(SigningClient {
            access_id: access_id.to_string(),
            secret: Redacted::new(secret.to_string()),
            client: client.clone(),
        });
        client
    }
}

impl UrlSigner for S3UrlSigner {
    async fn sign(
        &self,
        bucket: &str,
        key: &str,
        options: &SignOptions<'_>,
    ) -> Result<String, SigningError> {
        if options.method != http::Method::GET {
            return Err(SigningError::SignFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: format!("unsupported method {}", options.method),
            });
        }

        let secret = std::str::from_utf8(options.private_key).map_err(|e| {
            SigningError::InvalidCredentials {
                reason: format!("secret access key is not UTF-8: {}", e),
            }
        })?;
        if options.access_id.is_empty() || secret.is_empty() {
            return Err(SigningError::InvalidCredentials {
                reason: "access id and private key are required".to_string(),
            });
        }

        let expires_in = (options.expires_at - Utc::now())
            .to_std()
            .map_err(|_| SigningError::SignFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "expiration is in the past".to_string(),
            })?
            .min(MAX_PRESIGN_EXPIRY);

        let presigning = PresigningConfig::builder()
            .start_time(SystemTime::now())
            .expires_in(expires_in)
            .build()
            .map_err(|e| SigningError::SignFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let request = self
            .signing_client(options.access_id, secret)
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| SigningError::SignFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket, key, expires_in_secs = expires_in.as_secs(), "presigned object URL");
        Ok(request.uri().to_string())
    }
}
