pub mod local_signer;
pub mod memory;
pub mod retry;
#[cfg(feature = "s3")]
pub mod s3;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::core::error::{SigningError, StorageError};

/// Delimiter used for every listing: only objects at the prefix's own level.
pub const LIST_DELIMITER: &str = "/";

// ---------------------------------------------------------------------------
// ObjectLister trait
// ---------------------------------------------------------------------------

/// Paginated, delimiter-aware object listing.
///
/// One call returns one page. A page without `next_continuation` ends the
/// listing. A call may fail mid-way through a listing; callers restart from
/// the first page (see [`retry::RetryPolicy`]).
pub trait ObjectLister: Send + Sync {
    fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        continuation: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ObjectPage, StorageError>> + Send;
}

/// One object reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub bucket: String,
    pub name: String,
}

/// A single page of listing results.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ListedObject>,
    /// Token for the next page; `None` once the listing is done.
    pub next_continuation: Option<String>,
}

impl ObjectPage {
    pub fn is_last(&self) -> bool {
        self.next_continuation.is_none()
    }
}

// ---------------------------------------------------------------------------
// UrlSigner trait
// ---------------------------------------------------------------------------

/// Produces time-limited signed URLs for single objects.
pub trait UrlSigner: Send + Sync {
    /// Return an absolute signed URL for `bucket`/`key`.
    fn sign(
        &self,
        bucket: &str,
        key: &str,
        options: &SignOptions<'_>,
    ) -> impl std::future::Future<Output = Result<String, SigningError>> + Send;
}

/// Parameters for one signing call.
pub struct SignOptions<'a> {
    pub method: http::Method,
    pub access_id: &'a str,
    pub private_key: &'a [u8],
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for SignOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignOptions")
            .field("method", &self.method)
            .field("access_id", &self.access_id)
            .field("private_key", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
