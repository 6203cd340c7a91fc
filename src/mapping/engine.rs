use futures::future::try_join_all;
use tracing::{debug, info};

use crate::core::config::AppConfig;
use crate::core::error::{ConfigError, MapError, StorageError};
use crate::core::types::{Manifest, Sequence};
use crate::observability::metrics as obs;
use crate::storage::retry::RetryPolicy;
use crate::storage::{ObjectLister, UrlSigner};

use super::extra::append_extra_resources;
use super::filter::FilterSet;
use super::listing::expand_prefix;
use super::prefix::physical_prefixes;
use super::sign::{sign_manifest, SigningCredentials};

// ---------------------------------------------------------------------------
// MapEngine
// ---------------------------------------------------------------------------

/// Prefix-to-manifest mapping engine.
///
/// Holds only immutable configuration and its two collaborators, so one
/// instance is shared by all requests behind an `Arc`.
pub struct MapEngine<L, S> {
    lister: L,
    signer: S,
    filters: FilterSet,
    extra_prefixes: Vec<String>,
    extra_resources_param: Option<String>,
    signing: Option<SigningCredentials>,
    retry: RetryPolicy,
    parallel_listing: bool,
}

impl<L: ObjectLister, S: UrlSigner> MapEngine<L, S> {
    /// Compile filters and decode credentials from `config`.
    pub fn new(config: &AppConfig, lister: L, signer: S) -> Result<Self, ConfigError> {
        let mapping = &config.mapping;
        let extra_resources_param = if mapping.extra_resources_param.is_empty() {
            None
        } else {
            Some(mapping.extra_resources_param.clone())
        };
        let signing = SigningCredentials::from_config(&config.signer)?;

        info!(
            bucket = %mapping.bucket,
            extra_prefixes = ?mapping.extra_prefixes,
            signing_enabled = signing.is_some(),
            parallel_listing = mapping.parallel_listing,
            max_attempts = config.retry.max_attempts,
            "map engine configured"
        );

        Ok(Self {
            lister,
            signer,
            filters: FilterSet::from_config(mapping)?,
            extra_prefixes: mapping.extra_prefixes.clone(),
            extra_resources_param,
            signing,
            retry: RetryPolicy::from_config(&config.retry),
            parallel_listing: mapping.parallel_listing,
        })
    }

    /// Query parameter carrying extra resources, if injection is enabled.
    pub fn extra_resources_param(&self) -> Option<&str> {
        self.extra_resources_param.as_deref()
    }

    pub fn is_signing_enabled(&self) -> bool {
        self.signing.is_some()
    }

    pub fn lister(&self) -> &L {
        &self.lister
    }

    /// List every physical prefix for `prefix` and concatenate the matches in
    /// fan-out order. The first failure aborts the whole mapping.
    pub async fn map_prefix(&self, prefix: &str) -> Result<Manifest, StorageError> {
        let prefixes = physical_prefixes(prefix, &self.extra_prefixes);
        debug!(prefix, physical = ?prefixes, "expanding prefix");

        let groups: Vec<Vec<Sequence>> = if self.parallel_listing {
            try_join_all(
                prefixes
                    .iter()
                    .map(|p| expand_prefix(&self.lister, &self.filters, &self.retry, p)),
            )
            .await?
        } else {
            let mut groups = Vec::with_capacity(prefixes.len());
            for p in &prefixes {
                groups.push(expand_prefix(&self.lister, &self.filters, &self.retry, p).await?);
            }
            groups
        };

        Ok(Manifest::from_sequences(groups.into_iter().flatten().collect()))
    }

    /// Build the complete manifest for one request.
    ///
    /// `extra` is the raw value of the extra-resources parameter. Listing
    /// results come first, injected resources after them, and the signing
    /// stage runs last over the assembled manifest.
    pub async fn build_manifest(&self, prefix: &str, extra: Option<&str>) -> Result<Manifest, MapError> {
        if prefix.is_empty() {
            return Err(MapError::EmptyPrefix);
        }

        let mut manifest = self.map_prefix(prefix).await?;
        if self.extra_resources_param.is_some() {
            let added = append_extra_resources(&mut manifest, extra);
            if added > 0 {
                debug!(prefix, added, "extra resources appended");
            }
        }

        let signed = sign_manifest(&self.signer, self.signing.as_ref(), &manifest)
            .await
            .inspect_err(|_| obs::inc_signing_errors())?;
        Ok(signed)
    }
}
