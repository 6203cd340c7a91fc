use tracing::debug;

use crate::core::error::StorageError;
use crate::core::types::{Clip, ObjectLocator, Sequence};
use crate::storage::retry::RetryPolicy;
use crate::storage::{ObjectLister, LIST_DELIMITER};

use super::filter::{base_name, select_filter, FilterSet};

/// One full pagination pass over `prefix`.
///
/// Pages are followed until the lister reports no continuation. Every object
/// whose base filename passes `pattern` becomes a single-clip sequence, in
/// listing order. Any page error fails the whole pass.
async fn list_once<L: ObjectLister>(
    lister: &L,
    prefix: &str,
    pattern: &regex::Regex,
) -> Result<Vec<Sequence>, StorageError> {
    let mut sequences = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        let page = lister
            .list_page(prefix, LIST_DELIMITER, continuation.as_deref())
            .await?;
        for object in page.objects {
            if pattern.is_match(base_name(&object.name)) {
                sequences.push(Sequence::single(Clip::storage(ObjectLocator::new(
                    object.bucket,
                    object.name,
                ))));
            }
        }
        match page.next_continuation {
            Some(token) => continuation = Some(token),
            None => return Ok(sequences),
        }
    }
}

/// List one physical prefix with retry.
///
/// A failed pass is discarded entirely and the listing restarts from the first
/// page, so the result always comes from a single successful pass.
pub async fn expand_prefix<L: ObjectLister>(
    lister: &L,
    filters: &FilterSet,
    retry: &RetryPolicy,
    prefix: &str,
) -> Result<Vec<Sequence>, StorageError> {
    let (variant, prefix) = select_filter(prefix);
    let pattern = filters.pattern(variant);

    let sequences = retry
        .run("list_prefix", |_| list_once(lister, &prefix, pattern))
        .await?;

    debug!(
        prefix = %prefix,
        filter = variant.as_str(),
        matched = sequences.len(),
        "prefix listed"
    );
    Ok(sequences)
}
