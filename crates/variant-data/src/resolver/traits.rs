use async_trait::async_trait;

use crate::errors::VariantDataError;
use crate::models::{Assembly, GenomicPosition};
use crate::registry::FetchClient;

/// Maps an accession or nomenclature string to the position tuples it
/// denotes.
///
/// An unknown descriptor is `Ok(vec![])`; `Err` means the lookup itself
/// could not be completed.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn candidates(
        &self,
        client: &FetchClient,
        descriptor: &str,
        assembly: Assembly,
    ) -> Result<Vec<GenomicPosition>, VariantDataError>;
}
