use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use varlens_variant_data::provider::{
    KNOWN_SOURCES, SOURCE_ENSEMBL_VARIATION, SOURCE_ENSEMBL_VEP, SOURCE_EQTL_CATALOGUE,
    SOURCE_GNOMAD, SOURCE_GTEX, SOURCE_GWAS_CATALOG, SOURCE_MYVARIANT, SOURCE_UNIPROT_DOMAINS,
};
use varlens_variant_data::{
    AdapterOutput, AnnotationKind, CacheStore, EnsemblVariationAdapter, EqtlCatalogueAdapter,
    FetchClient, GnomadAdapter, GtexAdapter, GwasCatalogAdapter, HttpTransport, IdentityLookup,
    LocusResolver, MyVariantAdapter, NormalizedVariantRecord, ReqwestTransport, SourceAdapter,
    SqliteCacheStore, UniprotDomainAdapter, VariantIdentityResolver, VepAdapter,
};

use super::run_report::RunReport;
use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::integration::{IntegrationEngine, SourceReport};

/// One gene in, one integrated table out.
///
/// The pipeline builds a fresh [`FetchClient`] per run, so rate limiter and
/// circuit breaker state live exactly as long as the run. The cache store is
/// the only state that outlives it.
pub struct Pipeline {
    config: PipelineConfig,
    transport: Arc<dyn HttpTransport>,
    cache: Option<Arc<dyn CacheStore>>,
    lookup: Option<Arc<dyn IdentityLookup>>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new(&config.acquisition.user_agent));
        Self {
            config,
            transport,
            cache: None,
            lookup: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Use this store instead of opening the configured cache directory.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve accessions with this lookup instead of the Variant Recoder.
    pub fn with_identity_lookup(mut self, lookup: Arc<dyn IdentityLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Adapters for the enabled sources, in a fixed order.
    pub fn adapters(&self) -> Vec<Arc<dyn SourceAdapter>> {
        KNOWN_SOURCES
            .iter()
            .filter(|source| self.config.is_enabled(source))
            .filter_map(|source| -> Option<Arc<dyn SourceAdapter>> {
                let adapter: Arc<dyn SourceAdapter> = match *source {
                    SOURCE_ENSEMBL_VARIATION => Arc::new(EnsemblVariationAdapter::new()),
                    SOURCE_GNOMAD => Arc::new(GnomadAdapter::new(self.config.gnomad_dataset.clone())),
                    SOURCE_MYVARIANT => Arc::new(MyVariantAdapter::new()),
                    SOURCE_GTEX => Arc::new(GtexAdapter::new(self.config.gtex_tissues.clone())),
                    SOURCE_EQTL_CATALOGUE => Arc::new(EqtlCatalogueAdapter::new()),
                    SOURCE_GWAS_CATALOG => Arc::new(GwasCatalogAdapter::new()),
                    SOURCE_ENSEMBL_VEP => Arc::new(VepAdapter::new()),
                    SOURCE_UNIPROT_DOMAINS => Arc::new(UniprotDomainAdapter::new()),
                    _ => return None,
                };
                Some(adapter)
            })
            .collect()
    }

    fn build_client(&self) -> FetchClient {
        let client = FetchClient::new(self.config.acquisition.clone(), self.transport.clone())
            .with_cancellation(self.cancel.clone())
            .with_refresh(self.config.refresh);

        match self.open_cache() {
            Some(cache) => client.with_cache(cache),
            None => client,
        }
    }

    fn open_cache(&self) -> Option<Arc<dyn CacheStore>> {
        if let Some(cache) = &self.cache {
            return Some(cache.clone());
        }
        let settings = &self.config.acquisition.cache;
        if !settings.enabled {
            info!("response cache disabled");
            return None;
        }
        match SqliteCacheStore::open_dir(&settings.directory) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(
                    directory = %settings.directory.display(),
                    error = %e,
                    "response cache unavailable, fetching directly"
                );
                None
            }
        }
    }

    fn spawn_watchdog(&self) -> Option<JoinHandle<()>> {
        let timeout = self.config.run_timeout()?;
        let token = self.cancel.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(
                timeout_secs = timeout.as_secs(),
                "run timeout reached, cancelling outstanding requests"
            );
            token.cancel();
        }))
    }

    /// Run the whole pipeline for one gene symbol.
    ///
    /// Only locus resolution failure, an empty integration input or an
    /// invalid configuration fail the run. Everything else ends up as gaps,
    /// unresolved rows or coverage annotations in the report.
    pub async fn run(&self, gene_symbol: &str) -> Result<RunReport> {
        self.config.validate()?;
        let watchdog = self.spawn_watchdog();
        let result = self.execute(gene_symbol).await;
        if let Some(handle) = watchdog {
            handle.abort();
        }
        result
    }

    async fn execute(&self, gene_symbol: &str) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let client = self.build_client();
        info!(%run_id, gene = gene_symbol, "run started");

        let locus = LocusResolver::new(self.config.assembly)
            .resolve(&client, gene_symbol)
            .await?;

        let adapters = self.adapters();
        info!(
            %run_id,
            region = %locus.region(),
            adapters = adapters.len(),
            workers = self.config.worker_pool_size,
            "running source adapters"
        );

        let mut outputs: Vec<(AnnotationKind, AdapterOutput)> = stream::iter(adapters.iter())
            .map(|adapter| {
                let client = &client;
                let locus = &locus;
                async move {
                    let output = adapter.fetch_for_locus(client, locus).await;
                    client.discard(&output.unusable);
                    info!(
                        source = adapter.id(),
                        records = output.records.len(),
                        gaps = output.gaps.len(),
                        cancelled = output.cancelled,
                        "adapter finished"
                    );
                    (adapter.kind(), output)
                }
            })
            .buffer_unordered(self.config.worker_pool_size.max(1))
            .collect()
            .await;
        outputs.sort_by(|a, b| a.1.source.cmp(&b.1.source));

        let source_reports: Vec<SourceReport> = outputs
            .iter()
            .map(|(kind, output)| SourceReport::from_output(output, *kind))
            .collect();
        let mut gaps = Vec::new();
        let mut records: Vec<NormalizedVariantRecord> = Vec::new();
        for (_, output) in outputs {
            gaps.extend(output.gaps);
            records.extend(output.records);
        }
        records.sort_by_cached_key(NormalizedVariantRecord::sort_key);

        let resolver = match &self.lookup {
            Some(lookup) => VariantIdentityResolver::new(self.config.assembly, lookup.clone()),
            None => VariantIdentityResolver::ensembl(self.config.assembly),
        };
        let resolved = resolver
            .resolve_records(&client, records, self.config.resolver_concurrency)
            .await;

        let engine = IntegrationEngine::new(
            self.config.thresholds.clone(),
            self.config.authority_ranks.clone(),
        );
        let integration = engine.integrate(&resolved, &source_reports)?;

        let cancelled = client.is_cancelled();
        if cancelled {
            warn!(%run_id, gaps = gaps.len(), "run cancelled; results are partial");
        }
        let finished_at = Utc::now();
        info!(
            %run_id,
            variants = integration.records.len(),
            gaps = gaps.len(),
            network_calls = client.total_network_calls(),
            "run finished"
        );

        Ok(RunReport {
            run_id,
            gene_symbol: gene_symbol.to_string(),
            locus,
            started_at,
            finished_at,
            cancelled,
            integration,
            source_reports,
            gaps,
            fetch_stats: client.stats(),
            identity_lookups: resolver.lookups(),
            distinct_descriptors: resolver.memoized(),
            circuits: client.circuit_breaker().metrics(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapters_follow_enabled_sources() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let ids: Vec<&str> = pipeline.adapters().iter().map(|a| a.id()).collect();
        assert_eq!(ids, KNOWN_SOURCES.to_vec());

        let config = PipelineConfig {
            enabled_sources: vec!["gtex".to_string(), "GNOMAD".to_string()],
            ..Default::default()
        };
        let ids: Vec<&str> = Pipeline::new(config)
            .adapters()
            .iter()
            .map(|a| a.id())
            .collect();
        assert_eq!(ids, vec!["GNOMAD", "GTEX"]);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_request() {
        let config = PipelineConfig {
            worker_pool_size: 0,
            ..Default::default()
        };
        let result = Pipeline::new(config).run("SESN2").await;
        assert!(matches!(
            result,
            Err(crate::errors::IntegrationError::Config(_))
        ));
    }
}
