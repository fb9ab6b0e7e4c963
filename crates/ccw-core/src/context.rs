// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Process-wide engine wiring

use crate::allocator::PaneAllocator;
use crate::ingest::IngestionPipeline;
use crate::service::IngestionService;
use crate::store::ExecutionStore;
use ccw_classifier::ClassificationCache;
use ccw_config::EngineConfig;
use ccw_domain_types::PaneLayout;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static GLOBAL: OnceCell<EngineContext> = OnceCell::new();

/// Store, pipeline, classifier memo and ingestion service for one process
pub struct EngineContext {
    config: EngineConfig,
    store: Arc<ExecutionStore>,
    classifier: Arc<ClassificationCache>,
    service: IngestionService,
}

impl EngineContext {
    /// A standalone context; tests and embedded uses build their own
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(ExecutionStore::new(&config.store));
        let pipeline = Arc::new(IngestionPipeline::new(Arc::clone(&store)));
        Self {
            classifier: Arc::new(ClassificationCache::new(config.classifier.cache_capacity)),
            service: IngestionService::new(pipeline, config.ingest.clone()),
            store,
            config,
        }
    }

    /// Install the process singleton. The first configuration wins.
    pub fn init_global(config: EngineConfig) -> &'static EngineContext {
        GLOBAL.get_or_init(|| EngineContext::new(config))
    }

    /// The process singleton, created with default configuration if needed
    pub fn global() -> &'static EngineContext {
        GLOBAL.get_or_init(|| EngineContext::new(EngineConfig::default()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        self.service.pipeline()
    }

    pub fn classifier(&self) -> &Arc<ClassificationCache> {
        &self.classifier
    }

    pub fn service(&self) -> &IngestionService {
        &self.service
    }

    /// Fresh layout with the configured number of panes, and its allocator
    pub fn default_layout(&self) -> (PaneLayout, PaneAllocator) {
        let layout = PaneLayout::with_panes(self.config.panes.count);
        let allocator = PaneAllocator::seeded(&layout);
        (layout, allocator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_shared() {
        let first = EngineContext::global();
        let second = EngineContext::global();
        assert!(std::ptr::eq(first, second));
        assert!(Arc::ptr_eq(first.store(), first.pipeline().store()));
    }

    #[test]
    fn test_default_layout_uses_configured_panes() {
        let mut config = EngineConfig::default();
        config.panes.count = 3;
        let (layout, allocator) = EngineContext::new(config).default_layout();
        assert_eq!(layout.panes.len(), 3);
        assert_eq!(allocator.assigned_count(), 0);
    }
}
