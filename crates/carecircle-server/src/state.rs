//! Shared application state.

use std::sync::Arc;

use carecircle_engine::{
    ApprovalGate, EngineConfig, JobRunner, PipelineOrchestrator, StageExecutor, Store,
    TaskLifecycle,
};

/// Shared application state: the store plus the engine components the
/// routes translate onto.
pub struct AppState {
    pub store: Arc<Store>,
    pub runner: Arc<JobRunner>,
    pub approval: ApprovalGate,
    pub lifecycle: TaskLifecycle,
}

impl AppState {
    /// Wire up the engine around a stage executor.
    pub fn new(executor: Arc<dyn StageExecutor>, config: EngineConfig) -> Arc<Self> {
        let store = Store::new();
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            store.clone(),
            executor,
            config,
        ));
        let runner = JobRunner::new(store.clone(), orchestrator);
        let approval = ApprovalGate::new(store.clone());
        let lifecycle = TaskLifecycle::new(store.clone());
        Arc::new(Self {
            store,
            runner,
            approval,
            lifecycle,
        })
    }
}
