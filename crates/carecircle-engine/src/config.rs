//! Engine configuration.

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum narrative length (characters) the intake stage accepts.
    pub min_narrative_len: usize,

    /// Whether to run the optional A4 optimization stage.
    pub run_optimization: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_narrative_len: 20,
            run_optimization: true,
        }
    }
}
