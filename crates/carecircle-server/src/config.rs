//! Server configuration.

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address.
    pub bind_addr: String,

    /// External agent command invoked once per pipeline stage.
    pub agent_command: String,

    /// Whether to run the optional optimization stage.
    pub run_optimization: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            agent_command: "carecircle-agent".to_string(),
            run_optimization: true,
        }
    }
}
