use serde::{Deserialize, Serialize};

/// Engine configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database path. Defaults to `~/.grantflow/data/grantflow.db`.
    #[serde(default)]
    pub database_path: Option<String>,

    /// Root directory for rendered proposals and milestone documents.
    pub artifact_root: String,

    /// Organization prefix baked into proposal codes, e.g. `GP`.
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,

    /// Wall-clock deadline for a single proposal render.
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// Sender address for notification email.
    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// Events pulled per queue-consumer batch.
    #[serde(default = "default_notification_batch_size")]
    pub notification_batch_size: usize,
}

fn default_code_prefix() -> String {
    "GP".to_string()
}

fn default_render_timeout_secs() -> u64 {
    30
}

fn default_mail_from() -> String {
    "noreply@grantflow.local".to_string()
}

fn default_notification_batch_size() -> usize {
    50
}
