//! Daemon configuration: forwarder name (management prefix), content store
//! capacity, and the links to open at startup. TOML, via `serde` + `toml`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// The forwarder's name, doubling as its management name prefix
    /// (`ccnx:/local/<forwarder_name>`, spec.md §6).
    pub forwarder_name: String,

    /// Content Store capacity in megabytes (spec.md §4.5).
    #[serde(default = "default_content_store_capacity_mb")]
    pub content_store_capacity_mb: u64,

    /// Connection URIs to open at startup (spec.md §4.2).
    #[serde(default)]
    pub links: Vec<String>,
}

fn default_content_store_capacity_mb() -> u64 {
    16
}
