use serde::{Deserialize, Serialize};

/// A running dyno, as listed by `GET /apps/{app}/dynos`.
#[derive(Debug, Clone, Deserialize)]
pub struct Dyno {
    pub name: String,
    /// Process type from the Procfile, e.g. `web` or `run_all`.
    #[serde(rename = "type")]
    pub process_type: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Body for `PATCH /apps/{app}/formation/{type}`.
#[derive(Debug, Clone, Serialize)]
pub struct FormationUpdate {
    pub quantity: usize,
}

/// Formation as returned after an update.
#[derive(Debug, Clone, Deserialize)]
pub struct Formation {
    #[serde(rename = "type")]
    pub process_type: String,
    pub quantity: usize,
}

/// Count dynos of one process type. An unknown type simply has no dynos.
pub fn count_of_type(dynos: &[Dyno], process_type: &str) -> usize {
    dynos.iter().filter(|d| d.process_type == process_type).count()
}
