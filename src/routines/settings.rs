use config::Config as eConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Run configuration, read from a TOML file with `ODECAL_`-prefixed
/// environment overrides
#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Settings {
    pub paths: Paths,
    #[serde(default)]
    pub sampler: SamplerSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
    #[serde(default)]
    pub log: Log,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Paths {
    /// Input datafile
    pub data: String,
    /// Output folder; `None` disables file output
    pub output: Option<String>,
}

/// How chains pick their starting points
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Initializer {
    /// Independent draws from the priors
    Prior,
    /// A Sobol sequence over the priors' central intervals, giving
    /// overdispersed, deterministic starts
    Sobol,
    /// Explicit start vectors, one per chain, in flattened parameter order
    Fixed(Vec<Vec<f64>>),
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct SamplerSettings {
    #[serde(default = "default_chains")]
    pub chains: usize,
    #[serde(default = "default_1k")]
    pub warmup: usize,
    #[serde(default = "default_1k")]
    pub draws: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_initializer")]
    pub initializer: Initializer,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        SamplerSettings {
            chains: default_chains(),
            warmup: default_1k(),
            draws: default_1k(),
            seed: default_seed(),
            initializer: default_initializer(),
        }
    }
}

impl SamplerSettings {
    /// Basic sanity checks before a run starts
    pub fn validate(&self) -> Result<()> {
        if self.chains == 0 {
            return Err(Error::validation("sampler requires at least one chain"));
        }
        if self.draws == 0 {
            return Err(Error::validation(
                "sampler requires at least one post-warmup draw per chain",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct DiagnosticsSettings {
    /// Convergence threshold on the potential-scale-reduction statistic;
    /// conventional values lie in 1.01 - 1.1
    #[serde(default = "default_rhat")]
    pub rhat_threshold: f64,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        DiagnosticsSettings {
            rhat_threshold: default_rhat(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file name inside the output folder, if any
    pub file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: default_log_level(),
            file: None,
        }
    }
}

pub fn read_settings(path: &str) -> Result<Settings> {
    let parsed = eConfig::builder()
        .add_source(config::File::with_name(path).format(config::FileFormat::Toml))
        .add_source(config::Environment::with_prefix("ODECAL").separator("_"))
        .build()
        .map_err(|e| Error::Parse(format!("cannot read settings '{}': {}", path, e)))?;

    let settings: Settings = parsed
        .try_deserialize()
        .map_err(|e| Error::Parse(format!("cannot parse settings '{}': {}", path, e)))?;

    settings.sampler.validate()?;
    Ok(settings)
}

// *********************************
// Default values for deserializing
// *********************************
fn default_chains() -> usize {
    4
}

fn default_1k() -> usize {
    1_000
}

fn default_seed() -> u64 {
    347
}

fn default_initializer() -> Initializer {
    Initializer::Prior
}

fn default_rhat() -> f64 {
    1.05
}

fn default_log_level() -> String {
    "info".to_string()
}
