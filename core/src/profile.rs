//! Named profiles and layered configuration resolution
//!
//! A [`Configuration`] is assembled from up to five layers, lowest priority first:
//!
//! 1. the built-in defaults of a named [`Profile`]
//! 2. a discovered profile definition (`<search dir>/<name>.json`)
//! 3. an optional external JSON file
//! 4. `STREAMBENCH_*` environment variables
//! 5. explicit command overrides
//!
//! Every layer is a [`ProfileOverrides`] value; only the fields it sets replace the
//! layer below. The merged result is validated before it is returned.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{BatchConfig, Compression, Configuration, ExportConfig, SubscriptionType};
use crate::error::{BenchError, BenchResult};

/// Prefix of the environment variables read by [`ProfileResolver::env`]
pub const ENV_PREFIX: &str = "STREAMBENCH_";

/// Built-in workload profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Moderate concurrency, rate and batching
    #[default]
    Balanced,
    /// Single worker, no batching, small queues
    LowLatency,
    /// Many workers, large batches, unbounded rate
    HighThroughput,
    /// Moderate rate limit with burst-friendly batching
    Burst,
    /// Unbounded duration with metrics export enabled
    Sustained,
}

impl Profile {
    /// All built-in profiles
    pub const ALL: [Profile; 5] = [
        Profile::Balanced,
        Profile::LowLatency,
        Profile::HighThroughput,
        Profile::Burst,
        Profile::Sustained,
    ];

    /// Profile name as accepted on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Balanced => "balanced",
            Profile::LowLatency => "low-latency",
            Profile::HighThroughput => "high-throughput",
            Profile::Burst => "burst",
            Profile::Sustained => "sustained",
        }
    }

    /// One-line summary of the profile's intent
    pub fn description(&self) -> &'static str {
        match self {
            Profile::Balanced => "general purpose defaults",
            Profile::LowLatency => "minimize per-message latency: one worker, no batching",
            Profile::HighThroughput => "maximize throughput: many workers, large batches, no rate cap",
            Profile::Burst => "rate-capped traffic with burst-friendly batching",
            Profile::Sustained => "long-running soak test with metrics export",
        }
    }

    /// Built-in defaults for this profile
    pub fn defaults(&self) -> Configuration {
        let balanced = Configuration {
            workers: 4,
            rate: 1_000,
            total_operations: 0,
            payload_size: 1024,
            batching: BatchConfig::new(100, Duration::from_millis(10)),
            compression: Compression::None,
            subscription: SubscriptionType::Exclusive,
            queue_size: 1_000,
            duration: Duration::from_secs(60),
            warmup: Duration::from_secs(5),
            metrics_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            export: ExportConfig::default(),
        };

        match self {
            Profile::Balanced => balanced,
            Profile::LowLatency => Configuration {
                workers: 1,
                rate: 0,
                payload_size: 256,
                batching: BatchConfig::disabled(),
                queue_size: 10,
                ..balanced
            },
            Profile::HighThroughput => Configuration {
                workers: 32,
                rate: 0,
                batching: BatchConfig::new(1_000, Duration::from_millis(50)),
                compression: Compression::Lz4,
                subscription: SubscriptionType::Shared,
                queue_size: 10_000,
                ..balanced
            },
            Profile::Burst => Configuration {
                workers: 8,
                rate: 5_000,
                batching: BatchConfig::new(500, Duration::from_millis(5)),
                queue_size: 5_000,
                duration: Duration::from_secs(120),
                ..balanced
            },
            Profile::Sustained => Configuration {
                duration: Duration::ZERO,
                warmup: Duration::from_secs(30),
                metrics_interval: Duration::from_secs(5),
                export: ExportConfig {
                    enabled: true,
                    path: Some(PathBuf::from("streambench-metrics.jsonl")),
                },
                ..balanced
            },
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "default" => Ok(Profile::Balanced),
            other => Profile::ALL
                .into_iter()
                .find(|p| p.name() == other)
                .ok_or_else(|| BenchError::UnknownProfile(s.to_string())),
        }
    }
}

/// A sparse set of configuration values
///
/// Used for profile definitions, the external file, environment variables and
/// command-line overrides alike. Codec and subscription names stay strings here so
/// that an unrecognized value is reported against its field during [`apply`](Self::apply).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverrides {
    /// Free-form note carried by profile definition files
    #[serde(default, skip_serializing)]
    pub description: Option<String>,
    /// Worker count
    pub workers: Option<usize>,
    /// Target operations per second
    pub rate: Option<u64>,
    /// Total operations across all workers
    pub total_operations: Option<u64>,
    /// Payload size in bytes
    pub payload_size: Option<usize>,
    /// Enable producer batching
    pub batching_enabled: Option<bool>,
    /// Messages per batch
    pub batch_max_messages: Option<u32>,
    /// Batch linger in milliseconds
    pub batch_max_delay_ms: Option<u64>,
    /// Codec name
    pub compression: Option<String>,
    /// Subscription mode name
    pub subscription: Option<String>,
    /// Queue / backlog size
    pub queue_size: Option<usize>,
    /// Test duration in seconds
    pub duration_secs: Option<u64>,
    /// Warm-up in seconds
    pub warmup_secs: Option<u64>,
    /// Snapshot interval in milliseconds
    pub metrics_interval_ms: Option<u64>,
    /// Stop grace period in milliseconds
    pub shutdown_timeout_ms: Option<u64>,
    /// Enable snapshot export
    pub export_enabled: Option<bool>,
    /// Export destination
    pub export_path: Option<PathBuf>,
}

impl ProfileOverrides {
    /// Load overrides from a JSON file
    pub fn from_file(path: &Path) -> BenchResult<Self> {
        let source_err = |reason: String| BenchError::ProfileSource {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| source_err(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| source_err(e.to_string()))
    }

    /// Collect overrides from `STREAMBENCH_*` variables
    ///
    /// Variables without the prefix are ignored; unknown prefixed names are logged and
    /// skipped. A value that does not parse is a configuration error for its field.
    pub fn from_env<I, K, V>(vars: I) -> BenchResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::default();
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "WORKERS" => overrides.workers = Some(parse_env("workers", value)?),
                "RATE" => overrides.rate = Some(parse_env("rate", value)?),
                "TOTAL_OPERATIONS" => {
                    overrides.total_operations = Some(parse_env("total_operations", value)?)
                }
                "PAYLOAD_SIZE" => overrides.payload_size = Some(parse_env("payload_size", value)?),
                "BATCHING_ENABLED" => {
                    overrides.batching_enabled = Some(parse_bool("batching.enabled", value)?)
                }
                "BATCH_MAX_MESSAGES" => {
                    overrides.batch_max_messages =
                        Some(parse_env("batching.max_messages", value)?)
                }
                "BATCH_MAX_DELAY_MS" => {
                    overrides.batch_max_delay_ms = Some(parse_env("batching.max_delay", value)?)
                }
                "COMPRESSION" => overrides.compression = Some(value.to_string()),
                "SUBSCRIPTION" => overrides.subscription = Some(value.to_string()),
                "QUEUE_SIZE" => overrides.queue_size = Some(parse_env("queue_size", value)?),
                "DURATION_SECS" => overrides.duration_secs = Some(parse_env("duration", value)?),
                "WARMUP_SECS" => overrides.warmup_secs = Some(parse_env("warmup", value)?),
                "METRICS_INTERVAL_MS" => {
                    overrides.metrics_interval_ms = Some(parse_env("metrics_interval", value)?)
                }
                "SHUTDOWN_TIMEOUT_MS" => {
                    overrides.shutdown_timeout_ms = Some(parse_env("shutdown_timeout", value)?)
                }
                "EXPORT_ENABLED" => {
                    overrides.export_enabled = Some(parse_bool("export.enabled", value)?)
                }
                "EXPORT_PATH" => overrides.export_path = Some(PathBuf::from(value)),
                // Consumed by the binary, not by configuration
                "PROFILE" | "PROFILE_DIR" | "LOG" => {}
                other => tracing::warn!(variable = %format!("{ENV_PREFIX}{other}"), "Ignoring unknown environment override"),
            }
        }
        Ok(overrides)
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        Self {
            description: None,
            ..self.clone()
        } == Self::default()
    }

    /// Apply the set fields on top of `config`
    pub fn apply(&self, config: &mut Configuration) -> BenchResult<()> {
        if let Some(v) = self.workers {
            config.workers = v;
        }
        if let Some(v) = self.rate {
            config.rate = v;
        }
        if let Some(v) = self.total_operations {
            config.total_operations = v;
        }
        if let Some(v) = self.payload_size {
            config.payload_size = v;
        }
        if let Some(v) = self.batching_enabled {
            config.batching.enabled = v;
        }
        if let Some(v) = self.batch_max_messages {
            config.batching.max_messages = v;
        }
        if let Some(v) = self.batch_max_delay_ms {
            config.batching.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = &self.compression {
            config.compression = v.parse()?;
        }
        if let Some(v) = &self.subscription {
            config.subscription = v.parse()?;
        }
        if let Some(v) = self.queue_size {
            config.queue_size = v;
        }
        if let Some(v) = self.duration_secs {
            config.duration = Duration::from_secs(v);
        }
        if let Some(v) = self.warmup_secs {
            config.warmup = Duration::from_secs(v);
        }
        if let Some(v) = self.metrics_interval_ms {
            config.metrics_interval = Duration::from_millis(v);
        }
        if let Some(v) = self.shutdown_timeout_ms {
            config.shutdown_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.export_enabled {
            config.export.enabled = v;
        }
        if let Some(v) = &self.export_path {
            config.export.path = Some(v.clone());
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(field: &'static str, value: &str) -> BenchResult<T>
where
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| BenchError::invalid(field, format!("`{value}`: {e}")))
}

fn parse_bool(field: &'static str, value: &str) -> BenchResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BenchError::invalid(
            field,
            format!("`{value}` is not a boolean"),
        )),
    }
}

/// Resolves a named profile plus overrides into a validated [`Configuration`]
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    profile: String,
    search_dirs: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: ProfileOverrides,
    overrides: ProfileOverrides,
}

impl ProfileResolver {
    /// Start resolving the profile called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            profile: name.into(),
            search_dirs: Vec::new(),
            file: None,
            env: ProfileOverrides::default(),
            overrides: ProfileOverrides::default(),
        }
    }

    /// Add a directory searched for `<name>.json` profile definitions
    ///
    /// Directories are searched in the order they were added; the first match wins.
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// Layer an external configuration file
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Layer environment overrides taken from `vars`
    pub fn env<I, K, V>(mut self, vars: I) -> BenchResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.env = ProfileOverrides::from_env(vars)?;
        Ok(self)
    }

    /// Layer explicit command overrides (highest priority)
    pub fn overrides(mut self, overrides: ProfileOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Locate the profile definition for the requested name, if any
    pub fn discover(&self) -> Option<PathBuf> {
        let file_name = format!("{}.json", self.profile.trim());
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }

    /// Merge every layer and validate the result
    pub fn resolve(&self) -> BenchResult<Configuration> {
        let builtin = self.profile.parse::<Profile>().ok();
        let discovered = self.discover();

        let mut config = match (builtin, &discovered) {
            (Some(profile), _) => profile.defaults(),
            (None, Some(_)) => Profile::Balanced.defaults(),
            (None, None) => return Err(BenchError::UnknownProfile(self.profile.clone())),
        };

        if let Some(path) = &discovered {
            tracing::debug!(path = %path.display(), "Applying discovered profile definition");
            ProfileOverrides::from_file(path)?.apply(&mut config)?;
        }

        if let Some(path) = &self.file {
            tracing::debug!(path = %path.display(), "Applying configuration file");
            ProfileOverrides::from_file(path)?.apply(&mut config)?;
        }

        self.env.apply(&mut config)?;
        self.overrides.apply(&mut config)?;

        config.validate()?;

        tracing::debug!(
            profile = %self.profile,
            workers = config.workers,
            rate = config.rate,
            "Resolved configuration"
        );

        Ok(config)
    }
}
