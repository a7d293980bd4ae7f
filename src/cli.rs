//! Command-line arguments, logging setup and config resolution.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use insight_domain::OperatorConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Reconciles ObservabilityStack resources into running observability
/// components.
#[derive(Parser, Debug)]
#[command(name = "insight-operator")]
#[command(author, version, about, long_about = None)]
pub struct OperatorArgs {
    /// Operator config file (YAML). Defaults apply when omitted.
    #[arg(long, env = "INSIGHT_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Only watch stacks in this namespace; overrides the config file.
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "INSIGHT_LOG_JSON")]
    pub json_logs: bool,
}

impl OperatorArgs {
    pub fn resolve_config(&self) -> Result<OperatorConfig> {
        let mut config = match &self.config {
            Some(path) => OperatorConfig::load_from_path(path)?,
            None => OperatorConfig::default(),
        };
        if let Some(namespace) = &self.namespace {
            config.watch_namespace = Some(namespace.clone());
        }
        Ok(config)
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the `info` default.
pub fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_config_file() {
        let args = OperatorArgs::parse_from(["insight-operator"]);
        let config = args.resolve_config().unwrap();
        assert_eq!(config, OperatorConfig::default());
    }

    #[test]
    fn test_namespace_flag_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "watchNamespace: team-a\nrequeueAfterSecs: 60").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = OperatorArgs::parse_from([
            "insight-operator",
            "--config",
            path.as_str(),
            "--namespace",
            "monitoring",
        ]);
        let config = args.resolve_config().unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("monitoring"));
        assert_eq!(config.requeue_after_secs, 60);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "conflictRetries: 0").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = OperatorArgs::parse_from(["insight-operator", "--config", path.as_str()]);
        assert!(args.resolve_config().is_err());
    }
}
