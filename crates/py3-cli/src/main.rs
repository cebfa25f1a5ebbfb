mod args;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use py3_bridge::{Bridge, BridgeConfig, DecodeMode};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Default configuration file, read from the working directory when present
const DEFAULT_CONFIG: &str = "Py3.toml";

#[derive(Parser, Debug)]
#[command(name = "py3")]
#[command(about = "Call functions of an embedded Python module", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./Py3.toml when it exists)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Python module to import
    #[arg(short, long, global = true)]
    module: Option<String>,

    /// Directory to prepend to sys.path (repeatable)
    #[arg(long = "path", global = true)]
    paths: Vec<PathBuf>,

    /// How results are decoded
    #[arg(long, global = true, value_enum)]
    decode: Option<DecodeArg>,

    /// Give up waiting for the invocation lock after this many milliseconds
    #[arg(long, global = true)]
    lock_timeout_ms: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Call a function with rows of numbers and print the result matrix as JSON
    Call {
        /// Function name
        function: String,
        /// Rows as JSON, each passed as one positional argument
        #[arg(long, default_value = "[]", value_parser = args::parse_rows)]
        rows: args::Rows,
        /// Keyword parameter key=value (repeatable)
        #[arg(short, long = "param", value_parser = args::parse_param)]
        params: Vec<(String, i32)>,
    },
    /// Call a function with flat numbers and log its result
    Probe {
        /// Function name
        function: String,
        /// Positional values
        #[arg(allow_negative_numbers = true)]
        values: Vec<f64>,
        /// Also pass values as keywords "0", "1", ...
        #[arg(long)]
        mirror_kwargs: bool,
    },
    /// Check that the module defines a callable
    Check {
        /// Function name
        function: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DecodeArg {
    Direct,
    Repr,
}

impl From<DecodeArg> for DecodeMode {
    fn from(arg: DecodeArg) -> Self {
        match arg {
            DecodeArg::Direct => DecodeMode::Direct,
            DecodeArg::Repr => DecodeMode::Repr,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = resolve_config(&cli)?;
    if let Commands::Probe {
        mirror_kwargs: true,
        ..
    } = cli.command
    {
        config.mirror_positional_kwargs = true;
    }
    let bridge = Bridge::init(config)?;

    match cli.command {
        Commands::Call {
            function,
            rows,
            params,
        } => {
            let params = args::collect_params(params);
            let matrix = bridge.call(&function, &rows.0, &params)?;
            println!("{}", args::matrix_to_json(&matrix)?);
        }
        Commands::Probe {
            function,
            values,
            mirror_kwargs,
        } => {
            debug!(mirror_kwargs, "probe");
            bridge.call_diagnostic(&function, &values)?;
        }
        Commands::Check { function } => {
            if !bridge.has_function(&function)? {
                anyhow::bail!(
                    "module '{}' has no callable '{}'",
                    bridge.module_name(),
                    function
                );
            }
            println!("{}.{} is callable", bridge.module_name(), function);
        }
    }

    Ok(())
}

/// File, then environment, then flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let file = match &cli.config {
        Some(path) => Some(BridgeConfig::load(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Some(BridgeConfig::load(Path::new(DEFAULT_CONFIG))?)
        }
        None => None,
    };

    let base = match (file, &cli.module) {
        (Some(config), _) => config,
        (None, Some(module)) => BridgeConfig::new(module.clone()),
        (None, None) => match std::env::var(py3_bridge::config::ENV_MODULE) {
            Ok(module) => BridgeConfig::new(module),
            Err(_) => anyhow::bail!(
                "no module configured: pass --module, set {}, or create {}",
                py3_bridge::config::ENV_MODULE,
                DEFAULT_CONFIG
            ),
        },
    };

    let config = base.with_env_overrides()?;
    let config = apply_flags(config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_flags(mut config: BridgeConfig, cli: &Cli) -> BridgeConfig {
    if let Some(module) = &cli.module {
        config.module = module.clone();
    }
    if !cli.paths.is_empty() {
        let mut paths = cli.paths.clone();
        paths.append(&mut config.search_paths);
        config.search_paths = paths;
    }
    if let Some(decode) = cli.decode {
        config.decode = decode.into();
    }
    if let Some(ms) = cli.lock_timeout_ms {
        config.lock_timeout_ms = Some(ms);
    }
    config
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_call() {
        let cli = Cli::try_parse_from([
            "py3",
            "--module",
            "pyscripts",
            "call",
            "condd",
            "--rows",
            "[[1.9, 3.9], [1.88, 3.69]]",
            "-p",
            "start=2",
            "--param",
            "end=8",
        ])
        .unwrap();

        assert_eq!(cli.module.as_deref(), Some("pyscripts"));
        match cli.command {
            Commands::Call {
                function,
                rows,
                params,
            } => {
                assert_eq!(function, "condd");
                assert_eq!(rows.0, vec![vec![1.9, 3.9], vec![1.88, 3.69]]);
                assert_eq!(
                    params,
                    vec![("start".to_string(), 2), ("end".to_string(), 8)]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_probe_negative_values() {
        let cli = Cli::try_parse_from(["py3", "probe", "foo", "1.5", "-2", "--mirror-kwargs", "-vv"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Probe {
                function,
                values,
                mirror_kwargs,
            } => {
                assert_eq!(function, "foo");
                assert_eq!(values, vec![1.5, -2.0]);
                assert!(mirror_kwargs);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_bad_rows_rejected() {
        let result = Cli::try_parse_from(["py3", "call", "condd", "--rows", "not-json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "py3",
            "--module",
            "other",
            "--path",
            "/first",
            "--decode",
            "repr",
            "--lock-timeout-ms",
            "50",
            "check",
            "condd",
        ])
        .unwrap();

        let config = apply_flags(
            BridgeConfig::new("pyscripts").with_search_path("/second"),
            &cli,
        );
        assert_eq!(config.module, "other");
        assert_eq!(
            config.search_paths,
            vec![PathBuf::from("/first"), PathBuf::from("/second")]
        );
        assert_eq!(config.decode, DecodeMode::Repr);
        assert_eq!(config.lock_timeout_ms, Some(50));
    }
}
