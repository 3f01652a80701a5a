//! Startup configuration, read once from the environment (and `.env`, if present).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use shared::OutputFormat;

pub const DEFAULT_PORT: u16 = 1212;
pub const DEFAULT_ENGINE_BIN: &str = "blender";
pub const DEFAULT_ENGINE_ARGS: [&str; 2] = ["-b", "--python"];
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TEMPLATE_DIR: &str = "templates";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// How the external engine is launched: `<program> <args...> <script path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Headless Blender running a Python script.
    pub fn blender(program: impl Into<String>) -> Self {
        Self::new(program, DEFAULT_ENGINE_ARGS)
    }
}

impl Default for EngineCommand {
    fn default() -> Self {
        Self::blender(DEFAULT_ENGINE_BIN)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub engine: EngineCommand,
    pub engine_timeout: Duration,
    pub template_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub output_format: OutputFormat,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            engine: EngineCommand::default(),
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            scratch_dir: std::env::temp_dir(),
            output_format: OutputFormat::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let ip = match get("BIND_ADDR") {
            Some(v) => v.trim().parse::<IpAddr>().map_err(|e| invalid("BIND_ADDR", &v, e))?,
            None => defaults.bind_addr.ip(),
        };
        let port = match get("PORT") {
            Some(v) => v.trim().parse::<u16>().map_err(|e| invalid("PORT", &v, e))?,
            None => DEFAULT_PORT,
        };

        let program = get("ENGINE_BIN").unwrap_or_else(|| DEFAULT_ENGINE_BIN.to_string());
        let engine = match get("ENGINE_ARGS") {
            Some(args) => EngineCommand::new(program, args.split_whitespace()),
            None => EngineCommand::blender(program),
        };

        let engine_timeout = match get("ENGINE_TIMEOUT_SECS") {
            Some(v) => {
                let secs = v
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| invalid("ENGINE_TIMEOUT_SECS", &v, e))?;
                if secs == 0 {
                    return Err(invalid("ENGINE_TIMEOUT_SECS", &v, "must be greater than 0"));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_ENGINE_TIMEOUT,
        };

        let output_format = match get("OUTPUT_FORMAT") {
            Some(v) => v.parse::<OutputFormat>().map_err(|e| invalid("OUTPUT_FORMAT", &v, e))?,
            None => OutputFormat::default(),
        };

        let max_body_bytes = match get("MAX_BODY_BYTES") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .map_err(|e| invalid("MAX_BODY_BYTES", &v, e))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let template_dir = get("TEMPLATE_DIR").map(PathBuf::from).unwrap_or(defaults.template_dir);
        let scratch_dir = match get("SCRATCH_DIR") {
            Some(v) => absolutize("SCRATCH_DIR", Path::new(&v))?,
            None => defaults.scratch_dir,
        };

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            engine,
            engine_timeout,
            template_dir,
            scratch_dir,
            output_format,
            max_body_bytes,
        })
    }
}

// The output path handed to the engine has to be absolute
fn absolutize(var: &'static str, path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| invalid(var, &path.display().to_string(), e))
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
