//! Process-level settings: service URLs, HTTP timeout, engine commands.
//!
//! Loaded once at the binary boundary from `.env` plus `SEDPREP_*`
//! environment variables, then passed explicitly into every constructor.

use std::time::Duration;

use crate::data::dust::DEFAULT_DUST_URL;
use crate::data::sesame::DEFAULT_SESAME_URL;
use crate::data::vizier::DEFAULT_VIZIER_URL;
use crate::data::{DustConfig, SesameConfig, VizierConfig};
use crate::domain::ReddeningMap;
use crate::engine::EngineCommand;
use crate::error::AppError;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_ROWS: usize = 200;
const DEFAULT_ENGINE: &str = "pcigale";
const DEFAULT_ENGINE_ARGS: &str = "-c {config} run";
const DEFAULT_PLOTTER: &str = "pcigale-plots";
const DEFAULT_PLOTTER_ARGS: &str = "-c {config} sed";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sesame_url: String,
    pub vizier_url: String,
    pub dust_url: String,
    pub http_timeout: Duration,
    pub vizier_max_rows: usize,
    pub engine: EngineCommand,
    /// `None` when `SEDPREP_PLOTTER` is set to an empty string.
    pub plotter: Option<EngineCommand>,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| default.to_string())
        };
        let parse_num = |key: &str, default: u64| -> Result<u64, AppError> {
            match lookup(key) {
                None => Ok(default),
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| AppError::new(2, format!("{key} must be a positive integer (got '{v}')"))),
            }
        };

        let timeout_secs = parse_num("SEDPREP_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let max_rows = parse_num("SEDPREP_VIZIER_MAX_ROWS", DEFAULT_MAX_ROWS as u64)?;

        let engine_program = get("SEDPREP_ENGINE", DEFAULT_ENGINE);
        if engine_program.is_empty() {
            return Err(AppError::new(2, "SEDPREP_ENGINE must not be empty."));
        }
        let engine = command(&engine_program, &get("SEDPREP_ENGINE_ARGS", DEFAULT_ENGINE_ARGS));

        let plotter_program = get("SEDPREP_PLOTTER", DEFAULT_PLOTTER);
        let plotter = (!plotter_program.is_empty())
            .then(|| command(&plotter_program, &get("SEDPREP_PLOTTER_ARGS", DEFAULT_PLOTTER_ARGS)));

        Ok(Self {
            sesame_url: get("SEDPREP_SESAME_URL", DEFAULT_SESAME_URL),
            vizier_url: get("SEDPREP_VIZIER_URL", DEFAULT_VIZIER_URL),
            dust_url: get("SEDPREP_DUST_URL", DEFAULT_DUST_URL),
            http_timeout: Duration::from_secs(timeout_secs),
            vizier_max_rows: max_rows as usize,
            engine,
            plotter,
        })
    }

    pub fn sesame(&self) -> SesameConfig {
        SesameConfig {
            url: self.sesame_url.clone(),
            timeout: self.http_timeout,
        }
    }

    pub fn vizier(&self) -> VizierConfig {
        VizierConfig {
            url: self.vizier_url.clone(),
            timeout: self.http_timeout,
            max_rows: self.vizier_max_rows,
        }
    }

    pub fn dust(&self, map: ReddeningMap) -> DustConfig {
        DustConfig {
            url: self.dust_url.clone(),
            timeout: self.http_timeout,
            map,
        }
    }
}

fn command(program: &str, args: &str) -> EngineCommand {
    let args: Vec<&str> = args.split_whitespace().collect();
    EngineCommand::new(program, &args)
}
