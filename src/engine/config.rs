//! Fitting-engine configuration rendering.
//!
//! The engine reads an INI-style file with nested sections:
//!
//! ```text
//! data_file = input.txt
//! sed_modules = sfhdelayed, bc03, ...
//! bands = galex.FUV, galex.FUV_err, ...
//!
//! [sed_modules_params]
//!   [[sfhdelayed]]
//!     tau_main = 500, 1000, 2000
//!
//! [analysis_params]
//!   save_best_sed = True
//! ```
//!
//! Rendering depends only on `RunConfig` and the process working directory,
//! so the same config always produces the same bytes. Only structure is validated here; module parameter
//! semantics belong to the engine.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use log::info;

use crate::domain::{ModuleChoice, ParamGrid, RunConfig};
use crate::error::PipelineError;
use crate::io::{band_columns, write_atomic};

const ANALYSIS_METHOD: &str = "pdf_analysis";

pub const DEFAULT_VARIABLES: [&str; 5] = [
    "sfh.sfr",
    "sfh.sfr10Myrs",
    "stellar.m_star",
    "attenuation.E_BV_lines",
    "dust.luminosity",
];

/// Galaxy preset: delayed SFH, BC03, nebular emission, modified Calzetti
/// attenuation, Draine & Li (2014) dust, redshifting.
pub fn default_modules() -> Vec<ModuleChoice> {
    vec![
        ModuleChoice {
            name: "sfhdelayed".to_string(),
            params: vec![
                ParamGrid::new("tau_main", &["250", "500", "1000", "2000", "4000", "6000", "8000"]),
                ParamGrid::new("age_main", &["1000", "2500", "4500", "6000", "8000", "10000", "12000"]),
                ParamGrid::new("tau_burst", &["50.0"]),
                ParamGrid::new("age_burst", &["20"]),
                ParamGrid::new("f_burst", &["0.0", "0.001", "0.005", "0.01", "0.05", "0.1"]),
                ParamGrid::new("sfr_A", &["1.0"]),
                ParamGrid::new("normalise", &["True"]),
            ],
        },
        ModuleChoice {
            name: "bc03".to_string(),
            params: vec![
                ParamGrid::new("imf", &["1"]),
                ParamGrid::new("metallicity", &["0.02"]),
                ParamGrid::new("separation_age", &["10"]),
            ],
        },
        ModuleChoice {
            name: "nebular".to_string(),
            params: vec![
                ParamGrid::new("logU", &["-2.0"]),
                ParamGrid::new("f_esc", &["0.0"]),
                ParamGrid::new("f_dust", &["0.0"]),
                ParamGrid::new("lines_width", &["300.0"]),
                ParamGrid::new("emission", &["True"]),
            ],
        },
        ModuleChoice {
            name: "dustatt_modified_starburst".to_string(),
            params: vec![
                ParamGrid::new("E_BV_lines", &["0.0", "0.1", "0.3", "0.5", "0.7", "0.9"]),
                ParamGrid::new("E_BV_factor", &["0.44"]),
                ParamGrid::new("uv_bump_wavelength", &["217.5"]),
                ParamGrid::new("uv_bump_width", &["35.0"]),
                ParamGrid::new("uv_bump_amplitude", &["0.0"]),
                ParamGrid::new("powerlaw_slope", &["0.0"]),
                ParamGrid::new("Ext_law_emission_lines", &["1"]),
                ParamGrid::new("Rv", &["3.1"]),
            ],
        },
        ModuleChoice {
            name: "dl2014".to_string(),
            params: vec![
                ParamGrid::new("qpah", &["2.5"]),
                ParamGrid::new("umin", &["1.0"]),
                ParamGrid::new("alpha", &["2.0"]),
                ParamGrid::new("gamma", &["0.1"]),
            ],
        },
        ModuleChoice {
            name: "redshifting".to_string(),
            // Empty grid: take the redshift from the data file.
            params: vec![ParamGrid::new("redshift", &[])],
        },
    ]
}

/// Render the engine config text for `config`.
///
/// The engine runs in the config directory, so paths below it are written
/// relative to it and everything else is written absolute.
pub fn render_config(config: &RunConfig) -> Result<String, PipelineError> {
    validate(config)?;

    let base = absolute(&config_dir(&config.config_file))?;
    let data_file = engine_path(&base, &absolute(&config.data_file)?);
    let output_dir = engine_path(&base, &absolute(&config.output_dir)?);
    let module_names: Vec<&str> = config.modules.iter().map(|m| m.name.as_str()).collect();

    let mut out = String::new();
    out.push_str(&format!("# Fitting-engine configuration for object: {}\n", config.object_id));
    out.push_str(&format!("data_file = {}\n", data_file.display()));
    out.push_str("parameters_file = \n");
    out.push_str(&format!("sed_modules = {}\n", module_names.join(", ")));
    out.push_str(&format!("analysis_method = {ANALYSIS_METHOD}\n"));
    out.push_str(&format!("cores = {}\n", config.cores));
    out.push_str(&format!("redshift_column = {}\n", config.redshift_column));
    out.push_str(&format!("bands = {}\n", band_columns(&config.bands).join(", ")));
    out.push_str("properties = \n");
    out.push_str(&format!("additionalerror = {}\n", config.additional_error));
    out.push_str(&format!("output_dir = {}\n", output_dir.display()));
    out.push('\n');

    out.push_str("[sed_modules_params]\n");
    for module in &config.modules {
        out.push_str(&format!("  [[{}]]\n", module.name));
        for param in &module.params {
            out.push_str(&format!("    {} = {}\n", param.name, param.values.join(", ")));
        }
    }
    out.push('\n');

    out.push_str("[analysis_params]\n");
    out.push_str(&format!("  variables = {}\n", config.variables.join(", ")));
    out.push_str(&format!("  save_best_sed = {}\n", py_bool(config.flags.save_sed)));
    out.push_str(&format!("  plot_sed = {}\n", py_bool(config.flags.plot)));
    out.push_str("  save_chi2 = False\n");
    out.push_str("  lim_flag = False\n");
    out.push_str("  mock_flag = False\n");
    out.push_str("  redshift_decimals = 2\n");
    out.push_str("  blocks = 1\n");

    Ok(out)
}

/// Render and write the config file atomically.
pub fn write_config(config: &RunConfig) -> Result<String, PipelineError> {
    let text = render_config(config)?;
    write_atomic(&config.config_file, |w| w.write_all(text.as_bytes()))?;
    info!("Wrote engine config to '{}'", config.config_file.display());
    Ok(text)
}

/// Band columns declared by the top-level `bands` key of a config text.
///
/// Used to re-check a config that may have been edited by hand.
pub fn declared_bands(text: &str) -> Result<Vec<String>, PipelineError> {
    let value = top_level_value(text, "bands")
        .ok_or_else(|| PipelineError::MalformedConfig("missing top-level key `bands`".to_string()))?;
    Ok(value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// Data file and output directory named by a config text, resolved against
/// the directory of `config_file` the same way the engine resolves them.
pub fn declared_paths(text: &str, config_file: &Path) -> Result<(PathBuf, PathBuf), PipelineError> {
    let base = config_dir(config_file);
    let resolve = |key: &str| match top_level_value(text, key) {
        Some(v) if !v.is_empty() => Ok(base.join(v)),
        _ => Err(PipelineError::MalformedConfig(format!("missing or empty `{key}`"))),
    };
    Ok((resolve("data_file")?, resolve("output_dir")?))
}

/// Value of a `key = value` line before the first section header.
fn top_level_value<'t>(text: &'t str, key: &str) -> Option<&'t str> {
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            break;
        }
        if line.starts_with('#') {
            continue;
        }
        let Some((k, value)) = line.split_once('=') else {
            continue;
        };
        if k.trim() == key {
            return Some(value.trim());
        }
    }
    None
}

fn validate(config: &RunConfig) -> Result<(), PipelineError> {
    let missing = |key: &str| Err(PipelineError::MalformedConfig(format!("missing or empty `{key}`")));

    if config.object_id.trim().is_empty() {
        return missing("object_id");
    }
    if config.data_file.as_os_str().is_empty() {
        return missing("data_file");
    }
    if config.config_file.as_os_str().is_empty() {
        return missing("config_file");
    }
    if config.output_dir.as_os_str().is_empty() {
        return missing("output_dir");
    }
    if config.redshift_column.trim().is_empty() {
        return missing("redshift_column");
    }
    if config.modules.is_empty() {
        return missing("sed_modules");
    }
    if config.bands.is_empty() {
        return missing("bands");
    }
    if config.cores == 0 {
        return Err(PipelineError::MalformedConfig("`cores` must be >= 1".to_string()));
    }
    if !(config.additional_error.is_finite() && config.additional_error >= 0.0) {
        return Err(PipelineError::MalformedConfig(
            "`additionalerror` must be finite and >= 0".to_string(),
        ));
    }
    for module in &config.modules {
        if module.name.trim().is_empty() {
            return missing("module name");
        }
        if module.params.iter().any(|p| p.name.trim().is_empty()) {
            return Err(PipelineError::MalformedConfig(format!(
                "module `{}` has a parameter without a name",
                module.name
            )));
        }
    }

    // Values are written one per line; an embedded newline would break the file structure.
    let mut values: Vec<&str> = vec![config.object_id.as_str(), config.redshift_column.as_str()];
    values.extend(config.variables.iter().map(String::as_str));
    for module in &config.modules {
        values.push(&module.name);
        for p in &module.params {
            values.push(&p.name);
            values.extend(p.values.iter().map(String::as_str));
        }
    }
    if let Some(bad) = values.iter().find(|v| v.contains('\n') || v.contains('\r')) {
        return Err(PipelineError::MalformedConfig(format!(
            "value {bad:?} contains a line break"
        )));
    }

    Ok(())
}

fn py_bool(v: bool) -> &'static str {
    if v { "True" } else { "False" }
}

pub(crate) fn config_dir(config_file: &Path) -> PathBuf {
    match config_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `path` made absolute against the process working directory.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf, PipelineError> {
    std::path::absolute(path).map_err(|e| PipelineError::io(format!("Failed to resolve '{}'", path.display()), e))
}

/// `path` as the engine sees it from `base`: relative when it lives below `base`, absolute otherwise.
fn engine_path(base: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}
