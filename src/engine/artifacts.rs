//! Output-directory scanning after an engine run.
//!
//! Recognized files:
//!
//! - `results.txt` / `results.fits`: best-fit parameter table
//! - `*_best_model.fits`: best-fit SED
//! - `*_best_model.{pdf,png,svg}`: SED plots

use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::domain::{ArtifactKind, ArtifactMissingWarning, Artifacts, RunFlags};

const PARAMETER_TABLES: [&str; 2] = ["results.txt", "results.fits"];
const SED_SUFFIX: &str = "_best_model.fits";
const PLOT_MARKER: &str = "best_model";
const PLOT_EXTENSIONS: [&str; 3] = ["pdf", "png", "svg"];
const MAX_DEPTH: usize = 3;

/// Scan `output_dir` and report what is missing given `flags`.
pub fn collect_artifacts(output_dir: &Path, flags: &RunFlags) -> (Artifacts, Vec<ArtifactMissingWarning>) {
    let mut artifacts = Artifacts::default();

    if output_dir.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(output_dir)
            .max_depth(MAX_DEPTH)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();

        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if PARAMETER_TABLES.contains(&name) {
                // Prefer the text table when both exist.
                if artifacts.parameter_table.is_none() || name == PARAMETER_TABLES[0] {
                    artifacts.parameter_table = Some(path.clone());
                }
            } else if name.ends_with(SED_SUFFIX) {
                artifacts.sed_fits.push(path.clone());
            } else if name.contains(PLOT_MARKER) && has_plot_extension(&path) {
                artifacts.sed_plots.push(path.clone());
            }
        }
    }
    debug!(
        "Artifacts in '{}': table={:?}, {} SED FITS, {} plot(s)",
        output_dir.display(),
        artifacts.parameter_table,
        artifacts.sed_fits.len(),
        artifacts.sed_plots.len()
    );

    let mut warnings = Vec::new();
    let mut expect = |kind: ArtifactKind, present: bool, detail: &str| {
        if !present {
            let w = ArtifactMissingWarning {
                kind,
                output_dir: output_dir.to_path_buf(),
                detail: detail.to_string(),
            };
            warn!("{w}");
            warnings.push(w);
        }
    };

    expect(
        ArtifactKind::ParameterTable,
        artifacts.parameter_table.is_some(),
        "expected results.txt or results.fits",
    );
    if flags.save_sed {
        expect(
            ArtifactKind::SedFits,
            !artifacts.sed_fits.is_empty(),
            "save_sed was requested but no *_best_model.fits was written",
        );
    }
    if flags.plot {
        expect(
            ArtifactKind::SedPlot,
            !artifacts.sed_plots.is_empty(),
            "plot was requested but no best-model plot was written",
        );
    }

    (artifacts, warnings)
}

fn has_plot_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PLOT_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(e)))
}
