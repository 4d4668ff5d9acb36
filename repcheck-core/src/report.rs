//! Comparison results and their text/JSON renderings.

use crate::tensor::float_token;
use crate::tolerance::Tolerance;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Overall outcome of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

/// One parameter whose values differ beyond tolerance.
///
/// Recording one of these never stops the scan; it only fails the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceExceeded {
    pub parameter: String,
    /// Largest `|b - a|` over the parameter's elements.
    #[serde(with = "float_token")]
    pub max_abs_diff: f64,
    /// Signed `b - a` at the worst element outside tolerance.
    #[serde(with = "float_token")]
    pub delta: f64,
    /// Flat row-major index of that element.
    pub index: usize,
    /// Elements outside tolerance.
    pub mismatched: usize,
    pub total: usize,
}

/// Result of comparing two checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub verdict: Verdict,
    pub checkpoint_a: String,
    pub checkpoint_b: String,
    pub tolerance: Tolerance,
    pub parameters_compared: usize,
    pub elements_compared: u64,
    /// Largest difference seen anywhere, within tolerance or not.
    #[serde(with = "float_token")]
    pub max_abs_diff: f64,
    pub max_diff_parameter: Option<String>,
    /// Parameters beyond tolerance, in comparison order.
    pub diffs: Vec<ToleranceExceeded>,
}

impl ComparisonResult {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn diverged_parameters(&self) -> Vec<&str> {
        self.diffs.iter().map(|d| d.parameter.as_str()).collect()
    }

    /// Pretty JSON, stable byte-for-byte for a given pair of inputs.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Comparing {} vs {} ({} parameters, {} elements)",
            self.checkpoint_a, self.checkpoint_b, self.parameters_compared, self.elements_compared
        );
        if self.tolerance.is_exact() {
            let _ = writeln!(out, "Tolerance: exact");
        } else {
            let _ = writeln!(
                out,
                "Tolerance: absolute {:e}, relative {:e}",
                self.tolerance.absolute, self.tolerance.relative
            );
        }
        for diff in &self.diffs {
            let _ = writeln!(
                out,
                "  DIFF {}: max |diff| = {:e} (delta {:+e} at index {}), {}/{} elements out of tolerance",
                diff.parameter, diff.max_abs_diff, diff.delta, diff.index, diff.mismatched, diff.total
            );
        }
        match &self.max_diff_parameter {
            Some(param) => {
                let _ = writeln!(
                    out,
                    "Maximum difference across all parameters: {:e} ({param})",
                    self.max_abs_diff
                );
            }
            None => {
                let _ = writeln!(out, "Maximum difference across all parameters: 0");
            }
        }
        match self.verdict {
            Verdict::Pass => {
                let _ = writeln!(out, "PASS: checkpoints are identical within tolerance");
            }
            Verdict::Fail => {
                let _ = writeln!(
                    out,
                    "FAIL: {} parameter(s) differ beyond tolerance",
                    self.diffs.len()
                );
            }
        }
        out
    }
}
