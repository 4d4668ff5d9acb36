//! Checkpoint comparison.
//!
//! Structure is validated in full before any values are looked at; a pair
//! that fails validation never produces a [`ComparisonResult`].

use crate::checkpoint::{Checkpoint, OptimizerState};
use crate::config::{CompareOptions, VerifierConfig};
use crate::error::{LoadError, Mismatch, VerifyError};
use crate::loader;
use crate::report::{ComparisonResult, ToleranceExceeded, Verdict};
use crate::tensor::{Tensor, TensorData};
use crate::tolerance::Tolerance;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const OPTIMIZER_PREFIX: &str = "optimizer.";

/// Compares checkpoint pairs under a fixed tolerance and option set.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    tolerance: Tolerance,
    options: CompareOptions,
}

/// Per-tensor outcome before it's folded into the result.
struct TensorScan {
    max_abs_diff: f64,
    delta: f64,
    index: usize,
    mismatched: usize,
}

impl Verifier {
    pub fn new(tolerance: Tolerance, options: CompareOptions) -> Result<Self, VerifyError> {
        tolerance.validate()?;
        Ok(Self { tolerance, options })
    }

    pub fn from_config(config: &VerifierConfig) -> Result<Self, VerifyError> {
        Self::new(config.tolerance, config.compare.clone())
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Load both checkpoints concurrently, then compare.
    pub async fn verify(&self, a: PathBuf, b: PathBuf) -> Result<ComparisonResult, VerifyError> {
        let (ckpt_a, ckpt_b) = loader::load_pair(a, b).await?;
        Ok(self.compare(&ckpt_a, &ckpt_b)?)
    }

    /// Blocking variant of [`Verifier::verify`].
    pub fn verify_paths(&self, a: &Path, b: &Path) -> Result<ComparisonResult, VerifyError> {
        let ckpt_a = Checkpoint::load(a)?;
        let ckpt_b = Checkpoint::load(b)?;
        Ok(self.compare(&ckpt_a, &ckpt_b)?)
    }

    /// Check that `a` and `b` can be compared element-wise.
    ///
    /// Collects every structural problem before failing.
    pub fn validate_structure(&self, a: &Checkpoint, b: &Checkpoint) -> Result<(), LoadError> {
        let mut mismatch = Mismatch::default();
        tensor_maps_match(&a.parameters, &b.parameters, "", &mut mismatch);

        if self.options.require_same_iteration {
            if let (Some(ia), Some(ib)) = (a.iteration, b.iteration) {
                if ia != ib {
                    mismatch.conflict(format!("iteration {ia} vs {ib}"));
                }
            }
        }

        if self.options.require_same_config {
            if let (Some(ca), Some(cb)) = (&a.config, &b.config) {
                for diff in ca.differences(cb) {
                    mismatch.conflict(format!("training config: {diff}"));
                }
            }
        }

        if self.options.include_optimizer {
            match (&a.optimizer, &b.optimizer) {
                (Some(oa), Some(ob)) => optimizers_match(oa, ob, &mut mismatch),
                (Some(_), None) => mismatch.conflict("optimizer state only in checkpoint A"),
                (None, Some(_)) => mismatch.conflict("optimizer state only in checkpoint B"),
                (None, None) => {}
            }
        }

        if mismatch.is_empty() {
            Ok(())
        } else {
            Err(LoadError::StructuralMismatch(mismatch))
        }
    }

    /// Compare two loaded checkpoints.
    ///
    /// Every parameter is scanned even after a divergence is found, so the
    /// result lists all of them.
    pub fn compare(&self, a: &Checkpoint, b: &Checkpoint) -> Result<ComparisonResult, LoadError> {
        self.validate_structure(a, b)?;
        tracing::info!(
            a = %a.name,
            b = %b.name,
            parameters = a.parameters.len(),
            "Comparing checkpoints"
        );

        let mut result = ComparisonResult {
            verdict: Verdict::Pass,
            checkpoint_a: a.name.clone(),
            checkpoint_b: b.name.clone(),
            tolerance: self.tolerance,
            parameters_compared: 0,
            elements_compared: 0,
            max_abs_diff: 0.0,
            max_diff_parameter: None,
            diffs: Vec::new(),
        };

        for (id, ta) in &a.parameters {
            // Presence in both is guaranteed by validate_structure.
            if let Some(tb) = b.parameters.get(id) {
                self.record(&mut result, id.clone(), ta, tb);
            }
        }

        if self.options.include_optimizer {
            if let (Some(oa), Some(ob)) = (&a.optimizer, &b.optimizer) {
                for (id, ta) in &oa.state {
                    if let Some(tb) = ob.state.get(id) {
                        self.record(&mut result, format!("{OPTIMIZER_PREFIX}{id}"), ta, tb);
                    }
                }
                for (name, va) in &oa.hyperparams {
                    if let Some(vb) = ob.hyperparams.get(name) {
                        record_hyperparam(&mut result, name, *va, *vb);
                    }
                }
            }
        }

        if !result.diffs.is_empty() {
            result.verdict = Verdict::Fail;
        }
        tracing::info!(
            verdict = ?result.verdict,
            diverged = result.diffs.len(),
            max_abs_diff = result.max_abs_diff,
            "Comparison finished"
        );
        Ok(result)
    }

    fn record(&self, result: &mut ComparisonResult, id: String, a: &Tensor, b: &Tensor) {
        let scan = self.scan(a.data(), b.data());
        result.parameters_compared += 1;
        result.elements_compared += a.numel() as u64;

        if scan.max_abs_diff > result.max_abs_diff {
            result.max_abs_diff = scan.max_abs_diff;
            result.max_diff_parameter = Some(id.clone());
        }

        if scan.mismatched > 0 {
            tracing::warn!(
                parameter = %id,
                max_abs_diff = scan.max_abs_diff,
                mismatched = scan.mismatched,
                "Parameter differs beyond tolerance"
            );
            result.diffs.push(ToleranceExceeded {
                parameter: id,
                max_abs_diff: scan.max_abs_diff,
                delta: scan.delta,
                index: scan.index,
                mismatched: scan.mismatched,
                total: a.numel(),
            });
        } else {
            tracing::debug!(parameter = %id, max_abs_diff = scan.max_abs_diff, "Parameter matches");
        }
    }

    fn scan(&self, a: &TensorData, b: &TensorData) -> TensorScan {
        let mut scan = TensorScan {
            max_abs_diff: 0.0,
            delta: 0.0,
            index: 0,
            mismatched: 0,
        };
        match (a, b) {
            (TensorData::Float(xs), TensorData::Float(ys)) => {
                // delta/index point at the worst element that is out of tolerance,
                // which need not be the element with the largest distance.
                let mut worst = 0.0;
                for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
                    let dist = self.tolerance.distance(x, y);
                    scan.max_abs_diff = scan.max_abs_diff.max(dist);
                    if !self.tolerance.within(x, y) {
                        if scan.mismatched == 0 || dist > worst {
                            worst = dist;
                            scan.delta = y - x;
                            scan.index = i;
                        }
                        scan.mismatched += 1;
                    }
                }
            }
            (TensorData::Int(xs), TensorData::Int(ys)) => {
                for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
                    if x != y {
                        scan.mismatched += 1;
                        let delta = i128::from(y) - i128::from(x);
                        let dist = delta.unsigned_abs() as f64;
                        if dist > scan.max_abs_diff {
                            scan.max_abs_diff = dist;
                            scan.delta = delta as f64;
                            scan.index = i;
                        }
                    }
                }
            }
            (TensorData::Bool(xs), TensorData::Bool(ys)) => {
                for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
                    if x != y {
                        if scan.mismatched == 0 {
                            scan.max_abs_diff = 1.0;
                            scan.delta = f64::from(i8::from(y) - i8::from(x));
                            scan.index = i;
                        }
                        scan.mismatched += 1;
                    }
                }
            }
            // Dtype kinds are checked by validate_structure.
            _ => {}
        }
        scan
    }
}

/// Scalar optimizer settings must match exactly.
fn record_hyperparam(result: &mut ComparisonResult, name: &str, a: f64, b: f64) {
    result.parameters_compared += 1;
    result.elements_compared += 1;
    if a == b || (a.is_nan() && b.is_nan()) {
        return;
    }
    let id = format!("{OPTIMIZER_PREFIX}{name}");
    let dist = if a.is_nan() || b.is_nan() {
        f64::INFINITY
    } else {
        (b - a).abs()
    };
    if dist > result.max_abs_diff {
        result.max_abs_diff = dist;
        result.max_diff_parameter = Some(id.clone());
    }
    tracing::warn!(hyperparam = %id, a, b, "Optimizer hyperparameter differs");
    result.diffs.push(ToleranceExceeded {
        parameter: id,
        max_abs_diff: dist,
        delta: b - a,
        index: 0,
        mismatched: 1,
        total: 1,
    });
}

fn tensor_maps_match(
    a: &BTreeMap<String, Tensor>,
    b: &BTreeMap<String, Tensor>,
    prefix: &str,
    mismatch: &mut Mismatch,
) {
    for (id, ta) in a {
        match b.get(id) {
            None => mismatch.only_in_a.push(format!("{prefix}{id}")),
            Some(tb) => {
                if ta.dtype() != tb.dtype() {
                    mismatch.conflict(format!(
                        "{prefix}{id}: dtype {} vs {}",
                        ta.dtype(),
                        tb.dtype()
                    ));
                }
                if ta.shape() != tb.shape() {
                    mismatch.conflict(format!(
                        "{prefix}{id}: shape {:?} vs {:?}",
                        ta.shape(),
                        tb.shape()
                    ));
                }
            }
        }
    }
    for id in b.keys().filter(|id| !a.contains_key(*id)) {
        mismatch.only_in_b.push(format!("{prefix}{id}"));
    }
}

fn optimizers_match(a: &OptimizerState, b: &OptimizerState, mismatch: &mut Mismatch) {
    if a.step != b.step {
        mismatch.conflict(format!("optimizer step {} vs {}", a.step, b.step));
    }
    tensor_maps_match(&a.state, &b.state, OPTIMIZER_PREFIX, mismatch);
    for name in a.hyperparams.keys().filter(|k| !b.hyperparams.contains_key(*k)) {
        mismatch.only_in_a.push(format!("{OPTIMIZER_PREFIX}{name}"));
    }
    for name in b.hyperparams.keys().filter(|k| !a.hyperparams.contains_key(*k)) {
        mismatch.only_in_b.push(format!("{OPTIMIZER_PREFIX}{name}"));
    }
}
