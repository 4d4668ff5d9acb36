//! # repcheck-core: training reproducibility verification
//!
//! Loads two checkpoints produced by training runs that shared a
//! configuration and seed, and compares them parameter by parameter:
//! exactly for integer and boolean tensors, under a configurable
//! absolute/relative tolerance for floating-point tensors.
//!
//! ```no_run
//! use repcheck_core::{Tolerance, Verifier, config::CompareOptions};
//! use std::path::Path;
//!
//! let verifier = Verifier::new(Tolerance::absolute(1e-6), CompareOptions::default())?;
//! let result = verifier.verify_paths(Path::new("run1.json"), Path::new("run2.json"))?;
//! println!("{}", result.render_text());
//! # Ok::<(), repcheck_core::VerifyError>(())
//! ```

pub mod checkpoint;
pub mod compare;
pub mod config;
pub mod error;
pub mod loader;
pub mod persistence;
pub mod report;
pub mod tensor;
pub mod tolerance;
pub mod training_config;

pub use checkpoint::{Checkpoint, OptimizerState};
pub use compare::Verifier;
pub use config::{OutputFormat, VerifierConfig, load_config};
pub use error::{LoadError, Mismatch, VerifyError};
pub use report::{ComparisonResult, ToleranceExceeded, Verdict};
pub use tensor::{DType, Tensor, TensorData};
pub use tolerance::Tolerance;
pub use training_config::{Precision, TrainingConfiguration};
