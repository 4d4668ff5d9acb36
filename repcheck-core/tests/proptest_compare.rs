//! Property-based tests for checkpoint comparison using proptest.

use proptest::prelude::*;

use repcheck_core::config::CompareOptions;
use repcheck_core::{Checkpoint, Tensor, Tolerance, Verifier};

fn checkpoint_from(name: &str, params: &[(String, Vec<f64>)]) -> Checkpoint {
    params.iter().fold(Checkpoint::new(name, Some(10)), |ckpt, (id, values)| {
        ckpt.with_parameter(id.clone(), Tensor::from_f64s(values.clone()))
    })
}

fn params_strategy() -> impl Strategy<Value = Vec<(String, Vec<f64>)>> {
    prop::collection::btree_map(
        "[a-z]{1,6}(\\.[a-z]{1,6}){0,2}",
        prop::collection::vec(-1e6f64..1e6, 1..16),
        1..8,
    )
    .prop_map(|m| m.into_iter().collect())
}

proptest! {
    #[test]
    fn self_comparison_always_passes(params in params_strategy()) {
        let a = checkpoint_from("a", &params);
        let b = checkpoint_from("b", &params);
        let result = Verifier::default().compare(&a, &b).unwrap();
        prop_assert!(result.passed());
        prop_assert!(result.diffs.is_empty());
        prop_assert_eq!(result.max_abs_diff, 0.0);
    }

    #[test]
    fn single_perturbation_is_reported_alone(
        params in params_strategy(),
        pick in any::<prop::sample::Index>(),
        elem in any::<prop::sample::Index>(),
        bump in 1e-3f64..10.0,
    ) {
        let target = pick.index(params.len());
        let mut perturbed = params.clone();
        let values = &mut perturbed[target].1;
        let at = elem.index(values.len());
        values[at] += bump;

        let a = checkpoint_from("a", &params);
        let b = checkpoint_from("b", &perturbed);
        let verifier = Verifier::new(Tolerance::absolute(1e-6), CompareOptions::default()).unwrap();
        let result = verifier.compare(&a, &b).unwrap();

        prop_assert!(!result.passed());
        prop_assert_eq!(result.diverged_parameters(), vec![params[target].0.as_str()]);
        prop_assert_eq!(result.diffs[0].index, at);
    }

    #[test]
    fn comparison_is_symmetric(
        params in params_strategy(),
        noise in prop::collection::vec(-1e-2f64..1e-2, 16),
        atol in 0.0f64..1e-2,
        rtol in 0.0f64..1e-3,
    ) {
        let other: Vec<(String, Vec<f64>)> = params
            .iter()
            .map(|(id, values)| {
                let shifted = values.iter().zip(&noise).map(|(v, n)| v + n).collect();
                (id.clone(), shifted)
            })
            .collect();
        let a = checkpoint_from("a", &params);
        let b = checkpoint_from("b", &other);
        let tolerance = Tolerance { absolute: atol, relative: rtol, equal_nan: true };
        let verifier = Verifier::new(tolerance, CompareOptions::default()).unwrap();

        let ab = verifier.compare(&a, &b).unwrap();
        let ba = verifier.compare(&b, &a).unwrap();
        prop_assert_eq!(ab.verdict, ba.verdict);
        prop_assert_eq!(ab.diverged_parameters(), ba.diverged_parameters());
        prop_assert_eq!(ab.max_abs_diff, ba.max_abs_diff);
        for (x, y) in ab.diffs.iter().zip(&ba.diffs) {
            prop_assert_eq!(x.max_abs_diff, y.max_abs_diff);
            prop_assert_eq!(x.delta, -y.delta);
            prop_assert_eq!(x.mismatched, y.mismatched);
        }
    }

    #[test]
    fn serialized_result_is_deterministic(params in params_strategy(), bump in 0.0f64..1.0) {
        let a = checkpoint_from("a", &params);
        let mut shifted = params.clone();
        shifted[0].1[0] += bump;
        let b = checkpoint_from("b", &shifted);

        let verifier = Verifier::default();
        let first = verifier.compare(&a, &b).unwrap().to_json().unwrap();
        let second = verifier.compare(&a, &b).unwrap().to_json().unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn renamed_parameter_is_structural(params in params_strategy()) {
        let a = checkpoint_from("a", &params);
        let mut renamed = params.clone();
        renamed[0].0.push_str("_renamed");
        let b = checkpoint_from("b", &renamed);
        prop_assert!(Verifier::default().compare(&a, &b).is_err());
    }
}
