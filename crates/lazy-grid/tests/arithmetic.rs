//! Binary and unary arithmetic through the mock engine.

mod common;

use std::path::Path;

use common::{values, Harness};
use lazy_grid::{Dataset, TimeGroup};
use serde_json::json;
use test_utils::{assert_all_approx_eq, assert_approx_eq};

#[test]
fn test_add_scalar() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut original = h.open(&sst);
    let expected: Vec<f64> = values(&mut original, "sst").iter().map(|v| v + 1.0).collect();

    let mut ds = h.open(&sst);
    ds.add(1).unwrap();
    assert_eq!(ds.pending().len(), 1);
    assert_all_approx_eq!(&values(&mut ds, "sst"), &expected, 1e-9);
}

#[test]
fn test_add_zero_is_identity() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut original = h.open(&sst);
    let mut ds = h.open(&sst);
    ds.add(0).unwrap();
    assert_eq!(values(&mut ds, "sst"), values(&mut original, "sst"));
}

#[test]
fn test_add_then_subtract_dataset() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut original = h.open(&sst);
    let mut other = h.open(&sst);

    let mut ds = h.open(&sst);
    ds.add(&mut other).unwrap().subtract(&mut other).unwrap();
    assert_all_approx_eq!(
        &values(&mut ds, "sst"),
        &values(&mut original, "sst"),
        1e-9
    );
}

#[test]
fn test_copy_then_add_original_doubles() {
    let h = Harness::new();
    let mut ds = h.open(&h.fixtures.sst());
    let mut doubled = ds.copy();
    doubled.add(&mut ds).unwrap();

    let expected: Vec<f64> = values(&mut ds, "sst").iter().map(|v| v * 2.0).collect();
    assert_all_approx_eq!(&values(&mut doubled, "sst"), &expected, 1e-9);
}

#[test]
fn test_add_own_snapshot() {
    let h = Harness::new();
    let mut ds = h.open(&h.fixtures.sst());
    ds.add(1).unwrap();
    let before = values(&mut ds, "sst");

    let snapshot = ds.snapshot().unwrap();
    ds.add(snapshot).unwrap();
    let after = values(&mut ds, "sst");
    for (a, b) in after.iter().zip(&before) {
        assert_approx_eq!(*a, b * 2.0, 1e-9);
    }
}

#[test]
fn test_divide_by_itself_is_one() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut other = h.open(&sst);
    let mut ds = h.open(&sst);
    ds.divide(&mut other).unwrap();
    assert!(values(&mut ds, "sst").iter().all(|v| (v - 1.0).abs() < 1e-12));
}

#[test]
fn test_multiply_by_file() {
    let h = Harness::new();
    let twos = h.fixtures.constant("sst", 2.0);
    let sst = h.fixtures.sst();
    let mut original = h.open(&sst);

    let mut ds = h.open(&sst);
    ds.multiply(twos.as_path()).unwrap();
    let expected: Vec<f64> = values(&mut original, "sst").iter().map(|v| v * 2.0).collect();
    assert_all_approx_eq!(&values(&mut ds, "sst"), &expected, 1e-9);
}

#[test]
fn test_subtract_own_variable() {
    let h = Harness::new();
    let mut ds = h.open(&h.fixtures.two_variables());
    ds.subtract("sst").unwrap();

    assert!(values(&mut ds, "sst").iter().all(|v| v.abs() < 1e-12));
    assert!(values(&mut ds, "tos").iter().all(|v| (v - 1.0).abs() < 1e-12));
}

#[test]
fn test_add_single_variable_of_operand() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let both = h.fixtures.two_variables();
    let mut original = h.open(&sst);

    let mut ds = h.open(&sst);
    ds.add_var(both.as_path(), "tos").unwrap();
    let expected: Vec<f64> = values(&mut original, "sst")
        .iter()
        .map(|v| 2.0 * v + 1.0)
        .collect();
    assert_all_approx_eq!(&values(&mut ds, "sst"), &expected, 1e-9);
}

#[test]
fn test_power_and_unary_functions() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut original = h.open(&sst);
    let base = values(&mut original, "sst");

    let mut ds = h.open(&sst);
    ds.power(2).unwrap().sqrt().unwrap();
    assert_all_approx_eq!(&values(&mut ds, "sst"), &base, 1e-9);

    let mut ds = h.open(&sst);
    ds.log().unwrap().exp().unwrap();
    assert_all_approx_eq!(&values(&mut ds, "sst"), &base, 1e-9);

    let mut ds = h.open(&sst);
    ds.multiply(-1).unwrap().abs().unwrap().square().unwrap().log10().unwrap();
    let expected: Vec<f64> = base.iter().map(|v| (v * v).log10()).collect();
    assert_all_approx_eq!(&values(&mut ds, "sst"), &expected, 1e-9);
}

#[test]
fn test_rmse_against_itself_is_zero() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut other = h.open(&sst);
    let mut ds = h.open(&sst);
    ds.rmse(&mut other).unwrap();

    let layout = ds.layout().unwrap();
    assert_eq!(layout[0].timesteps(), 1);
    assert!(values(&mut ds, "sst").iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn test_climatology_operand_uses_month_of_year() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut climatology = h.open(&sst);
    climatology.tmean(TimeGroup::Month).unwrap();

    let mut ds = h.open(&sst);
    ds.subtract(&mut climatology).unwrap();
    ds.run().unwrap();

    let last = h.engine.invocations().pop().unwrap();
    assert_eq!(last.steps[0].operator, "ymonsub");

    // Each month minus its ten-year mean: year offset minus 4.5.
    let result = values(&mut ds, "sst");
    assert_approx_eq!(result[0], -4.5, 1e-9);
    assert_approx_eq!(*result.last().unwrap(), 4.5, 1e-9);
}

#[test]
fn test_single_timestep_operand_broadcasts() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut mean = h.open(&sst);
    mean.tmean(TimeGroup::All).unwrap();

    let mut ds = h.open(&sst);
    ds.subtract(&mut mean).unwrap().tmean(TimeGroup::All).unwrap();
    assert!(values(&mut ds, "sst").iter().all(|v| v.abs() < 1e-9));
}

/// Open `sst` and run one step so the receiver holds a registered temp file.
fn realized(h: &Harness) -> Dataset {
    let mut ds = h.open(&h.fixtures.sst());
    ds.add(0).unwrap();
    ds.run().unwrap();
    assert_eq!(h.session.session_files().len(), 1);
    ds
}

#[test]
fn test_collection_operand_is_type_error() {
    let h = Harness::new();
    let mut ds = realized(&h);
    let before = h.session.session_files();

    assert!(ds.add(json!([1, 2])).unwrap_err().is_type_error());
    assert!(ds.subtract(json!(true)).unwrap_err().is_type_error());
    assert!(ds.pending().is_empty());
    assert_eq!(h.session.session_files(), before);
}

#[test]
fn test_collection_operand_on_empty_dataset_is_type_error() {
    let h = Harness::new();
    let mut ds = Dataset::empty(&h.session);
    assert!(ds.multiply(json!([1, 2])).unwrap_err().is_type_error());
    assert!(ds.add_var(json!({"a": 1}), "sst").unwrap_err().is_type_error());
    assert!(ds.power(json!("x")).unwrap_err().is_type_error());
    assert!(ds.rmse(1.0).unwrap_err().is_type_error());

    // A well-typed operand still reports the missing data.
    assert!(ds.multiply(json!(2)).unwrap_err().is_value_error());
    assert!(h.session.session_files().is_empty());
}

#[test]
fn test_unknown_variable_operand_is_value_error() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut ds = realized(&h);
    let before = h.session.session_files();
    assert!(ds.add("xyz").unwrap_err().is_value_error());

    let mut other = h.open(&sst);
    other.abs().unwrap();
    assert!(ds.add_var(&mut other, "x").unwrap_err().is_value_error());
    assert!(ds.pending().is_empty());
    assert_eq!(other.pending().len(), 1);
    assert_eq!(h.session.session_files(), before);
}

#[test]
fn test_single_variable_operand_must_exist_in_receiver() {
    let h = Harness::new();
    let mut ds = realized(&h);
    let before = h.session.session_files();

    let mut tos = h.open(&h.fixtures.two_variables());
    tos.select_variables(["tos"]).unwrap();
    assert!(ds.add(&mut tos).unwrap_err().is_value_error());
    assert!(ds.pending().is_empty());
    assert_eq!(tos.pending().len(), 1);
    assert_eq!(h.session.session_files(), before);

    // The same single-variable operand applies to a receiver that has it.
    let mut both = h.open(&h.fixtures.two_variables());
    assert!(both.add(&mut tos).is_ok());
}

#[test]
fn test_var_with_scalar_is_value_error() {
    let h = Harness::new();
    let mut ds = realized(&h);
    let before = h.session.session_files();
    assert!(ds.add_var(1, "sst").unwrap_err().is_value_error());
    assert_eq!(h.session.session_files(), before);
}

#[test]
fn test_empty_receiver_is_value_error() {
    let h = Harness::new();
    let mut ds = Dataset::empty(&h.session);
    assert!(ds.add(1).unwrap_err().is_value_error());
    assert!(ds.abs().unwrap_err().is_value_error());
    assert!(ds.power(2).unwrap_err().is_value_error());
    assert!(h.session.session_files().is_empty());
}

#[test]
fn test_empty_operand_is_value_error() {
    let h = Harness::new();
    let mut ds = realized(&h);
    let before = h.session.session_files();
    let mut empty = Dataset::empty(&h.session);
    assert!(ds.add(&mut empty).unwrap_err().is_value_error());
    assert_eq!(h.session.session_files(), before);
}

#[test]
fn test_missing_file_operand_is_value_error() {
    let h = Harness::new();
    let mut ds = realized(&h);
    let before = h.session.session_files();
    let err = ds.add(Path::new("/definitely/not/here.nc")).unwrap_err();
    assert!(err.is_value_error());
    assert_eq!(h.session.session_files(), before);
}

#[test]
fn test_file_count_rules() {
    let h = Harness::new();
    let two = h.fixtures.sst_ensemble(2);
    let three = h.fixtures.sst_ensemble(3);

    let mut ds = h.open_all(&two);
    let mut operand = h.open_all(&three);
    operand.abs().unwrap();
    assert!(ds.add(&mut operand).unwrap_err().is_value_error());

    // Several operand files never spread over a single receiver file.
    let mut one = h.open(&two[0]);
    assert!(one.add(&mut operand).unwrap_err().is_value_error());
    assert!(one.pending().is_empty());
    assert_eq!(operand.pending().len(), 1);
    assert!(h.session.session_files().is_empty());

    // A single-file operand applies to every member.
    let mut single = h.open(&two[0]);
    ds.subtract(&mut single).unwrap();
    let result = values(&mut ds, "sst");
    assert_eq!(result.len(), 2 * 12 * 12);
    assert!(result[..144].iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn test_incompatible_grid_is_value_error() {
    let h = Harness::new();
    let mut ds = realized(&h);
    let before = h.session.session_files();
    let mut coarse = h.open(&h.fixtures.coarse());
    coarse.abs().unwrap();
    assert!(ds.add(&mut coarse).unwrap_err().is_value_error());
    assert_eq!(coarse.pending().len(), 1);
    assert_eq!(h.session.session_files(), before);
}

#[test]
fn test_incompatible_time_axis_is_value_error() {
    let h = Harness::new();
    let sst = h.fixtures.sst();
    let mut ds = h.open(&sst);
    let mut partial = h.open(&sst);
    partial.subset_timesteps(0..5).unwrap();

    assert!(ds.add(&mut partial).unwrap_err().is_value_error());
    // A rejected operand is never executed.
    assert_eq!(partial.pending().len(), 1);
    assert_eq!(h.engine.invocation_count(), 0);
    assert!(h.session.session_files().is_empty());

    let mut ds = realized(&h);
    let before = h.session.session_files();
    assert!(ds.add(&mut partial).unwrap_err().is_value_error());
    assert_eq!(h.session.session_files(), before);
}

#[test]
fn test_non_numeric_exponent_is_type_error() {
    let h = Harness::new();
    let mut ds = realized(&h);
    let before = h.session.session_files();
    assert!(ds.power("x").unwrap_err().is_type_error());
    assert!(ds.power(json!("x")).unwrap_err().is_type_error());
    assert_eq!(h.session.session_files(), before);
    assert!(ds.power(json!(2)).is_ok());
}

#[test]
fn test_rmse_needs_dataset() {
    let h = Harness::new();
    let mut ds = realized(&h);
    let before = h.session.session_files();
    assert!(ds.rmse(1.0).unwrap_err().is_type_error());
    assert_eq!(h.session.session_files(), before);
}
