//! Tests for building and reshaping fields through the public API.

use cf_model::{Data, Field, ModelError, Units, Variable};

const TIME: &str = "days since 2000-01-01";

fn coordinate(values: Vec<f64>, units: &str, name: &str) -> Variable {
    Variable::new(Data::from_vec(values, Units::new(units))).with_standard_name(name)
}

fn time_lat_field() -> Field {
    let mut f = Field::new("air_temperature", Units::new("K"));
    let t = f.add_axis(3);
    let y = f.add_axis(2);
    f.set_dimension_coordinate(
        &t,
        coordinate(vec![0.0, 1.0, 2.0], TIME, "time")
            .with_bounds(Data::from_shape_vec(&[3, 2], vec![-0.5, 0.5, 0.5, 1.5, 1.5, 2.5], Units::new(TIME)).unwrap()),
    )
    .unwrap();
    f.set_dimension_coordinate(&y, coordinate(vec![-45.0, 45.0], "degrees_north", "latitude"))
        .unwrap();
    f.set_data(
        Data::from_shape_vec(&[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Units::none()).unwrap(),
        &[t.as_str(), y.as_str()],
    )
    .unwrap();
    f
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_axis_keys_are_sequential() {
    let mut f = Field::new("air_temperature", Units::new("K"));
    assert_eq!(f.add_axis(2), "dim0");
    assert_eq!(f.add_axis(3), "dim1");
    assert_eq!(f.axis_size("dim1").unwrap(), 3);
    assert!(f.axis_size("dim2").is_err());
}

#[test]
fn test_data_takes_field_units() {
    let f = time_lat_field();
    assert_eq!(f.data.as_ref().unwrap().units(), &Units::new("K"));
}

#[test]
fn test_mismatched_coordinate_rejected() {
    let mut f = Field::new("air_temperature", Units::new("K"));
    let t = f.add_axis(2);
    let err = f
        .set_dimension_coordinate(&t, coordinate(vec![0.0, 1.0, 2.0], TIME, "time"))
        .unwrap_err();
    assert!(matches!(err, ModelError::ShapeMismatch(_)));
}

#[test]
fn test_multi_axis_auxiliary_coordinate() {
    let mut f = time_lat_field();
    let aux = Variable::new(Data::from_shape_vec(&[2, 3], vec![0.0; 6], Units::new("m")).unwrap()).with_id("altitude");
    let key = f.add_auxiliary_coordinate(aux, &["dim1", "dim0"]).unwrap();
    assert_eq!(key, "aux0");
    assert!(f.auxiliary_coordinates[&key].spans("dim0"));
    assert_eq!(f.auxiliary_coordinates[&key].position("dim0"), Some(1));
}

// ============================================================================
// Reshaping
// ============================================================================

#[test]
fn test_flip_reverses_data_coordinates_and_bounds() {
    let mut f = time_lat_field();
    assert!(f.direction("dim0"));
    f.flip("dim0").unwrap();
    assert!(!f.direction("dim0"));

    let time = &f.dimension_coordinates["dim0"];
    assert_eq!(time.data.as_ref().unwrap().to_f64_vec().unwrap(), vec![2.0, 1.0, 0.0]);
    assert_eq!(
        time.bounds.as_ref().unwrap().to_f64_vec().unwrap(),
        vec![2.5, 1.5, 1.5, 0.5, 0.5, -0.5]
    );
    assert_eq!(
        f.data.as_ref().unwrap().to_f64_vec().unwrap(),
        vec![5.0, 6.0, 3.0, 4.0, 1.0, 2.0]
    );
}

#[test]
fn test_expand_dims_requires_size_one() {
    let mut f = time_lat_field();
    let z = f.add_axis(1);
    let w = f.add_axis(2);
    f.expand_dims(0, &z).unwrap();
    assert_eq!(f.data.as_ref().unwrap().shape(), &[1, 3, 2]);
    assert_eq!(f.data_axes[0], z);
    assert!(f.expand_dims(0, &w).is_err());
    assert!(f.expand_dims(0, &z).is_err());
}

#[test]
fn test_transpose_data() {
    let mut f = time_lat_field();
    f.transpose_data(&["dim1".to_string(), "dim0".to_string()]).unwrap();
    assert_eq!(f.data.as_ref().unwrap().shape(), &[2, 3]);
    assert_eq!(
        f.data.as_ref().unwrap().to_f64_vec().unwrap(),
        vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]
    );
    assert!(f.transpose_data(&["dim5".to_string(), "dim0".to_string()]).is_err());
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_identity_fallbacks() {
    let mut f = Field::new("air_temperature", Units::new("K"))
        .with_property("long_name", "Air temperature")
        .with_ncvar("tas");
    assert_eq!(f.identity(true, false).as_deref(), Some("air_temperature"));
    assert_eq!(f.identity(true, true).as_deref(), Some("tas"));

    f.del_property("standard_name");
    assert_eq!(f.identity(true, false), None);
    assert_eq!(f.identity(false, false).as_deref(), Some("Air temperature"));
}
