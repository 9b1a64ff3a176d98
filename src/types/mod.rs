//! Value types carried by the codec.
//!
//! The value model mirrors the OPC UA built-in type system:
//! - [`BuiltInType`] numbers the 30 canonical kinds (0 = Null through 29 = Enumeration)
//! - [`Value`] holds one scalar of any built-in type
//! - [`Variant`] wraps a null, scalar, array or matrix value
//! - [`DataValue`] adds status and timestamps to a variant
//! - [`DataSet`] is an ordered set of named data values forming one message
//!
//! ## Usage Example
//!
//! ```rust
//! use opcua_avro::types::{Array, BuiltInType, DataSet, DataValue, Value, Variant};
//!
//! let speeds = Array::new(BuiltInType::Double, vec![Value::Double(1.0), Value::Double(2.5)]).unwrap();
//! let data_set = DataSet::new(Some("Motor".to_string()))
//!     .with_field("Running", DataValue::new(true))
//!     .with_field("Speeds", DataValue::new(Variant::Array(speeds)));
//!
//! assert_eq!(data_set.len(), 2);
//! assert_eq!(data_set.get("Running").unwrap().value, Variant::from(true));
//! ```

mod built_in;
mod data_set;
mod data_value;
mod extension_object;
mod node_id;
mod variant;

pub use built_in::BuiltInType;
pub use data_set::{DataSet, DataSetField, FieldContent};
pub use data_value::{DataValue, DateTime, DiagnosticInfo, StatusCode};
pub use extension_object::{ExtensionObject, ExtensionObjectBody, Structure, StructureField};
pub use node_id::{ExpandedNodeId, Identifier, LocalizedText, NodeId, QualifiedName};
pub use variant::{Array, Matrix, Value, Variant};

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    prop_compose! {
        fn arb_scalar()(
            choice in 0..6usize,
            int in any::<i32>(),
            long in any::<i64>(),
            double in any::<f64>().prop_filter("finite", |d| d.is_finite()),
            text in "[a-zA-Z0-9 ]{0,16}",
            flag in any::<bool>()
        ) -> Value {
            match choice {
                0 => Value::Int32(int),
                1 => Value::Int64(long),
                2 => Value::Double(double),
                3 => Value::String(text),
                4 => Value::Boolean(flag),
                _ => Value::StatusCode(StatusCode(int as u32)),
            }
        }
    }

    proptest! {
        #[test]
        fn prop_homogeneous_arrays_are_accepted(values in prop::collection::vec(any::<i32>(), 0..32)) {
            let elements: Vec<Value> = values.into_iter().map(Value::Int32).collect();
            let array = Array::new(BuiltInType::Int32, elements.clone()).unwrap();
            prop_assert_eq!(array.elements(), elements.as_slice());
        }

        #[test]
        fn prop_scalar_type_is_reported(value in arb_scalar()) {
            let ty = value.built_in_type();
            prop_assert!(ty.is_variant_member());
            prop_assert_eq!(Variant::Scalar(value).built_in_type(), ty);
        }

        #[test]
        fn prop_matrix_dimensions_must_cover_elements(rows in 1u32..5, cols in 1u32..5, extra in 1usize..3) {
            let count = (rows * cols) as usize;
            let elements = vec![Value::Float(0.5); count];
            prop_assert!(Matrix::new(BuiltInType::Float, vec![rows, cols], elements).is_ok());

            let elements = vec![Value::Float(0.5); count + extra];
            prop_assert!(Matrix::new(BuiltInType::Float, vec![rows, cols], elements).is_err());
        }
    }

    #[test]
    fn mixed_arrays_are_rejected() {
        let result = Array::new(BuiltInType::Int32, vec![Value::Int32(1), Value::Int64(2)]);
        assert!(result.is_err());
    }

    #[test]
    fn data_set_preserves_field_order() {
        let data_set = DataSet::new(None)
            .with_field("b", DataValue::new(1i32))
            .with_field("a", DataValue::new(2i32));
        let names: Vec<&str> = data_set.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert!(data_set.is_raw());
    }
}
