//! Common test utilities for operator tests.
//!
//! Operators are initialized straight from the catalog registry, the same
//! way the graph compiler does it.

use basalt_core::{AttributeMap, Operator, OperatorDescriptor, Result, TensorDesc};
use basalt_model::{AttributeValue, DataType};
use basalt_operators::{CatalogOptions, core_operator_registry};
use std::collections::HashMap;

/// Float32 tensor descriptor.
pub fn f32_tensor(name: &str, shape: &[usize]) -> TensorDesc {
    TensorDesc::new(name, DataType::F32, shape)
}

/// Instantiate `op_type` from the catalog and initialize it.
pub fn init_op(
    op_type: &str,
    inputs: &[TensorDesc],
    outputs: &[TensorDesc],
    attributes: &[(&str, AttributeValue)],
) -> Result<Box<dyn Operator>> {
    init_op_with(&CatalogOptions::default(), op_type, inputs, outputs, attributes)
}

/// Like [`init_op`], with explicit catalog options.
pub fn init_op_with(
    options: &CatalogOptions,
    op_type: &str,
    inputs: &[TensorDesc],
    outputs: &[TensorDesc],
    attributes: &[(&str, AttributeValue)],
) -> Result<Box<dyn Operator>> {
    let registry = core_operator_registry(options);
    let factory = registry
        .find(op_type)
        .unwrap_or_else(|| panic!("{op_type} not in catalog"));
    let attrs: HashMap<String, AttributeValue> = attributes
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    let mut op = factory();
    op.initialize(inputs, outputs, &AttributeMap::new(&attrs))?;
    Ok(op)
}

/// Descriptor of an initialized operator.
pub fn descriptor(op: &dyn Operator) -> &OperatorDescriptor {
    op.descriptor().expect("initialized operator has a descriptor")
}
