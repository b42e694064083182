//! Tensor and operator tables of a serialized model.
//!
//! A [`Model`] is the flattened, already-optimized form the graph compiler
//! consumes: an ordered tensor table followed by an ordered operator table.
//! Everything refers to tensors by their index in the tensor table.

use crate::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of a node in [`Model::nodes`].
pub type NodeId = usize;

/// Index of a tensor in [`Model::tensors`].
pub type TensorId = usize;

/// Flattened model: tensor table, operator table and the boundary lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model metadata.
    #[serde(default)]
    pub metadata: ModelMetadata,

    /// Tensor table, in declared order.
    pub tensors: Vec<TensorInfo>,

    /// Operator table, in declared order.
    pub nodes: Vec<Node>,

    /// Model input tensors, in declared order.
    pub inputs: Vec<TensorId>,

    /// Model output tensors, in declared order.
    pub outputs: Vec<TensorId>,

    /// Weight tensors, in declared order.
    pub weights: Vec<TensorId>,

    /// Intermediate tensors, in declared order.
    pub intermediates: Vec<TensorId>,
}

/// Metadata about the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name.
    pub name: String,

    /// Name of the tool that produced the model.
    pub producer_name: String,

    /// Model version.
    pub model_version: i64,
}

impl Model {
    /// Create a new empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tensor to the table and to the boundary list matching its kind.
    pub fn add_tensor(&mut self, info: TensorInfo) -> TensorId {
        let id = self.tensors.len();
        match info.kind {
            TensorKind::Input => self.inputs.push(id),
            TensorKind::Output => self.outputs.push(id),
            TensorKind::Weight => self.weights.push(id),
            TensorKind::Intermediate => self.intermediates.push(id),
        }
        self.tensors.push(info);
        id
    }

    /// Add a node to the operator table.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        id
    }

    /// Get tensor info by ID.
    pub fn tensor(&self, id: TensorId) -> Result<&TensorInfo> {
        self.tensors
            .get(id)
            .ok_or_else(|| ModelError::InvalidModel(format!("Invalid tensor ID: {}", id)))
    }

    /// Validate table consistency.
    ///
    /// Every index must be in range, every boundary list must only name
    /// tensors of its kind, and every weight must carry its data.
    pub fn validate(&self) -> Result<()> {
        let lists = [
            (&self.inputs, TensorKind::Input),
            (&self.outputs, TensorKind::Output),
            (&self.weights, TensorKind::Weight),
            (&self.intermediates, TensorKind::Intermediate),
        ];
        for (list, kind) in lists {
            for &id in list {
                let info = self.tensor(id)?;
                if info.kind != kind {
                    return Err(ModelError::InvalidModel(format!(
                        "Tensor '{}' is listed as {:?} but declared as {:?}",
                        info.name, kind, info.kind
                    )));
                }
            }
        }

        for info in &self.tensors {
            if info.kind == TensorKind::Weight && info.initializer.is_none() {
                return Err(ModelError::InvalidModel(format!(
                    "Weight '{}' has no prepared data",
                    info.name
                )));
            }
            if let (Some(data), Some(dims)) = (&info.initializer, info.shape.as_static()) {
                let expected = dims.iter().product::<usize>() * info.dtype.size();
                if data.len() != expected {
                    return Err(ModelError::InvalidModel(format!(
                        "Tensor '{}' carries {} bytes of data, shape {:?} needs {}",
                        info.name,
                        data.len(),
                        dims,
                        expected
                    )));
                }
            }
        }

        for node in &self.nodes {
            for &id in node.inputs.iter().chain(node.outputs.iter()) {
                if id >= self.tensors.len() {
                    return Err(ModelError::InvalidModel(format!(
                        "Node '{}' ({}) references tensor {} out of {}",
                        node.name,
                        node.op_type,
                        id,
                        self.tensors.len()
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A node (operation) in the operator table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node name (may be empty).
    #[serde(default)]
    pub name: String,

    /// Operation type (e.g., "MatMul", "Add", "Relu").
    pub op_type: String,

    /// Input tensor indices.
    pub inputs: Vec<TensorId>,

    /// Output tensor indices.
    pub outputs: Vec<TensorId>,

    /// Node attributes.
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
}

impl Node {
    /// Create a new node.
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            op_type: op_type.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = TensorId>) -> Self {
        self.inputs = inputs.into_iter().collect();
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = TensorId>) -> Self {
        self.outputs = outputs.into_iter().collect();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Name used in logs and error messages: the node name, or its type.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.op_type
        } else {
            &self.name
        }
    }
}

/// Attribute value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
}

impl AttributeValue {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Float(_) => "float",
            AttributeValue::Int(_) => "int",
            AttributeValue::String(_) => "string",
            AttributeValue::Floats(_) => "float array",
            AttributeValue::Ints(_) => "int array",
        }
    }
}

impl TryFrom<AttributeValue> for f32 {
    type Error = String;

    fn try_from(value: AttributeValue) -> std::result::Result<Self, Self::Error> {
        match value {
            AttributeValue::Float(v) => Ok(v),
            // Integer-valued floats are common in exported models.
            AttributeValue::Int(v) => Ok(v as f32),
            other => Err(format!("expected float, got {}", other.type_name())),
        }
    }
}

impl TryFrom<AttributeValue> for i64 {
    type Error = String;

    fn try_from(value: AttributeValue) -> std::result::Result<Self, Self::Error> {
        match value {
            AttributeValue::Int(v) => Ok(v),
            other => Err(format!("expected int, got {}", other.type_name())),
        }
    }
}

/// Information about a tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    /// Tensor name.
    pub name: String,

    /// Data type.
    pub dtype: DataType,

    /// Tensor shape.
    pub shape: TensorShape,

    /// Tensor kind (input, output, weight, intermediate).
    pub kind: TensorKind,

    /// Prepared data (for weights).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<Vec<u8>>,
}

impl TensorInfo {
    /// Create a tensor entry with a static shape and no data.
    pub fn new(name: impl Into<String>, dtype: DataType, shape: &[usize], kind: TensorKind) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape: TensorShape::Static(shape.to_vec()),
            kind,
            initializer: None,
        }
    }

    /// Create a weight entry carrying its prepared data.
    pub fn weight(name: impl Into<String>, dtype: DataType, shape: &[usize], data: Vec<u8>) -> Self {
        Self {
            initializer: Some(data),
            ..Self::new(name, dtype, shape, TensorKind::Weight)
        }
    }
}

/// Element data types a model may declare.
///
/// Not every type is representable on every accelerator; the device layer
/// decides which ones it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    F64,
    F32,
    F16,
    BF16,
    I64,
    I32,
    I16,
    I8,
    U64,
    U32,
    U16,
    U8,
    Bool,
    String,
}

impl DataType {
    /// Size of this data type in bytes.
    ///
    /// Strings have no fixed width and report 0.
    pub fn size(&self) -> usize {
        match self {
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F16 | DataType::BF16 | DataType::I16 | DataType::U16 => 2,
            DataType::I8 | DataType::U8 | DataType::Bool => 1,
            DataType::String => 0,
        }
    }
}

/// Tensor shape representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorShape {
    /// Static shape (all dimensions known).
    Static(Vec<usize>),

    /// Shape with at least one symbolic dimension.
    Dynamic(Vec<Dimension>),

    /// Unknown/unspecified shape.
    Unknown,
}

impl TensorShape {
    /// Get static dimensions if available.
    pub fn as_static(&self) -> Option<&[usize]> {
        match self {
            TensorShape::Static(dims) => Some(dims),
            _ => None,
        }
    }
}

/// A single dimension in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// Static dimension with known size.
    Static(usize),

    /// Named symbolic dimension (e.g., "batch", "sequence").
    Named(String),
}

/// Kind of tensor (determines storage and lifetime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorKind {
    /// Model input (provided by the caller).
    Input,

    /// Model output (returned to the caller).
    Output,

    /// Prepared weight, uploaded once at load time.
    Weight,

    /// Value produced and consumed inside the graph.
    Intermediate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relu_model() -> Model {
        let mut model = Model::new();
        let x = model.add_tensor(TensorInfo::new("x", DataType::F32, &[2, 2], TensorKind::Input));
        let y = model.add_tensor(TensorInfo::new("y", DataType::F32, &[2, 2], TensorKind::Output));
        model.add_node(Node::new("Relu").with_name("relu").with_inputs([x]).with_outputs([y]));
        model
    }

    #[test]
    fn test_add_tensor_fills_boundary_lists() {
        let mut model = relu_model();
        let w = model.add_tensor(TensorInfo::weight("w", DataType::F32, &[1], vec![0; 4]));

        assert_eq!(model.inputs, vec![0]);
        assert_eq!(model.outputs, vec![1]);
        assert_eq!(model.weights, vec![w]);
        assert!(model.intermediates.is_empty());
        model.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_weight_without_data() {
        let mut model = relu_model();
        model.add_tensor(TensorInfo::new("w", DataType::F32, &[4], TensorKind::Weight));

        assert!(matches!(model.validate(), Err(ModelError::InvalidModel(_))));
    }

    #[test]
    fn test_validate_rejects_wrong_data_length() {
        let mut model = relu_model();
        model.add_tensor(TensorInfo::weight("w", DataType::F32, &[4], vec![0; 8]));

        let err = model.validate().unwrap_err();
        assert!(err.to_string().contains("needs 16"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_node_tensor() {
        let mut model = relu_model();
        model.add_node(Node::new("Neg").with_inputs([0]).with_outputs([42]));

        assert!(model.validate().is_err());
    }

    #[test]
    fn test_attribute_conversions() {
        assert_eq!(f32::try_from(AttributeValue::Float(0.5)).unwrap(), 0.5);
        assert_eq!(f32::try_from(AttributeValue::Int(2)).unwrap(), 2.0);
        assert_eq!(i64::try_from(AttributeValue::Int(7)).unwrap(), 7);

        let err = i64::try_from(AttributeValue::Float(1.0)).unwrap_err();
        assert_eq!(err, "expected int, got float");
    }

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::F64.size(), 8);
        assert_eq!(DataType::F16.size(), 2);
        assert_eq!(DataType::Bool.size(), 1);
        assert_eq!(DataType::String.size(), 0);
    }
}
