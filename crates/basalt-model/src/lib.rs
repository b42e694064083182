//! Serialized model format for basalt.
//!
//! A model is an ordered tensor table followed by an ordered operator table,
//! stored as JSON. This crate only describes and validates that table; it does
//! not optimize or re-infer shapes.
//!
//! # Example
//!
//! ```no_run
//! use basalt_model::load_model;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = load_model("model.json")?;
//!
//! println!("Model: {}", model.metadata.name);
//! println!("Nodes: {}", model.nodes.len());
//! println!("Tensors: {}", model.tensors.len());
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::Path;
use thiserror::Error;

pub mod model;

pub use model::{
    AttributeValue, DataType, Dimension, Model, ModelMetadata, Node, NodeId, TensorId, TensorInfo,
    TensorKind, TensorShape,
};

/// Errors that can occur when loading or validating models.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to decode model: {0}")]
    DecodeError(#[from] serde_json::Error),

    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

impl Model {
    /// Decode a model from its JSON form and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Model = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    /// Encode the model as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Load a model from a file.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Model> {
    let json = fs::read_to_string(path)?;
    Model::from_json(&json)
}

/// Save a model to a file.
pub fn save_model<P: AsRef<Path>>(model: &Model, path: P) -> Result<()> {
    fs::write(path, model.to_json()?)?;
    Ok(())
}
