//! Operator trait for the extensible operator catalog.

use crate::attributes::AttributeMap;
use crate::descriptor::OperatorDescriptor;
use crate::tensor::TensorDesc;
use crate::Result;

/// A model operator.
///
/// Operators are created fresh for every node by a registry factory, then
/// initialized once with the node's concrete tensors and attributes. A
/// successful initialization leaves a device-neutral descriptor behind that
/// the accelerator turns into a device operator.
///
/// # Example
///
/// ```ignore
/// struct NegOperator {
///     descriptor: Option<OperatorDescriptor>,
/// }
///
/// impl Operator for NegOperator {
///     fn name(&self) -> &str {
///         "Neg"
///     }
///
///     fn initialize(&mut self, inputs: &[TensorDesc], outputs: &[TensorDesc], _attrs: &AttributeMap) -> Result<()> {
///         self.descriptor = Some(OperatorDescriptor::Unary { /* ... */ });
///         Ok(())
///     }
///
///     fn descriptor(&self) -> Option<&OperatorDescriptor> {
///         self.descriptor.as_ref()
///     }
/// }
/// ```
pub trait Operator: Send + Sync {
    /// Operator type name (e.g., "Add", "MatMul").
    fn name(&self) -> &str;

    /// Validate arity, shapes and attributes and build the descriptor.
    ///
    /// Any failure aborts the whole model load.
    fn initialize(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
        attributes: &AttributeMap<'_>,
    ) -> Result<()>;

    /// Descriptor built by a successful [`Operator::initialize`].
    fn descriptor(&self) -> Option<&OperatorDescriptor>;
}
