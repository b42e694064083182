//! Core operator registry.

use basalt_core::{OperatorRegistry, UnaryKind, VariadicKind};

use crate::families::{
    BinaryElementwiseOp, DEFAULT_MAX_FAN_IN, UnaryElementwiseOp, VariadicElementwiseOp,
};
use crate::operators::{GemmOp, MatMulOp};

/// Options shaping the registered operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogOptions {
    /// Inputs combined per dispatch by variadic operators.
    pub max_fan_in: usize,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            max_fan_in: DEFAULT_MAX_FAN_IN,
        }
    }
}

/// Returns an operator registry pre-populated with every catalog operator.
///
/// The registry includes:
/// - 33 unary elementwise operators (Abs ... Tanh)
/// - 7 binary elementwise operators (Add, Sub, Mul, Div, Pow, PRelu, Mod)
/// - 4 variadic elementwise operators (Max, Min, Sum, Mean)
/// - Gemm and MatMul
///
/// Custom operators can be added to the returned registry via
/// `registry.register(name, factory)`.
pub fn core_operator_registry(options: &CatalogOptions) -> OperatorRegistry {
    let mut registry = OperatorRegistry::new();

    for kind in UnaryKind::ALL {
        registry.register(kind.op_type(), move || Box::new(UnaryElementwiseOp::new(kind)));
    }

    // Binary elementwise operators
    registry.register("Add", || Box::new(BinaryElementwiseOp::add()));
    registry.register("Sub", || Box::new(BinaryElementwiseOp::sub()));
    registry.register("Mul", || Box::new(BinaryElementwiseOp::mul()));
    registry.register("Div", || Box::new(BinaryElementwiseOp::div()));
    registry.register("Pow", || Box::new(BinaryElementwiseOp::pow()));
    registry.register("PRelu", || Box::new(BinaryElementwiseOp::prelu()));
    registry.register("Mod", || Box::new(BinaryElementwiseOp::modulo()));

    let max_fan_in = options.max_fan_in;
    for kind in VariadicKind::ALL {
        registry.register(kind.op_type(), move || {
            Box::new(VariadicElementwiseOp::new(kind, max_fan_in))
        });
    }

    // Matrix operators
    registry.register("Gemm", || Box::new(GemmOp::new()));
    registry.register("MatMul", || Box::new(MatMulOp::new()));

    tracing::debug!(operators = registry.len(), "operator catalog registered");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_contents() {
        let registry = core_operator_registry(&CatalogOptions::default());

        assert_eq!(registry.len(), 33 + 7 + 4 + 2);
        for name in ["Neg", "IsNaN", "Add", "PRelu", "Mod", "Mean", "Gemm", "MatMul"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_factory_names_match_keys() {
        let registry = core_operator_registry(&CatalogOptions::default());
        for name in registry.operator_names() {
            let op = registry.find(name).unwrap()();
            assert_eq!(op.name(), name);
        }
    }
}
