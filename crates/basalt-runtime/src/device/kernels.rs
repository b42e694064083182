//! Reference kernels of the host device.
//!
//! Every kernel reads its operands through the strides of their
//! descriptors, computes in `f64` and converts back to the element type of
//! the output.

use basalt_core::{
    BinaryKind, DeviceDataType, DeviceTensorDesc, GemmBias, OperatorDescriptor, UnaryKind,
    VariadicKind,
};
use half::f16;

/// Read element `index` of `data` as `f64`.
pub(crate) fn read_element(data: &[u8], data_type: DeviceDataType, index: usize) -> f64 {
    let size = data_type.size();
    let bytes = &data[index * size..(index + 1) * size];
    match data_type {
        DeviceDataType::Float64 => bytemuck::pod_read_unaligned::<f64>(bytes),
        DeviceDataType::Float32 => bytemuck::pod_read_unaligned::<f32>(bytes) as f64,
        DeviceDataType::Float16 => f16::from_bits(bytemuck::pod_read_unaligned(bytes)).to_f64(),
        DeviceDataType::Int64 => bytemuck::pod_read_unaligned::<i64>(bytes) as f64,
        DeviceDataType::Int32 => bytemuck::pod_read_unaligned::<i32>(bytes) as f64,
        DeviceDataType::Int16 => bytemuck::pod_read_unaligned::<i16>(bytes) as f64,
        DeviceDataType::Int8 => bytemuck::pod_read_unaligned::<i8>(bytes) as f64,
        DeviceDataType::Uint64 => bytemuck::pod_read_unaligned::<u64>(bytes) as f64,
        DeviceDataType::Uint32 => bytemuck::pod_read_unaligned::<u32>(bytes) as f64,
        DeviceDataType::Uint16 => bytemuck::pod_read_unaligned::<u16>(bytes) as f64,
        DeviceDataType::Uint8 => bytes[0] as f64,
    }
}

/// Write `value` as element `index` of `data`. Integer types truncate and
/// saturate.
pub(crate) fn write_element(data: &mut [u8], data_type: DeviceDataType, index: usize, value: f64) {
    let size = data_type.size();
    let dst = &mut data[index * size..(index + 1) * size];
    match data_type {
        DeviceDataType::Float64 => dst.copy_from_slice(&value.to_le_bytes()),
        DeviceDataType::Float32 => dst.copy_from_slice(&(value as f32).to_le_bytes()),
        DeviceDataType::Float16 => dst.copy_from_slice(&f16::from_f64(value).to_le_bytes()),
        DeviceDataType::Int64 => dst.copy_from_slice(&(value as i64).to_le_bytes()),
        DeviceDataType::Int32 => dst.copy_from_slice(&(value as i32).to_le_bytes()),
        DeviceDataType::Int16 => dst.copy_from_slice(&(value as i16).to_le_bytes()),
        DeviceDataType::Int8 => dst.copy_from_slice(&(value as i8).to_le_bytes()),
        DeviceDataType::Uint64 => dst.copy_from_slice(&(value as u64).to_le_bytes()),
        DeviceDataType::Uint32 => dst.copy_from_slice(&(value as u32).to_le_bytes()),
        DeviceDataType::Uint16 => dst.copy_from_slice(&(value as u16).to_le_bytes()),
        DeviceDataType::Uint8 => dst[0] = value as u8,
    }
}

/// Element offsets of `desc` in row-major order of its sizes.
fn strided_offsets(desc: &DeviceTensorDesc) -> Vec<usize> {
    let strides = desc.effective_strides();
    let mut offsets = Vec::with_capacity(desc.element_count());
    let mut index = vec![0usize; desc.sizes.len()];
    for _ in 0..desc.element_count() {
        offsets.push(index.iter().zip(&strides).map(|(i, s)| i * s).sum());
        for d in (0..index.len()).rev() {
            index[d] += 1;
            if index[d] < desc.sizes[d] {
                break;
            }
            index[d] = 0;
        }
    }
    offsets
}

fn read_all(desc: &DeviceTensorDesc, data: &[u8]) -> Vec<f64> {
    strided_offsets(desc)
        .into_iter()
        .map(|offset| read_element(data, desc.data_type, offset))
        .collect()
}

fn write_all(desc: &DeviceTensorDesc, data: &mut [u8], values: &[f64]) {
    for (offset, &value) in strided_offsets(desc).into_iter().zip(values) {
        write_element(data, desc.data_type, offset, value);
    }
}

/// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.327_591_1 * x.abs());
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let y = 1.0 - poly * (-x * x).exp();
    if x < 0.0 {
        -y
    } else {
        y
    }
}

pub(crate) fn unary(kind: UnaryKind, x: f64, alpha: f64, beta: f64, gamma: f64) -> f64 {
    let bool_value = |b: bool| if b { 1.0 } else { 0.0 };
    match kind {
        UnaryKind::Abs => x.abs(),
        UnaryKind::Acos => x.acos(),
        UnaryKind::Acosh => x.acosh(),
        UnaryKind::Asin => x.asin(),
        UnaryKind::Asinh => x.asinh(),
        UnaryKind::Atan => x.atan(),
        UnaryKind::Atanh => x.atanh(),
        UnaryKind::Ceil => x.ceil(),
        UnaryKind::Cos => x.cos(),
        UnaryKind::Cosh => x.cosh(),
        UnaryKind::Elu => {
            if x >= 0.0 {
                x
            } else {
                alpha * (x.exp() - 1.0)
            }
        }
        UnaryKind::Erf => erf(x),
        UnaryKind::Exp => x.exp(),
        UnaryKind::Floor => x.floor(),
        UnaryKind::IsInf => bool_value(x.is_infinite()),
        UnaryKind::IsNan => bool_value(x.is_nan()),
        UnaryKind::HardSigmoid => (alpha * x + beta).clamp(0.0, 1.0),
        UnaryKind::LeakyRelu => {
            if x >= 0.0 {
                x
            } else {
                alpha * x
            }
        }
        UnaryKind::Log => x.ln(),
        UnaryKind::Neg => -x,
        UnaryKind::Reciprocal => 1.0 / x,
        UnaryKind::Relu => x.max(0.0),
        UnaryKind::Round => x.round_ties_even(),
        UnaryKind::Selu => {
            if x > 0.0 {
                gamma * x
            } else {
                gamma * alpha * (x.exp() - 1.0)
            }
        }
        UnaryKind::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        UnaryKind::Sign => {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                x
            }
        }
        UnaryKind::Sin => x.sin(),
        UnaryKind::Sinh => x.sinh(),
        UnaryKind::Softplus => x.exp().ln_1p(),
        UnaryKind::Softsign => x / (1.0 + x.abs()),
        UnaryKind::Sqrt => x.sqrt(),
        UnaryKind::Tan => x.tan(),
        UnaryKind::Tanh => x.tanh(),
    }
}

pub(crate) fn binary(kind: BinaryKind, a: f64, b: f64) -> f64 {
    match kind {
        BinaryKind::Add => a + b,
        BinaryKind::Sub => a - b,
        BinaryKind::Mul => a * b,
        BinaryKind::Div => a / b,
        BinaryKind::Pow => a.powf(b),
        BinaryKind::Prelu => {
            if a < 0.0 {
                a * b
            } else {
                a
            }
        }
        BinaryKind::Mod { fmod: true } => a % b,
        BinaryKind::Mod { fmod: false } => {
            // Result takes the sign of the divisor.
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
    }
}

fn combine(kind: VariadicKind, acc: f64, x: f64) -> f64 {
    match kind {
        VariadicKind::Max => acc.max(x),
        VariadicKind::Min => acc.min(x),
        VariadicKind::Sum | VariadicKind::Mean => acc + x,
    }
}

/// Run one operator. `inputs` holds the bytes of every input slot, `outputs`
/// the buffers of every output slot.
pub(crate) fn execute(desc: &OperatorDescriptor, inputs: &[Vec<u8>], outputs: &mut [Vec<u8>]) {
    match desc {
        OperatorDescriptor::Unary {
            kind,
            input,
            output,
            alpha,
            beta,
            gamma,
        } => {
            let values: Vec<f64> = read_all(input, &inputs[0])
                .into_iter()
                .map(|x| unary(*kind, x, *alpha as f64, *beta as f64, *gamma as f64))
                .collect();
            write_all(output, &mut outputs[0], &values);
        }
        OperatorDescriptor::Binary { kind, a, b, output } => {
            let lhs = read_all(a, &inputs[0]);
            let rhs = read_all(b, &inputs[1]);
            let values: Vec<f64> = lhs
                .into_iter()
                .zip(rhs)
                .map(|(a, b)| binary(*kind, a, b))
                .collect();
            write_all(output, &mut outputs[0], &values);
        }
        OperatorDescriptor::Variadic {
            kind,
            inputs: descs,
            output,
            passes,
        } => {
            for pass in passes {
                let mut acc: Option<Vec<f64>> = None;
                if pass.output_as_input {
                    acc = Some(read_all(output, &outputs[0]));
                }
                for slot in pass.inputs.clone() {
                    let values = read_all(&descs[slot], &inputs[slot]);
                    acc = Some(match acc {
                        None => values,
                        Some(acc) => acc
                            .into_iter()
                            .zip(values)
                            .map(|(acc, x)| combine(*kind, acc, x))
                            .collect(),
                    });
                }
                let mut values = acc.unwrap_or_default();
                if let Some(scale) = pass.scale {
                    values.iter_mut().for_each(|v| *v *= scale as f64);
                }
                write_all(output, &mut outputs[0], &values);
            }
        }
        OperatorDescriptor::Gemm {
            a,
            b,
            c,
            output,
            alpha,
            beta,
            trans_a,
            trans_b,
            bias,
        } => gemm(
            GemmArgs {
                a,
                b,
                c: c.as_ref(),
                output,
                alpha: *alpha as f64,
                beta: *beta as f64,
                trans_a: *trans_a,
                trans_b: *trans_b,
                bias: *bias,
            },
            inputs,
            &mut outputs[0],
        ),
    }
}

struct GemmArgs<'a> {
    a: &'a DeviceTensorDesc,
    b: &'a DeviceTensorDesc,
    c: Option<&'a DeviceTensorDesc>,
    output: &'a DeviceTensorDesc,
    alpha: f64,
    beta: f64,
    trans_a: bool,
    trans_b: bool,
    bias: GemmBias,
}

fn gemm(args: GemmArgs<'_>, inputs: &[Vec<u8>], out: &mut [u8]) {
    let rank = args.output.sizes.len();
    let (m_dim, n_dim) = (rank - 2, rank - 1);
    let (m_size, n_size) = (args.output.sizes[m_dim], args.output.sizes[n_dim]);
    let k_size = if args.trans_a {
        args.a.sizes[m_dim]
    } else {
        args.a.sizes[n_dim]
    };

    let sa = args.a.effective_strides();
    let sb = args.b.effective_strides();
    let sc = args.c.map(|c| c.effective_strides());
    let so = args.output.effective_strides();

    // (row, col) strides of each matrix as the product reads it.
    let (a_row, a_col) = if args.trans_a {
        (sa[n_dim], sa[m_dim])
    } else {
        (sa[m_dim], sa[n_dim])
    };
    let (b_row, b_col) = if args.trans_b {
        (sb[n_dim], sb[m_dim])
    } else {
        (sb[m_dim], sb[n_dim])
    };

    let batch_sizes = &args.output.sizes[..m_dim];
    let batch_count: usize = batch_sizes.iter().product();
    let mut batch_index = vec![0usize; batch_sizes.len()];

    for _ in 0..batch_count {
        let base = |strides: &[usize]| -> usize {
            batch_index.iter().zip(strides).map(|(i, s)| i * s).sum()
        };
        let (a_base, b_base, o_base) = (base(&sa), base(&sb), base(&so));
        let c_base = sc.as_deref().map(base).unwrap_or(0);

        for m in 0..m_size {
            for n in 0..n_size {
                let mut acc = 0.0;
                for k in 0..k_size {
                    let x = read_element(&inputs[0], args.a.data_type, a_base + m * a_row + k * a_col);
                    let y = read_element(&inputs[1], args.b.data_type, b_base + k * b_row + n * b_col);
                    acc += x * y;
                }
                let mut value = args.alpha * acc;
                if let (Some(c), Some(sc)) = (args.c, sc.as_deref()) {
                    let offset = match args.bias {
                        GemmBias::NoBias => None,
                        GemmBias::Scalar => Some(0),
                        GemmBias::Tensor => Some(c_base + m * sc[m_dim] + n * sc[n_dim]),
                    };
                    if let Some(offset) = offset {
                        value += args.beta * read_element(&inputs[2], c.data_type, offset);
                    }
                }
                let index = o_base + m * so[m_dim] + n * so[n_dim];
                write_element(out, args.output.data_type, index, value);
            }
        }

        for d in (0..batch_index.len()).rev() {
            batch_index[d] += 1;
            if batch_index[d] < batch_sizes[d] {
                break;
            }
            batch_index[d] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_round_trip_f16() {
        let mut data = vec![0u8; 4];
        write_element(&mut data, DeviceDataType::Float16, 1, 1.5);
        assert_eq!(read_element(&data, DeviceDataType::Float16, 1), 1.5);
        assert_eq!(read_element(&data, DeviceDataType::Float16, 0), 0.0);
    }

    #[test]
    fn test_integer_writes_truncate() {
        let mut data = vec![0u8; 4];
        write_element(&mut data, DeviceDataType::Int32, 0, -2.7);
        assert_eq!(read_element(&data, DeviceDataType::Int32, 0), -2.0);
    }

    #[test]
    fn test_unary_edge_cases() {
        assert_eq!(unary(UnaryKind::Sign, 0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(unary(UnaryKind::Round, 2.5, 0.0, 0.0, 0.0), 2.0);
        assert_eq!(unary(UnaryKind::Round, -1.5, 0.0, 0.0, 0.0), -2.0);
        assert_eq!(unary(UnaryKind::IsNan, f64::NAN, 0.0, 0.0, 0.0), 1.0);
        assert_eq!(unary(UnaryKind::HardSigmoid, 10.0, 0.2, 0.5, 0.0), 1.0);
        assert!((unary(UnaryKind::Erf, 1.0, 0.0, 0.0, 0.0) - 0.842_700_79).abs() < 1e-6);
        assert!((unary(UnaryKind::Erf, -0.5, 0.0, 0.0, 0.0) + 0.520_499_88).abs() < 1e-6);
    }

    #[test]
    fn test_mod_sign_conventions() {
        assert_eq!(binary(BinaryKind::Mod { fmod: false }, -7.0, 3.0), 2.0);
        assert_eq!(binary(BinaryKind::Mod { fmod: false }, 7.0, -3.0), -2.0);
        assert_eq!(binary(BinaryKind::Mod { fmod: true }, -7.0, 3.0), -1.0);
        assert_eq!(binary(BinaryKind::Prelu, -2.0, 0.5), -1.0);
    }

    #[test]
    fn test_broadcast_offsets() {
        let desc = DeviceTensorDesc {
            data_type: DeviceDataType::Float32,
            sizes: vec![2, 3],
            strides: Some(vec![0, 1]),
            total_size_bytes: 12,
            owned_by_device: false,
        };
        assert_eq!(strided_offsets(&desc), vec![0, 1, 2, 0, 1, 2]);
    }
}
