//! Binding of plain (non-handle) arguments.

use crate::sequence::{ArgValue, Sequence};
use crate::surface::{ApiFunction, ParamKind};

/// Deterministic knobs for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Strategy {
    /// Rotation applied to every literal list
    pub literal_offset: usize,
    /// Repeated calls of a function take successive literals
    pub spread_duplicates: bool,
    /// Nullable buffers and callbacks get `NULL`
    pub null_buffers: bool,
    /// Index into the constructor list when bridging
    pub constructor_choice: usize,
}

/// Fill every param not already bound in `bound`.
///
/// `occurrence` is how many times the function was placed before in the
/// same sequence. Lengths are resolved last, from the buffer they describe.
pub(crate) fn fill_plain_args(
    seq: &mut Sequence,
    function: &ApiFunction,
    strategy: &Strategy,
    occurrence: usize,
    mut bound: Vec<Option<ArgValue>>,
) -> Vec<ArgValue> {
    bound.resize(function.params.len(), None);

    for (slot, param) in bound.iter_mut().zip(&function.params) {
        if slot.is_some() {
            continue;
        }
        *slot = match &param.kind {
            ParamKind::Primitive { values, .. } => {
                let shift = if strategy.spread_duplicates { occurrence } else { 0 };
                Some(literal(values, strategy.literal_offset + shift))
            }
            ParamKind::Buffer {
                c_type,
                size,
                nullable,
                ..
            } => Some(if *nullable && strategy.null_buffers {
                ArgValue::Null
            } else {
                ArgValue::StackBuffer {
                    var: seq.stack_buffer(c_type, *size),
                }
            }),
            ParamKind::Callback { nullable, stub, .. } => Some(match stub {
                Some(expr) if !(*nullable && strategy.null_buffers) => ArgValue::Callback {
                    expr: expr.clone(),
                },
                _ => ArgValue::Null,
            }),
            ParamKind::Length { .. } => None,
            ParamKind::HandleIn { .. } | ParamKind::HandleOut { .. } => Some(ArgValue::Null),
        };
    }

    for (i, param) in function.params.iter().enumerate() {
        let ParamKind::Length { of } = &param.kind else {
            continue;
        };
        let target = function.param_index(of);
        let value = match target.map(|t| (&function.params[t].kind, bound[t].as_ref())) {
            Some((_, Some(ArgValue::StackBuffer { var }))) => ArgValue::Length {
                expr: format!("sizeof({var})"),
                zero: false,
            },
            Some((ParamKind::Buffer { size, .. }, Some(ArgValue::Resource { .. }))) => {
                ArgValue::Length {
                    expr: size.to_string(),
                    zero: *size == 0,
                }
            }
            _ => ArgValue::Length {
                expr: "0".to_string(),
                zero: true,
            },
        };
        bound[i] = Some(value);
    }

    bound
        .into_iter()
        .map(|a| a.unwrap_or(ArgValue::Null))
        .collect()
}

fn literal(values: &[String], index: usize) -> ArgValue {
    let text = if values.is_empty() {
        "0".to_string()
    } else {
        values[index % values.len()].clone()
    };
    ArgValue::Literal { text }
}
