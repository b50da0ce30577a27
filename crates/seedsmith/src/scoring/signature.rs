//! Qualitative branch signatures of call sites.

use crate::sequence::{ArgValue, CallSite};
use crate::surface::SurfaceModel;

/// Qualitative shape of one bound argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArgShape {
    Handle,
    Null,
    Buffer,
    Length,
    Zero,
    Negative,
    Positive,
    Str,
    EmptyStr,
    Literal,
    Callback,
}

impl ArgShape {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handle => "handle",
            Self::Null => "null",
            Self::Buffer => "buf",
            Self::Length => "len",
            Self::Zero => "zero",
            Self::Negative => "neg",
            Self::Positive => "pos",
            Self::Str => "str",
            Self::EmptyStr => "empty-str",
            Self::Literal => "lit",
            Self::Callback => "cb",
        }
    }

    /// Shape of a bound argument.
    pub fn of(arg: &ArgValue) -> Self {
        match arg {
            ArgValue::Resource { .. } | ArgValue::Output { .. } => Self::Handle,
            ArgValue::Null => Self::Null,
            ArgValue::StackBuffer { .. } => Self::Buffer,
            ArgValue::Length { zero: true, .. } => Self::Zero,
            ArgValue::Length { .. } => Self::Length,
            ArgValue::Callback { .. } => Self::Callback,
            ArgValue::Literal { text } => classify_literal(text),
        }
    }
}

impl std::fmt::Display for ArgShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a C literal expression.
pub fn classify_literal(text: &str) -> ArgShape {
    let text = text.trim();
    match text {
        "NULL" | "nullptr" => return ArgShape::Null,
        "\"\"" => return ArgShape::EmptyStr,
        _ => {}
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return ArgShape::Str;
    }

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex.trim_end_matches(['u', 'U', 'l', 'L']), 16)
            .ok()
            .map(|v| v as f64)
    } else {
        digits
            .trim_end_matches(['u', 'U', 'l', 'L', 'f', 'F'])
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    };

    match magnitude {
        Some(v) if v == 0.0 => ArgShape::Zero,
        Some(_) if negative => ArgShape::Negative,
        Some(_) => ArgShape::Positive,
        None => ArgShape::Literal,
    }
}

/// `function(shape,...)` for a call to a declared function, `None` when
/// the surface has no rule for it.
pub fn branch_signature(surface: &SurfaceModel, call: &CallSite) -> Option<String> {
    surface.function(&call.function)?;
    let shapes: Vec<&str> = call.args.iter().map(|a| ArgShape::of(a).as_str()).collect();
    Some(format!("{}({})", call.function, shapes.join(",")))
}
