//! Rendering of validated sequences as C seed programs.

use crate::result::{SeedsmithError, SeedsmithResult};
use crate::scoring::{QualityBlock, QualityReport};
use crate::sequence::{ArgValue, CallSite, Phase, ValidatedSequence};
use crate::surface::{ReturnSpec, Storage, SurfaceModel};
use regex::Regex;
use serde::Serialize;

const INDENT: &str = "    ";

/// Render one seed file: metadata block, includes and the test function.
pub fn render_seed(
    surface: &SurfaceModel,
    seq: &ValidatedSequence,
    quality: &QualityReport,
    id: u64,
    sentinel: i32,
) -> String {
    let mut out = String::new();

    out.push_str(&format!("// <ID> {id}\n"));
    out.push_str(&format!("// <Prompt> {}\n", one_line(seq.prompt())));
    out.push_str(&format!("// <Combination> {}\n", seq.combination().join(", ")));
    out.push_str(&format!(
        "// <score> {:.2}, nr_unique_branch: {}\n",
        quality.score, quality.nr_unique_branch
    ));
    out.push_str(&format!("// <Quality> {}\n", quality.quality_json()));

    for header in surface.headers() {
        if header.starts_with('<') || header.starts_with('"') {
            out.push_str(&format!("#include {header}\n"));
        } else {
            out.push_str(&format!("#include \"{header}\"\n"));
        }
    }
    out.push_str("#include <string.h>\n\n");

    out.push_str(&format!(
        "int test_{}_api_sequence() {{\n",
        crate::sequence::c_identifier(surface.library())
    ));

    let declarations = declarations(surface, seq);
    if !declarations.is_empty() {
        for line in &declarations {
            out.push_str(&format!("{INDENT}{line}\n"));
        }
        out.push('\n');
    }

    let mut phase: Option<Phase> = None;
    for call in seq.call_sites() {
        if phase != Some(call.phase) {
            if phase.is_some() {
                out.push('\n');
            }
            out.push_str(&format!(
                "{INDENT}// step {}: {}\n",
                call.phase.step(),
                call.phase.label()
            ));
            phase = Some(call.phase);
        }
        out.push_str(&format!("{INDENT}{}\n", statement(surface, seq, call)));
    }
    if phase.is_some() {
        out.push('\n');
    }

    out.push_str(&format!("{INDENT}return {sentinel};\n}}\n"));
    out
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn declarations(surface: &SurfaceModel, seq: &ValidatedSequence) -> Vec<String> {
    let mut lines = Vec::new();
    for res in seq.resources() {
        let Ok(kind) = surface.kind(&res.kind) else {
            continue;
        };
        match kind.storage {
            Storage::Pointer => lines.push(format!("{} *{} = NULL;", kind.c_type, res.var)),
            Storage::Value => {
                lines.push(format!("{} {};", kind.c_type, res.var));
                lines.push(format!("memset(&{0}, 0, sizeof({0}));", res.var));
            }
        }
    }
    for buf in seq.buffers() {
        lines.push(format!("{} {}[{}];", buf.c_type, buf.var, buf.size));
        lines.push(format!("memset({0}, 0, sizeof({0}));", buf.var));
    }
    lines
}

fn statement(surface: &SurfaceModel, seq: &ValidatedSequence, call: &CallSite) -> String {
    let args: Vec<String> = call.args.iter().map(|a| argument(seq, a)).collect();
    let invocation = format!("{}({})", call.function, args.join(", "));
    let returns = surface
        .function(&call.function)
        .map_or(&ReturnSpec::Void, |f| &f.returns);

    match returns {
        ReturnSpec::Void => format!("{invocation};"),
        ReturnSpec::Status { c_type } | ReturnSpec::Value { c_type } => {
            format!("{c_type} ret_{} = {invocation};", call.id)
        }
        ReturnSpec::Handle { .. } => match call.produces.and_then(|r| seq.resource(r)) {
            Some(res) => format!("{} = {invocation};", res.var),
            None => format!("{invocation};"),
        },
    }
}

fn argument(seq: &ValidatedSequence, arg: &ArgValue) -> String {
    let var = |id| seq.resource(id).map_or_else(|| "NULL".to_string(), |r| r.var.clone());
    match arg {
        ArgValue::Resource { id, by_ref: true } | ArgValue::Output { id } => {
            format!("&{}", var(*id))
        }
        ArgValue::Resource { id, by_ref: false } => var(*id),
        ArgValue::Literal { text } => text.clone(),
        ArgValue::StackBuffer { var } => var.clone(),
        ArgValue::Null => "NULL".to_string(),
        ArgValue::Length { expr, .. } | ArgValue::Callback { expr } => expr.clone(),
    }
}

/// Metadata block read back from an emitted seed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedHeader {
    pub id: u64,
    pub prompt: String,
    pub combination: Vec<String>,
    pub score: f64,
    pub nr_unique_branch: usize,
    pub quality: QualityBlock,
}

/// Parse the `<ID>`..`<Quality>` comment block of a seed.
pub fn parse_seed_header(text: &str) -> SeedsmithResult<SeedHeader> {
    let id: u64 = capture(text, r"(?m)^// <ID> (\d+)\s*$", "<ID>")?
        .parse()
        .map_err(|e| header_error(format!("<ID>: {e}")))?;
    let prompt = capture(text, r"(?m)^// <Prompt> ?(.*?)\s*$", "<Prompt>")?;
    let combination = capture(text, r"(?m)^// <Combination> ?(.*?)\s*$", "<Combination>")?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();

    let pattern = r"(?m)^// <score> ([-+0-9.eE]+), nr_unique_branch: (\d+)\s*$";
    let re = Regex::new(pattern).map_err(|e| header_error(e.to_string()))?;
    let caps = re
        .captures(text)
        .ok_or_else(|| header_error("missing <score> line".to_string()))?;
    let score: f64 = caps[1]
        .parse()
        .map_err(|e| header_error(format!("<score>: {e}")))?;
    let nr_unique_branch: usize = caps[2]
        .parse()
        .map_err(|e| header_error(format!("nr_unique_branch: {e}")))?;

    let quality_json = capture(text, r"(?m)^// <Quality> (\{.*\})\s*$", "<Quality>")?;
    let quality: QualityBlock = serde_json::from_str(&quality_json)
        .map_err(|e| header_error(format!("<Quality>: {e}")))?;

    Ok(SeedHeader {
        id,
        prompt,
        combination,
        score,
        nr_unique_branch,
        quality,
    })
}

fn capture(text: &str, pattern: &str, tag: &str) -> SeedsmithResult<String> {
    let re = Regex::new(pattern).map_err(|e| header_error(e.to_string()))?;
    re.captures(text)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| header_error(format!("missing {tag} line")))
}

fn header_error(message: String) -> SeedsmithError {
    SeedsmithError::SeedHeader { message }
}
