//! WGSL compute shader emission for lowered rules.

use std::fmt::Write;

use voxel_ca_core::Offset;

use super::ir::{Cursor, KernelCond, KernelExpr, KernelRule, KernelStmt};
use super::KernelConfig;

/// Module header: neighbor table, window constants and the cell reader.
pub const HEADER_TEMPLATE: &str = r#"// ============================================================================
// Generated cellular automaton kernel
// ============================================================================

const RADIUS: i32 = {radius};
const SIDE: i32 = {side};
const NEIGHBOR_COUNT: u32 = {count}u;
const AIR: i32 = 0;

const NEIGHBOR_OFFSETS = array<vec3<i32>, {count}>(
{offsets}
);

struct Params {
    cell_count: u32,
}

@group(0) @binding(0) var<storage, read> input: array<i32>;
@group(0) @binding(1) var<storage, read_write> output: array<i32>;
@group(0) @binding(2) var<uniform> params: Params;

var<private> neighbors: array<i32, NEIGHBOR_COUNT>;

// Primitive at `p` relative to the evaluated cell; AIR outside the window.
fn cell(p: vec3<i32>) -> i32 {
    if (any(abs(p) > vec3<i32>(RADIUS))) {
        return AIR;
    }
    let q = p + vec3<i32>(RADIUS);
    return neighbors[(q.z * SIDE + q.y) * SIDE + q.x];
}
"#;

/// Entry point reading one window per invocation.
pub const ENTRY_TEMPLATE: &str = r#"
@compute @workgroup_size({wx}, {wy}, {wz})
fn {entry}(
    @builtin(global_invocation_id) id: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let width = groups.x * {wx}u;
    let height = groups.y * {wy}u;
    let cell_index = id.x + width * (id.y + height * id.z);
    if (cell_index >= params.cell_count) {
        return;
    }

    let base = cell_index * NEIGHBOR_COUNT;
    for (var n: u32 = 0u; n < NEIGHBOR_COUNT; n = n + 1u) {
        neighbors[n] = input[base + n];
    }
    output[cell_index] = iterate();
}
"#;

/// Render the complete shader module.
pub fn render(config: &KernelConfig, table: &[Offset], rules: &[KernelRule]) -> String {
    let side = 2 * config.radius + 1;
    let offsets = table
        .iter()
        .map(|o| format!("    vec3<i32>({}, {}, {}),", o.x, o.y, o.z))
        .collect::<Vec<_>>()
        .join("\n");

    let mut source = HEADER_TEMPLATE
        .replace("{radius}", &config.radius.to_string())
        .replace("{side}", &side.to_string())
        .replace("{count}", &table.len().to_string())
        .replace("{offsets}", &offsets);

    source.push_str(&render_iterate(rules));

    let [wx, wy, wz] = config.workgroup_size;
    source.push_str(
        &ENTRY_TEMPLATE
            .replace("{wx}", &wx.to_string())
            .replace("{wy}", &wy.to_string())
            .replace("{wz}", &wz.to_string())
            .replace("{entry}", &config.entry_point),
    );
    source
}

fn render_iterate(rules: &[KernelRule]) -> String {
    let mut out = String::new();
    out.push_str("\nfn iterate() -> i32 {\n");
    out.push_str("    var next: i32 = cell(vec3<i32>(0, 0, 0));\n");
    for (i, rule) in rules.iter().enumerate() {
        let _ = writeln!(out, "\n    // rule {i}");
        out.push_str("    {\n");
        render_statements(&mut out, &rule.prelude, 2);
        let _ = writeln!(out, "        if ({}) {{", condition(&rule.condition));
        for value in &rule.assignments {
            let _ = writeln!(out, "            next = {};", expression(value));
        }
        out.push_str("        }\n");
        out.push_str("    }\n");
    }
    out.push_str("    return next;\n}\n");
    out
}

fn render_statements(out: &mut String, statements: &[KernelStmt], depth: usize) {
    let pad = "    ".repeat(depth);
    for statement in statements {
        let KernelStmt::Count {
            id,
            origin,
            indices,
            body,
            condition: test,
        } = statement;
        let list = indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let len = indices.len();
        let _ = writeln!(out, "{pad}var count_{id}: i32 = 0;");
        let _ = writeln!(out, "{pad}var idx_{id} = array<i32, {len}>({list});");
        let _ = writeln!(
            out,
            "{pad}for (var i_{id}: i32 = 0; i_{id} < {len}; i_{id} = i_{id} + 1) {{"
        );
        let _ = writeln!(
            out,
            "{pad}    let o_{id} = {} + NEIGHBOR_OFFSETS[idx_{id}[i_{id}]];",
            anchor(*origin)
        );
        render_statements(out, body, depth + 1);
        let _ = writeln!(out, "{pad}    if ({}) {{", condition(test));
        let _ = writeln!(out, "{pad}        count_{id} = count_{id} + 1;");
        let _ = writeln!(out, "{pad}    }}");
        let _ = writeln!(out, "{pad}}}");
    }
}

fn anchor(origin: Cursor) -> String {
    match origin {
        Cursor::Center => "vec3<i32>(0, 0, 0)".to_string(),
        Cursor::Loop(id) => format!("o_{id}"),
    }
}

fn condition(condition: &KernelCond) -> String {
    match condition {
        KernelCond::Eq(left, right) => format!("{} == {}", expression(left), expression(right)),
        KernelCond::All(list) if list.is_empty() => "true".to_string(),
        KernelCond::All(list) => list
            .iter()
            .map(|c| format!("({})", self::condition(c)))
            .collect::<Vec<_>>()
            .join(" && "),
        KernelCond::Not(inner) => format!("!({})", self::condition(inner)),
    }
}

fn expression(expression: &KernelExpr) -> String {
    match expression {
        KernelExpr::Lit(value) if *value < 0 => format!("({value})"),
        KernelExpr::Lit(value) => value.to_string(),
        KernelExpr::Cell { origin, offset } => match (origin, *offset == Offset::SELF) {
            (Cursor::Loop(id), true) => format!("cell(o_{id})"),
            (Cursor::Loop(id), false) => format!(
                "cell(o_{id} + vec3<i32>({}, {}, {}))",
                offset.x, offset.y, offset.z
            ),
            (Cursor::Center, _) => {
                format!("cell(vec3<i32>({}, {}, {}))", offset.x, offset.y, offset.z)
            }
        },
        KernelExpr::Count(id) => format!("count_{id}"),
        KernelExpr::Sign(left, right) => {
            let (l, r) = (self::expression(left), self::expression(right));
            format!("select(select(0, -1, {l} < {r}), 1, {l} > {r})")
        }
        KernelExpr::Bin(op, left, right) => format!(
            "({} {} {})",
            self::expression(left),
            op.symbol(),
            self::expression(right)
        ),
    }
}
