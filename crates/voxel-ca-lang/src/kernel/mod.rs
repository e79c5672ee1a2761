//! Lowering of rules into data-parallel compute-kernel source (WGSL).
//!
//! The kernel evaluates the primitive channel only: each invocation reads a
//! flattened `(2r+1)^3` window around one cell and writes that cell's next
//! primitive value. Rules touching auxiliary channels or raising events are
//! rejected. Arithmetic is 32-bit and follows the same division rules as the
//! interpreter.

mod ir;
pub mod wgsl;

use serde::{Deserialize, Serialize};
use tracing::debug;
use voxel_ca_core::Offset;

use crate::ast::{Condition, Effect, Expression, Rule};
use crate::error::{KernelError, LangResult};

pub use ir::{apply_i32, neighbor_table, Cursor, KernelCond, KernelExpr, KernelRule, KernelStmt};

const MAX_RADIUS: u32 = 4;

/// Configuration for kernel generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Window radius around each cell.
    #[serde(default = "default_radius")]
    pub radius: u32,

    /// Invocations per workgroup along x, y, z.
    #[serde(default = "default_workgroup_size")]
    pub workgroup_size: [u32; 3],

    /// Name of the compute entry point.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

fn default_radius() -> u32 {
    1
}

fn default_workgroup_size() -> [u32; 3] {
    [4, 4, 4]
}

fn default_entry_point() -> String {
    "main".to_string()
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            workgroup_size: default_workgroup_size(),
            entry_point: default_entry_point(),
        }
    }
}

impl KernelConfig {
    /// Check the configuration for values the emitter cannot honor.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.radius == 0 || self.radius > MAX_RADIUS {
            return Err(KernelError::InvalidConfig(format!(
                "radius {} outside 1..={MAX_RADIUS}",
                self.radius
            )));
        }
        if self.workgroup_size.contains(&0) {
            return Err(KernelError::InvalidConfig(
                "workgroup dimensions must be non-zero".to_string(),
            ));
        }
        let valid_name = self
            .entry_point
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && self
                .entry_point
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(KernelError::InvalidConfig(format!(
                "invalid entry point name '{}'",
                self.entry_point
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, KernelError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KernelError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Generated kernel: source text plus the lowered rules it was emitted from.
#[derive(Debug, Clone)]
pub struct KernelProgram {
    config: KernelConfig,
    table: Vec<Offset>,
    rules: Vec<KernelRule>,
    source: String,
}

impl KernelProgram {
    /// WGSL source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Neighbor table baked into the source.
    pub fn neighbor_offsets(&self) -> &[Offset] {
        &self.table
    }

    pub fn rules(&self) -> &[KernelRule] {
        &self.rules
    }

    /// Run the lowered rules on one flattened window, as one kernel
    /// invocation would. `window` holds the primitive of every neighbor in
    /// table order; values are truncated to 32 bits.
    pub fn evaluate(&self, window: &[i64]) -> i64 {
        ir::Machine::new(window, &self.table, self.config.radius).run(&self.rules) as i64
    }

    pub fn into_source(self) -> String {
        self.source
    }
}

/// Lowers rule sets into kernel programs.
///
/// Synthesized identifiers take their numeric suffix from a counter that
/// only ever increases, so separately compiled fragments never collide.
#[derive(Debug)]
pub struct KernelCompiler {
    config: KernelConfig,
    table: Vec<Offset>,
    counter: usize,
}

impl KernelCompiler {
    /// Create a compiler after validating `config`.
    pub fn new(config: KernelConfig) -> Result<Self, KernelError> {
        config.validate()?;
        let table = neighbor_table(config.radius);
        Ok(Self {
            config,
            table,
            counter: 0,
        })
    }

    /// Lower and emit `rules`.
    pub fn compile(&mut self, rules: &[Rule]) -> Result<KernelProgram, KernelError> {
        let lowered = rules
            .iter()
            .map(|rule| self.lower_rule(rule))
            .collect::<Result<Vec<_>, _>>()?;
        let source = wgsl::render(&self.config, &self.table, &lowered);
        debug!(
            rules = lowered.len(),
            bytes = source.len(),
            counter = self.counter,
            "kernel_compiled"
        );
        Ok(KernelProgram {
            config: self.config.clone(),
            table: self.table.clone(),
            rules: lowered,
            source,
        })
    }

    fn next_id(&mut self) -> usize {
        let id = self.counter;
        self.counter += 1;
        id
    }

    fn table_index(&self, offset: Offset) -> Result<usize, KernelError> {
        self.table
            .iter()
            .position(|o| *o == offset)
            .ok_or_else(|| self.out_of_range(offset))
    }

    fn out_of_range(&self, offset: Offset) -> KernelError {
        KernelError::OffsetOutOfRange {
            offset: offset.to_string(),
            radius: self.config.radius,
        }
    }

    fn check_window(&self, offset: Offset) -> Result<Offset, KernelError> {
        if offset.radius() > self.config.radius as i32 {
            Err(self.out_of_range(offset))
        } else {
            Ok(offset)
        }
    }

    fn lower_rule(&mut self, rule: &Rule) -> Result<KernelRule, KernelError> {
        let mut prelude = Vec::new();
        let condition = self.lower_condition(&rule.condition, Cursor::Center, &mut prelude)?;
        let mut assignments = Vec::new();
        for effect in &rule.effects {
            match effect {
                Effect::SetIndex(0, value) => {
                    assignments.push(self.lower_expression(value, Cursor::Center, &mut prelude)?)
                }
                Effect::SetIndex(..) => {
                    return Err(KernelError::Unsupported("auxiliary state channels"))
                }
                Effect::BlockCopy(offset) => assignments.push(KernelExpr::Cell {
                    origin: Cursor::Center,
                    offset: self.check_window(*offset)?,
                }),
                Effect::TriggerEvent(..) => return Err(KernelError::Unsupported("events")),
            }
        }
        Ok(KernelRule {
            prelude,
            condition,
            assignments,
        })
    }

    fn lower_condition(
        &mut self,
        condition: &Condition,
        cursor: Cursor,
        prelude: &mut Vec<KernelStmt>,
    ) -> Result<KernelCond, KernelError> {
        Ok(match condition {
            Condition::And(list) => KernelCond::All(
                list.iter()
                    .map(|c| self.lower_condition(c, cursor, prelude))
                    .collect::<Result<_, _>>()?,
            ),
            Condition::Not(inner) => {
                KernelCond::Not(Box::new(self.lower_condition(inner, cursor, prelude)?))
            }
            Condition::Equal(left, right) => KernelCond::Eq(
                self.lower_expression(left, cursor, prelude)?,
                self.lower_expression(right, cursor, prelude)?,
            ),
        })
    }

    fn lower_expression(
        &mut self,
        expression: &Expression,
        cursor: Cursor,
        prelude: &mut Vec<KernelStmt>,
    ) -> Result<KernelExpr, KernelError> {
        Ok(match expression {
            Expression::Literal(value) => KernelExpr::Lit(
                i32::try_from(*value).map_err(|_| KernelError::LiteralOutOfRange(*value))?,
            ),
            Expression::Index(0) => KernelExpr::Cell {
                origin: cursor,
                offset: Offset::SELF,
            },
            Expression::NeighborIndex(offset, 0) => KernelExpr::Cell {
                origin: cursor,
                offset: self.check_window(*offset)?,
            },
            Expression::Index(_) | Expression::NeighborIndex(..) => {
                return Err(KernelError::Unsupported("auxiliary state channels"))
            }
            Expression::NeighborsCount(offsets, inner) => {
                let indices = offsets
                    .iter()
                    .map(|o| self.table_index(*o))
                    .collect::<Result<Vec<_>, _>>()?;
                let id = self.next_id();
                let mut body = Vec::new();
                let condition = self.lower_condition(inner, Cursor::Loop(id), &mut body)?;
                prelude.push(KernelStmt::Count {
                    id,
                    origin: cursor,
                    indices,
                    body,
                    condition,
                });
                KernelExpr::Count(id)
            }
            Expression::Compare(left, right) => KernelExpr::Sign(
                Box::new(self.lower_expression(left, cursor, prelude)?),
                Box::new(self.lower_expression(right, cursor, prelude)?),
            ),
            Expression::Operation(left, right, op) => KernelExpr::Bin(
                *op,
                Box::new(self.lower_expression(left, cursor, prelude)?),
                Box::new(self.lower_expression(right, cursor, prelude)?),
            ),
        })
    }
}

/// Compile `rules` with the default configuration and return the source.
pub fn compile_to_source(rules: &[Rule]) -> LangResult<String> {
    let program = KernelCompiler::new(KernelConfig::default())?.compile(rules)?;
    Ok(program.into_source())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;
    use voxel_ca_core::BlockPalette;

    fn rules(source: &str) -> Vec<Rule> {
        let palette = BlockPalette::builtin();
        Program::from_source(source, &palette).unwrap().rules().to_vec()
    }

    #[test]
    fn test_source_layout() {
        let source = compile_to_source(&rules(
            "#air & [3]moore2d@#white_wool -> #white_wool",
        ))
        .unwrap();
        assert!(source.contains("const NEIGHBOR_OFFSETS = array<vec3<i32>, 27>("));
        assert!(source.contains("const NEIGHBOR_COUNT: u32 = 27u;"));
        assert!(source.contains("fn cell(p: vec3<i32>) -> i32"));
        assert!(source.contains("fn iterate() -> i32"));
        assert!(source.contains("@compute @workgroup_size(4, 4, 4)"));
        assert!(source.contains("fn main("));
        assert!(source.contains("var count_0: i32 = 0;"));
        assert!(source.contains("next = "));
    }

    #[test]
    fn test_counter_is_monotonic_across_compiles() {
        let mut compiler = KernelCompiler::new(KernelConfig::default()).unwrap();
        let rules = rules("[2]moore2d@#dirt -> #stone");
        let first = compiler.compile(&rules).unwrap();
        let second = compiler.compile(&rules).unwrap();
        assert!(first.source().contains("count_0"));
        assert!(second.source().contains("count_1"));
        assert!(!second.source().contains("count_0"));
    }

    #[test]
    fn test_nested_counts_live_in_loop_body() {
        let mut compiler = KernelCompiler::new(KernelConfig::default()).unwrap();
        let program = compiler
            .compile(&rules("#air & [2]neumann2d@[1]up@#sand -> #sand"))
            .unwrap();
        let KernelStmt::Count { id, body, .. } = &program.rules()[0].prelude[0];
        assert_eq!(*id, 0);
        assert!(matches!(
            body.as_slice(),
            [KernelStmt::Count { origin: Cursor::Loop(0), .. }]
        ));
    }

    #[test]
    fn test_rejects_unsupported_rules() {
        let err = compile_to_source(&rules("#dirt -> heat=1")).unwrap_err();
        assert!(err.to_string().contains("auxiliary"));
        let err = compile_to_source(&rules("#dirt -> $boom")).unwrap_err();
        assert!(err.to_string().contains("events"));
        let err = compile_to_source(&rules("#dirt -> block={0, 3, 0}@block")).unwrap_err();
        assert!(err.to_string().contains("outside the kernel window"));
    }

    #[test]
    fn test_config_validation() {
        assert!(KernelConfig::default().validate().is_ok());
        let bad = KernelConfig {
            radius: 0,
            ..Default::default()
        };
        assert!(KernelCompiler::new(bad).is_err());
        let bad = KernelConfig {
            entry_point: "9lives".into(),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let parsed = KernelConfig::from_json_str(r#"{"radius": 2}"#).unwrap();
        assert_eq!(parsed.radius, 2);
        assert_eq!(parsed.entry_point, "main");
        assert!(KernelConfig::from_json_str(r#"{"radius": 9}"#).is_err());
        assert!(KernelConfig::from_json_str("{").is_err());
    }

    #[test]
    fn test_evaluate_follows_last_match() {
        let palette = BlockPalette::builtin();
        let program = Program::from_source("#dirt -> #stone\n#dirt -> #sand", &palette)
            .unwrap()
            .compile_kernel(KernelConfig::default())
            .unwrap();
        let mut window = vec![0i64; 27];
        window[13] = palette.resolve("dirt").unwrap();
        assert_eq!(program.evaluate(&window), palette.resolve("sand").unwrap());
    }
}
