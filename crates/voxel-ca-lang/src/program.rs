//! A parsed rule set together with its state slot table.

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use voxel_ca_core::{BlockPalette, StateName};

use crate::analysis;
use crate::ast::Rule;
use crate::compile::{compile, CompiledRule};
use crate::error::{KernelError, LangError, LangResult};
use crate::kernel::{KernelCompiler, KernelConfig, KernelProgram};
use crate::parser::Parser;

/// Rules in source order plus the identifier to slot table they share.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    rules: Vec<Rule>,
    slots: IndexMap<String, usize>,
}

impl Program {
    pub fn new(rules: Vec<Rule>, slots: IndexMap<String, usize>) -> Self {
        Self { rules, slots }
    }

    /// Parse `source`, failing on the first bad line.
    pub fn from_source(source: &str, palette: &BlockPalette) -> LangResult<Self> {
        let mut parser = Parser::new(palette);
        for line in source.lines() {
            parser.feed_line(line)?;
        }
        let (rules, slots) = parser.finish();
        debug!(rules = rules.len(), slots = slots.len(), "program_parsed");
        Ok(Self { rules, slots })
    }

    /// Parse `source`, skipping bad lines and returning their errors.
    pub fn from_source_lenient(source: &str, palette: &BlockPalette) -> (Self, Vec<LangError>) {
        let mut parser = Parser::new(palette);
        let mut errors = Vec::new();
        for line in source.lines() {
            if let Err(error) = parser.feed_line(line) {
                warn!(line = ?error.line(), error = %error, "rule_rejected");
                errors.push(error);
            }
        }
        let (rules, slots) = parser.finish();
        debug!(
            rules = rules.len(),
            rejected = errors.len(),
            "program_parsed_lenient"
        );
        (Self { rules, slots }, errors)
    }

    /// Read and parse a rule file.
    pub fn from_file(path: impl AsRef<Path>, palette: &BlockPalette) -> LangResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_source(&source, palette)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn slots(&self) -> &IndexMap<String, usize> {
        &self.slots
    }

    /// Auxiliary state names in slot order.
    pub fn states(&self) -> Vec<StateName> {
        self.slots.keys().map(|name| StateName::from(name.as_str())).collect()
    }

    /// Channels needed per cell, including the primitive slot.
    pub fn state_count(&self) -> usize {
        analysis::state_count(&self.rules).max(self.slots.len() + 1)
    }

    pub fn tracked_literals(&self) -> BTreeSet<i64> {
        analysis::tracked_literals(&self.rules)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Build the interpreter backend.
    pub fn compile(&self) -> CompiledRule {
        compile(self.rules.clone(), &self.slots)
    }

    /// Build compute-kernel source for the primitive channel.
    pub fn compile_kernel(&self, config: KernelConfig) -> Result<KernelProgram, KernelError> {
        KernelCompiler::new(config)?.compile(&self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_ca_core::CellRule;

    const LIFE: &str = "\
// Conway's game of life on the horizontal plane
#white_wool & [!2]moore2d@#white_wool & [!3]moore2d@#white_wool -> #air
#air & [3]moore2d@#white_wool -> #white_wool
";

    #[test]
    fn test_from_source() {
        let palette = BlockPalette::builtin();
        let program = Program::from_source(LIFE, &palette).unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.state_count(), 1);
        assert!(program.states().is_empty());

        let tracked = program.tracked_literals();
        assert!(tracked.contains(&palette.resolve("white_wool").unwrap()));
        assert!(tracked.contains(&palette.resolve("air").unwrap()));
    }

    #[test]
    fn test_strict_parse_reports_line() {
        let palette = BlockPalette::builtin();
        let err = Program::from_source("#dirt -> #stone\n\n#dirt -> #bogus", &palette).unwrap_err();
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_lenient_parse_keeps_good_rules() {
        let palette = BlockPalette::builtin();
        let (program, errors) =
            Program::from_source_lenient("#dirt -> #stone\n#dirt -> ?\nheat=1 -> #bogus\n#sand -> age=2", &palette);
        assert_eq!(program.len(), 2);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line(), Some(2));
        assert_eq!(program.slots().get("heat"), Some(&1));
        assert_eq!(program.slots().get("age"), Some(&2));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let palette = BlockPalette::builtin();
        let source = "#dirt & heat>2 -> heat=heat-1 $cool\n#stone -> ~up";
        let a = Program::from_source(source, &palette).unwrap();
        let b = Program::from_source(source, &palette).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compiled_states_follow_slots() {
        let palette = BlockPalette::builtin();
        let program = Program::from_source("#dirt -> heat=1 age=2", &palette).unwrap();
        let rule = program.compile();
        assert_eq!(rule.states(), program.states().as_slice());
        assert_eq!(rule.slot_of("age"), Some(2));
        assert_eq!(rule.channel_count(), 3);
    }

    #[test]
    fn test_program_serializes() {
        let palette = BlockPalette::builtin();
        let program = Program::from_source(LIFE, &palette).unwrap();
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, program);
    }

    #[test]
    fn test_from_file() {
        let palette = BlockPalette::builtin();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("life.rules");
        std::fs::write(&path, LIFE).unwrap();

        let program = Program::from_file(&path, &palette).unwrap();
        assert_eq!(program.rules().len(), 2);
        assert!(matches!(
            Program::from_file(dir.path().join("missing.rules"), &palette),
            Err(LangError::Io(_))
        ));
    }
}
