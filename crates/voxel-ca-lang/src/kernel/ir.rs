//! Flat intermediate form of a rule set, as emitted into kernel source.
//!
//! Neighbor counts are hoisted out of expressions into [`KernelStmt::Count`]
//! loops that run before the condition that reads them. A count nested in
//! another count's condition lives in that loop's body and is evaluated
//! relative to the loop cursor.

use std::collections::HashMap;

use voxel_ca_core::Offset;

use crate::ast::Operator;

/// Where a cell read is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// The evaluated cell.
    Center,
    /// The current position of count loop `N`.
    Loop(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelExpr {
    Lit(i32),
    Cell { origin: Cursor, offset: Offset },
    /// Result of count loop `N`.
    Count(usize),
    /// Sign of `left - right` without overflow.
    Sign(Box<KernelExpr>, Box<KernelExpr>),
    Bin(Operator, Box<KernelExpr>, Box<KernelExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelCond {
    Eq(KernelExpr, KernelExpr),
    All(Vec<KernelCond>),
    Not(Box<KernelCond>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelStmt {
    Count {
        id: usize,
        origin: Cursor,
        /// Positions in the neighbor table.
        indices: Vec<usize>,
        body: Vec<KernelStmt>,
        condition: KernelCond,
    },
}

/// One lowered rule: run `prelude`, then if `condition` holds apply
/// `assignments` to the primitive in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelRule {
    pub prelude: Vec<KernelStmt>,
    pub condition: KernelCond,
    pub assignments: Vec<KernelExpr>,
}

/// Neighbor table of a cubic window: x fastest, then y, then z.
pub fn neighbor_table(radius: u32) -> Vec<Offset> {
    let r = radius as i32;
    let mut table = Vec::new();
    for z in -r..=r {
        for y in -r..=r {
            for x in -r..=r {
                table.push(Offset::new(x, y, z));
            }
        }
    }
    table
}

/// Two's-complement kernel arithmetic.
pub fn apply_i32(op: Operator, left: i32, right: i32) -> i32 {
    match op {
        Operator::Add => left.wrapping_add(right),
        Operator::Sub => left.wrapping_sub(right),
        Operator::Mul => left.wrapping_mul(right),
        Operator::Div => left.checked_div(right).unwrap_or(left),
        Operator::Mod => left.checked_rem(right).unwrap_or(0),
    }
}

/// Reference executor for lowered rules over a flattened window.
pub(crate) struct Machine<'a> {
    cells: &'a [i64],
    table: &'a [Offset],
    radius: i32,
    counts: HashMap<usize, i32>,
    cursors: HashMap<usize, Offset>,
}

impl<'a> Machine<'a> {
    pub(crate) fn new(cells: &'a [i64], table: &'a [Offset], radius: u32) -> Self {
        Self {
            cells,
            table,
            radius: radius as i32,
            counts: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    pub(crate) fn run(&mut self, rules: &[KernelRule]) -> i32 {
        let mut next = self.cell(Offset::SELF);
        for rule in rules {
            self.statements(&rule.prelude);
            if self.condition(&rule.condition) {
                for value in &rule.assignments {
                    next = self.expression(value);
                }
            }
        }
        next
    }

    fn cell(&self, position: Offset) -> i32 {
        let r = self.radius;
        if position.radius() > r {
            return 0;
        }
        let side = 2 * r + 1;
        let index = ((position.z + r) * side + (position.y + r)) * side + (position.x + r);
        self.cells
            .get(index as usize)
            .map(|&v| v as i32)
            .unwrap_or(0)
    }

    fn anchor(&self, origin: Cursor) -> Offset {
        match origin {
            Cursor::Center => Offset::SELF,
            Cursor::Loop(id) => self.cursors.get(&id).copied().unwrap_or(Offset::SELF),
        }
    }

    fn statements(&mut self, statements: &[KernelStmt]) {
        for statement in statements {
            let KernelStmt::Count {
                id,
                origin,
                indices,
                body,
                condition,
            } = statement;
            let base = self.anchor(*origin);
            let mut count = 0i32;
            for &index in indices {
                let step = self.table[index];
                let position = Offset::new(base.x + step.x, base.y + step.y, base.z + step.z);
                self.cursors.insert(*id, position);
                self.statements(body);
                if self.condition(condition) {
                    count = count.wrapping_add(1);
                }
            }
            self.counts.insert(*id, count);
        }
    }

    fn condition(&self, condition: &KernelCond) -> bool {
        match condition {
            KernelCond::Eq(left, right) => self.expression(left) == self.expression(right),
            KernelCond::All(list) => list.iter().all(|c| self.condition(c)),
            KernelCond::Not(inner) => !self.condition(inner),
        }
    }

    fn expression(&self, expression: &KernelExpr) -> i32 {
        match expression {
            KernelExpr::Lit(value) => *value,
            KernelExpr::Cell { origin, offset } => {
                let base = self.anchor(*origin);
                self.cell(Offset::new(
                    base.x + offset.x,
                    base.y + offset.y,
                    base.z + offset.z,
                ))
            }
            KernelExpr::Count(id) => self.counts.get(id).copied().unwrap_or(0),
            KernelExpr::Sign(left, right) => {
                self.expression(left).cmp(&self.expression(right)) as i32
            }
            KernelExpr::Bin(op, left, right) => {
                apply_i32(*op, self.expression(left), self.expression(right))
            }
        }
    }
}
