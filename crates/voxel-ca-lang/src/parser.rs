//! Recursive-descent parser for rule lines.
//!
//! The parser is fed one line of tokens at a time and keeps a single state
//! slot table across lines, so the same identifier always maps to the same
//! slot. Slot `0` is the primitive block channel and may be named `block`;
//! other identifiers take slots from `1` in order of first use.

use indexmap::IndexMap;
use voxel_ca_core::{neighbors, BlockPalette, Offset};

use crate::ast::{Condition, Effect, Expression, Operator, Rule};
use crate::error::{LangError, LangResult, ParseError, ParseErrorKind};
use crate::lexer::{scan, Token};

/// Identifier bound to the primitive channel.
pub const BLOCK_IDENTIFIER: &str = "block";

static EOF: Token = Token::Eof;

/// Incremental rule parser.
#[derive(Debug)]
pub struct Parser<'p> {
    palette: &'p BlockPalette,
    slots: IndexMap<String, usize>,
    rules: Vec<Rule>,
    line: usize,
}

impl<'p> Parser<'p> {
    /// Create a parser resolving constants against `palette`.
    pub fn new(palette: &'p BlockPalette) -> Self {
        Self {
            palette,
            slots: IndexMap::new(),
            rules: Vec::new(),
            line: 0,
        }
    }

    /// Parse one line of tokens, returning how many rules it added.
    ///
    /// A failing rule is discarded; slots it allocated stay allocated.
    pub fn feed(&mut self, tokens: &[Token]) -> Result<usize, ParseError> {
        self.line += 1;
        let mut cursor = RuleParser {
            tokens,
            pos: 0,
            line: self.line,
            palette: self.palette,
            slots: &mut self.slots,
        };
        let parsed = cursor.line()?;
        let added = parsed.len();
        self.rules.extend(parsed);
        Ok(added)
    }

    /// Scan and parse one line of source text.
    pub fn feed_line(&mut self, text: &str) -> LangResult<usize> {
        match scan(text) {
            Ok(tokens) => Ok(self.feed(&tokens)?),
            Err(source) => {
                self.line += 1;
                Err(LangError::Lex {
                    line: self.line,
                    source,
                })
            }
        }
    }

    /// Rules parsed so far, in source order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Identifier to slot table, in slot order.
    pub fn slots(&self) -> &IndexMap<String, usize> {
        &self.slots
    }

    /// Number of lines fed so far.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn finish(self) -> (Vec<Rule>, IndexMap<String, usize>) {
        (self.rules, self.slots)
    }
}

enum CountPredicate {
    Exactly(i64),
    Not(i64),
    Greater(i64),
    Less(i64),
}

impl CountPredicate {
    fn apply(self, count: Expression) -> Condition {
        match self {
            CountPredicate::Exactly(n) => Condition::equal(count, Expression::Literal(n)),
            CountPredicate::Not(n) => Condition::not_equal(count, Expression::Literal(n)),
            CountPredicate::Greater(n) => Condition::equal(
                Expression::compare(count, Expression::Literal(n)),
                Expression::Literal(1),
            ),
            CountPredicate::Less(n) => Condition::equal(
                Expression::compare(count, Expression::Literal(n)),
                Expression::Literal(-1),
            ),
        }
    }
}

struct RuleParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
    palette: &'a BlockPalette,
    slots: &'a mut IndexMap<String, usize>,
}

impl RuleParser<'_> {
    // ========================================================================
    // Token cursor
    // ========================================================================

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&EOF)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            line: self.line,
            kind,
            found: self.peek().to_string(),
        }
    }

    fn expect(&mut self, token: Token, what: &'static str) -> Result<(), ParseError> {
        if *self.peek() == token {
            self.bump();
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::Expected(what)))
        }
    }

    fn slot(&mut self, name: &str) -> usize {
        if name == BLOCK_IDENTIFIER {
            return 0;
        }
        let next = self.slots.len() + 1;
        *self.slots.entry(name.to_string()).or_insert(next)
    }

    // ========================================================================
    // Rules
    // ========================================================================

    fn line(&mut self) -> Result<Vec<Rule>, ParseError> {
        let mut rules = Vec::new();
        if *self.peek() == Token::Eof {
            return Ok(rules);
        }
        rules.push(self.rule()?);
        while *self.peek() == Token::Separator {
            self.bump();
            rules.push(self.rule()?);
        }
        self.expect(Token::Eof, "end of line")?;
        Ok(rules)
    }

    fn rule(&mut self) -> Result<Rule, ParseError> {
        let mut conditions = Vec::new();
        while *self.peek() != Token::Arrow {
            if !conditions.is_empty() && *self.peek() == Token::And {
                self.bump();
            }
            conditions.push(self.condition()?);
        }
        let condition = Condition::all(conditions)
            .ok_or_else(|| self.error(ParseErrorKind::Expected("condition before '->'")))?;
        self.bump();

        let mut effects = Vec::new();
        loop {
            match self.peek() {
                Token::Eof | Token::Separator if !effects.is_empty() => break,
                Token::Comma | Token::And if !effects.is_empty() => self.bump(),
                _ => {}
            }
            effects.push(self.effect()?);
        }

        Ok(Rule { condition, effects })
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    fn condition(&mut self) -> Result<Condition, ParseError> {
        let predicate = if *self.peek() == Token::LeftBracket {
            Some(self.count_predicate()?)
        } else {
            None
        };

        if self.at_neighbor_path() {
            let offsets = self.target()?;
            self.bump();
            let inner = self.condition()?;
            let count = Expression::count(offsets, inner);
            return Ok(match predicate {
                Some(predicate) => predicate.apply(count),
                None => Condition::equal(count, Expression::Literal(1)),
            });
        }

        if predicate.is_some() {
            return Err(self.error(ParseErrorKind::DanglingCountPredicate));
        }

        match self.peek().clone() {
            Token::Constant(_) => Ok(Condition::block(self.constant()?)),
            Token::Exclamation => {
                self.bump();
                if !matches!(self.peek(), Token::Constant(_)) {
                    return Err(self.error(ParseErrorKind::Expected("constant after '!'")));
                }
                Ok(Condition::block(self.constant()?).negate())
            }
            Token::Identifier(name) => {
                self.bump();
                let index = Expression::Index(self.slot(&name));
                let comparator = self.peek().clone();
                match comparator {
                    Token::Equals | Token::Exclamation | Token::GreaterThan | Token::LessThan => {
                        self.bump()
                    }
                    _ => {
                        return Err(self.error(ParseErrorKind::Expected(
                            "'=', '!', '>' or '<' after state name",
                        )))
                    }
                }
                let value = self.expression()?;
                Ok(match comparator {
                    Token::Exclamation => Condition::not_equal(index, value),
                    Token::GreaterThan => Condition::equal(
                        Expression::compare(index, value),
                        Expression::Literal(1),
                    ),
                    Token::LessThan => Condition::equal(
                        Expression::compare(index, value),
                        Expression::Literal(-1),
                    ),
                    _ => Condition::equal(index, value),
                })
            }
            _ => Err(self.error(ParseErrorKind::Expected("condition"))),
        }
    }

    fn count_predicate(&mut self) -> Result<CountPredicate, ParseError> {
        self.bump();
        let predicate = match self.peek().clone() {
            Token::Number(n) => {
                self.bump();
                CountPredicate::Exactly(n)
            }
            Token::Exclamation => {
                self.bump();
                CountPredicate::Not(self.number()?)
            }
            Token::GreaterThan => {
                self.bump();
                CountPredicate::Greater(self.number()?)
            }
            Token::LessThan => {
                self.bump();
                CountPredicate::Less(self.number()?)
            }
            _ => return Err(self.error(ParseErrorKind::Expected("count predicate"))),
        };
        self.expect(Token::RightBracket, "']'")?;
        Ok(predicate)
    }

    fn number(&mut self) -> Result<i64, ParseError> {
        match *self.peek() {
            Token::Number(n) => {
                self.bump();
                Ok(n)
            }
            _ => Err(self.error(ParseErrorKind::Expected("number"))),
        }
    }

    // ========================================================================
    // Neighbor addressing
    // ========================================================================

    fn at_neighbor_path(&self) -> bool {
        matches!(self.peek(), Token::Identifier(_) | Token::Offset(_))
            && *self.peek_at(1) == Token::At
    }

    fn target(&mut self) -> Result<Vec<Offset>, ParseError> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                let offsets = neighbors::named(&name)
                    .ok_or_else(|| self.error(ParseErrorKind::UnknownNeighborhood(name)))?;
                self.bump();
                Ok(offsets.to_vec())
            }
            Token::Offset(offset) => {
                self.bump();
                Ok(vec![offset])
            }
            _ => Err(self.error(ParseErrorKind::Expected("neighborhood or offset"))),
        }
    }

    fn single_target(&mut self) -> Result<Offset, ParseError> {
        let label = match self.peek() {
            Token::Identifier(name) => name.clone(),
            other => other.to_string(),
        };
        let found = self.peek().to_string();
        match self.target()?.as_slice() {
            [offset] => Ok(*offset),
            _ => Err(ParseError {
                line: self.line,
                kind: ParseErrorKind::MultipleTargets(label),
                found,
            }),
        }
    }

    // ========================================================================
    // Constants
    // ========================================================================

    fn constant(&mut self) -> Result<i64, ParseError> {
        let Token::Constant(name) = self.peek().clone() else {
            return Err(self.error(ParseErrorKind::Expected("constant")));
        };
        let mut state = self
            .palette
            .resolve(&name)
            .ok_or_else(|| self.error(ParseErrorKind::UnknownConstant(name.clone())))?;
        self.bump();

        let has_properties = *self.peek() == Token::LeftBracket
            && matches!(self.peek_at(1), Token::Identifier(_))
            && *self.peek_at(2) == Token::Equals;
        if !has_properties {
            return Ok(state);
        }

        self.bump();
        loop {
            let Token::Identifier(property) = self.peek().clone() else {
                return Err(self.error(ParseErrorKind::Expected("property name")));
            };
            self.bump();
            self.expect(Token::Equals, "'=' after property name")?;
            let value = match self.peek().clone() {
                Token::Identifier(value) => value,
                Token::Number(n) => n.to_string(),
                _ => return Err(self.error(ParseErrorKind::Expected("property value"))),
            };
            state = match self.palette.with_property(state, &property, &value) {
                Ok(state) => state,
                Err(_) => {
                    return Err(self.error(ParseErrorKind::UnknownProperty {
                        block: name,
                        property,
                        value,
                    }))
                }
            };
            self.bump();
            match self.peek() {
                Token::Comma => self.bump(),
                Token::RightBracket => {
                    self.bump();
                    return Ok(state);
                }
                _ => return Err(self.error(ParseErrorKind::Expected("',' or ']'"))),
            }
        }
    }

    // ========================================================================
    // Effects
    // ========================================================================

    fn effect(&mut self) -> Result<Effect, ParseError> {
        match self.peek().clone() {
            Token::Constant(_) => Ok(Effect::SetIndex(0, Expression::Literal(self.constant()?))),
            Token::Identifier(name) => {
                self.bump();
                let slot = self.slot(&name);
                self.expect(Token::Equals, "'=' after state name")?;
                Ok(Effect::SetIndex(slot, self.expression()?))
            }
            Token::Tilde => {
                self.bump();
                Ok(Effect::BlockCopy(self.single_target()?))
            }
            Token::Dollar => {
                self.bump();
                let Token::Identifier(name) = self.peek().clone() else {
                    return Err(self.error(ParseErrorKind::Expected("event name after '$'")));
                };
                self.bump();
                let value = if *self.peek() == Token::Equals {
                    self.bump();
                    Some(self.expression()?)
                } else {
                    None
                };
                Ok(Effect::TriggerEvent(name, value))
            }
            _ => Err(self.error(ParseErrorKind::Expected("result"))),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expression(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => Operator::Add,
                Token::Minus => Operator::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.term()?;
            left = Expression::operation(left, right, op);
        }
    }

    fn term(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.primary()?;
        loop {
            let op = match self.peek() {
                Token::Star => Operator::Mul,
                Token::Slash => Operator::Div,
                Token::Percent => Operator::Mod,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.primary()?;
            left = Expression::operation(left, right, op);
        }
    }

    fn primary(&mut self) -> Result<Expression, ParseError> {
        if self.at_neighbor_path() {
            let offset = self.single_target()?;
            self.bump();
            let Token::Identifier(state) = self.peek().clone() else {
                return Err(self.error(ParseErrorKind::Expected("state name after '@'")));
            };
            self.bump();
            return Ok(Expression::NeighborIndex(offset, self.slot(&state)));
        }

        match self.peek().clone() {
            Token::Number(n) => {
                self.bump();
                Ok(Expression::Literal(n))
            }
            Token::Constant(_) => Ok(Expression::Literal(self.constant()?)),
            Token::Identifier(name) => {
                self.bump();
                Ok(Expression::Index(self.slot(&name)))
            }
            _ => Err(self.error(ParseErrorKind::Expected("expression"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> BlockPalette {
        BlockPalette::builtin()
    }

    fn block(p: &BlockPalette, name: &str) -> i64 {
        p.resolve(name).unwrap()
    }

    fn parse_one(p: &BlockPalette, line: &str) -> Rule {
        let mut parser = Parser::new(p);
        assert_eq!(parser.feed_line(line).unwrap(), 1);
        parser.rules()[0].clone()
    }

    #[test]
    fn test_block_and_state_condition() {
        let p = palette();
        let rule = parse_one(&p, "#white_wool & points=0 -> #black_wool");
        assert_eq!(
            rule.condition,
            Condition::And(vec![
                Condition::block(block(&p, "white_wool")),
                Condition::equal(Expression::Index(1), Expression::Literal(0)),
            ])
        );
        assert_eq!(
            rule.effects,
            vec![Effect::SetIndex(0, Expression::Literal(block(&p, "black_wool")))]
        );
    }

    #[test]
    fn test_ampersand_is_optional() {
        let p = palette();
        let with = parse_one(&p, "#dirt & points=1 -> #stone");
        let without = parse_one(&p, "#dirt points=1 -> #stone");
        assert_eq!(with, without);
    }

    #[test]
    fn test_neighbor_state_expression() {
        let p = palette();
        let rule = parse_one(&p, "#dirt -> points=up@points");
        assert_eq!(
            rule.effects,
            vec![Effect::SetIndex(
                1,
                Expression::NeighborIndex(Offset::new(0, 1, 0), 1)
            )]
        );
    }

    #[test]
    fn test_block_properties() {
        let p = palette();
        let rule = parse_one(&p, "#stone -> #redstone_wire[power=15, south=side]");
        let wire = block(&p, "redstone_wire");
        let expected = p.with_property(wire, "power", "15").unwrap();
        let expected = p.with_property(expected, "south", "side").unwrap();
        assert_eq!(
            rule.effects,
            vec![Effect::SetIndex(0, Expression::Literal(expected))]
        );
    }

    #[test]
    fn test_events() {
        let p = palette();
        let rule = parse_one(&p, "#dirt -> $dirt_exist=1 $ping");
        assert_eq!(
            rule.effects,
            vec![
                Effect::TriggerEvent("dirt_exist".into(), Some(Expression::Literal(1))),
                Effect::TriggerEvent("ping".into(), None),
            ]
        );
    }

    #[test]
    fn test_math_and_not_equal() {
        let p = palette();
        let rule = parse_one(&p, "points!0 -> points=points+1");
        assert_eq!(
            rule.condition,
            Condition::not_equal(Expression::Index(1), Expression::Literal(0))
        );
        assert_eq!(
            rule.effects,
            vec![Effect::SetIndex(
                1,
                Expression::operation(Expression::Index(1), Expression::Literal(1), Operator::Add)
            )]
        );
    }

    #[test]
    fn test_precedence_and_associativity() {
        let p = palette();
        let rule = parse_one(&p, "#dirt -> a=10-2-3 b=1+2*3");
        let Effect::SetIndex(_, sub) = &rule.effects[0] else {
            panic!("expected SetIndex");
        };
        assert_eq!(
            *sub,
            Expression::operation(
                Expression::operation(Expression::Literal(10), Expression::Literal(2), Operator::Sub),
                Expression::Literal(3),
                Operator::Sub
            )
        );
        let Effect::SetIndex(_, add) = &rule.effects[1] else {
            panic!("expected SetIndex");
        };
        assert_eq!(
            *add,
            Expression::operation(
                Expression::Literal(1),
                Expression::operation(Expression::Literal(2), Expression::Literal(3), Operator::Mul),
                Operator::Add
            )
        );
    }

    #[test]
    fn test_count_predicates() {
        let p = palette();
        let wool = block(&p, "white_wool");
        let count = || Expression::count(neighbors::MOORE_2D.to_vec(), Condition::block(wool));

        let rule = parse_one(&p, "#air & [3]moore2d@#white_wool -> #white_wool");
        let Condition::And(parts) = rule.condition else {
            panic!("expected conjunction");
        };
        assert_eq!(parts[1], Condition::equal(count(), Expression::Literal(3)));

        let rule = parse_one(&p, "[!2]moore2d@#white_wool -> #air");
        assert_eq!(rule.condition, Condition::not_equal(count(), Expression::Literal(2)));

        let rule = parse_one(&p, "[>2]moore2d@#white_wool -> #air");
        assert_eq!(
            rule.condition,
            Condition::equal(
                Expression::compare(count(), Expression::Literal(2)),
                Expression::Literal(1)
            )
        );

        let rule = parse_one(&p, "[<2]moore2d@#white_wool -> #air");
        assert_eq!(
            rule.condition,
            Condition::equal(
                Expression::compare(count(), Expression::Literal(2)),
                Expression::Literal(-1)
            )
        );

        let rule = parse_one(&p, "moore2d@#white_wool -> #air");
        assert_eq!(rule.condition, Condition::equal(count(), Expression::Literal(1)));
    }

    #[test]
    fn test_block_copy_and_offsets() {
        let p = palette();
        let rule = parse_one(&p, "#air & up@#sand -> ~up");
        assert_eq!(rule.effects, vec![Effect::BlockCopy(Offset::new(0, 1, 0))]);

        let rule = parse_one(&p, "#air -> block={0, 2, 0}@block");
        assert_eq!(
            rule.effects,
            vec![Effect::SetIndex(
                0,
                Expression::NeighborIndex(Offset::new(0, 2, 0), 0)
            )]
        );
    }

    #[test]
    fn test_comment_and_empty_lines() {
        let p = palette();
        let mut parser = Parser::new(&p);
        assert_eq!(parser.feed_line("// just a comment").unwrap(), 0);
        assert_eq!(parser.feed_line("").unwrap(), 0);
        assert_eq!(parser.feed_line("#dirt -> #stone // trailing").unwrap(), 1);
        assert_eq!(parser.line(), 3);
    }

    #[test]
    fn test_separator_adds_several_rules() {
        let p = palette();
        let mut parser = Parser::new(&p);
        assert_eq!(parser.feed_line("#dirt -> #stone | #stone -> #dirt").unwrap(), 2);
    }

    #[test]
    fn test_slots_shared_across_lines() {
        let p = palette();
        let mut parser = Parser::new(&p);
        parser.feed_line("#dirt -> heat=1").unwrap();
        parser.feed_line("#stone -> age=heat").unwrap();
        let (rules, slots) = parser.finish();
        assert_eq!(rules.len(), 2);
        assert_eq!(slots.get("heat"), Some(&1));
        assert_eq!(slots.get("age"), Some(&2));
        assert_eq!(
            rules[1].effects,
            vec![Effect::SetIndex(2, Expression::Index(1))]
        );
    }

    #[test]
    fn test_failed_rule_keeps_slots() {
        let p = palette();
        let mut parser = Parser::new(&p);
        let err = parser.feed_line("heat=1 -> #nothing").unwrap_err();
        assert!(matches!(
            err,
            LangError::Parse(ParseError {
                line: 1,
                kind: ParseErrorKind::UnknownConstant(_),
                ..
            })
        ));
        assert!(parser.rules().is_empty());
        assert_eq!(parser.slots().get("heat"), Some(&1));

        parser.feed_line("#dirt -> age=2").unwrap();
        assert_eq!(parser.slots().get("age"), Some(&2));
    }

    #[test]
    fn test_parse_errors() {
        let p = palette();
        let kind = |line: &str| match Parser::new(&p).feed_line(line) {
            Err(LangError::Parse(e)) => e.kind,
            other => panic!("expected parse error, got {other:?}"),
        };

        assert_eq!(kind("-> #dirt"), ParseErrorKind::Expected("condition before '->'"));
        assert_eq!(kind("#dirt ->"), ParseErrorKind::Expected("result"));
        assert_eq!(
            kind("#dirt & sideways@#dirt -> #air"),
            ParseErrorKind::UnknownNeighborhood("sideways".into())
        );
        assert_eq!(
            kind("#dirt -> ~moore2d"),
            ParseErrorKind::MultipleTargets("moore2d".into())
        );
        assert_eq!(kind("[2]#dirt -> #air"), ParseErrorKind::DanglingCountPredicate);
        assert!(matches!(
            kind("#dirt -> #redstone_wire[power=99]"),
            ParseErrorKind::UnknownProperty { .. }
        ));
    }

    #[test]
    fn test_lex_error_carries_line() {
        let p = palette();
        let mut parser = Parser::new(&p);
        parser.feed_line("#dirt -> #stone").unwrap();
        let err = parser.feed_line("#dirt -> ?").unwrap_err();
        assert_eq!(err.line(), Some(2));
    }
}
