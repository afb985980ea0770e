//! Expression syntax trees and the linker.
//!
//! An [`Expression`] is an immutable template. Linking it against a
//! [`Scope`] and an optional type hint never mutates it; the result is a
//! [`Linked`] pair of resolved type and live value stream. Because linking is
//! pure, overload resolution can link the same arguments several times and
//! simply discard failed attempts.

use crate::error::LinkError;
use crate::function::{Localizer, format_localized};
use crate::parser::Span;
use crate::reactive::Signal;
use crate::scope::Scope;
use crate::types::{Primitive, Type, TypeRegistry};
use crate::value::Value;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Remainder
        )
    }

    fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::Less | Self::LessOrEqual | Self::Greater | Self::GreaterOrEqual
        )
    }

    fn is_equality(self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }

    fn arithmetic(self, left: &Value, right: &Value) -> Value {
        match (left, right) {
            (Value::Number(left), Value::Number(right)) => Value::Number(match self {
                Self::Add => left + right,
                Self::Subtract => left - right,
                Self::Multiply => left * right,
                Self::Divide => left / right,
                _ => left % right,
            }),
            (Value::String(left), Value::String(right)) if self == Self::Add => {
                Value::string(format!("{left}{right}"))
            }
            _ => Value::Nil,
        }
    }

    fn ordering(self, left: &Value, right: &Value) -> Value {
        let ordering = match (left, right) {
            (Value::Number(left), Value::Number(right)) => left.partial_cmp(right),
            (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
            _ => None,
        };
        let Some(ordering) = ordering else {
            return Value::Bool(false);
        };
        Value::Bool(match self {
            Self::Less => ordering.is_lt(),
            Self::LessOrEqual => ordering.is_le(),
            Self::Greater => ordering.is_gt(),
            _ => ordering.is_ge(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub matchers: Vec<Expression>,
    pub result: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Constant(Value),
    Nil,
    EnumShorthand(String),
    KeyPath(Vec<String>),
    Wildcard,
    Negate(Box<Expression>),
    Not(Box<Expression>),
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Call {
        name: String,
        arguments: Vec<Expression>,
    },
    /// `@(format, arguments...)`
    Localized(Vec<Expression>),
    Alternative(Vec<Expression>),
    Conditional {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    Switch {
        sources: Vec<Expression>,
        cases: Vec<SwitchCase>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub span: Span,
    pub kind: ExpressionKind,
}

/// A linked expression: its resolved type and the stream of its values.
#[derive(Debug, Clone)]
pub struct Linked {
    pub ty: Type,
    pub sink: Signal,
}

impl Linked {
    pub fn constant(ty: Type, value: Value) -> Self {
        Self {
            ty,
            sink: Signal::constant(value),
        }
    }

    pub fn latest(&self) -> Option<Value> {
        self.sink.latest()
    }
}

fn cast(ty: Type, hint: Option<&Type>, span: Span) -> Result<Type, LinkError> {
    match hint {
        Some(hint) if *hint != ty => Err(LinkError::CannotCast(
            ty.name().to_string(),
            hint.name().to_string(),
            span,
        )),
        _ => Ok(ty),
    }
}

fn signals(linked: &[Linked]) -> Vec<Signal> {
    linked.iter().map(|linked| linked.sink.clone()).collect()
}

/// Whether `value` matches `matcher`, treating an alternative set as membership.
fn matches(value: &Value, matcher: &Value) -> bool {
    match matcher {
        Value::Set(_) => matcher.contains(value),
        _ => value.contains(matcher),
    }
}

fn comparable(left: &Type, right: &Type) -> bool {
    match (left.set_original(), right.set_original()) {
        (None, None) => left == right,
        (Some(original), None) => original == right,
        (None, Some(original)) => original == left,
        (Some(_), Some(_)) => false,
    }
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self { span, kind }
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == ExpressionKind::Wildcard
    }

    /// Fresh copy for an independent use site; linking never touches the template.
    pub fn instantiate(&self) -> Expression {
        self.clone()
    }

    /// The type an expression has regardless of context, if any.
    pub fn intrinsic_type(&self, types: &TypeRegistry) -> Option<Type> {
        match &self.kind {
            ExpressionKind::Constant(value) => constant_type(types, value),
            ExpressionKind::Not(_) => Some(types.bool()),
            ExpressionKind::Negate(_) => Some(types.number()),
            ExpressionKind::Localized(_) => Some(types.string()),
            ExpressionKind::Binary { operator, .. }
                if operator.is_equality()
                    || operator.is_ordering()
                    || matches!(operator, BinaryOperator::And | BinaryOperator::Or) =>
            {
                Some(types.bool())
            }
            _ => None,
        }
    }

    /// Expressions that cannot pick a type on their own.
    pub(crate) fn needs_hint(&self) -> bool {
        match &self.kind {
            ExpressionKind::EnumShorthand(_) | ExpressionKind::Nil => true,
            ExpressionKind::Alternative(branches) => branches.iter().all(Expression::needs_hint),
            _ => false,
        }
    }

    pub fn link(&self, scope: &dyn Scope, hint: Option<&Type>) -> Result<Linked, LinkError> {
        let types = &scope.context().types;
        let span = self.span;
        match &self.kind {
            ExpressionKind::Constant(value) => {
                let ty = constant_type(types, value).ok_or_else(|| {
                    LinkError::UnknownType(value.to_display_string(), span)
                })?;
                Ok(Linked::constant(cast(ty, hint, span)?, value.clone()))
            }
            ExpressionKind::Nil => {
                let ty = match hint {
                    None => types.number(),
                    Some(hint)
                        if hint.is_primitive(Primitive::Number)
                            || hint.is_primitive(Primitive::Image) =>
                    {
                        hint.clone()
                    }
                    Some(hint) => return Err(LinkError::NilCast(hint.name().to_string(), span)),
                };
                Ok(Linked::constant(ty, Value::Nil))
            }
            ExpressionKind::EnumShorthand(key) => {
                let Some((ty, cases)) = hint.and_then(|hint| Some((hint, hint.enum_cases()?))) else {
                    return Err(LinkError::MissingEnumHint(key.clone(), span));
                };
                let value = cases.get(key).cloned().ok_or_else(|| {
                    LinkError::UnknownEnumCase(ty.name().to_string(), key.clone(), span)
                })?;
                Ok(Linked::constant(ty.clone(), value))
            }
            ExpressionKind::KeyPath(path) => {
                let linked = scope
                    .variable(path, hint, span)?
                    .ok_or_else(|| LinkError::UnknownVariable(path.join("."), span))?;
                cast(linked.ty.clone(), hint, span)?;
                Ok(linked)
            }
            ExpressionKind::Wildcard => Err(LinkError::MisplacedWildcard(span)),
            ExpressionKind::Negate(operand) => {
                let ty = cast(types.number(), hint, span)?;
                let operand = operand.link(scope, Some(&ty))?;
                let sink = operand.sink.map(|value| match value {
                    Value::Number(number) => Value::Number(-number),
                    _ => Value::Nil,
                });
                Ok(Linked { ty, sink })
            }
            ExpressionKind::Not(operand) => {
                let ty = cast(types.bool(), hint, span)?;
                let operand = operand.link(scope, Some(&ty))?;
                let sink = operand
                    .sink
                    .map(|value| Value::Bool(!value.as_bool().unwrap_or(false)));
                Ok(Linked { ty, sink })
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => self.link_binary(scope, *operator, left, right, hint),
            ExpressionKind::Call { name, arguments } => self.link_call(scope, name, arguments, hint),
            ExpressionKind::Localized(arguments) => {
                if arguments.is_empty() {
                    return Err(LinkError::EmptyLocalized(span));
                }
                let string = types.string();
                let linked = arguments
                    .iter()
                    .map(|argument| argument.link(scope, Some(&string)))
                    .collect::<Result<Vec<_>, _>>()?;
                let ty = cast(string, hint, span)?;
                let localizer: Rc<dyn Localizer> = scope.context().localizer();
                let sink = Signal::combine(&signals(&linked), move |values| {
                    Value::string(format_localized(localizer.as_ref(), values))
                });
                Ok(Linked { ty, sink })
            }
            ExpressionKind::Alternative(branches) => {
                let base_hint = hint.map(|hint| hint.set_original().unwrap_or(hint));
                let (linked, base) = link_unified(scope, branches, base_hint, span)?;
                let ty = types
                    .set_of(&base)
                    .ok_or_else(|| LinkError::NoAlternativeType(base.name().to_string(), span))?;
                let sink = Signal::combine(&signals(&linked), |values| Value::Set(values.into()));
                Ok(Linked { ty, sink })
            }
            ExpressionKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                // Branches subscribe to shared inputs before the condition
                // does, so a flip never selects a branch that is still stale.
                let branches = [then.as_ref().clone(), otherwise.as_ref().clone()];
                let (linked, ty) = link_unified(scope, &branches, hint, span)?;
                let condition = condition.link(scope, Some(&types.bool()))?;
                let [then, otherwise] = [linked[0].sink.clone(), linked[1].sink.clone()];
                let sink = Signal::switch(&condition.sink, move |value| match value.as_bool()? {
                    true => Some(then.clone()),
                    false => Some(otherwise.clone()),
                });
                Ok(Linked { ty, sink })
            }
            ExpressionKind::Switch { sources, cases } => self.link_switch(scope, sources, cases, hint),
        }
    }

    fn link_binary(
        &self,
        scope: &dyn Scope,
        operator: BinaryOperator,
        left: &Expression,
        right: &Expression,
        hint: Option<&Type>,
    ) -> Result<Linked, LinkError> {
        let types = &scope.context().types;
        let span = self.span;

        if operator.is_equality() && (left.is_wildcard() || right.is_wildcard()) {
            let ty = cast(types.bool(), hint, span)?;
            return Ok(Linked::constant(ty, Value::Bool(operator == BinaryOperator::Equal)));
        }

        if matches!(operator, BinaryOperator::And | BinaryOperator::Or) {
            let bool = types.bool();
            let left = left.link(scope, Some(&bool))?;
            let right = right.link(scope, Some(&bool))?;
            let ty = cast(bool, hint, span)?;
            let sink = Signal::combine(&[left.sink, right.sink], move |values| {
                let left = values[0].as_bool().unwrap_or(false);
                let right = values[1].as_bool().unwrap_or(false);
                Value::Bool(match operator {
                    BinaryOperator::And => left && right,
                    _ => left || right,
                })
            });
            return Ok(Linked { ty, sink });
        }

        if operator.is_arithmetic() {
            let (left, right) = link_pair(scope, left, right, hint)?;
            let number = types.number();
            if operator == BinaryOperator::Add {
                if left.ty != number && left.ty != types.string() {
                    return Err(LinkError::ExpectsNumbersOrStrings(
                        operator.symbol(),
                        left.ty.name().to_string(),
                        span,
                    ));
                }
            } else if left.ty != number {
                return Err(LinkError::ExpectsNumbers(
                    operator.symbol(),
                    left.ty.name().to_string(),
                    span,
                ));
            }
            if left.ty != right.ty {
                return Err(LinkError::OperandMismatch(
                    operator.symbol(),
                    left.ty.name().to_string(),
                    right.ty.name().to_string(),
                    span,
                ));
            }
            let ty = cast(left.ty.clone(), hint, span)?;
            let sink = Signal::combine(&[left.sink, right.sink], move |values| {
                operator.arithmetic(&values[0], &values[1])
            });
            return Ok(Linked { ty, sink });
        }

        let (left, right) = link_pair(scope, left, right, None)?;
        let ty = cast(types.bool(), hint, span)?;
        if operator.is_ordering() {
            let ordered = left.ty == right.ty && (left.ty == types.number() || left.ty == types.string());
            if !ordered {
                return Err(LinkError::CannotCompare(
                    left.ty.name().to_string(),
                    right.ty.name().to_string(),
                    span,
                ));
            }
            let sink = Signal::combine(&[left.sink, right.sink], move |values| {
                operator.ordering(&values[0], &values[1])
            });
            return Ok(Linked { ty, sink });
        }

        if !comparable(&left.ty, &right.ty) {
            return Err(LinkError::CannotCompare(
                left.ty.name().to_string(),
                right.ty.name().to_string(),
                span,
            ));
        }
        let equal = operator == BinaryOperator::Equal;
        let sink = Signal::combine(&[left.sink, right.sink], move |values| {
            Value::Bool(matches(&values[0], &values[1]) == equal)
        });
        Ok(Linked { ty, sink })
    }

    fn link_call(
        &self,
        scope: &dyn Scope,
        name: &str,
        arguments: &[Expression],
        hint: Option<&Type>,
    ) -> Result<Linked, LinkError> {
        let span = self.span;
        let unhinted = arguments
            .iter()
            .map(|argument| argument.link(scope, None))
            .collect::<Result<Vec<_>, _>>();

        if let Ok(linked) = &unhinted {
            let parameter_types: Vec<Type> = linked.iter().map(|linked| linked.ty.clone()).collect();
            if let Some(function) = scope.function_for(name, &parameter_types) {
                let ty = cast(function.return_type().clone(), hint, span)?;
                let sink = function.sink(scope, signals(linked), span)?;
                return Ok(Linked { ty, sink });
            }
        }

        for candidate in scope.functions_loose(name, arguments.len()) {
            let attempt = arguments
                .iter()
                .zip(candidate.parameter_types())
                .map(|(argument, parameter)| argument.link(scope, Some(parameter)))
                .collect::<Result<Vec<_>, _>>();
            let Ok(linked) = attempt else {
                continue;
            };
            let ty = cast(candidate.return_type().clone(), hint, span)?;
            let sink = candidate.sink(scope, signals(&linked), span)?;
            return Ok(Linked { ty, sink });
        }

        let signature = match unhinted {
            Ok(linked) => {
                let names: Vec<&str> = linked.iter().map(|linked| linked.ty.name()).collect();
                format!("{name}({})", names.join(", "))
            }
            Err(LinkError::MissingEnumHint(..)) => format!("{name}/{}", arguments.len()),
            Err(error) => return Err(error),
        };
        Err(LinkError::CannotFindFunction(signature, span))
    }

    fn link_switch(
        &self,
        scope: &dyn Scope,
        sources: &[Expression],
        cases: &[SwitchCase],
        hint: Option<&Type>,
    ) -> Result<Linked, LinkError> {
        let sources = sources
            .iter()
            .map(|source| source.link(scope, None))
            .collect::<Result<Vec<_>, _>>()?;

        let results: Vec<Expression> = cases.iter().map(|case| case.result.clone()).collect();
        let (results, ty) = link_unified(scope, &results, hint, self.span)?;
        let results: Vec<Signal> = signals(&results);

        let mut rows = Vec::with_capacity(cases.len());
        for case in cases {
            let mut conditions = Vec::new();
            for (matcher, source) in case.matchers.iter().zip(&sources) {
                if matcher.is_wildcard() {
                    continue;
                }
                let linked = link_hinted(scope, matcher, &source.ty)?;
                if !comparable(&source.ty, &linked.ty) {
                    return Err(LinkError::CannotCompare(
                        source.ty.name().to_string(),
                        linked.ty.name().to_string(),
                        matcher.span,
                    ));
                }
                conditions.push(Signal::combine(
                    &[source.sink.clone(), linked.sink],
                    |values| Value::Bool(matches(&values[0], &values[1])),
                ));
            }
            rows.push(match conditions.is_empty() {
                true => Signal::constant(Value::Bool(true)),
                false => Signal::combine(&conditions, |values| {
                    Value::Bool(values.iter().all(|value| value.as_bool() == Some(true)))
                }),
            });
        }

        // Emits the index of the first matching row; equal indices are
        // suppressed, so the output only resubscribes when the row changes.
        let selector = Signal::combine(&rows, |values| {
            values
                .iter()
                .position(|value| value.as_bool() == Some(true))
                .map_or(Value::Nil, |index| Value::Number(index as f64))
        });
        let sink = Signal::switch(&selector, move |value| {
            let index = value.as_number()?;
            results.get(index as usize).cloned()
        });
        Ok(Linked { ty, sink })
    }
}

fn constant_type(types: &TypeRegistry, value: &Value) -> Option<Type> {
    match value {
        Value::Number(_) => Some(types.number()),
        Value::String(_) => Some(types.string()),
        Value::Bool(_) => Some(types.bool()),
        Value::Color(_) => Some(types.color()),
        Value::Font(_) => Some(types.primitive(Primitive::Font)),
        Value::Image(_) => Some(types.primitive(Primitive::Image)),
        _ => None,
    }
}

/// Links against `hint`, falling back to an unhinted link so callers can
/// report a comparison error instead of a bare cast failure.
fn link_hinted(scope: &dyn Scope, expression: &Expression, hint: &Type) -> Result<Linked, LinkError> {
    match expression.link(scope, Some(hint)) {
        Ok(linked) => Ok(linked),
        Err(error) => expression.link(scope, None).map_err(|_| error),
    }
}

/// Links two operands so that a typed side hints the untyped side.
fn link_pair(
    scope: &dyn Scope,
    left: &Expression,
    right: &Expression,
    hint: Option<&Type>,
) -> Result<(Linked, Linked), LinkError> {
    let types = &scope.context().types;
    let left_typed = left.intrinsic_type(types).is_some();
    let right_typed = right.intrinsic_type(types).is_some();
    match (left_typed, right_typed) {
        (true, true) => Ok((left.link(scope, None)?, right.link(scope, None)?)),
        (true, false) => {
            let left = left.link(scope, None)?;
            let right = link_hinted(scope, right, &left.ty)?;
            Ok((left, right))
        }
        (false, true) => {
            let right = right.link(scope, None)?;
            let left = link_hinted(scope, left, &right.ty)?;
            Ok((left, right))
        }
        (false, false) if left.needs_hint() && !right.needs_hint() => {
            let right = right.link(scope, hint)?;
            let left = link_hinted(scope, left, &right.ty)?;
            Ok((left, right))
        }
        (false, false) => {
            let left = left.link(scope, hint)?;
            let right = link_hinted(scope, right, &left.ty)?;
            Ok((left, right))
        }
    }
}

/// Links every expression to one shared type. Without a hint, expressions
/// with an intrinsic type go first and the first successful link fixes the
/// type; expressions that failed before that are linked again against it.
pub(crate) fn link_unified(
    scope: &dyn Scope,
    expressions: &[Expression],
    hint: Option<&Type>,
    span: Span,
) -> Result<(Vec<Linked>, Type), LinkError> {
    if let Some(hint) = hint {
        let linked = expressions
            .iter()
            .map(|expression| expression.link(scope, Some(hint)))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((linked, hint.clone()));
    }

    let types = &scope.context().types;
    let mut order: Vec<usize> = (0..expressions.len()).collect();
    order.sort_by_key(|index| {
        let expression = &expressions[*index];
        (expression.intrinsic_type(types).is_none(), expression.needs_hint())
    });

    let mut slots: Vec<Option<Linked>> = vec![None; expressions.len()];
    let mut shared: Option<Type> = None;
    let mut first_error = None;
    for index in order {
        let expression = &expressions[index];
        match &shared {
            Some(ty) => slots[index] = Some(expression.link(scope, Some(ty))?),
            None => match expression.link(scope, None) {
                Ok(linked) => {
                    shared = Some(linked.ty.clone());
                    slots[index] = Some(linked);
                }
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            },
        }
    }

    let Some(ty) = shared else {
        return Err(first_error.unwrap_or(LinkError::UnknownType("?".to_string(), span)));
    };
    let mut linked = Vec::with_capacity(expressions.len());
    for (slot, expression) in slots.into_iter().zip(expressions) {
        let branch = match slot {
            Some(branch) => branch,
            None => expression.link(scope, Some(&ty))?,
        };
        if branch.ty != ty {
            return Err(LinkError::BranchMismatch(
                ty.name().to_string(),
                branch.ty.name().to_string(),
                expression.span,
            ));
        }
        linked.push(branch);
    }
    Ok((linked, ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::IdentityLocalizer;
    use crate::parser::{parse_expression, tokenize};
    use crate::scope::{InputBinding, LinkContext};
    use crate::types::EnumDefinition;

    fn context() -> LinkContext {
        let mut types = TypeRegistry::new();
        types
            .register_enum(
                EnumDefinition::new("Level")
                    .case("low", Value::Number(1.0))
                    .case("high", Value::Number(2.0)),
            )
            .unwrap();
        LinkContext::new(types, Rc::new(IdentityLocalizer), Default::default(), 8)
    }

    fn parse(code: &str) -> Expression {
        let tokens = tokenize(code).unwrap();
        parse_expression(&tokens, code.len()).unwrap()
    }

    fn link(context: &LinkContext, code: &str) -> Result<Linked, LinkError> {
        parse(code).link(context, None)
    }

    #[test]
    fn constants_type_themselves() {
        let context = context();
        let linked = link(&context, "#ff0000").unwrap();
        assert_eq!(linked.ty.name(), "Color");
        let error = parse("1").link(&context, Some(&context.types.string())).unwrap_err();
        assert_eq!(error.to_string(), "cannot cast Number to String");
    }

    #[test]
    fn nil_needs_a_nullable_hint() {
        let context = context();
        assert_eq!(link(&context, "nil").unwrap().ty.name(), "Number");
        let image = context.types.primitive(Primitive::Image);
        assert_eq!(parse("nil").link(&context, Some(&image)).unwrap().ty, image);
        assert!(matches!(
            parse("nil").link(&context, Some(&context.types.bool())),
            Err(LinkError::NilCast(..))
        ));
    }

    #[test]
    fn enum_shorthand_needs_enum_hint() {
        let context = context();
        let level = context.types.type_named("Level").unwrap();
        let linked = parse(".high").link(&context, Some(&level)).unwrap();
        assert_eq!(linked.latest(), Some(Value::Number(2.0)));
        assert!(matches!(link(&context, ".high"), Err(LinkError::MissingEnumHint(..))));
        assert!(matches!(
            parse(".medium").link(&context, Some(&level)),
            Err(LinkError::UnknownEnumCase(..))
        ));
    }

    #[test]
    fn enum_type_paths_resolve_to_cases() {
        let context = context();
        let linked = link(&context, "Level.low == .low").unwrap();
        assert_eq!(linked.latest(), Some(Value::Bool(true)));
    }

    #[test]
    fn literal_alternatives_test_membership() {
        let context = context();
        assert_eq!(link(&context, "2 == 1|2|3").unwrap().latest(), Some(Value::Bool(true)));
        assert_eq!(link(&context, "4 != 1|2|3").unwrap().latest(), Some(Value::Bool(true)));
        assert!(matches!(link(&context, "true|false"), Err(LinkError::NoAlternativeType(..))));
    }

    #[test]
    fn logical_operators_force_bool() {
        let context = context();
        assert_eq!(link(&context, "!(1 > 2) && true").unwrap().latest(), Some(Value::Bool(true)));
        assert!(matches!(link(&context, "1 || true"), Err(LinkError::CannotCast(..))));
    }

    #[test]
    fn ordering_of_mismatched_types_fails() {
        let context = context();
        assert!(matches!(link(&context, "1 < \"a\""), Err(LinkError::CannotCast(..) | LinkError::CannotCompare(..))));
        assert_eq!(link(&context, "\"a\" < \"b\"").unwrap().latest(), Some(Value::Bool(true)));
    }

    #[test]
    fn wildcard_outside_switch_fails() {
        let context = context();
        assert!(matches!(link(&context, "_"), Err(LinkError::MisplacedWildcard(_))));
        assert_eq!(link(&context, "_ == 3").unwrap().latest(), Some(Value::Bool(true)));
    }

    #[test]
    fn conditional_branches_unify() {
        let mut context = context();
        let flag = Signal::new();
        context.add_input(
            "flag",
            Some(InputBinding {
                ty: context.types.bool(),
                signal: flag.clone(),
            }),
        );
        let linked = link(&context, "flag ? nil : 3").unwrap();
        assert_eq!(linked.ty.name(), "Number");
        let recorder = linked.sink.record();
        flag.emit(Value::Bool(false));
        flag.emit(Value::Bool(true));
        assert_eq!(recorder.values(), [Value::Number(3.0), Value::Nil]);
        assert!(matches!(link(&context, "flag ? 1 : \"one\""), Err(LinkError::CannotCast(..))));
    }

    #[test]
    fn hinted_branches_link_after_the_others() {
        let mut context = context();
        let image = context.types.primitive(Primitive::Image);
        context.add_input(
            "flag",
            Some(InputBinding {
                ty: context.types.bool(),
                signal: Signal::new(),
            }),
        );
        context.add_input(
            "picture",
            Some(InputBinding {
                ty: image.clone(),
                signal: Signal::new(),
            }),
        );
        assert_eq!(link(&context, "flag ? nil : picture").unwrap().ty, image);
        assert_eq!(link(&context, "flag ? picture : nil").unwrap().ty, image);
    }

    #[test]
    fn untyped_inputs_cannot_be_read() {
        let mut context = context();
        context.add_input("raw", None);
        assert!(matches!(link(&context, "raw + 1"), Err(LinkError::UntypedInput(..))));
        assert!(matches!(link(&context, "missing"), Err(LinkError::UnknownVariable(..))));
    }

    #[test]
    fn instantiated_copies_link_identically() {
        let context = context();
        let template = parse("max(2, 3) * 2");
        let original = template.link(&context, None).unwrap();
        let copy = template.instantiate().link(&context, None).unwrap();
        assert_eq!(original.ty, copy.ty);
        assert_eq!(original.latest(), copy.latest());
        assert!(!original.sink.ptr_eq(&copy.sink));
    }
}
