use chumsky::{input::ValueInput, pratt::*, prelude::*};

mod document;
pub use document::{Document, FunctionItem, InputDeclaration, build_document};

mod scanner;
pub use scanner::{Scanner, Token, TokenKind, tokenize};

mod source;
pub use source::{Position, SourceCode};

use crate::error::ParseError;
use crate::expression::{BinaryOperator, Expression, ExpressionKind, SwitchCase};
use crate::value::{Color, Value};

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type RichError<'src> = Rich<'src, Token, Span>;

/// Identifiers that can never name a property, input or function.
pub const RESERVED_WORDS: [&str; 6] = ["switch", "case", "true", "false", "nil", "_"];

/// Generic declaration: `name: value`, `name { ... }`, `name(a: T) { body }` or a bare `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    pub span: Span,
    pub body: ItemBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemBody {
    Value(Expression),
    Block(Vec<Item>),
    Function {
        parameters: Vec<Parameter>,
        body: Expression,
    },
    Bare,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
    pub span: Span,
}

fn symbol<'src, I>(
    text: &'static str,
) -> impl Parser<'src, I, (), extra::Err<RichError<'src>>> + Clone
where
    I: ValueInput<'src, Token = Token, Span = Span>,
{
    any()
        .filter(move |token: &Token| token.is_symbol(text))
        .ignored()
}

fn keyword<'src, I>(
    text: &'static str,
) -> impl Parser<'src, I, (), extra::Err<RichError<'src>>> + Clone
where
    I: ValueInput<'src, Token = Token, Span = Span>,
{
    any()
        .filter(move |token: &Token| token.is_identifier(text))
        .ignored()
}

fn identifier<'src, I>() -> impl Parser<'src, I, String, extra::Err<RichError<'src>>> + Clone
where
    I: ValueInput<'src, Token = Token, Span = Span>,
{
    select! { Token { kind: TokenKind::Identifier, content, .. } => content }
        .filter(|content: &String| !RESERVED_WORDS.contains(&content.as_str()))
}

fn binary(operator: BinaryOperator, left: Expression, right: Expression, span: Span) -> Expression {
    Expression::new(
        ExpressionKind::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

pub fn expression_parser<'src, I>()
-> impl Parser<'src, I, Expression, extra::Err<RichError<'src>>> + Clone
where
    I: ValueInput<'src, Token = Token, Span = Span>,
{
    recursive(|expression| {
        let number = select! { Token { kind: TokenKind::Number, content, .. } => content }
            .try_map(|content: String, span| {
                content
                    .parse::<f64>()
                    .map(|number| ExpressionKind::Constant(Value::Number(number)))
                    .map_err(|_| Rich::custom(span, format!("malformed number '{content}'")))
            });
        let text = select! {
            Token { kind: TokenKind::String, content, .. } => ExpressionKind::Constant(Value::string(content))
        };
        let color = select! { Token { kind: TokenKind::Color, content, .. } => content }
            .try_map(|content: String, span| {
                Color::from_hex(&content)
                    .map(|color| ExpressionKind::Constant(Value::Color(color)))
                    .ok_or_else(|| Rich::custom(span, format!("invalid color '#{content}'")))
            });
        let boolean = choice((
            keyword("true").to(ExpressionKind::Constant(Value::Bool(true))),
            keyword("false").to(ExpressionKind::Constant(Value::Bool(false))),
        ));
        let nil = keyword("nil").to(ExpressionKind::Nil);
        let wildcard = keyword("_").to(ExpressionKind::Wildcard);

        let arguments = expression
            .clone()
            .separated_by(symbol(","))
            .collect::<Vec<_>>()
            .delimited_by(symbol("("), symbol(")"));

        let enum_shorthand = symbol(".")
            .ignore_then(identifier())
            .map(ExpressionKind::EnumShorthand);

        let localized = symbol("@")
            .ignore_then(arguments.clone())
            .map(ExpressionKind::Localized);

        let call = identifier()
            .then(arguments.clone())
            .map(|(name, arguments)| ExpressionKind::Call { name, arguments });

        let key_path = identifier()
            .separated_by(symbol("."))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(ExpressionKind::KeyPath);

        let case = keyword("case")
            .ignore_then(
                expression
                    .clone()
                    .separated_by(symbol(","))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .then_ignore(symbol("=>"))
            .then(expression.clone())
            .map_with(|(matchers, result), extra| SwitchCase {
                matchers,
                result,
                span: extra.span(),
            });

        // One matcher per source; a lone `_` stands for all of them.
        let switch = keyword("switch")
            .ignore_then(arguments.clone())
            .then(
                case.repeated()
                    .at_least(1)
                    .collect::<Vec<_>>()
                    .delimited_by(symbol("{"), symbol("}")),
            )
            .validate(|(sources, cases): (Vec<Expression>, Vec<SwitchCase>), _, emitter| {
                let cases = cases
                    .into_iter()
                    .map(|mut case| {
                        let expected = sources.len();
                        let found = case.matchers.len();
                        if found == 1 && case.matchers[0].is_wildcard() {
                            case.matchers = vec![case.matchers[0].clone(); expected];
                        } else if found > expected {
                            emitter.emit(Rich::custom(
                                case.span,
                                format!("extra matcher: {found} matchers for {expected} sources"),
                            ));
                        } else if found < expected {
                            emitter.emit(Rich::custom(
                                case.span,
                                format!("count mismatch: {found} matchers for {expected} sources"),
                            ));
                        }
                        case
                    })
                    .collect();
                ExpressionKind::Switch { sources, cases }
            });

        let atom = choice((
            number,
            text,
            color,
            boolean,
            nil,
            wildcard,
            enum_shorthand,
            localized,
            switch,
            call,
            key_path,
        ))
        .map_with(|kind, extra| Expression::new(kind, extra.span()))
        .or(expression
            .clone()
            .delimited_by(symbol("("), symbol(")")));

        let alternatives = atom
            .separated_by(symbol("|"))
            .at_least(1)
            .collect::<Vec<_>>()
            .map_with(|branches, extra| match <[Expression; 1]>::try_from(branches) {
                Ok([single]) => single,
                Err(branches) => Expression::new(ExpressionKind::Alternative(branches), extra.span()),
            });

        let operators = alternatives.pratt((
            infix(left(1), symbol("||"), |l, _, r, extra| {
                binary(BinaryOperator::Or, l, r, extra.span())
            }),
            infix(left(2), symbol("&&"), |l, _, r, extra| {
                binary(BinaryOperator::And, l, r, extra.span())
            }),
            infix(left(3), symbol("=="), |l, _, r, extra| {
                binary(BinaryOperator::Equal, l, r, extra.span())
            }),
            infix(left(3), symbol("!="), |l, _, r, extra| {
                binary(BinaryOperator::NotEqual, l, r, extra.span())
            }),
            infix(left(4), symbol(">"), |l, _, r, extra| {
                binary(BinaryOperator::Greater, l, r, extra.span())
            }),
            infix(left(4), symbol(">="), |l, _, r, extra| {
                binary(BinaryOperator::GreaterOrEqual, l, r, extra.span())
            }),
            infix(left(4), symbol("<"), |l, _, r, extra| {
                binary(BinaryOperator::Less, l, r, extra.span())
            }),
            infix(left(4), symbol("<="), |l, _, r, extra| {
                binary(BinaryOperator::LessOrEqual, l, r, extra.span())
            }),
            infix(left(5), symbol("+"), |l, _, r, extra| {
                binary(BinaryOperator::Add, l, r, extra.span())
            }),
            infix(left(5), symbol("-"), |l, _, r, extra| {
                binary(BinaryOperator::Subtract, l, r, extra.span())
            }),
            infix(left(6), symbol("*"), |l, _, r, extra| {
                binary(BinaryOperator::Multiply, l, r, extra.span())
            }),
            infix(left(6), symbol("/"), |l, _, r, extra| {
                binary(BinaryOperator::Divide, l, r, extra.span())
            }),
            infix(left(6), symbol("%"), |l, _, r, extra| {
                binary(BinaryOperator::Remainder, l, r, extra.span())
            }),
            prefix(7, symbol("!"), |_, operand, extra| {
                Expression::new(ExpressionKind::Not(Box::new(operand)), extra.span())
            }),
            prefix(7, symbol("-"), |_, operand, extra| {
                Expression::new(ExpressionKind::Negate(Box::new(operand)), extra.span())
            }),
        ));

        // Conditional binds loosest and nests to the right.
        operators
            .then(
                symbol("?")
                    .ignore_then(expression.clone())
                    .then_ignore(symbol(":"))
                    .then(expression)
                    .or_not(),
            )
            .map_with(|(condition, branches), extra| match branches {
                None => condition,
                Some((then, otherwise)) => Expression::new(
                    ExpressionKind::Conditional {
                        condition: Box::new(condition),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                    extra.span(),
                ),
            })
    })
}

pub fn parser<'src, I>() -> impl Parser<'src, I, Vec<Item>, extra::Err<RichError<'src>>>
where
    I: ValueInput<'src, Token = Token, Span = Span>,
{
    let expression = expression_parser();

    recursive(|items| {
        let parameter = identifier()
            .then_ignore(symbol(":"))
            .then(identifier())
            .map_with(|(name, type_name), extra| Parameter {
                name,
                type_name,
                span: extra.span(),
            });

        let parameters = parameter
            .separated_by(symbol(","))
            .collect::<Vec<_>>()
            .delimited_by(symbol("("), symbol(")"));

        let body = choice((
            symbol(":")
                .ignore_then(expression.clone())
                .map(ItemBody::Value),
            parameters
                .then(expression.clone().delimited_by(symbol("{"), symbol("}")))
                .map(|(parameters, body)| ItemBody::Function { parameters, body }),
            items
                .delimited_by(symbol("{"), symbol("}"))
                .map(ItemBody::Block),
        ))
        .or_not()
        .map(|body| body.unwrap_or(ItemBody::Bare));

        identifier()
            .map_with(|name, extra| (name, extra.span()))
            .then(body)
            .map(|((name, span), body)| Item { name, span, body })
            .then_ignore(symbol(",").or_not())
            .repeated()
            .collect::<Vec<_>>()
    })
    .then_ignore(end())
}

fn first_error(errors: Vec<RichError<'_>>, end_of_input: usize) -> ParseError {
    match errors.into_iter().next() {
        Some(error) => ParseError::Syntax(error.to_string(), *error.span()),
        None => ParseError::Syntax("invalid syntax".to_string(), Span::from(end_of_input..end_of_input)),
    }
}

/// Parses a whole document into generic items.
pub fn parse_items(tokens: &[Token], source_len: usize) -> Result<Vec<Item>, ParseError> {
    let input = tokens.map(Span::from(source_len..source_len), |token| (token, &token.span));
    parser()
        .parse(input)
        .into_result()
        .map_err(|errors| first_error(errors, source_len))
}

/// Parses a single standalone expression.
pub fn parse_expression(tokens: &[Token], source_len: usize) -> Result<Expression, ParseError> {
    let input = tokens.map(Span::from(source_len..source_len), |token| (token, &token.span));
    expression_parser()
        .then_ignore(end())
        .parse(input)
        .into_result()
        .map_err(|errors| first_error(errors, source_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression(code: &str) -> Expression {
        let tokens = tokenize(code).unwrap();
        parse_expression(&tokens, code.len()).unwrap()
    }

    fn items(code: &str) -> Vec<Item> {
        let tokens = tokenize(code).unwrap();
        parse_items(&tokens, code.len()).unwrap()
    }

    fn operator(expression: &Expression) -> BinaryOperator {
        match &expression.kind {
            ExpressionKind::Binary { operator, .. } => *operator,
            other => panic!("expected a binary expression, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter() {
        let parsed = expression("1 + 2 * 3");
        assert_eq!(operator(&parsed), BinaryOperator::Add);
        let ExpressionKind::Binary { right, .. } = &parsed.kind else {
            unreachable!()
        };
        assert_eq!(operator(right), BinaryOperator::Multiply);
    }

    #[test]
    fn subtraction_is_left_associative() {
        let parsed = expression("10 - 6 - 3");
        let ExpressionKind::Binary { left, .. } = &parsed.kind else {
            panic!("expected binary")
        };
        assert_eq!(operator(left), BinaryOperator::Subtract);
    }

    #[test]
    fn logical_operators_bind_below_comparisons() {
        let parsed = expression("a < 1 || b >= 2 && c");
        assert_eq!(operator(&parsed), BinaryOperator::Or);
        let ExpressionKind::Binary { right, .. } = &parsed.kind else {
            panic!("expected binary")
        };
        assert_eq!(operator(right), BinaryOperator::And);
    }

    #[test]
    fn conditional_is_right_associative() {
        let parsed = expression("a ? 1 : b ? 2 : 3");
        let ExpressionKind::Conditional { otherwise, .. } = &parsed.kind else {
            panic!("expected conditional")
        };
        assert!(matches!(otherwise.kind, ExpressionKind::Conditional { .. }));
    }

    #[test]
    fn alternatives_and_shorthand() {
        let parsed = expression("mode == .compact|.expanded");
        let ExpressionKind::Binary { right, .. } = &parsed.kind else {
            panic!("expected binary")
        };
        let ExpressionKind::Alternative(branches) = &right.kind else {
            panic!("expected alternative")
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].kind, ExpressionKind::EnumShorthand("expanded".into()));
    }

    #[test]
    fn calls_paths_and_localized() {
        assert!(matches!(
            expression("max(a.b.c, 2)").kind,
            ExpressionKind::Call { ref name, ref arguments } if name == "max" && arguments.len() == 2
        ));
        assert_eq!(
            expression("user.name").kind,
            ExpressionKind::KeyPath(vec!["user".into(), "name".into()])
        );
        assert!(matches!(expression("@(\"hello %@\", name)").kind, ExpressionKind::Localized(ref args) if args.len() == 2));
    }

    #[test]
    fn switch_expands_single_wildcard() {
        let parsed = expression("switch (a, b) { case 1, true => \"A\" case _ => \"C\" }");
        let ExpressionKind::Switch { sources, cases } = &parsed.kind else {
            panic!("expected switch")
        };
        assert_eq!(sources.len(), 2);
        assert_eq!(cases[1].matchers.len(), 2);
        assert!(cases[1].matchers.iter().all(Expression::is_wildcard));
    }

    #[test]
    fn switch_matcher_counts_are_checked() {
        let code = "switch (a, b) { case 1, 2, 3 => \"A\" }";
        let tokens = tokenize(code).unwrap();
        let error = parse_expression(&tokens, code.len()).unwrap_err();
        assert!(error.to_string().contains("extra matcher"), "{error}");

        let code = "switch (a, b) { case 1 => \"A\" }";
        let tokens = tokenize(code).unwrap();
        let error = parse_expression(&tokens, code.len()).unwrap_err();
        assert!(error.to_string().contains("count mismatch"), "{error}");
    }

    #[test]
    fn item_forms() {
        let parsed = items("a: 1, b { c d: 2 } f(x: Number, y: String) { x }");
        assert_eq!(parsed.len(), 3);
        assert!(matches!(parsed[0].body, ItemBody::Value(_)));
        let ItemBody::Block(children) = &parsed[1].body else {
            panic!("expected block")
        };
        assert_eq!(children[0].body, ItemBody::Bare);
        let ItemBody::Function { parameters, .. } = &parsed[2].body else {
            panic!("expected function")
        };
        assert_eq!(parameters[1].type_name, "String");
    }

    #[test]
    fn reports_position_of_unexpected_token() {
        let code = "layout { text: 1 + }";
        let tokens = tokenize(code).unwrap();
        let error = parse_items(&tokens, code.len()).unwrap_err();
        assert!(error.span().start >= 17, "{error:?}");
    }
}
