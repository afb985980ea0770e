//! Error taxonomy: lexical, parse and link errors abort a build; registration
//! errors reject host setup calls. Runtime value errors never surface here,
//! they are filtered out of input streams and logged.

use crate::parser::{Position, SourceCode, Span};
use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected symbol '{0}'")]
    UnexpectedSymbol(char, Position),

    #[error("unterminated string")]
    UnterminatedString(Position),

    #[error("unknown escape sequence '\\{0}'")]
    UnknownEscape(char, Position),

    #[error("color literal needs one to six hex digits")]
    InvalidColor(Position),

    #[error("malformed number '{0}'")]
    MalformedNumber(String, Position),
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            Self::UnexpectedSymbol(_, position)
            | Self::UnterminatedString(position)
            | Self::UnknownEscape(_, position)
            | Self::InvalidColor(position)
            | Self::MalformedNumber(_, position) => *position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(String, Span),

    #[error("unknown block '{0}'")]
    UnknownBlock(String, Span),

    #[error("block '{0}' is out of order or repeated")]
    MisplacedBlock(String, Span),

    #[error("missing layout block")]
    MissingLayout(Span),

    #[error("'{0}' must be a block")]
    ExpectedBlock(String, Span),

    #[error("invalid declaration in {0}: {1}")]
    InvalidDeclaration(&'static str, String, Span),

    #[error("unknown property '{0}' for {1}")]
    UnknownProperty(String, String, Span),

    #[error("duplicate property '{0}'")]
    DuplicateProperty(String, Span),

    #[error("unknown view kind '{0}'")]
    UnknownView(String, Span),

    #[error("{0} cannot contain views")]
    NotAContainer(String, Span),

    #[error("layer can only appear at the top of the layout")]
    NestedLayer(Span),

    #[error("list needs an 'items' property")]
    MissingItems(Span),

    #[error("unknown binding kind '{0}', expected View, Button or List")]
    UnknownBindingKind(String, Span),

    #[error("binding '{0}' has no registered {1}")]
    UnboundHostObject(String, String, Span),

    #[error("unknown type '{0}'")]
    UnknownType(String, Span),

    #[error("unknown input '{0}'")]
    UnknownInput(String, Span),

    #[error("input '{0}' is already typed as {1}")]
    InputTypeConflict(String, String, Span),

    #[error("{0}")]
    Registration(RegistrationError, Span),
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            Self::Syntax(_, span)
            | Self::UnknownBlock(_, span)
            | Self::MisplacedBlock(_, span)
            | Self::MissingLayout(span)
            | Self::ExpectedBlock(_, span)
            | Self::InvalidDeclaration(_, _, span)
            | Self::UnknownProperty(_, _, span)
            | Self::DuplicateProperty(_, span)
            | Self::UnknownView(_, span)
            | Self::NotAContainer(_, span)
            | Self::NestedLayer(span)
            | Self::MissingItems(span)
            | Self::UnknownBindingKind(_, span)
            | Self::UnboundHostObject(_, _, span)
            | Self::UnknownType(_, span)
            | Self::UnknownInput(_, span)
            | Self::InputTypeConflict(_, _, span)
            | Self::Registration(_, span) => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("cannot cast {0} to {1}")]
    CannotCast(String, String, Span),

    #[error("nil cannot be cast to {0}")]
    NilCast(String, Span),

    #[error("cannot resolve '.{0}' without an enum type")]
    MissingEnumHint(String, Span),

    #[error("enum {0} has no case '{1}'")]
    UnknownEnumCase(String, String, Span),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String, Span),

    #[error("variant '{0}' has no field '{1}'")]
    UnknownField(String, String, Span),

    #[error("input '{0}' has no declared type")]
    UntypedInput(String, Span),

    #[error("circular reference through '{0}'")]
    CircularReference(String, Span),

    #[error("wildcard '_' is only allowed as a switch matcher")]
    MisplacedWildcard(Span),

    #[error("operator '{0}' expects numbers, found {1}")]
    ExpectsNumbers(&'static str, String, Span),

    #[error("operator '{0}' expects numbers or strings, found {1}")]
    ExpectsNumbersOrStrings(&'static str, String, Span),

    #[error("operands of '{0}' have different types: {1} and {2}")]
    OperandMismatch(&'static str, String, String, Span),

    #[error("cannot compare {0} with {1}")]
    CannotCompare(String, String, Span),

    #[error("{0} has no alternative (set) type")]
    NoAlternativeType(String, Span),

    #[error("branches have different types: {0} and {1}")]
    BranchMismatch(String, String, Span),

    #[error("cannot find function {0}")]
    CannotFindFunction(String, Span),

    #[error("function {0} is already declared")]
    DuplicateFunction(String, Span),

    #[error("localized string needs at least one argument")]
    EmptyLocalized(Span),

    #[error("unknown type '{0}'")]
    UnknownType(String, Span),

    #[error("list items must have a list type, found {0}")]
    NotAList(String, Span),

    #[error("list type {0} has no variant '{1}'")]
    UnknownVariant(String, String, Span),
}

impl LinkError {
    pub fn span(&self) -> Span {
        match self {
            Self::CannotCast(_, _, span)
            | Self::NilCast(_, span)
            | Self::MissingEnumHint(_, span)
            | Self::UnknownEnumCase(_, _, span)
            | Self::UnknownVariable(_, span)
            | Self::UnknownField(_, _, span)
            | Self::UntypedInput(_, span)
            | Self::CircularReference(_, span)
            | Self::MisplacedWildcard(span)
            | Self::ExpectsNumbers(_, _, span)
            | Self::ExpectsNumbersOrStrings(_, _, span)
            | Self::OperandMismatch(_, _, _, span)
            | Self::CannotCompare(_, _, span)
            | Self::NoAlternativeType(_, span)
            | Self::BranchMismatch(_, _, span)
            | Self::CannotFindFunction(_, span)
            | Self::DuplicateFunction(_, span)
            | Self::EmptyLocalized(span)
            | Self::UnknownType(_, span)
            | Self::NotAList(_, span)
            | Self::UnknownVariant(_, _, span) => *span,
        }
    }
}

/// Host setup mistakes; registration names are unique per engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    #[error("input '{0}' is already registered")]
    DuplicateInput(String),

    #[error("'{0}' is already registered as a view, button or list")]
    DuplicateHostObject(String),

    #[error("unknown type '{0}'")]
    UnknownType(String),
}

/// First error of a failed build, with its resolved source position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("{position}: lexical error: {error}")]
    Lex { error: LexError, position: Position },

    #[error("{position}: parse error: {error}")]
    Parse { error: ParseError, position: Position },

    #[error("{position}: link error: {error}")]
    Link { error: LinkError, position: Position },
}

impl BuildError {
    pub fn lex(error: LexError) -> Self {
        let position = error.position();
        Self::Lex { error, position }
    }

    pub fn parse(error: ParseError, source: &SourceCode) -> Self {
        let position = source.position(error.span().start);
        Self::Parse { error, position }
    }

    pub fn link(error: LinkError, source: &SourceCode) -> Self {
        let position = source.position(error.span().start);
        Self::Link { error, position }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::Lex { position, .. } | Self::Parse { position, .. } | Self::Link { position, .. } => {
                *position
            }
        }
    }

    pub fn line(&self) -> usize {
        self.position().line
    }

    pub fn column(&self) -> usize {
        self.position().column
    }

    /// Message without the position prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Lex { error, .. } => error.to_string(),
            Self::Parse { error, .. } => error.to_string(),
            Self::Link { error, .. } => error.to_string(),
        }
    }

    fn byte_range(&self) -> std::ops::Range<usize> {
        match self {
            Self::Lex { position, .. } => position.offset..position.offset + 1,
            Self::Parse { error, .. } => error.span().into_range(),
            Self::Link { error, .. } => error.span().into_range(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Lex { .. } => "lexical error",
            Self::Parse { .. } => "parse error",
            Self::Link { .. } => "link error",
        }
    }

    /// Renders the error as an ariadne report against `source_code`.
    pub fn report(&self, filename: &str, source_code: &str) -> String {
        let range = self.byte_range();
        let range = range.start.min(source_code.len())..range.end.min(source_code.len());
        let mut report_bytes = Vec::new();
        let written = Report::build(ReportKind::Error, (filename, range.clone()))
            .with_config(Config::default().with_color(false))
            .with_message(self.kind())
            .with_label(Label::new((filename, range)).with_message(self.message()))
            .finish()
            .write((filename, Source::from(source_code)), &mut report_bytes);
        match written {
            Ok(()) => String::from_utf8_lossy(&report_bytes).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_errors_resolve_positions() {
        let source = SourceCode::new("layout {\n  layer { }\n}");
        let error = BuildError::link(LinkError::UnknownVariable("x".into(), Span::from(11..16)), &source);
        assert_eq!((error.line(), error.column()), (2, 3));
        assert_eq!(error.message(), "unknown variable 'x'");
        assert!(error.to_string().starts_with("2:3: link error"));
    }

    #[test]
    fn reports_name_the_file() {
        let source = "a + ";
        let error = BuildError::parse(
            ParseError::Syntax("found end of input".into(), Span::from(4..4)),
            &SourceCode::new(source),
        );
        let report = error.report("main.strata", source);
        assert!(report.contains("main.strata"));
        assert!(report.contains("found end of input"));
    }
}
