use super::{Position, Span};
use crate::error::LexError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::CharIndices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Number,
    Identifier,
    String,
    Color,
    Symbol,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text: decoded for strings, without `#` for colors.
    pub content: String,
    pub line: usize,
    pub column: usize,
    pub span: Span,
}

impl Token {
    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.content == symbol
    }

    pub fn is_identifier(&self, identifier: &str) -> bool {
        self.kind == TokenKind::Identifier && self.content == identifier
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::String => write!(f, "{:?}", self.content),
            TokenKind::Color => write!(f, "#{}", self.content),
            _ => write!(f, "{}", self.content),
        }
    }
}

/// Two-character symbols, always preferred over their one-character prefix.
const COMPOUND_SYMBOLS: [&str; 7] = ["&&", "||", "==", "!=", ">=", "<=", "=>"];

fn is_digit(character: char) -> bool {
    character.is_ascii_digit()
}

fn is_letter(character: char) -> bool {
    character.is_alphabetic() || character == '_'
}

fn is_hex_digit(character: char) -> bool {
    character.is_ascii_hexdigit()
}

fn is_whitespace(character: char) -> bool {
    character.is_whitespace()
}

fn is_newline(character: char) -> bool {
    character == '\n'
}

fn is_symbol(character: char) -> bool {
    matches!(
        character,
        '(' | ')'
            | '{'
            | '}'
            | '['
            | ']'
            | ','
            | ':'
            | '.'
            | '?'
            | '|'
            | '!'
            | '='
            | '<'
            | '>'
            | '+'
            | '-'
            | '*'
            | '%'
            | '@'
            | '&'
    )
}

/// Returns the closing mark for an opening quote.
fn is_quote(character: char) -> Option<char> {
    match character {
        '"' => Some('"'),
        '\'' => Some('\''),
        '“' => Some('”'),
        '‘' => Some('’'),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Whitespace,
    Identifier,
    Number,
    FloatPoint,
    Float,
    String { closing: char },
    StringEscape { closing: char },
    Color,
    MaybeComment,
    Comment,
    Symbol { first: char },
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Char(char, Position),
    End(Position),
}

/// Finite-state scanner with one token of lookahead.
///
/// Every character read becomes an [`Event`]. A transition that finishes a
/// token without consuming the character puts the event back on the pending
/// queue, so the next state sees it without any recursion.
pub struct Scanner<'src> {
    chars: CharIndices<'src>,
    source_len: usize,
    line: usize,
    column: usize,
    state: State,
    pending: VecDeque<Event>,
    produced: VecDeque<Token>,
    buffer: String,
    token_start: Position,
    token_end: usize,
    finished: bool,
    current: Option<Token>,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Result<Self, LexError> {
        let mut scanner = Self {
            chars: source.char_indices(),
            source_len: source.len(),
            line: 1,
            column: 1,
            state: State::Whitespace,
            pending: VecDeque::new(),
            produced: VecDeque::new(),
            buffer: String::new(),
            token_start: Position::START,
            token_end: 0,
            finished: false,
            current: None,
        };
        scanner.current = scanner.scan()?;
        Ok(scanner)
    }

    pub fn current(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    /// Advances to the next token and returns it; `None` once the source is exhausted.
    pub fn next(&mut self) -> Result<Option<&Token>, LexError> {
        self.current = self.scan()?;
        Ok(self.current.as_ref())
    }

    fn scan(&mut self) -> Result<Option<Token>, LexError> {
        loop {
            if let Some(token) = self.produced.pop_front() {
                return Ok(Some(token));
            }
            if self.finished {
                return Ok(None);
            }
            let event = match self.pending.pop_front() {
                Some(event) => event,
                None => self.read(),
            };
            self.step(event)?;
        }
    }

    fn read(&mut self) -> Event {
        let Some((offset, character)) = self.chars.next() else {
            return Event::End(Position {
                offset: self.source_len,
                line: self.line,
                column: self.column,
            });
        };
        let position = Position {
            offset,
            line: self.line,
            column: self.column,
        };
        if is_newline(character) {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Event::Char(character, position)
    }

    fn step(&mut self, event: Event) -> Result<(), LexError> {
        match (self.state, event) {
            (State::Whitespace, Event::End(_)) => self.finished = true,
            (State::Whitespace, Event::Char(character, position)) => {
                self.whitespace(character, position)?
            }

            (State::Identifier, Event::Char(character, position))
                if is_letter(character) || is_digit(character) =>
            {
                self.append(character, position)
            }
            (State::Identifier, event) => self.produce_and_requeue(TokenKind::Identifier, event),

            (State::Number, Event::Char(character, position)) if is_digit(character) => {
                self.append(character, position)
            }
            (State::Number, Event::Char('.', position)) => {
                self.append('.', position);
                self.state = State::FloatPoint;
            }
            (State::Number, event) => self.produce_and_requeue(TokenKind::Number, event),

            (State::FloatPoint, Event::Char(character, position)) if is_digit(character) => {
                self.append(character, position);
                self.state = State::Float;
            }
            (State::FloatPoint, _) => {
                return Err(LexError::MalformedNumber(
                    self.buffer.clone(),
                    self.token_start,
                ));
            }

            (State::Float, Event::Char(character, position)) if is_digit(character) => {
                self.append(character, position)
            }
            (State::Float, event) => self.produce_and_requeue(TokenKind::Number, event),

            (State::String { closing }, Event::Char(character, position)) => {
                if character == closing {
                    self.accept(character, position);
                    self.produce(TokenKind::String);
                } else if character == '\\' {
                    self.accept(character, position);
                    self.state = State::StringEscape { closing };
                } else {
                    self.append(character, position);
                }
            }
            (State::StringEscape { closing }, Event::Char(character, position)) => {
                let decoded = match character {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'a' => '\u{7}',
                    '"' | '\'' | '\\' => character,
                    other if other == closing => other,
                    other => return Err(LexError::UnknownEscape(other, position)),
                };
                self.append(decoded, position);
                self.state = State::String { closing };
            }
            (State::String { .. } | State::StringEscape { .. }, Event::End(_)) => {
                return Err(LexError::UnterminatedString(self.token_start));
            }

            (State::Color, Event::Char(character, position)) if is_hex_digit(character) => {
                self.append(character, position);
                if self.buffer.len() > 6 {
                    return Err(LexError::InvalidColor(self.token_start));
                }
            }
            (State::Color, event) => {
                if self.buffer.is_empty() {
                    return Err(LexError::InvalidColor(self.token_start));
                }
                self.produce_and_requeue(TokenKind::Color, event);
            }

            (State::MaybeComment, Event::Char('/', _)) => self.state = State::Comment,
            (State::MaybeComment, event) => {
                self.buffer.push('/');
                self.produce_and_requeue(TokenKind::Symbol, event);
            }

            (State::Comment, Event::Char(character, _)) => {
                if is_newline(character) {
                    self.state = State::Whitespace;
                }
            }
            (State::Comment, event @ Event::End(_)) => {
                self.state = State::Whitespace;
                self.pending.push_back(event);
            }

            (State::Symbol { first }, event) => {
                if let Event::Char(second, position) = event {
                    let pair: String = [first, second].iter().collect();
                    if COMPOUND_SYMBOLS.contains(&pair.as_str()) {
                        self.buffer = pair;
                        self.accept(second, position);
                        self.produce(TokenKind::Symbol);
                        return Ok(());
                    }
                }
                if first == '&' {
                    return Err(LexError::UnexpectedSymbol(first, self.token_start));
                }
                self.buffer.push(first);
                self.produce_and_requeue(TokenKind::Symbol, event);
            }
        }
        Ok(())
    }

    fn whitespace(&mut self, character: char, position: Position) -> Result<(), LexError> {
        if is_whitespace(character) {
            return Ok(());
        }
        self.begin(position);
        if is_digit(character) {
            self.append(character, position);
            self.state = State::Number;
        } else if is_letter(character) {
            self.append(character, position);
            self.state = State::Identifier;
        } else if let Some(closing) = is_quote(character) {
            self.accept(character, position);
            self.state = State::String { closing };
        } else if character == '#' {
            self.accept(character, position);
            self.state = State::Color;
        } else if character == '/' {
            self.accept(character, position);
            self.state = State::MaybeComment;
        } else if is_symbol(character) {
            self.accept(character, position);
            self.state = State::Symbol { first: character };
        } else {
            return Err(LexError::UnexpectedSymbol(character, position));
        }
        Ok(())
    }

    fn begin(&mut self, position: Position) {
        self.buffer.clear();
        self.token_start = position;
        self.token_end = position.offset;
    }

    fn accept(&mut self, character: char, position: Position) {
        self.token_end = position.offset + character.len_utf8();
    }

    fn append(&mut self, character: char, position: Position) {
        self.buffer.push(character);
        self.accept(character, position);
    }

    fn produce(&mut self, kind: TokenKind) {
        self.produced.push_back(Token {
            kind,
            content: std::mem::take(&mut self.buffer),
            line: self.token_start.line,
            column: self.token_start.column,
            span: Span::from(self.token_start.offset..self.token_end),
        });
        self.state = State::Whitespace;
    }

    fn produce_and_requeue(&mut self, kind: TokenKind, event: Event) {
        self.produce(kind);
        self.pending.push_back(event);
    }
}

/// Scans the whole source; the first lexical error aborts.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut scanner = Scanner::new(source)?;
    let mut tokens: Vec<Token> = scanner.current().cloned().into_iter().collect();
    while let Some(token) = scanner.next()? {
        tokens.push(token.clone());
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn contents(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| (token.kind, token.content))
            .collect()
    }

    #[rstest]
    #[case("12", TokenKind::Number, "12")]
    #[case("1.25", TokenKind::Number, "1.25")]
    #[case("user_name2", TokenKind::Identifier, "user_name2")]
    #[case("_", TokenKind::Identifier, "_")]
    #[case("\"a\\nb\"", TokenKind::String, "a\nb")]
    #[case("'tab\\there'", TokenKind::String, "tab\there")]
    #[case("\"line\\rfeed\"", TokenKind::String, "line\rfeed")]
    #[case("\"bell\\a\"", TokenKind::String, "bell\u{7}")]
    #[case("\"say \\\"hi\\\"\"", TokenKind::String, "say \"hi\"")]
    #[case("'it\\'s'", TokenKind::String, "it's")]
    #[case("“curly 'quote'”", TokenKind::String, "curly 'quote'")]
    #[case("‘single’", TokenKind::String, "single")]
    #[case("#ff8800", TokenKind::Color, "ff8800")]
    #[case("#abc", TokenKind::Color, "abc")]
    #[case(">=", TokenKind::Symbol, ">=")]
    #[case("&&", TokenKind::Symbol, "&&")]
    #[case("=>", TokenKind::Symbol, "=>")]
    #[case("/", TokenKind::Symbol, "/")]
    fn single_tokens(#[case] source: &str, #[case] kind: TokenKind, #[case] content: &str) {
        assert_eq!(contents(source), vec![(kind, content.to_string())]);
    }

    #[test]
    fn compound_symbols_are_greedy() {
        let symbols: Vec<String> = contents("a>=b>c<=d<e==f!=g")
            .into_iter()
            .filter(|(kind, _)| *kind == TokenKind::Symbol)
            .map(|(_, content)| content)
            .collect();
        assert_eq!(symbols, [">=", ">", "<=", "<", "==", "!="]);
    }

    #[test]
    fn division_is_not_a_comment() {
        assert_eq!(
            contents("6 / 3 // trailing comment\n+ 1"),
            vec![
                (TokenKind::Number, "6".into()),
                (TokenKind::Symbol, "/".into()),
                (TokenKind::Number, "3".into()),
                (TokenKind::Symbol, "+".into()),
                (TokenKind::Number, "1".into()),
            ]
        );
    }

    #[test]
    fn comment_at_end_of_input() {
        assert_eq!(contents("x // done"), vec![(TokenKind::Identifier, "x".into())]);
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tokens = tokenize("layout {\n  label\n}").unwrap();
        let label = &tokens[2];
        assert_eq!((label.line, label.column), (2, 3));
        assert_eq!(label.span.into_range(), 11..16);
    }

    #[test]
    fn lookahead_is_pre_read() {
        let mut scanner = Scanner::new("a b").unwrap();
        assert_eq!(scanner.current().map(|token| token.content.as_str()), Some("a"));
        assert_eq!(scanner.next().unwrap().map(|token| token.content.clone()), Some("b".into()));
        assert!(scanner.next().unwrap().is_none());
        assert!(scanner.current().is_none());
    }

    #[test]
    fn color_longer_than_six_digits_fails() {
        assert!(matches!(tokenize("#1234567"), Err(LexError::InvalidColor(_))));
        assert!(matches!(tokenize("#"), Err(LexError::InvalidColor(_))));
    }

    #[test]
    fn unterminated_string_fails() {
        let error = tokenize("text: \"open").unwrap_err();
        assert_eq!(error, LexError::UnterminatedString(Position { offset: 6, line: 1, column: 7 }));
    }

    #[test]
    fn lone_ampersand_is_unexpected() {
        assert!(matches!(tokenize("a & b"), Err(LexError::UnexpectedSymbol('&', _))));
        assert!(matches!(tokenize("a $ b"), Err(LexError::UnexpectedSymbol('$', _))));
    }

    #[test]
    fn unknown_escape_fails() {
        assert!(matches!(tokenize("\"\\q\""), Err(LexError::UnknownEscape('q', _))));
    }

    #[test]
    fn number_needs_digits_after_point() {
        assert!(matches!(tokenize("1.x"), Err(LexError::MalformedNumber(..))));
    }
}
