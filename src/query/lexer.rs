use crate::error::{QueryError, QueryResult};

use super::token::{lookup_selector, Token, TokenKind};

/// The scanner is context sensitive: inside a bracketed predicate it
/// recognizes operators and the full literal grammar, outside it only the
/// path vocabulary. Brackets flip the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Path,
    Expression,
}

pub struct Scanner {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
    mode: Mode,
    buffer: String,
}

impl Scanner {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
            mode: Mode::Path,
            buffer: String::new(),
        }
    }

    /// Produce the next token. Never fails; malformed input comes back as an
    /// `Illegal` token carrying the offending slice.
    pub fn next_token(&mut self) -> Token {
        self.buffer.clear();
        let kind = match self.mode {
            Mode::Path => self.scan_path(),
            Mode::Expression => self.scan_expression(),
        };
        match kind {
            TokenKind::BegExpr => self.mode = Mode::Expression,
            TokenKind::EndExpr => self.mode = Mode::Path,
            _ => {}
        }
        Token {
            kind,
            literal: std::mem::take(&mut self.buffer),
        }
    }

    /// Scan the whole input, failing on the first illegal token.
    pub fn tokenize(&mut self) -> QueryResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            match token.kind {
                TokenKind::Eof => {
                    tokens.push(token);
                    break;
                }
                TokenKind::Illegal => return Err(QueryError::Lexical(token.literal)),
                _ => tokens.push(token),
            }
        }

        Ok(tokens)
    }

    fn scan_path(&mut self) -> TokenKind {
        let Some(ch) = self.current_char else {
            return TokenKind::Eof;
        };
        let start = self.position;
        let kind = match ch {
            c if c.is_ascii_digit() => self.scan_digits(),
            c if is_letter(c) => self.scan_word(),
            '\'' | '"' => self.scan_quoted(),
            c if is_control(c) => self.scan_control(),
            '/' => self.scan_pattern(),
            ':' => self.scan_selector(),
            _ => TokenKind::Illegal,
        };
        match kind {
            TokenKind::Comma => {
                self.skip_blanks();
                kind
            }
            TokenKind::Illegal => self.recover(start, is_control),
            _ => kind,
        }
    }

    fn scan_expression(&mut self) -> TokenKind {
        self.skip_blanks();
        let Some(ch) = self.current_char else {
            // an open bracket is never closed by the end of input
            return TokenKind::Illegal;
        };
        let start = self.position;
        let kind = match ch {
            '\'' | '"' => self.scan_quoted(),
            c if is_operator(c) => self.scan_operator(),
            c if c.is_ascii_digit() || (is_sign(c) && self.peek_digit()) => {
                if c == '0' && matches!(self.peek(), Some('x') | Some('o') | Some('b')) {
                    self.scan_base()
                } else {
                    self.scan_number()
                }
            }
            c if is_letter(c) || (is_sign(c) && self.peek_letter()) => self.scan_word(),
            c if is_control(c) => self.scan_control(),
            '/' => self.scan_pattern(),
            _ => TokenKind::Illegal,
        };
        if kind == TokenKind::Illegal {
            return self.recover(start, |c| is_control(c) || is_operator(c));
        }
        kind
    }

    /// Re-read from `start` up to the next boundary so the illegal token
    /// carries enough context to be useful in the error message.
    fn recover(&mut self, start: usize, boundary: fn(char) -> bool) -> TokenKind {
        self.reset(start);
        while let Some(ch) = self.current_char {
            if boundary(ch) {
                break;
            }
            self.push(ch);
            self.advance();
        }
        TokenKind::Illegal
    }

    fn scan_control(&mut self) -> TokenKind {
        let kind = match self.current_char {
            Some('(') => TokenKind::BegGrp,
            Some(')') => TokenKind::EndGrp,
            Some(',') => TokenKind::Comma,
            Some('[') => TokenKind::BegExpr,
            Some(']') => TokenKind::EndExpr,
            Some('%') => TokenKind::Value,
            Some('$') => TokenKind::Regular,
            Some('@') => TokenKind::Array,
            Some('.') => {
                if self.peek() == Some('.') {
                    self.advance();
                    TokenKind::LevelAny
                } else {
                    TokenKind::LevelOne
                }
            }
            _ => TokenKind::Illegal,
        };
        self.advance();
        kind
    }

    fn scan_operator(&mut self) -> TokenKind {
        let kind = match self.current_char {
            Some('*') => self.equal_suffix(TokenKind::Contains),
            Some('~') => self.equal_suffix(TokenKind::Match),
            Some('$') => self.equal_suffix(TokenKind::EndsWith),
            Some('^') => self.equal_suffix(TokenKind::StartsWith),
            Some('=') => self.equal_suffix(TokenKind::Equal),
            Some('!') => self.equal_suffix(TokenKind::NotEqual),
            Some('<') => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::LessEq
                } else {
                    TokenKind::Lesser
                }
            }
            Some('>') => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::GreatEq
                } else {
                    TokenKind::Greater
                }
            }
            Some('&') => {
                if self.peek() == Some('&') {
                    self.advance();
                    TokenKind::And
                } else {
                    TokenKind::Illegal
                }
            }
            Some('|') => {
                if self.peek() == Some('|') {
                    self.advance();
                    TokenKind::Or
                } else {
                    TokenKind::Illegal
                }
            }
            Some(',') => TokenKind::Comma,
            _ => TokenKind::Illegal,
        };
        self.advance();
        kind
    }

    fn equal_suffix(&mut self, kind: TokenKind) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            kind
        } else {
            TokenKind::Illegal
        }
    }

    /// Bare digits in path position, used as integer map keys.
    fn scan_digits(&mut self) -> TokenKind {
        if !self.scan_until(|c| c.is_ascii_digit()) {
            return TokenKind::Illegal;
        }
        TokenKind::Integer
    }

    fn scan_word(&mut self) -> TokenKind {
        let ok = self.scan_until(is_alpha);
        if matches!(self.buffer.as_str(), "true" | "false") {
            return TokenKind::Bool;
        }
        if !ok {
            return TokenKind::Illegal;
        }
        TokenKind::Literal
    }

    /// Consume accepted characters up to the next boundary; a character that
    /// is neither accepted nor a boundary poisons the token.
    fn scan_until(&mut self, accept: fn(char) -> bool) -> bool {
        while let Some(ch) = self.current_char {
            if is_boundary(ch) {
                break;
            }
            if !accept(ch) {
                return false;
            }
            self.push(ch);
            self.advance();
        }
        true
    }

    fn scan_selector(&mut self) -> TokenKind {
        self.advance();
        while let Some(ch) = self.current_char {
            if !is_letter(ch) {
                break;
            }
            self.push(ch);
            self.advance();
        }
        match lookup_selector(&self.buffer) {
            Some(kind) => kind,
            None => TokenKind::Illegal,
        }
    }

    /// `/…/` delimited pattern, taken verbatim.
    fn scan_pattern(&mut self) -> TokenKind {
        self.advance();
        while let Some(ch) = self.current_char {
            if ch == '/' {
                self.advance();
                return TokenKind::Pattern;
            }
            self.push(ch);
            self.advance();
        }
        TokenKind::Illegal
    }

    fn scan_quoted(&mut self) -> TokenKind {
        let Some(quote) = self.current_char else {
            return TokenKind::Illegal;
        };
        self.advance();
        while let Some(ch) = self.current_char {
            if ch == quote {
                self.advance();
                return TokenKind::Literal;
            }
            if quote == '"' && ch == '\\' {
                self.advance();
                match self.scan_escape() {
                    Some(decoded) => self.buffer.push(decoded),
                    None => return TokenKind::Illegal,
                }
                continue;
            }
            self.push(ch);
            self.advance();
        }
        TokenKind::Illegal
    }

    fn scan_escape(&mut self) -> Option<char> {
        match self.current_char {
            Some('u') => self.scan_unicode_escape(4),
            Some('U') => self.scan_unicode_escape(8),
            Some(ch) => {
                let decoded = match ch {
                    '\\' => '\\',
                    '"' => '"',
                    'n' => '\n',
                    't' => '\t',
                    'f' => '\u{c}',
                    'b' => '\u{8}',
                    'r' => '\r',
                    _ => return None,
                };
                self.advance();
                Some(decoded)
            }
            None => None,
        }
    }

    fn scan_unicode_escape(&mut self, width: u32) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..width {
            self.advance();
            let digit = self.current_char.and_then(|c| c.to_digit(16))?;
            code = (code << 4) | digit;
        }
        self.advance();
        char::from_u32(code)
    }

    /// Numeric literal in a predicate. The first disambiguating character
    /// decides between integer, float, date, time and datetime.
    fn scan_number(&mut self) -> TokenKind {
        if matches!(self.current_char, Some(c) if is_sign(c)) {
            self.push_current();
        }
        if self.current_char == Some('0') && self.peek_digit() {
            return TokenKind::Illegal;
        }
        while let Some(ch) = self.current_char {
            match ch {
                '-' => return self.scan_date(),
                ':' => return self.scan_time(),
                '.' => return self.scan_fraction(),
                'e' | 'E' => return self.scan_exponent(),
                '_' => {
                    if !(self.prev_digit() && self.peek_digit()) {
                        return TokenKind::Illegal;
                    }
                }
                c if c.is_ascii_digit() => self.push(c),
                _ => break,
            }
            self.advance();
        }
        TokenKind::Integer
    }

    /// `0x`, `0o` and `0b` prefixed integers; underscores only between two
    /// digits of the base.
    fn scan_base(&mut self) -> TokenKind {
        self.push_current();
        let accept: fn(char) -> bool = match self.current_char {
            Some('x') => |c| c.is_ascii_hexdigit(),
            Some('o') => |c| matches!(c, '0'..='7'),
            Some('b') => |c| matches!(c, '0' | '1'),
            _ => return TokenKind::Illegal,
        };
        self.push_current();
        while let Some(ch) = self.current_char {
            if ch == '_' {
                let ok = matches!(self.prev(), Some(c) if accept(c))
                    && matches!(self.peek(), Some(c) if accept(c));
                if !ok {
                    return TokenKind::Illegal;
                }
                self.advance();
                continue;
            }
            if !accept(ch) {
                break;
            }
            self.push(ch);
            self.advance();
        }
        TokenKind::Integer
    }

    /// Called with the year digits already buffered and the cursor on `-`.
    fn scan_date(&mut self) -> TokenKind {
        for _ in 0..2 {
            if self.current_char != Some('-') {
                return TokenKind::Illegal;
            }
            self.push_current();
            if !self.scan_fixed_digits(2) {
                return TokenKind::Illegal;
            }
        }
        let separated = matches!(self.current_char, Some(' ') | Some('T'));
        if separated && self.peek_digit() {
            self.push_current();
            if self.scan_time() == TokenKind::Illegal {
                return TokenKind::Illegal;
            }
            return self.scan_timezone();
        }
        TokenKind::Date
    }

    /// Either continues a bare number whose hours are already buffered (the
    /// cursor sits on `:`) or reads the full clock after a date separator.
    fn scan_time(&mut self) -> TokenKind {
        if self.current_char != Some(':') {
            while matches!(self.current_char, Some(c) if c.is_ascii_digit()) {
                self.push_current();
            }
        }
        for _ in 0..2 {
            if self.current_char != Some(':') {
                return TokenKind::Illegal;
            }
            self.push_current();
            if !self.scan_fixed_digits(2) {
                return TokenKind::Illegal;
            }
        }
        if self.current_char == Some('.') {
            self.push_current();
            let mut digits = 0;
            while matches!(self.current_char, Some(c) if c.is_ascii_digit()) {
                self.push_current();
                digits += 1;
            }
            if digits > 9 {
                return TokenKind::Illegal;
            }
        }
        TokenKind::Time
    }

    fn scan_timezone(&mut self) -> TokenKind {
        match self.current_char {
            Some('Z') => {
                self.push_current();
                TokenKind::DateTime
            }
            Some('+') | Some('-') => {
                self.push_current();
                if !self.scan_fixed_digits(2) {
                    return TokenKind::Illegal;
                }
                if self.current_char != Some(':') {
                    return TokenKind::Illegal;
                }
                self.push_current();
                if !self.scan_fixed_digits(2) {
                    return TokenKind::Illegal;
                }
                TokenKind::DateTime
            }
            _ => TokenKind::DateTime,
        }
    }

    fn scan_fraction(&mut self) -> TokenKind {
        self.push_current();
        while let Some(ch) = self.current_char {
            match ch {
                'e' | 'E' => return self.scan_exponent(),
                '_' => {
                    if !(self.prev_digit() && self.peek_digit()) {
                        return TokenKind::Illegal;
                    }
                }
                c if c.is_ascii_digit() => self.push(c),
                _ => break,
            }
            self.advance();
        }
        TokenKind::Float
    }

    fn scan_exponent(&mut self) -> TokenKind {
        self.push_current();
        if matches!(self.current_char, Some(c) if is_sign(c)) {
            self.push_current();
        }
        while let Some(ch) = self.current_char {
            match ch {
                '_' => {
                    if !(self.prev_digit() && self.peek_digit()) {
                        return TokenKind::Illegal;
                    }
                }
                c if c.is_ascii_digit() => self.push(c),
                _ => break,
            }
            self.advance();
        }
        TokenKind::Float
    }

    fn scan_fixed_digits(&mut self, count: usize) -> bool {
        for _ in 0..count {
            match self.current_char {
                Some(c) if c.is_ascii_digit() => self.push_current(),
                _ => return false,
            }
        }
        true
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn reset(&mut self, at: usize) {
        self.position = at;
        self.current_char = self.input.get(at).copied();
        self.buffer.clear();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn prev(&self) -> Option<char> {
        self.position
            .checked_sub(1)
            .and_then(|at| self.input.get(at))
            .copied()
    }

    fn peek_digit(&self) -> bool {
        matches!(self.peek(), Some(c) if c.is_ascii_digit())
    }

    fn peek_letter(&self) -> bool {
        matches!(self.peek(), Some(c) if is_letter(c))
    }

    fn prev_digit(&self) -> bool {
        matches!(self.prev(), Some(c) if c.is_ascii_digit())
    }

    fn push(&mut self, ch: char) {
        self.buffer.push(ch);
    }

    /// Buffer the cursor character and advance past it.
    fn push_current(&mut self) {
        if let Some(ch) = self.current_char {
            self.buffer.push(ch);
        }
        self.advance();
    }

    fn skip_blanks(&mut self) {
        while matches!(self.current_char, Some(' ') | Some('\t')) {
            self.advance();
        }
    }
}

fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_alpha(c: char) -> bool {
    is_letter(c) || c.is_ascii_digit() || c == '_' || c == '-'
}

fn is_sign(c: char) -> bool {
    c == '+' || c == '-'
}

fn is_operator(c: char) -> bool {
    matches!(
        c,
        '=' | '!' | '<' | '>' | '&' | '|' | '~' | '^' | '$' | '*' | ','
    )
}

fn is_control(c: char) -> bool {
    matches!(c, '%' | '@' | '$' | '.' | '[' | ']' | '(' | ')' | ',')
}

fn is_boundary(c: char) -> bool {
    is_control(c) || is_operator(c) || c == ' ' || c == '\t' || c == ':'
}
