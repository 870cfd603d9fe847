//! Hand-rolled lexer with automatic semicolon insertion.
//!
//! The lexer works on a peekable char cursor over one file's source text and
//! produces the complete token vector up front; the parser then indexes into
//! it freely. A newline following a statement-ending token (identifier,
//! literal, `)`, `}`, `++`, ...) inserts an implicit [`TokenKind::Semicolon`],
//! matching the source language's layout rule.

use std::str::Chars;

use crate::{
    error::SyntaxError,
    position::Pos,
    token::{Token, TokenKind},
};

pub(crate) struct Lexer<'a> {
    chars: Chars<'a>,
    /// Global offset of the next char to be read.
    offset: u32,
    base: u32,
    lookahead: Option<char>,
    tokens: Vec<Token>,
}

/// Lexes one file into a token vector ending in [`TokenKind::Eof`].
///
/// `base` is the file's base offset in the owning
/// [`FileSet`](crate::position::FileSet).
pub(crate) fn lex(src: &str, base: u32) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        chars: src.chars(),
        offset: 0,
        base,
        lookahead: None,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn peek(&mut self) -> Option<char> {
        if self.lookahead.is_none() {
            self.lookahead = self.chars.next();
        }
        self.lookahead
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.lookahead = None;
        self.offset += u32::try_from(c.len_utf8()).unwrap_or(1);
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos::new(self.base + self.offset)
    }

    fn pos_back(&self, width: u32) -> Pos {
        Pos::new(self.base + self.offset - width)
    }

    fn push(&mut self, kind: TokenKind, lit: String, pos: Pos) {
        self.tokens.push(Token { kind, lit, pos });
    }

    /// True when a newline at this point should become a semicolon.
    fn needs_semicolon(&self) -> bool {
        self.tokens
            .last()
            .is_some_and(|t| t.kind.ends_statement())
    }

    fn insert_semicolon(&mut self, pos: Pos) {
        if self.needs_semicolon() {
            self.push(TokenKind::Semicolon, String::new(), pos);
        }
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    let pos = self.pos();
                    self.bump();
                    self.insert_semicolon(pos);
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '/' => self.slash()?,
                c if is_ident_start(c) => self.ident(),
                c if c.is_ascii_digit() => self.number()?,
                '"' => self.string()?,
                '`' => self.raw_string()?,
                '\'' => self.rune()?,
                '.' => self.dot()?,
                _ => self.operator()?,
            }
        }
        let pos = self.pos();
        self.insert_semicolon(pos);
        self.push(TokenKind::Eof, String::new(), pos);
        Ok(())
    }

    /// `/` starts a comment or an operator.
    fn slash(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        self.bump();
        match self.peek() {
            Some('/') => {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                Ok(())
            }
            Some('*') => {
                self.bump();
                let mut saw_newline = false;
                loop {
                    match self.bump() {
                        Some('*') if self.peek() == Some('/') => {
                            self.bump();
                            break;
                        }
                        Some('\n') => saw_newline = true,
                        Some(_) => {}
                        None => return Err(SyntaxError::new("unterminated comment", pos)),
                    }
                }
                // A comment spanning lines behaves like a newline for ASI.
                if saw_newline {
                    self.insert_semicolon(pos);
                }
                Ok(())
            }
            Some('=') => {
                self.bump();
                self.push(TokenKind::QuoAssign, String::new(), pos);
                Ok(())
            }
            _ => {
                self.push(TokenKind::Quo, String::new(), pos);
                Ok(())
            }
        }
    }

    fn ident(&mut self) {
        let pos = self.pos();
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match TokenKind::keyword(&word) {
            Some(kind) => self.push(kind, String::new(), pos),
            None => self.push(TokenKind::Ident, word, pos),
        }
    }

    fn number(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        let mut lit = String::new();
        let mut kind = TokenKind::Int;

        if self.peek() == Some('0') {
            lit.push('0');
            self.bump();
            if matches!(self.peek(), Some('x' | 'X' | 'b' | 'B' | 'o' | 'O')) {
                lit.push(self.bump().unwrap_or_default());
                while let Some(c) = self.peek() {
                    if c.is_ascii_hexdigit() || c == '_' {
                        lit.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.push(TokenKind::Int, lit, pos);
                return Ok(());
            }
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                lit.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            // Not a float if this is actually `1..` or a selector on an int,
            // which the language does not allow; a digit must follow.
            kind = TokenKind::Float;
            lit.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    lit.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            kind = TokenKind::Float;
            lit.push('e');
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                lit.push(self.bump().unwrap_or_default());
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lit.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if self.peek() == Some('i') {
            self.bump();
            kind = TokenKind::Imag;
        }
        self.push(kind, lit, pos);
        Ok(())
    }

    fn string(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => value.push(self.escape(pos)?),
                Some('\n') | None => {
                    return Err(SyntaxError::new("unterminated string literal", pos));
                }
                Some(c) => value.push(c),
            }
        }
        self.push(TokenKind::String, value, pos);
        Ok(())
    }

    fn raw_string(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some(c) => value.push(c),
                None => return Err(SyntaxError::new("unterminated raw string literal", pos)),
            }
        }
        self.push(TokenKind::String, value, pos);
        Ok(())
    }

    fn rune(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        self.bump();
        let c = match self.bump() {
            Some('\\') => self.escape(pos)?,
            Some('\'') | None => return Err(SyntaxError::new("empty rune literal", pos)),
            Some(c) => c,
        };
        if self.bump() != Some('\'') {
            return Err(SyntaxError::new("unterminated rune literal", pos));
        }
        self.push(TokenKind::Rune, c.to_string(), pos);
        Ok(())
    }

    fn escape(&mut self, pos: Pos) -> Result<char, SyntaxError> {
        let c = self
            .bump()
            .ok_or_else(|| SyntaxError::new("unterminated escape sequence", pos))?;
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'x' => self.hex_escape(pos, 2)?,
            'u' => self.hex_escape(pos, 4)?,
            'U' => self.hex_escape(pos, 8)?,
            other => {
                return Err(SyntaxError::new(
                    format!("unknown escape sequence \\{other}"),
                    pos,
                ));
            }
        })
    }

    fn hex_escape(&mut self, pos: Pos, digits: u32) -> Result<char, SyntaxError> {
        let mut value = 0u32;
        for _ in 0..digits {
            let c = self
                .bump()
                .ok_or_else(|| SyntaxError::new("unterminated escape sequence", pos))?;
            let digit = c
                .to_digit(16)
                .ok_or_else(|| SyntaxError::new("invalid hex digit in escape", pos))?;
            value = value * 16 + digit;
        }
        char::from_u32(value).ok_or_else(|| SyntaxError::new("invalid character escape", pos))
    }

    fn dot(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        self.bump();
        if self.peek() == Some('.') {
            self.bump();
            if self.bump() == Some('.') {
                self.push(TokenKind::Ellipsis, String::new(), pos);
                return Ok(());
            }
            return Err(SyntaxError::new("unexpected '..'", pos));
        }
        self.push(TokenKind::Period, String::new(), pos);
        Ok(())
    }

    /// Maximal-munch operator scanning for everything not handled above.
    fn operator(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        let c = self.bump().unwrap_or_default();
        let kind = match c {
            '+' => self.pick('=', TokenKind::AddAssign, '+', TokenKind::Inc, TokenKind::Add),
            '-' => self.pick('=', TokenKind::SubAssign, '-', TokenKind::Dec, TokenKind::Sub),
            '*' => self.pick1('=', TokenKind::MulAssign, TokenKind::Mul),
            '%' => self.pick1('=', TokenKind::RemAssign, TokenKind::Rem),
            '^' => self.pick1('=', TokenKind::XorAssign, TokenKind::Xor),
            '!' => self.pick1('=', TokenKind::Neq, TokenKind::Not),
            '=' => self.pick1('=', TokenKind::Eql, TokenKind::Assign),
            ':' => self.pick1('=', TokenKind::Define, TokenKind::Colon),
            '&' => match self.peek() {
                Some('&') => {
                    self.bump();
                    TokenKind::LAnd
                }
                Some('=') => {
                    self.bump();
                    TokenKind::AndAssign
                }
                Some('^') => {
                    self.bump();
                    self.pick1('=', TokenKind::AndNotAssign, TokenKind::AndNot)
                }
                _ => TokenKind::And,
            },
            '|' => match self.peek() {
                Some('|') => {
                    self.bump();
                    TokenKind::LOr
                }
                Some('=') => {
                    self.bump();
                    TokenKind::OrAssign
                }
                _ => TokenKind::Or,
            },
            '<' => match self.peek() {
                Some('-') => {
                    self.bump();
                    TokenKind::Arrow
                }
                Some('=') => {
                    self.bump();
                    TokenKind::Leq
                }
                Some('<') => {
                    self.bump();
                    self.pick1('=', TokenKind::ShlAssign, TokenKind::Shl)
                }
                _ => TokenKind::Lss,
            },
            '>' => match self.peek() {
                Some('=') => {
                    self.bump();
                    TokenKind::Geq
                }
                Some('>') => {
                    self.bump();
                    self.pick1('=', TokenKind::ShrAssign, TokenKind::Shr)
                }
                _ => TokenKind::Gtr,
            },
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBrack,
            ']' => TokenKind::RBrack,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character {other:?}"),
                    self.pos_back(1),
                ));
            }
        };
        self.push(kind, String::new(), pos);
        Ok(())
    }

    fn pick1(&mut self, next: char, hit: TokenKind, miss: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.bump();
            hit
        } else {
            miss
        }
    }

    fn pick(
        &mut self,
        a: char,
        on_a: TokenKind,
        b: char,
        on_b: TokenKind,
        miss: TokenKind,
    ) -> TokenKind {
        match self.peek() {
            Some(c) if c == a => {
                self.bump();
                on_a
            }
            Some(c) if c == b => {
                self.bump();
                on_b
            }
            _ => miss,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src, 0).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn semicolons_inserted_after_statement_enders() {
        assert_eq!(
            kinds("x := 1\ny++\n"),
            vec![
                TokenKind::Ident,
                TokenKind::Define,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::Inc,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn no_semicolon_after_operators() {
        assert_eq!(
            kinds("x +\n1"),
            vec![
                TokenKind::Ident,
                TokenKind::Add,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes_are_processed() {
        let tokens = lex(r#""a\tb\né""#, 0).unwrap();
        assert_eq!(tokens[0].lit, "a\tb\n\u{e9}");
    }

    #[test]
    fn rune_literals_carry_their_char() {
        let tokens = lex(r"'\n'", 0).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Rune);
        assert_eq!(tokens[0].lit, "\n");
    }

    #[test]
    fn compound_operators_munch_maximally() {
        assert_eq!(
            kinds("a &^= b <<= c <- d"),
            vec![
                TokenKind::Ident,
                TokenKind::AndNotAssign,
                TokenKind::Ident,
                TokenKind::ShlAssign,
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(lex("\"abc", 0).is_err());
    }
}
