//! Lexer for kernel declarations using logos
//!
//! Used both for `@turbo(...)` annotations and for the line-level scans of a
//! kernel body (assignment targets, unroll headers). Supports tokens like:
//! - Identifiers: n, np, float32, UNROLL
//! - Numbers: 7, 0x80, 2.5
//! - Strings: 'abc'
//! - Assignment: =, +=, -=, ...
//! - Punctuation: (, ), [, ], {, }, ,, :, ., @

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\r\n\f]+|#[^\n]*)")]
pub enum Token {
    // Literals
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| i64::from_str_radix(&lex.slice()[2..], 16).ok())]
    Int(i64),

    #[regex(r#"'[^'\n]*'|"[^"\n]*""#, |lex| { let s = lex.slice(); s[1..s.len() - 1].to_string() })]
    Str(String),

    // Identifiers and keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Assignment
    #[token("=")]
    Equals,

    #[regex(r"(\+|-|\*|/|//|%|&|\||\^|<<|>>|\*\*)=")]
    AugAssign,

    // Operators
    #[token("@")]
    At,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[regex(r"==|!=|<=|>=|<<|>>|\*\*|//|[<>%&|^~]")]
    Op,

    #[token(".")]
    Dot,

    // Punctuation
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,
}

impl Token {
    pub fn is_ident(&self, name: &str) -> bool {
        matches!(self, Token::Ident(s) if s == name)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Float(x) => write!(f, "{}", x),
            Token::Int(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Equals => write!(f, "="),
            Token::AugAssign => write!(f, "op="),
            Token::At => write!(f, "@"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Op => write!(f, "operator"),
            Token::Dot => write!(f, "."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
        }
    }
}

/// Lexer wrapper that provides a stream of tokens
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Result<Token, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Tokens of a single line, stopping at the first unlexable character
pub fn line_tokens(line: &str) -> Vec<Token> {
    Lexer::new(line).map_while(Result::ok).collect()
}

/// Leading whitespace of a line
pub fn indent_of(line: &str) -> &str {
    let end = line.len() - line.trim_start().len();
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    #[test]
    fn test_decorator_tokens() {
        let tokens = line_tokens("@turbo(x = [np.float32], n = T)");
        assert_eq!(
            tokens,
            vec![
                Token::At,
                ident("turbo"),
                Token::LParen,
                ident("x"),
                Token::Equals,
                Token::LBracket,
                ident("np"),
                Token::Dot,
                ident("float32"),
                Token::RBracket,
                Token::Comma,
                ident("n"),
                Token::Equals,
                ident("T"),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_unroll_header() {
        let tokens = line_tokens("for UNROLL in range(n):");
        assert_eq!(
            tokens,
            vec![
                ident("for"),
                ident("UNROLL"),
                ident("in"),
                ident("range"),
                Token::LParen,
                ident("n"),
                Token::RParen,
                Token::Colon,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(line_tokens("0x80 7 2.5"), vec![Token::Int(128), Token::Int(7), Token::Float(2.5)]);
    }

    #[test]
    fn test_assignments() {
        assert_eq!(line_tokens("acc += 3"), vec![ident("acc"), Token::AugAssign, Token::Int(3)]);
        assert_eq!(line_tokens("a == b"), vec![ident("a"), Token::Op, ident("b")]);
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(line_tokens("n = 1 # count"), vec![ident("n"), Token::Equals, Token::Int(1)]);
    }

    #[test]
    fn test_indent_of() {
        assert_eq!(indent_of("    x = 1\n"), "    ");
        assert_eq!(indent_of("x"), "");
    }
}
