//! Parser for annotated kernel source
//!
//! Recognises, anywhere in a source file:
//! - `@turbo(n = np.uint32, x = [T])` followed by a `def`
//! - `@turbo(types = dict(self = {}, x = [T]), dynamic = True)`
//! - `@turbo(types = dict(i = int, k = X), groups = {X: range(5, 10)})`
//! - `class Cls(generic):` blocks holding annotated methods
//!
//! Everything else in the file is ignored. The body of each kernel is kept as
//! text; only its assignment targets are extracted, giving the local names.

use crate::ast::{
    ClassDef, Declaration, DecoratorArgs, FunctionDef, Group, RawSpec, SourceModule,
};
use crate::error::{TurboError, TurboResult};
use crate::lexer::{indent_of, line_tokens, Lexer, Token};
use crate::types::{Placeholder, ScalarType, TypeArg};

/// Sentinel loop variable of the unroll pattern, never a real local
pub const UNROLL: &str = "UNROLL";

/// Marker value for a line that only declares locals: `acc = LOCAL`
pub const LOCAL: &str = "LOCAL";

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "break", "class", "continue", "def", "del", "elif", "else", "except",
    "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal", "not",
    "or", "pass", "raise", "return", "try", "while", "with", "yield", "None", "True", "False",
];

/// Token parser for one `@turbo(...)` annotation
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    current: Option<Token>,
    line: usize,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str, line: usize) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next().and_then(Result::ok);
        Self { lexer, current, line }
    }

    /// Advance to the next token
    fn advance(&mut self) -> Option<Token> {
        let prev = self.current.take();
        self.current = self.lexer.next().and_then(Result::ok);
        prev
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        match &self.current {
            Some(tok) => std::mem::discriminant(tok) == std::mem::discriminant(expected),
            None => false,
        }
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> TurboResult<Token> {
        if self.check(&expected) {
            self.advance().ok_or_else(|| self.error("Unexpected end of input"))
        } else {
            Err(self.error(format!("Expected {}, got {}", expected, self.describe_current())))
        }
    }

    fn expect_ident(&mut self) -> TurboResult<String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(self.error(format!(
                "Expected identifier, got {}",
                other.map(|t| t.to_string()).unwrap_or_else(|| "end of input".into())
            ))),
        }
    }

    fn describe_current(&self) -> String {
        match &self.current {
            Some(tok) => tok.to_string(),
            None => "end of input".to_string(),
        }
    }

    fn error(&self, msg: impl Into<String>) -> TurboError {
        TurboError::parse_error(self.line, msg)
    }

    /// Skip an optional trailing comma, reporting whether the list goes on
    fn list_continues(&mut self, close: &Token) -> bool {
        if self.check(&Token::Comma) {
            self.advance();
        }
        !self.check(close) && self.current.is_some()
    }

    /// Parse `@turbo(...)`
    pub fn parse_decorator(&mut self) -> TurboResult<DecoratorArgs> {
        self.expect(Token::At)?;
        let name = self.expect_ident()?;
        if name != "turbo" {
            return Err(self.error(format!("Expected turbo annotation, got @{}", name)));
        }
        self.expect(Token::LParen)?;
        let kwargs = self.parse_kwargs(Token::RParen)?;
        self.expect(Token::RParen)?;
        if self.current.is_some() {
            return Err(self.error(format!("Unexpected {} after annotation", self.describe_current())));
        }

        if !kwargs.iter().any(|(name, _)| name == "types") {
            let types = kwargs
                .into_iter()
                .map(|(name, tokens)| Ok((name, Self::sub(tokens, self.line).parse_spec_all()?)))
                .collect::<TurboResult<_>>()?;
            return Ok(DecoratorArgs { types, ..Default::default() });
        }

        let mut args = DecoratorArgs::default();
        for (name, tokens) in kwargs {
            let mut sub = Self::sub(tokens, self.line);
            match name.as_str() {
                "types" => args.types = sub.parse_mapping()?,
                "dynamic" => args.dynamic = sub.parse_bool()?,
                "groups" | "groupsets" => args.groups = sub.parse_groups()?,
                other => return Err(self.error(format!("Unknown annotation argument: {}", other))),
            }
            sub.finish()?;
        }
        Ok(args)
    }

    /// A parser over an already split-out argument
    fn sub(tokens: Vec<Token>, line: usize) -> SubParser {
        SubParser { tokens, pos: 0, line }
    }

    /// `name = <tokens>` pairs up to `close`, values kept as raw token runs
    fn parse_kwargs(&mut self, close: Token) -> TurboResult<Vec<(String, Vec<Token>)>> {
        let mut kwargs = Vec::new();
        while !self.check(&close) && self.current.is_some() {
            let name = self.expect_ident()?;
            self.expect(Token::Equals)?;
            let mut value = Vec::new();
            let mut depth = 0usize;
            while let Some(tok) = &self.current {
                match tok {
                    Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                    Token::RParen | Token::RBracket | Token::RBrace if depth == 0 => break,
                    Token::RParen | Token::RBracket | Token::RBrace => depth -= 1,
                    Token::Comma if depth == 0 => break,
                    _ => {}
                }
                if let Some(tok) = self.advance() {
                    value.push(tok);
                }
            }
            if value.is_empty() {
                return Err(self.error(format!("Missing value for {}", name)));
            }
            kwargs.push((name, value));
            if !self.list_continues(&close) {
                break;
            }
        }
        Ok(kwargs)
    }
}

/// Recursive-descent parser over one argument's tokens
struct SubParser {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
}

impl SubParser {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn check(&self, expected: &Token) -> bool {
        match self.current() {
            Some(tok) => std::mem::discriminant(tok) == std::mem::discriminant(expected),
            None => false,
        }
    }

    fn error(&self, msg: impl Into<String>) -> TurboError {
        TurboError::parse_error(self.line, msg)
    }

    fn expect(&mut self, expected: Token) -> TurboResult<()> {
        if self.check(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!(
                "Expected {}, got {}",
                expected,
                self.current().map(|t| t.to_string()).unwrap_or_else(|| "end of input".into())
            )))
        }
    }

    fn finish(&self) -> TurboResult<()> {
        match self.current() {
            None => Ok(()),
            Some(tok) => Err(self.error(format!("Unexpected {}", tok))),
        }
    }

    fn list_continues(&mut self, close: &Token) -> bool {
        if self.check(&Token::Comma) {
            self.pos += 1;
        }
        !self.check(close) && self.current().is_some()
    }

    fn parse_spec_all(&mut self) -> TurboResult<RawSpec> {
        let spec = self.parse_spec()?;
        self.finish()?;
        Ok(spec)
    }

    /// Dotted name: `np.float32`
    fn parse_path(&mut self) -> TurboResult<String> {
        let mut path = match self.advance() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(self.error(format!(
                    "Expected type, got {}",
                    other.map(|t| t.to_string()).unwrap_or_else(|| "end of input".into())
                )))
            }
        };
        while self.check(&Token::Dot) {
            self.pos += 1;
            match self.advance() {
                Some(Token::Ident(name)) => {
                    path.push('.');
                    path.push_str(&name);
                }
                _ => return Err(self.error("Expected identifier after '.'")),
            }
        }
        Ok(path)
    }

    fn parse_spec(&mut self) -> TurboResult<RawSpec> {
        match self.current().cloned() {
            Some(Token::LBracket) => {
                self.pos += 1;
                let inner = self.parse_spec()?;
                self.expect(Token::RBracket)?;
                Ok(RawSpec::list(inner))
            }
            Some(Token::LBrace) => Ok(RawSpec::Map(self.parse_mapping()?)),
            Some(tok) if tok.is_ident("dict") => Ok(RawSpec::Map(self.parse_mapping()?)),
            Some(Token::Ident(_)) => {
                let path = self.parse_path()?;
                if let Some(p) = Placeholder::parse(&path) {
                    return Ok(RawSpec::Placeholder(p));
                }
                ScalarType::from_name(&path)
                    .map(RawSpec::Type)
                    .ok_or_else(|| self.error(format!("Unknown type: {}", path)))
            }
            other => Err(self.error(format!(
                "Expected type spec, got {}",
                other.map(|t| t.to_string()).unwrap_or_else(|| "end of input".into())
            ))),
        }
    }

    /// `dict(a = spec, ...)` or `{'a': spec, ...}`
    fn parse_mapping(&mut self) -> TurboResult<Vec<(String, RawSpec)>> {
        let mut fields = Vec::new();
        if self.check(&Token::LBrace) {
            self.pos += 1;
            while !self.check(&Token::RBrace) && self.current().is_some() {
                let name = match self.advance() {
                    Some(Token::Str(s)) | Some(Token::Ident(s)) => s,
                    _ => return Err(self.error("Expected field name")),
                };
                self.expect(Token::Colon)?;
                fields.push((name, self.parse_spec()?));
                if !self.list_continues(&Token::RBrace) {
                    break;
                }
            }
            self.expect(Token::RBrace)?;
            return Ok(fields);
        }
        match self.advance() {
            Some(tok) if tok.is_ident("dict") => {}
            _ => return Err(self.error("Expected dict(...) or {...}")),
        }
        self.expect(Token::LParen)?;
        while !self.check(&Token::RParen) && self.current().is_some() {
            let name = match self.advance() {
                Some(Token::Ident(s)) => s,
                _ => return Err(self.error("Expected field name")),
            };
            self.expect(Token::Equals)?;
            fields.push((name, self.parse_spec()?));
            if !self.list_continues(&Token::RParen) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(fields)
    }

    fn parse_bool(&mut self) -> TurboResult<bool> {
        match self.advance() {
            Some(tok) if tok.is_ident("True") => Ok(true),
            Some(tok) if tok.is_ident("False") => Ok(false),
            Some(Token::Int(n)) => Ok(n != 0),
            _ => Err(self.error("Expected True or False")),
        }
    }

    /// `{X: range(5, 10), T: (np.float32, np.float64)}`
    fn parse_groups(&mut self) -> TurboResult<Vec<(Placeholder, Group)>> {
        self.expect(Token::LBrace)?;
        let mut groups = Vec::new();
        while !self.check(&Token::RBrace) && self.current().is_some() {
            let placeholder = match self.advance() {
                Some(Token::Ident(name)) => Placeholder::parse(&name)
                    .ok_or_else(|| self.error(format!("Not a placeholder: {}", name)))?,
                _ => return Err(self.error("Expected placeholder")),
            };
            self.expect(Token::Colon)?;
            if self.check(&Token::LBracket) && self.tokens.get(self.pos + 1).map_or(false, |t| {
                matches!(t, Token::LParen | Token::LBracket) || t.is_ident("range")
            }) {
                // A list of groups for one placeholder
                self.pos += 1;
                while !self.check(&Token::RBracket) && self.current().is_some() {
                    groups.push((placeholder, self.parse_group()?));
                    if !self.list_continues(&Token::RBracket) {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
            } else {
                groups.push((placeholder, self.parse_group()?));
            }
            if !self.list_continues(&Token::RBrace) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(groups)
    }

    fn parse_group(&mut self) -> TurboResult<Group> {
        if matches!(self.current(), Some(tok) if tok.is_ident("range")) {
            self.pos += 1;
            self.expect(Token::LParen)?;
            let first = self.parse_int()?;
            let range = if self.check(&Token::Comma) {
                self.pos += 1;
                first..self.parse_int()?
            } else {
                0..first
            };
            self.expect(Token::RParen)?;
            return Ok(Group::Range(range));
        }
        let close = match self.advance() {
            Some(Token::LParen) => Token::RParen,
            Some(Token::LBracket) => Token::RBracket,
            Some(Token::LBrace) => Token::RBrace,
            _ => return Err(self.error("Expected range(...) or a member list")),
        };
        let mut members = Vec::new();
        while !self.check(&close) && self.current().is_some() {
            members.push(self.parse_member()?);
            if !self.list_continues(&close) {
                break;
            }
        }
        self.expect(close)?;
        Ok(Group::Members(members))
    }

    fn parse_int(&mut self) -> TurboResult<i64> {
        let negative = self.check(&Token::Minus);
        if negative {
            self.pos += 1;
        }
        match self.advance() {
            Some(Token::Int(n)) => Ok(if negative { -n } else { n }),
            _ => Err(self.error("Expected integer")),
        }
    }

    fn parse_member(&mut self) -> TurboResult<TypeArg> {
        let negative = self.check(&Token::Minus);
        if negative {
            self.pos += 1;
        }
        let member = match self.current().cloned() {
            Some(Token::Int(n)) => TypeArg::from(if negative { -n } else { n }),
            Some(Token::Float(x)) => TypeArg::from(if negative { -x } else { x }),
            Some(Token::Str(s)) if !negative => TypeArg::from(s.as_str()),
            Some(tok) if !negative && tok.is_ident("True") => TypeArg::from(true),
            Some(tok) if !negative && tok.is_ident("False") => TypeArg::from(false),
            Some(Token::Ident(_)) if !negative => {
                let path = self.parse_path()?;
                return ScalarType::from_name(&path)
                    .map(TypeArg::Type)
                    .ok_or_else(|| self.error(format!("Unknown type: {}", path)));
            }
            _ => return Err(self.error("Expected group member")),
        };
        self.pos += 1;
        Ok(member)
    }
}

/// Parse a `def` header plus body, as one block of text
pub fn parse_function(source: &str) -> TurboResult<FunctionDef> {
    let lines: Vec<&str> = source.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.trim_start().starts_with("def "))
        .ok_or_else(|| TurboError::parse_error(1, "Expected def"))?;
    let (function, _) = parse_def_at(&lines, start)?;
    Ok(function)
}

/// Parse one annotated function from text that starts with `@turbo(...)`
pub fn parse_declaration(source: &str) -> TurboResult<Declaration> {
    let module = parse_source(source)?;
    module
        .functions
        .into_iter()
        .next()
        .ok_or_else(|| TurboError::parse_error(1, "No annotated function found"))
}

/// Scan a whole source file for annotated functions and classes
pub fn parse_source(source: &str) -> TurboResult<SourceModule> {
    let lines: Vec<&str> = source.lines().collect();
    let mut module = SourceModule::default();
    let mut class: Option<(ClassDef, usize)> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }
        let indent = indent_of(line).len();
        if let Some((_, class_indent)) = &class {
            if indent <= *class_indent {
                if let Some((done, _)) = class.take() {
                    module.classes.push(done);
                }
            }
        }

        if trimmed.starts_with("class ") {
            class = Some((parse_class_header(trimmed, i + 1)?, indent));
            i += 1;
        } else if trimmed.starts_with("@turbo") {
            let (decorator, next) = parse_decorator_at(&lines, i)?;
            let def_start = (next..lines.len())
                .find(|&j| !lines[j].trim().is_empty())
                .filter(|&j| lines[j].trim_start().starts_with("def "))
                .ok_or_else(|| TurboError::parse_error(next + 1, "Expected def after @turbo"))?;
            let (function, next) = parse_def_at(&lines, def_start)?;
            let declaration = Declaration { decorator, function };
            match &mut class {
                Some((c, _)) => c.methods.push(declaration),
                None => module.functions.push(declaration),
            }
            i = next;
        } else {
            i += 1;
        }
    }
    if let Some((done, _)) = class {
        module.classes.push(done);
    }
    Ok(module)
}

/// `class Name(generic):`, `class Name(metaclass = generic):` or `class Name:`
fn parse_class_header(text: &str, line: usize) -> TurboResult<ClassDef> {
    let tokens = line_tokens(text);
    let name = match tokens.get(1) {
        Some(Token::Ident(name)) => name.clone(),
        _ => return Err(TurboError::parse_error(line, "Expected class name")),
    };
    let generic = tokens.iter().any(|t| t.is_ident("generic"));
    Ok(ClassDef {
        name,
        generic,
        methods: Vec::new(),
    })
}

fn bracket_depth(tokens: &[Token]) -> isize {
    tokens.iter().fold(0, |depth, tok| match tok {
        Token::LParen | Token::LBracket | Token::LBrace => depth + 1,
        Token::RParen | Token::RBracket | Token::RBrace => depth - 1,
        _ => depth,
    })
}

/// Decorator text may span lines until its brackets balance
fn parse_decorator_at(lines: &[&str], start: usize) -> TurboResult<(DecoratorArgs, usize)> {
    let mut text = String::new();
    let mut depth = 0;
    let mut i = start;
    while i < lines.len() {
        text.push_str(lines[i]);
        text.push('\n');
        depth += bracket_depth(&line_tokens(lines[i]));
        i += 1;
        if depth <= 0 {
            break;
        }
    }
    let args = Parser::new(&text, start + 1).parse_decorator()?;
    Ok((args, i))
}

/// Returns the function and the index of the first line after its body
fn parse_def_at(lines: &[&str], start: usize) -> TurboResult<(FunctionDef, usize)> {
    let function_indent = indent_of(lines[start]).len();
    let mut header = Vec::new();
    let mut i = start;
    loop {
        let line = lines
            .get(i)
            .ok_or_else(|| TurboError::parse_error(start + 1, "Unterminated def header"))?;
        header.extend(line_tokens(line));
        i += 1;
        if bracket_depth(&header) <= 0 && matches!(header.last(), Some(Token::Colon)) {
            break;
        }
    }
    let (name, params) = parse_def_header(&header, start + 1)?;

    let mut body_lines: Vec<&str> = Vec::new();
    while i < lines.len() {
        let line = lines[i];
        if !line.trim().is_empty() && indent_of(line).len() <= function_indent {
            break;
        }
        body_lines.push(line);
        i += 1;
    }
    while body_lines.last().map_or(false, |l| l.trim().is_empty()) {
        body_lines.pop();
    }
    let first_index = body_lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .ok_or_else(|| TurboError::parse_error(start + 1, format!("Function {} has no body", name)))?;
    let first = body_lines[first_index];

    let strip = |line: &str| -> String {
        let cut = indent_of(line).len().min(function_indent);
        line[cut..].to_string()
    };
    let body_indent = indent_of(&strip(first)).to_string();

    let mut locals = Vec::new();
    let marker = local_marker_targets(first);
    if let Some(targets) = &marker {
        locals.extend(targets.iter().cloned());
    }
    for line in &body_lines {
        for target in assignment_targets(line) {
            locals.push(target);
        }
    }
    let mut seen = std::collections::HashSet::new();
    locals.retain(|n| n != UNROLL && !params.contains(n) && seen.insert(n.clone()));

    let body = body_lines
        .iter()
        .enumerate()
        .filter(|(k, _)| marker.is_none() || *k != first_index)
        .map(|(_, l)| format!("{}\n", strip(l)))
        .collect();

    Ok((
        FunctionDef {
            name,
            params,
            locals,
            body_indent,
            body,
        },
        i,
    ))
}

/// `def name(a, b = 1,):` → name and parameter names
fn parse_def_header(tokens: &[Token], line: usize) -> TurboResult<(String, Vec<String>)> {
    let mut iter = tokens.iter();
    match iter.next() {
        Some(tok) if tok.is_ident("def") => {}
        _ => return Err(TurboError::parse_error(line, "Expected def")),
    }
    let name = match iter.next() {
        Some(Token::Ident(name)) => name.clone(),
        _ => return Err(TurboError::parse_error(line, "Expected function name")),
    };
    match iter.next() {
        Some(Token::LParen) => {}
        _ => return Err(TurboError::parse_error(line, "Expected '(' after function name")),
    }
    let mut params = Vec::new();
    let mut depth = 1;
    let mut expecting_name = true;
    for tok in iter {
        match tok {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Token::Comma if depth == 1 => expecting_name = true,
            Token::Star if depth == 1 && expecting_name => {
                return Err(TurboError::parse_error(line, "Variadic parameters are not supported"))
            }
            Token::Ident(param) if depth == 1 && expecting_name => {
                params.push(param.clone());
                expecting_name = false;
            }
            _ => {}
        }
    }
    Ok((name, params))
}

/// Targets of `a, b = LOCAL`, the line that only declares locals
fn local_marker_targets(line: &str) -> Option<Vec<String>> {
    let tokens = line_tokens(line);
    match tokens.split_last() {
        Some((last, [targets @ .., Token::Equals])) if last.is_ident(LOCAL) => {
            target_names(targets)
        }
        _ => None,
    }
}

fn target_names(tokens: &[Token]) -> Option<Vec<String>> {
    let mut names = Vec::new();
    for tok in tokens {
        match tok {
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => names.push(name.clone()),
            Token::Comma | Token::LParen | Token::RParen => {}
            _ => return None,
        }
    }
    (!names.is_empty()).then_some(names)
}

/// Names a line stores to: `x = ...`, `x += ...`, `a, b = ...`, `for i in ...`
pub fn assignment_targets(line: &str) -> Vec<String> {
    let tokens = line_tokens(line);
    if tokens.first().map_or(false, |t| t.is_ident("for")) {
        let end = tokens.iter().position(|t| t.is_ident("in")).unwrap_or(tokens.len());
        return target_names(&tokens[1..end]).unwrap_or_default();
    }
    let mut targets = Vec::new();
    let mut segment_start = 0;
    let mut depth = 0isize;
    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => depth -= 1,
            Token::Equals | Token::AugAssign if depth == 0 => {
                match target_names(&tokens[segment_start..i]) {
                    Some(names) => targets.extend(names),
                    None => break,
                }
                if matches!(tok, Token::AugAssign) {
                    break;
                }
                segment_start = i + 1;
            }
            _ => {}
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_shorthand_decorator() {
        let args = Parser::new("@turbo(i = np.uint32, x = [np.float32], a = [[T]])", 1)
            .parse_decorator()
            .unwrap();
        assert_eq!(
            args.types,
            vec![
                ("i".to_string(), RawSpec::Type(ScalarType::UInt32)),
                ("x".to_string(), RawSpec::list(RawSpec::Type(ScalarType::Float32))),
                ("a".to_string(), RawSpec::list(RawSpec::list(RawSpec::Placeholder(Placeholder::T)))),
            ]
        );
        assert!(!args.dynamic);
    }

    #[test]
    fn test_parse_structured_decorator() {
        let args = Parser::new(
            "@turbo(types = dict(self = {}, n = np.uint32, x = [T]), dynamic = True)",
            1,
        )
        .parse_decorator()
        .unwrap();
        assert!(args.dynamic);
        assert_eq!(args.types[0], ("self".to_string(), RawSpec::Map(vec![])));
        assert_eq!(args.types.len(), 3);
    }

    #[test]
    fn test_parse_composite() {
        let args = Parser::new("@turbo(self = dict(x = np.int8), y = np.int8)", 1)
            .parse_decorator()
            .unwrap();
        assert_eq!(
            args.types[0],
            (
                "self".to_string(),
                RawSpec::Map(vec![("x".to_string(), RawSpec::Type(ScalarType::Int8))])
            )
        );
    }

    #[test]
    fn test_parse_groups() {
        let args = Parser::new(
            "@turbo(types = dict(i = int, k = X), groups = {X: range(5, 10), T: (np.float32, float64)})",
            1,
        )
        .parse_decorator()
        .unwrap();
        assert_eq!(args.groups[0], (Placeholder::X, Group::Range(5..10)));
        assert_eq!(
            args.groups[1],
            (
                Placeholder::T,
                Group::Members(vec![
                    TypeArg::Type(ScalarType::Float32),
                    TypeArg::Type(ScalarType::Float64)
                ])
            )
        );
    }

    #[test]
    fn test_unknown_type_is_error() {
        let result = Parser::new("@turbo(x = np.complex64)", 3).parse_decorator();
        assert!(matches!(result, Err(TurboError::ParseError { line: 3, .. })));
    }

    #[test]
    fn test_parse_function() {
        let function = parse_function(
            "def triple(n):\n    acc = 0\n    for UNROLL in range(n):\n        acc += 3\n    return acc\n",
        )
        .unwrap();
        assert_eq!(function.name, "triple");
        assert_eq!(function.params, vec!["n"]);
        assert_eq!(function.locals, vec!["acc"]);
        assert_eq!(function.body_indent, "    ");
        assert_eq!(
            function.body,
            "    acc = 0\n    for UNROLL in range(n):\n        acc += 3\n    return acc\n"
        );
    }

    #[test]
    fn test_multiline_header() {
        let function = parse_function(
            "def tsum(\n    n,\n    x,\n    y,\n    out,\n):\n    for i in range(n):\n        out[i] = x[i] + y[i]\n",
        )
        .unwrap();
        assert_eq!(function.params, vec!["n", "x", "y", "out"]);
        assert_eq!(function.locals, vec!["i"]);
    }

    #[test]
    fn test_local_marker_line_dropped() {
        let function =
            parse_function("def f(n):\n    acc = LOCAL\n    return n\n").unwrap();
        assert_eq!(function.locals, vec!["acc"]);
        assert_eq!(function.body, "    return n\n");
    }

    #[test]
    fn test_assignment_targets() {
        assert_eq!(assignment_targets("    a, b = 1, 2"), vec!["a", "b"]);
        assert_eq!(assignment_targets("    out[i] = x[i]"), Vec::<String>::new());
        assert_eq!(assignment_targets("    if a == b:"), Vec::<String>::new());
        assert_eq!(assignment_targets("    x = y = 0"), vec!["x", "y"]);
        assert_eq!(assignment_targets("    n -= 1"), vec!["n"]);
    }

    #[test]
    fn test_parse_source_with_class() {
        let source = "\
import numpy as np

@turbo(x = [T], y = [T])
def noinfer(x, y):
    pass

class Cls(generic):

    @turbo(types = dict(self = {}, n = np.uint32, x = [T]), dynamic = True)
    def fill(self, n, x):
        for i in range(n):
            x[i] = i

def plain():
    return 1
";
        let module = parse_source(source).unwrap();
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].function.name, "noinfer");
        assert_eq!(module.classes.len(), 1);
        let class = &module.classes[0];
        assert_eq!(class.name, "Cls");
        assert!(class.generic);
        assert_eq!(class.methods[0].function.params, vec!["self", "n", "x"]);
        assert_eq!(class.methods[0].function.body, "    for i in range(n):\n        x[i] = i\n");
    }
}
