//! Fixed-count loop unrolling on body text
//!
//! Only one loop shape is recognised:
//!
//! ```text
//! for UNROLL in range(count):
//!     <block>
//! ```
//!
//! With a constant count the block is repeated that many times one level out.
//! With a runtime count the block is repeated under a ladder of bit tests,
//! followed by a `while` loop that consumes [`MAX_CHUNK`] iterations at a time.

use std::collections::BTreeMap;
use std::iter::Peekable;

use log::trace;

use crate::error::{TurboError, TurboResult};
use crate::lexer::{indent_of, line_tokens, Token};
use crate::parser::UNROLL;
use crate::types::{ConstValue, TypeArg};

/// Largest number of copies emitted per `while` iteration
pub const MAX_CHUNK: usize = 0x80;

/// How many times a recognised loop runs
#[derive(Debug, Clone, PartialEq)]
enum Count {
    Name(String),
    Literal(i64),
}

/// `for UNROLL in range(<count>):`
fn match_header(line: &str) -> Option<Count> {
    let tokens = line_tokens(line);
    match tokens.as_slice() {
        [Token::Ident(kw_for), Token::Ident(var), Token::Ident(kw_in), Token::Ident(range), Token::LParen, count, Token::RParen, Token::Colon]
            if kw_for == "for" && var == UNROLL && kw_in == "in" && range == "range" =>
        {
            match count {
                Token::Ident(name) => Some(Count::Name(name.clone())),
                Token::Int(n) => Some(Count::Literal(*n)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Expand every unroll loop in `body`
pub fn unroll(body: &str, consts: &BTreeMap<String, ConstValue>) -> TurboResult<String> {
    let mut out = String::with_capacity(body.len());
    let mut lines = body.split_inclusive('\n').peekable();

    while let Some(line) = lines.next() {
        let Some(count) = match_header(line) else {
            out.push_str(line);
            continue;
        };
        let outer = indent_of(line);
        let inner = match lines.peek() {
            Some(&next) if indent_of(next).len() > outer.len() => indent_of(next),
            _ => {
                out.push_str(line);
                continue;
            }
        };
        let block = take_block(&mut lines, inner);

        let constant = match &count {
            Count::Literal(n) => Ok(ConstValue::Int(*n)),
            Count::Name(name) => consts.get(name).cloned().ok_or(name),
        };
        match constant {
            Ok(value) => {
                let times = value
                    .as_count()
                    .ok_or_else(|| TurboError::BadArg { arg: TypeArg::Obj(value.clone()) })?;
                trace!("Unrolling {} lines {} times", block.len(), times);
                for _ in 0..times {
                    for line in &block {
                        out.push_str(outer);
                        out.push_str(&line[inner.len()..]);
                    }
                }
            }
            Err(variable) => {
                trace!("Unrolling {} lines by runtime count {}", block.len(), variable);
                emit_runtime(&mut out, &block, outer, inner, variable);
            }
        }
    }
    Ok(out)
}

/// Lines starting with the inner indent, the first line that doesn't is left in place
fn take_block<'a, I>(lines: &mut Peekable<I>, inner: &str) -> Vec<&'a str>
where
    I: Iterator<Item = &'a str>,
{
    let mut block = Vec::new();
    while let Some(line) = lines.next_if(|l| l.starts_with(inner)) {
        block.push(line);
    }
    block
}

fn emit_runtime(out: &mut String, block: &[&str], outer: &str, inner: &str, variable: &str) {
    let mut mask = 0x01;
    while mask < MAX_CHUNK {
        out.push_str(&format!("{}if {} & 0x{:x}:\n", outer, variable, mask));
        for _ in 0..mask {
            block.iter().for_each(|line| out.push_str(line));
        }
        mask <<= 1;
    }
    out.push_str(&format!("{}while {} >= 0x{:x}:\n", outer, variable, MAX_CHUNK));
    for _ in 0..MAX_CHUNK {
        block.iter().for_each(|line| out.push_str(line));
    }
    out.push_str(&format!("{}{} -= 0x{:x}\n", inner, variable, MAX_CHUNK));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    const BODY: &str = "    acc = 0\n    for UNROLL in range(n):\n        acc += 3\n    return acc\n";

    /// Runs the handful of statement shapes the expansion produces
    fn run(lines: &[&str], vars: &mut HashMap<String, i64>) {
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            let depth = indent_of(line).len();
            let words: Vec<&str> = line.split_whitespace().collect();
            let value = |vars: &HashMap<String, i64>, word: &str| -> i64 {
                let word = word.trim_end_matches(':');
                match word.strip_prefix("0x") {
                    Some(hex) => i64::from_str_radix(hex, 16).unwrap(),
                    None => word.parse().unwrap_or_else(|_| vars[word]),
                }
            };
            let block_end = (i + 1..lines.len())
                .find(|&j| indent_of(lines[j]).len() <= depth)
                .unwrap_or(lines.len());
            match words.as_slice() {
                ["if", a, "&", b] => {
                    if value(vars, a) & value(vars, b) != 0 {
                        run(&lines[i + 1..block_end], vars);
                    }
                    i = block_end;
                }
                ["while", a, ">=", b] => {
                    while value(vars, a) >= value(vars, b) {
                        run(&lines[i + 1..block_end], vars);
                    }
                    i = block_end;
                }
                [name, op, operand] => {
                    let rhs = value(vars, operand);
                    let slot = vars.entry(name.to_string()).or_insert(0);
                    match *op {
                        "=" => *slot = rhs,
                        "+=" => *slot += rhs,
                        "-=" => *slot -= rhs,
                        other => panic!("unexpected operator {}", other),
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }
    }

    fn execute(text: &str, n: i64) -> i64 {
        let lines: Vec<&str> = text.lines().collect();
        let mut vars = HashMap::from([("n".to_string(), n)]);
        run(&lines, &mut vars);
        vars["acc"]
    }

    #[test]
    fn test_constant_unroll_text() {
        let consts = BTreeMap::from([("n".to_string(), ConstValue::Int(2))]);
        assert_eq!(
            unroll(BODY, &consts).unwrap(),
            "    acc = 0\n    acc += 3\n    acc += 3\n    return acc\n"
        );
    }

    #[test]
    fn test_constant_unroll_counts() {
        for k in [0, 1, 7] {
            let consts = BTreeMap::from([("n".to_string(), ConstValue::Int(k))]);
            let text = unroll(BODY, &consts).unwrap();
            assert_eq!(execute(&text, 0), 3 * k);
            assert!(!text.contains("UNROLL"));
        }
    }

    #[test]
    fn test_literal_count_is_constant() {
        let body = "for UNROLL in range(3):\n    acc += 1\n";
        assert_eq!(
            unroll(body, &BTreeMap::new()).unwrap(),
            "acc += 1\nacc += 1\nacc += 1\n"
        );
    }

    #[test]
    fn test_runtime_unroll_counts() {
        for n in [0, 3, 129, 1000] {
            let text = unroll(BODY, &BTreeMap::new()).unwrap();
            assert_eq!(execute(&text, n), 3 * n, "n = {}", n);
        }
    }

    #[test]
    fn test_runtime_unroll_shape() {
        let text = unroll(BODY, &BTreeMap::new()).unwrap();
        assert!(text.contains("    if n & 0x1:\n        acc += 3\n    if n & 0x2:\n"));
        assert!(text.contains("    if n & 0x40:\n"));
        assert!(!text.contains("& 0x80"));
        assert!(text.contains("    while n >= 0x80:\n"));
        assert!(text.ends_with("        n -= 0x80\n    return acc\n"));
        assert_eq!(text.matches("acc += 3").count(), 127 + 128);
    }

    #[test]
    fn test_bad_constant() {
        let consts = BTreeMap::from([("n".to_string(), ConstValue::Str("many".into()))]);
        assert!(matches!(unroll(BODY, &consts), Err(TurboError::BadArg { .. })));
    }

    #[test]
    fn test_other_loops_pass_through() {
        let body = "    for i in range(n):\n        acc += 1\n";
        assert_eq!(unroll(body, &BTreeMap::new()).unwrap(), body);
    }
}
