//! Parsing of Makefile syntax as found in `.d` files emitted by C compilers.
//!
//! Only the right-hand side of the first colon is consumed: everything up to
//! it is the target and is discarded, the remainder is whitespace-split.  A
//! backslash at end of line continues the list; backslash-space is a literal
//! space inside a filename.

use crate::scanner::{ParseResult, Scanner};
use anyhow::{anyhow, Result};
use std::path::Path;

pub fn parse(scanner: &mut Scanner) -> ParseResult<Vec<String>> {
    loop {
        match scanner.read() {
            ':' => break,
            '\0' => return scanner.parse_error("expected ':' in depfile"),
            _ => {}
        }
    }

    let mut deps = Vec::new();
    let mut cur = String::new();
    let flush = |cur: &mut String, deps: &mut Vec<String>| {
        if !cur.is_empty() {
            deps.push(std::mem::take(cur));
        }
    };
    loop {
        match scanner.read() {
            '\0' => break,
            ' ' | '\t' | '\n' | '\r' => flush(&mut cur, &mut deps),
            '\\' => match scanner.read() {
                '\0' => break,
                '\n' => flush(&mut cur, &mut deps),
                '\r' => {
                    if scanner.peek() == '\n' {
                        scanner.next();
                    }
                    flush(&mut cur, &mut deps);
                }
                ' ' => cur.push(' '),
                other => {
                    cur.push('\\');
                    cur.push(other);
                }
            },
            c => cur.push(c),
        }
    }
    flush(&mut cur, &mut deps);
    Ok(deps)
}

/// Reads and parses a depfile from disk.
pub fn parse_file(path: &Path) -> Result<Vec<String>> {
    let mut bytes = std::fs::read(path)
        .map_err(|err| anyhow!("read depfile {}: {}", path.display(), err))?;
    bytes.push(0);
    let mut scanner = Scanner::new(&bytes);
    parse(&mut scanner).map_err(|err| anyhow!(scanner.format_parse_error(path, err)))
}
