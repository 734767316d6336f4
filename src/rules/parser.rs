//! Rule text parser
//!
//! One rule per line. `#`- and `//`-prefixed comments and blank lines
//! are skipped. Keywords are case-insensitive; string literals take
//! single or double quotes; lists are `[v1, v2, ...]`. Splitting on
//! `OR`/`AND` honors quotes and bracket depth. Parse errors carry the
//! 1-based line number and do not abort parsing of the remaining lines.

use crate::error::RuleError;
use crate::rules::{Action, Comparator, Literal, Predicate, Rule, Scope};

/// Parse a rules document.
///
/// Returns every successfully parsed rule in order, plus any per-line
/// errors.
pub fn parse_rules(input: &str) -> (Vec<Rule>, Vec<RuleError>) {
    let mut rules = Vec::new();
    let mut errors = Vec::new();

    for (i, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        match parse_line(line) {
            Ok(rule) => rules.push(rule),
            Err(message) => errors.push(RuleError::Parse {
                line: i + 1,
                message,
            }),
        }
    }

    (rules, errors)
}

/// Parse multiple rule strings as one document.
pub fn parse_rule_strings(inputs: &[impl AsRef<str>]) -> (Vec<Rule>, Vec<RuleError>) {
    let combined = inputs
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    parse_rules(&combined)
}

fn parse_line(line: &str) -> Result<Rule, String> {
    let upper = line.to_ascii_uppercase();

    // DEFAULT rule
    if upper.starts_with("DEFAULT:") || upper.starts_with("DEFAULT :") {
        let behavior = line
            .splitn(2, ':')
            .nth(1)
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_default();
        return match behavior.as_str() {
            "ALLOW" => Ok(Rule::Default(Action::Allow)),
            "DENY" => Ok(Rule::Default(Action::Deny)),
            other => Err(format!("DEFAULT must be ALLOW or DENY, got: {}", other)),
        };
    }

    let (action, mut rest) = if upper.starts_with("ALLOW") {
        (Action::Allow, line[5..].trim_start())
    } else if upper.starts_with("DENY") {
        (Action::Deny, line[4..].trim_start())
    } else {
        return Err("rule must start with ALLOW, DENY, or DEFAULT".into());
    };

    // Optional scope keyword; absent means the rule applies to both.
    let mut scope = Scope::All;
    let rest_upper = rest.to_ascii_uppercase();
    if rest_upper.starts_with("EXPLORATION") {
        scope = Scope::Exploration;
        rest = rest["EXPLORATION".len()..].trim_start();
    } else if rest_upper.starts_with("PROCESSING") {
        scope = Scope::Processing;
        rest = rest["PROCESSING".len()..].trim_start();
    }

    let rest_upper = rest.to_ascii_uppercase();
    let predicate = if rest_upper.starts_with("IF ") {
        parse_predicate(rest[3..].trim())?
    } else if rest.is_empty() {
        Predicate::True
    } else {
        return Err(format!("unexpected trailing input: {}", rest));
    };

    Ok(Rule::Filter {
        action,
        scope,
        predicate,
    })
}

fn parse_predicate(input: &str) -> Result<Predicate, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty condition".into());
    }

    // OR binds loosest
    let or_parts = split_at_keyword(input, "OR");
    if or_parts.len() > 1 {
        let conditions = or_parts
            .iter()
            .map(|p| parse_predicate(p))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Predicate::Or(conditions));
    }

    let and_parts = split_at_keyword(input, "AND");
    if and_parts.len() > 1 {
        let conditions = and_parts
            .iter()
            .map(|p| parse_predicate(p))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Predicate::And(conditions));
    }

    let upper = input.to_ascii_uppercase();
    if upper.starts_with("NOT ") {
        return Ok(Predicate::Not(Box::new(parse_predicate(&input[4..])?)));
    }

    if input.starts_with('(') && input.ends_with(')') && balanced_wrap(input) {
        return parse_predicate(&input[1..input.len() - 1]);
    }

    parse_comparison(input)
}

/// True if the outermost parentheses wrap the whole expression
fn balanced_wrap(input: &str) -> bool {
    let mut depth = 0i32;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != input.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn parse_comparison(input: &str) -> Result<Predicate, String> {
    let input = input.trim();

    // Longest operators first so `<=` wins over `<` and `NOT IN` over `IN`
    const COMPARATORS: &[(&str, Comparator, bool)] = &[
        ("NOT IN", Comparator::NotIn, true),
        ("MATCHES", Comparator::Matches, true),
        ("IN", Comparator::In, true),
        ("==", Comparator::Eq, false),
        ("!=", Comparator::Ne, false),
        ("<=", Comparator::Le, false),
        (">=", Comparator::Ge, false),
        ("=", Comparator::Eq, false),
        ("<", Comparator::Lt, false),
        (">", Comparator::Gt, false),
    ];

    let upper = input.to_ascii_uppercase();
    let bytes = input.as_bytes();

    let mut in_quote = false;
    let mut quote_char = 0u8;
    let mut depth = 0i32;

    for i in 0..bytes.len() {
        let c = bytes[i];
        if c == b'\'' || c == b'"' {
            if !in_quote {
                in_quote = true;
                quote_char = c;
            } else if c == quote_char {
                in_quote = false;
            }
            continue;
        }
        if c == b'(' || c == b'[' {
            depth += 1;
            continue;
        }
        if c == b')' || c == b']' {
            depth -= 1;
            continue;
        }
        if in_quote || depth != 0 || i == 0 {
            continue;
        }

        for &(text, op, is_word) in COMPARATORS {
            if !upper[i..].starts_with(text) {
                continue;
            }
            // Word operators need whitespace on both sides
            if is_word {
                let before_ok = bytes[i - 1].is_ascii_whitespace();
                let after = i + text.len();
                let after_ok = after < bytes.len() && bytes[after].is_ascii_whitespace();
                if !before_ok || !after_ok {
                    continue;
                }
            }

            let field = input[..i].trim();
            let value_str = input[i + text.len()..].trim();
            if field.is_empty() {
                return Err(format!("missing field before '{}'", text));
            }
            if value_str.is_empty() {
                return Err(format!("missing value after '{}'", text));
            }
            let value = parse_value(value_str)?;
            return Ok(Predicate::Compare {
                field: field.to_string(),
                op,
                value,
            });
        }
    }

    Err(format!("could not parse comparison: {}", input))
}

fn parse_value(input: &str) -> Result<Literal, String> {
    let input = input.trim();

    // List literal
    if input.starts_with('[') && input.ends_with(']') {
        let inner = &input[1..input.len() - 1];
        let mut values = Vec::new();
        for part in split_list_items(inner) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            values.push(parse_value(part)?);
        }
        return Ok(Literal::List(values));
    }

    // Quoted string
    if input.len() >= 2 {
        let first = input.as_bytes()[0];
        let last = input.as_bytes()[input.len() - 1];
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return Ok(Literal::Str(input[1..input.len() - 1].to_string()));
        }
    }

    match input.to_uppercase().as_str() {
        "TRUE" => return Ok(Literal::Bool(true)),
        "FALSE" => return Ok(Literal::Bool(false)),
        _ => {}
    }

    if is_numeric_literal(input) {
        let num: f64 = input
            .parse()
            .map_err(|_| format!("invalid number: {}", input))?;
        return Ok(Literal::Num(num));
    }

    // Bare word
    Ok(Literal::Str(input.to_string()))
}

fn is_numeric_literal(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    if s.is_empty() {
        return false;
    }
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '0'..='9' => {}
            '.' if !seen_dot && i > 0 && i < s.len() - 1 => seen_dot = true,
            _ => return false,
        }
    }
    true
}

/// Split at a keyword (case-insensitive, whitespace-delimited) while
/// respecting quotes and bracket depth.
fn split_at_keyword(input: &str, keyword: &str) -> Vec<String> {
    let mut parts = Vec::new();

    let upper = input.to_ascii_uppercase();
    let bytes = input.as_bytes();
    let klen = keyword.len();

    let mut in_quote = false;
    let mut quote_char = 0u8;
    let mut depth = 0i32;

    let mut segment_start = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];

        if c == b'\'' || c == b'"' {
            if !in_quote {
                in_quote = true;
                quote_char = c;
            } else if c == quote_char {
                in_quote = false;
            }
            i += 1;
            continue;
        }

        if c == b'(' || c == b'[' {
            depth += 1;
            i += 1;
            continue;
        }
        if c == b')' || c == b']' {
            depth -= 1;
            i += 1;
            continue;
        }

        if !in_quote
            && depth == 0
            && i > 0
            && bytes[i - 1].is_ascii_whitespace()
            && upper[i..].starts_with(keyword)
        {
            let after = i + klen;
            if after < bytes.len() && bytes[after].is_ascii_whitespace() {
                parts.push(input[segment_start..i].trim().to_string());
                segment_start = after + 1;
                i = after + 1;
                continue;
            }
        }

        i += 1;
    }

    parts.push(input[segment_start..].trim().to_string());
    parts
}

/// Split list items by comma while respecting quotes.
fn split_list_items(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut quote_char = ' ';

    for c in input.chars() {
        if c == '\'' || c == '"' {
            if !in_quote {
                in_quote = true;
                quote_char = c;
            } else if c == quote_char {
                in_quote = false;
            }
            current.push(c);
            continue;
        }

        if c == ',' && !in_quote {
            parts.push(current.clone());
            current.clear();
            continue;
        }

        current.push(c);
    }

    parts.push(current);
    parts
}
