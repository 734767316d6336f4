//! Rule evaluation
//!
//! `decide` runs the rule list in order: the first `DEFAULT` rule (if
//! any) supplies the fallback action, every other rule is skipped when
//! its scope does not match the request, and the first rule whose
//! predicate holds decides. If nothing matches the fallback applies
//! (ALLOW when no default was given).
//!
//! # Comparison semantics
//!
//! Equality compares numerically when both sides coerce to f64,
//! otherwise as lowercased strings. Ordered comparisons require both
//! sides to coerce numerically and are false otherwise. `IN`/`NOT IN`
//! apply equality element-wise against a list. `MATCHES` compiles the
//! right side as a regex; a malformed pattern never matches. A missing
//! field fails every predicate except `NOT IN`, which holds vacuously.

use crate::rules::{
    Action, Comparator, FieldValue, Literal, Predicate, Rule, RuleContext, Scope,
};

/// A compiled, ordered rule list
#[derive(Debug, Clone, Default)]
pub struct RuleProgram {
    rules: Vec<Rule>,
}

impl RuleProgram {
    pub fn new(rules: Vec<Rule>) -> Self {
        RuleProgram { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run the decision procedure for a scope against a fact set.
    pub fn decide(&self, scope: Scope, ctx: &RuleContext) -> Action {
        let mut default_action = Action::Allow;
        for rule in &self.rules {
            if let Rule::Default(action) = rule {
                default_action = *action;
                break;
            }
        }

        for rule in &self.rules {
            let Rule::Filter {
                action,
                scope: rule_scope,
                predicate,
            } = rule
            else {
                continue;
            };

            if !rule_scope.applies_to(scope) {
                continue;
            }

            if eval_predicate(predicate, ctx) {
                return *action;
            }
        }

        default_action
    }

    /// True if traversal into the object is allowed
    pub fn can_explore(&self, ctx: &RuleContext) -> bool {
        self.decide(Scope::Exploration, ctx) == Action::Allow
    }

    /// True if the object may be emitted into the graph
    pub fn can_process(&self, ctx: &RuleContext) -> bool {
        self.decide(Scope::Processing, ctx) == Action::Allow
    }
}

fn eval_predicate(predicate: &Predicate, ctx: &RuleContext) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::Not(inner) => !eval_predicate(inner, ctx),
        Predicate::And(parts) => parts.iter().all(|p| eval_predicate(p, ctx)),
        Predicate::Or(parts) => parts.iter().any(|p| eval_predicate(p, ctx)),
        Predicate::Compare { field, op, value } => {
            let lhs = ctx.field_value(field);
            compare(&lhs, *op, value)
        }
    }
}

fn compare(lhs: &FieldValue, op: Comparator, rhs: &Literal) -> bool {
    match op {
        Comparator::Eq => equals(lhs, rhs),
        Comparator::Ne => !equals(lhs, rhs),
        Comparator::Lt => numeric_cmp(lhs, rhs).map(|o| o.is_lt()).unwrap_or(false),
        Comparator::Gt => numeric_cmp(lhs, rhs).map(|o| o.is_gt()).unwrap_or(false),
        Comparator::Le => numeric_cmp(lhs, rhs).map(|o| o.is_le()).unwrap_or(false),
        Comparator::Ge => numeric_cmp(lhs, rhs).map(|o| o.is_ge()).unwrap_or(false),
        Comparator::In => in_list(lhs, rhs),
        Comparator::NotIn => !in_list(lhs, rhs),
        Comparator::Matches => matches_regex(lhs, rhs),
    }
}

/// Numeric form of a field value, if it has one
fn field_num(v: &FieldValue) -> Option<f64> {
    match v {
        FieldValue::Num(n) => Some(*n),
        FieldValue::Str(s) => s.trim().parse().ok(),
        FieldValue::Bool(_) | FieldValue::Missing => None,
    }
}

/// Numeric form of a literal, if it has one
fn literal_num(v: &Literal) -> Option<f64> {
    match v {
        Literal::Num(n) => Some(*n),
        Literal::Str(s) => s.trim().parse().ok(),
        Literal::Bool(_) | Literal::List(_) => None,
    }
}

/// Canonical string form used for case-insensitive equality
fn field_str(v: &FieldValue) -> Option<String> {
    match v {
        FieldValue::Str(s) => Some(s.to_lowercase()),
        FieldValue::Num(n) => Some(format_num(*n)),
        FieldValue::Bool(b) => Some(b.to_string()),
        FieldValue::Missing => None,
    }
}

fn literal_str(v: &Literal) -> Option<String> {
    match v {
        Literal::Str(s) => Some(s.to_lowercase()),
        Literal::Num(n) => Some(format_num(*n)),
        Literal::Bool(b) => Some(b.to_string()),
        Literal::List(_) => None,
    }
}

/// Integral floats print without a trailing `.0` so `5` and `5.0`
/// compare equal as strings.
fn format_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn equals(lhs: &FieldValue, rhs: &Literal) -> bool {
    if matches!(lhs, FieldValue::Missing) {
        return false;
    }
    if let (Some(a), Some(b)) = (field_num(lhs), literal_num(rhs)) {
        return a == b;
    }
    match (field_str(lhs), literal_str(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn numeric_cmp(lhs: &FieldValue, rhs: &Literal) -> Option<std::cmp::Ordering> {
    let a = field_num(lhs)?;
    let b = literal_num(rhs)?;
    a.partial_cmp(&b)
}

fn in_list(lhs: &FieldValue, rhs: &Literal) -> bool {
    let Literal::List(items) = rhs else {
        return false;
    };
    items.iter().any(|item| equals(lhs, item))
}

fn matches_regex(lhs: &FieldValue, rhs: &Literal) -> bool {
    let Some(text) = field_str_exact(lhs) else {
        return false;
    };
    let pattern = match rhs {
        Literal::Str(s) => s.clone(),
        Literal::Num(n) => format_num(*n),
        Literal::Bool(b) => b.to_string(),
        Literal::List(_) => return false,
    };
    match regex::Regex::new(&pattern) {
        Ok(re) => re.is_match(&text),
        Err(_) => false,
    }
}

/// String form without case folding, for regex matching
fn field_str_exact(v: &FieldValue) -> Option<String> {
    match v {
        FieldValue::Str(s) => Some(s.clone()),
        FieldValue::Num(n) => Some(format_num(*n)),
        FieldValue::Bool(b) => Some(b.to_string()),
        FieldValue::Missing => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{parse_rule_strings, FileFact, ShareFact};

    fn program(lines: &[&str]) -> RuleProgram {
        let (rules, errors) = parse_rule_strings(lines);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        RuleProgram::new(rules)
    }

    fn share_ctx(name: &str) -> RuleContext {
        RuleContext {
            share: Some(ShareFact::new(name, "")),
            ..Default::default()
        }
    }

    #[test]
    fn test_admin_share_filtering() {
        let prog = program(&[
            "DEFAULT: ALLOW",
            "DENY EXPLORATION IF SHARE.NAME IN ['c$','print$','admin$','ipc$']",
            "ALLOW EXPLORATION",
        ]);

        // Case-insensitive list membership
        assert!(!prog.can_explore(&share_ctx("ADMIN$")));
        assert!(!prog.can_explore(&share_ctx("c$")));
        assert!(prog.can_explore(&share_ctx("DATA")));
    }

    #[test]
    fn test_deny_default_with_size_and_depth() {
        let prog = program(&[
            "DEFAULT: DENY",
            "ALLOW EXPLORATION IF SHARE.NAME = 'public'",
            "ALLOW PROCESSING IF FILE.SIZE < 1000000",
            "DENY EXPLORATION IF DEPTH > 2",
        ]);

        let mut ctx = RuleContext {
            share: Some(ShareFact::new("public", "")),
            file: Some(FileFact::new("doc.txt", "doc.txt", 500_000)),
            depth: 1,
            ..Default::default()
        };
        assert!(prog.can_explore(&ctx));
        assert!(prog.can_process(&ctx));

        ctx.depth = 3;
        ctx.file = Some(FileFact::new("big.bin", "big.bin", 2_000_000));
        // Depth rule does not fire first: the share-name ALLOW still
        // precedes it, so EXPLORATION stays allowed for 'public'.
        assert!(prog.can_explore(&ctx));
        assert!(!prog.can_process(&ctx));

        // A different share at depth 3 falls through to the deny
        ctx.share = Some(ShareFact::new("other", ""));
        assert!(!prog.can_explore(&ctx));
    }

    #[test]
    fn test_default_when_nothing_matches() {
        let prog = program(&["DEFAULT: DENY", "ALLOW PROCESSING IF FILE.SIZE < 10"]);
        // EXPLORATION has no matching rule; falls to the default
        assert!(!prog.can_explore(&share_ctx("data")));

        let prog = program(&["ALLOW PROCESSING IF FILE.SIZE < 10"]);
        // No DEFAULT rule at all: ALLOW
        assert!(prog.can_explore(&share_ctx("data")));
    }

    #[test]
    fn test_scopeless_rule_hits_both_scopes() {
        let prog = program(&["DENY IF SHARE.NAME = 'secret'"]);
        let ctx = share_ctx("secret");
        assert!(!prog.can_explore(&ctx));
        assert!(!prog.can_process(&ctx));
    }

    #[test]
    fn test_hidden_share_field() {
        let prog = program(&["DENY EXPLORATION IF SHARE.HIDDEN = TRUE"]);
        assert!(!prog.can_explore(&share_ctx("backup$")));
        assert!(prog.can_explore(&share_ctx("backup")));
    }

    #[test]
    fn test_missing_field_three_valued_collapse() {
        let ctx = RuleContext::default(); // no share facts at all

        let prog = program(&["DENY IF SHARE.NAME = 'x'"]);
        assert!(prog.can_explore(&ctx), "equality on missing is false");

        let prog = program(&["DENY IF SHARE.NAME IN ['x']"]);
        assert!(prog.can_explore(&ctx), "IN on missing is false");

        let prog = program(&["DENY IF SHARE.NAME NOT IN ['x']"]);
        assert!(!prog.can_explore(&ctx), "NOT IN on missing is true");

        let prog = program(&["DENY IF DEPTH < 5 AND SHARE.NAME != 'x'"]);
        // != on missing is true (negation of false), depth 0 < 5
        assert!(!prog.can_explore(&ctx));
    }

    #[test]
    fn test_numeric_string_coercion() {
        let mut ctx = RuleContext::default();
        ctx.file = Some(FileFact::new("f", "f", 1024));

        let prog = program(&["DENY IF FILE.SIZE = '1024'"]);
        assert!(!prog.can_explore(&ctx), "numeric equality through string literal");

        let prog = program(&["DENY IF FILE.NAME < 10"]);
        assert!(prog.can_explore(&ctx), "non-numeric side makes ordered compare false");
    }

    #[test]
    fn test_matches_operator() {
        let mut ctx = RuleContext::default();
        ctx.file = Some(FileFact::new("backup-2023.sql", "dumps\\backup-2023.sql", 1));

        let prog = program(&["DENY PROCESSING IF FILE.NAME MATCHES '^backup-.*\\.sql$'"]);
        assert!(!prog.can_process(&ctx));

        // Malformed regex never matches
        let prog = program(&["DENY PROCESSING IF FILE.NAME MATCHES '['"]);
        assert!(prog.can_process(&ctx));
    }

    #[test]
    fn test_first_match_wins() {
        let prog = program(&[
            "DEFAULT: DENY",
            "ALLOW EXPLORATION IF SHARE.NAME = 'data'",
            "DENY EXPLORATION IF SHARE.NAME = 'data'",
        ]);
        assert!(prog.can_explore(&share_ctx("data")));
    }

    #[test]
    fn test_extension_empty_without_dot() {
        let mut ctx = RuleContext::default();
        ctx.file = Some(FileFact::new("Makefile", "Makefile", 1));

        let prog = program(&["DENY PROCESSING IF FILE.EXTENSION = ''"]);
        assert!(!prog.can_process(&ctx));
    }
}
