//! Operator precedence.
//!
//! spec.md §9 flags a suspicious source behavior: "the parser's
//! operator-precedence table is encoded twice (string-based and
//! enum-based)". Resolved here with a single textual table; `OperatorKind`
//! is derived from it so there is exactly one source of truth.

/// Numeric operator codes, low to high (spec.md §4.2 "Precedence"):
/// `+ - * /` (pemdas); `== != < <= > >=` all equal precedence; `&&`/`||`
/// lower than arithmetic.
const PRECEDENCE: &[(&str, u8)] = &[
    ("||", 1),
    ("&&", 1),
    ("==", 2),
    ("!=", 2),
    ("<", 2),
    ("<=", 2),
    (">", 2),
    (">=", 2),
    ("+", 3),
    ("-", 3),
    ("*", 4),
    ("/", 4),
];

pub fn precedence_of(op: &str) -> Option<u8> {
    PRECEDENCE.iter().find(|(name, _)| *name == op).map(|(_, p)| *p)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

impl TryFrom<&str> for OperatorKind {
    type Error = ();

    fn try_from(s: &str) -> Result<Self, ()> {
        Ok(match s {
            "+" => OperatorKind::Add,
            "-" => OperatorKind::Sub,
            "*" => OperatorKind::Mul,
            "/" => OperatorKind::Div,
            "==" => OperatorKind::Eq,
            "!=" => OperatorKind::Ne,
            "<" => OperatorKind::Lt,
            "<=" => OperatorKind::Le,
            ">" => OperatorKind::Gt,
            ">=" => OperatorKind::Ge,
            "&&" => OperatorKind::And,
            "||" => OperatorKind::Or,
            "!" => OperatorKind::Not,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_binds_tighter_than_add() {
        assert!(precedence_of("*").unwrap() > precedence_of("+").unwrap());
    }

    #[test]
    fn logical_binds_loosest() {
        assert!(precedence_of("&&").unwrap() < precedence_of("+").unwrap());
        assert!(precedence_of("&&").unwrap() < precedence_of("==").unwrap());
    }

    #[test]
    fn comparisons_share_precedence() {
        let p = precedence_of("==").unwrap();
        for op in ["!=", "<", "<=", ">", ">="] {
            assert_eq!(precedence_of(op).unwrap(), p);
        }
    }
}
