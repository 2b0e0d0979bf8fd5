//! Axis labels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One label on a column axis: a name, a number, or a tuple for
/// multi-level column headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    /// Integer label.
    Int(i64),
    /// String label.
    Str(String),
    /// One entry per level of a multi-level axis.
    Tuple(Vec<Label>),
}

impl Label {
    /// The label as a string, when it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Label::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(v) => write!(f, "{v}"),
            Label::Str(s) => f.write_str(s),
            Label::Tuple(parts) => {
                f.write_str("(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Str(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label::Str(s)
    }
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Label::Int(v)
    }
}

impl From<i32> for Label {
    fn from(v: i32) -> Self {
        Label::Int(i64::from(v))
    }
}

/// Render labels as `[a, b, c]` for messages.
pub(crate) fn display_labels(labels: &[Label]) -> String {
    let parts: Vec<String> = labels.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_serialize_untagged() -> Result<(), serde_json::Error> {
        let labels = vec![
            Label::from("a"),
            Label::from(3),
            Label::Tuple(vec![Label::from("x"), Label::from(1)]),
        ];
        let json = serde_json::to_string(&labels)?;
        assert_eq!(json, r#"["a",3,["x",1]]"#);
        let back: Vec<Label> = serde_json::from_str(&json)?;
        assert_eq!(back, labels);
        Ok(())
    }
}
