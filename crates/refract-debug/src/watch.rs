//! Watch list entries.

/// An expression re-evaluated whenever the session pauses.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchExpression {
    pub expression: String,
    /// Pretty-printed result, or the reason evaluation failed.
    pub value: String,
    /// Swatch for 3- and 4-component float results.
    pub color: Option<[f32; 4]>,
}

impl WatchExpression {
    pub(crate) fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            value: String::new(),
            color: None,
        }
    }
}
