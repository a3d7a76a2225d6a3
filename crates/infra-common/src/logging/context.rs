use std::collections::BTreeMap;
use std::fmt;
use tracing::Span;

/// Structured context attached to log output for one unit of work
#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub operation: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new<S: Into<String>>(component: S) -> Self {
        LogContext {
            component: component.into(),
            operation: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_operation<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        LogContext {
            operation: Some(operation.into()),
            ..LogContext::new(component)
        }
    }

    pub fn with_field<S: Into<String>, T: Into<String>>(mut self, key: S, value: T) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Info-level span carrying the component, operation and rendered fields.
    pub fn span(&self) -> Span {
        let op = self.operation.as_deref().unwrap_or("-");
        tracing::info_span!("mgcp", component = %self.component, operation = %op, fields = %self.render_fields())
    }

    fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.component)?;
        if let Some(op) = &self.operation {
            write!(f, "[{}]", op)?;
        }
        for (key, value) in &self.fields {
            write!(f, "[{}={}]", key, value)?;
        }
        Ok(())
    }
}
