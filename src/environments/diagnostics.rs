use std::fmt;
use tracing::warn;

/// Non-fatal notice that a retired field alias was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecationNotice {
    pub field: &'static str,
    pub replacement: Option<&'static str>,
    pub message: String,
}

impl DeprecationNotice {
    pub fn new(
        field: &'static str,
        replacement: Option<&'static str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field,
            replacement,
            message: message.into(),
        }
    }
}

impl fmt::Display for DeprecationNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.field, self.message)
    }
}

/// Receives deprecation notices raised while an environment is validated.
/// Notices never influence whether validation succeeds.
pub trait Diagnostics {
    fn deprecated(&mut self, notice: DeprecationNotice);
}

/// Reports every notice as a `warn` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn deprecated(&mut self, notice: DeprecationNotice) {
        warn!(
            field = notice.field,
            replacement = notice.replacement.unwrap_or("none"),
            "{}",
            notice.message
        );
    }
}

impl Diagnostics for Vec<DeprecationNotice> {
    fn deprecated(&mut self, notice: DeprecationNotice) {
        self.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_collects_notices_in_order() {
        let mut notices: Vec<DeprecationNotice> = Vec::new();
        let sink: &mut dyn Diagnostics = &mut notices;
        sink.deprecated(DeprecationNotice::new("a", None, "first"));
        sink.deprecated(DeprecationNotice::new("b", Some("c"), "second"));

        let fields: Vec<_> = notices.iter().map(|n| n.field).collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(notices[1].replacement, Some("c"));
    }

    #[test]
    fn test_notice_display_names_field() {
        let notice =
            DeprecationNotice::new("max_restarts", Some("max_retries"), "use `max_retries`.");
        assert_eq!(notice.to_string(), "`max_restarts`: use `max_retries`.");
    }
}
