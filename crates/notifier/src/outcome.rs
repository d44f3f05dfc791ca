use serde::{Deserialize, Serialize};

/// Result of one delivery attempt on one channel (or one device).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }

    /// Prefix the failure reason with a label, e.g. `push: ...`.
    pub fn labelled(self, label: &str) -> Self {
        match self.error {
            Some(error) if !self.success => Self {
                success: false,
                error: Some(format!("{}: {}", label, error)),
            },
            _ => self,
        }
    }

    /// Failure reason, or a generic one when the sender gave none.
    pub fn reason(&self) -> &str {
        self.error.as_deref().unwrap_or("delivery failed")
    }
}

/// Logical OR over delivery attempts.
///
/// Succeeds when any attempt succeeded. Otherwise fails with every attempt's
/// reason joined by `; `. An empty set of attempts is a failure.
pub fn any_succeeded<I>(outcomes: I) -> SendOutcome
where
    I: IntoIterator<Item = SendOutcome>,
{
    let mut attempted = false;
    let mut reasons = Vec::new();

    for outcome in outcomes {
        attempted = true;
        if outcome.success {
            return SendOutcome::ok();
        }
        reasons.push(outcome.reason().to_string());
    }

    if !attempted {
        return SendOutcome::failed("no delivery attempted");
    }

    SendOutcome::failed(reasons.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_success_wins() {
        let outcome = any_succeeded(vec![
            SendOutcome::failed("token expired"),
            SendOutcome::ok(),
            SendOutcome::failed("unreachable"),
        ]);
        assert!(outcome.success);
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn test_all_failures_join_reasons() {
        let outcome = any_succeeded(vec![
            SendOutcome::failed("token expired"),
            SendOutcome::failed("unreachable"),
        ]);
        assert!(!outcome.success);
        assert_eq!(outcome.reason(), "token expired; unreachable");
    }

    #[test]
    fn test_empty_is_failure() {
        let outcome = any_succeeded(Vec::new());
        assert!(!outcome.success);
        assert_eq!(outcome.reason(), "no delivery attempted");
    }

    #[test]
    fn test_labelled_only_touches_failures() {
        assert_eq!(SendOutcome::ok().labelled("sms"), SendOutcome::ok());
        assert_eq!(
            SendOutcome::failed("no phone number available")
                .labelled("sms")
                .reason(),
            "sms: no phone number available"
        );
    }

    #[test]
    fn test_deserialize_without_error_field() {
        let outcome: SendOutcome = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(outcome.success);
        assert!(outcome.error.is_none());
    }
}
