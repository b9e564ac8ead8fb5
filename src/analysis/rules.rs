//! Action rules: predicate to action-item template mappings over a unit payload.

use crate::models::ActionTemplate;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&Value) -> bool + Send + Sync;
type Producer = dyn Fn(&Value) -> Vec<ActionTemplate> + Send + Sync;

/// One rule a unit declares for the reducer.
#[derive(Clone)]
pub struct ActionRule {
    name: &'static str,
    predicate: Arc<Predicate>,
    produce: Arc<Producer>,
}

impl ActionRule {
    /// Emit one item when `predicate` holds for the payload.
    pub fn when<P, T>(name: &'static str, predicate: P, template: T) -> Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        T: Fn(&Value) -> ActionTemplate + Send + Sync + 'static,
    {
        Self {
            name,
            predicate: Arc::new(predicate),
            produce: Arc::new(move |payload: &Value| vec![template(payload)]),
        }
    }

    /// Emit one item per element of the array at `pointer`, up to `limit`.
    pub fn for_each<T>(name: &'static str, pointer: &'static str, limit: usize, template: T) -> Self
    where
        T: Fn(&Value) -> ActionTemplate + Send + Sync + 'static,
    {
        Self {
            name,
            predicate: Arc::new(move |payload: &Value| {
                payload
                    .pointer(pointer)
                    .and_then(Value::as_array)
                    .is_some_and(|items| !items.is_empty())
            }),
            produce: Arc::new(move |payload: &Value| {
                payload
                    .pointer(pointer)
                    .and_then(Value::as_array)
                    .map(|items| items.iter().take(limit).map(&template).collect())
                    .unwrap_or_default()
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, payload: &Value) -> bool {
        (self.predicate)(payload)
    }

    /// Templates this rule yields for `payload`; empty when it does not match.
    pub fn apply(&self, payload: &Value) -> Vec<ActionTemplate> {
        if self.matches(payload) {
            (self.produce)(payload)
        } else {
            Vec::new()
        }
    }
}

impl fmt::Debug for ActionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRule").field("name", &self.name).finish()
    }
}

/// Numeric field lookup used by rule predicates.
pub fn number_at(payload: &Value, pointer: &str) -> Option<f64> {
    payload.pointer(pointer).and_then(Value::as_f64)
}

/// String field lookup used by rule templates.
pub fn str_at<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload.pointer(pointer).and_then(Value::as_str)
}

/// Length of the array at `pointer`, zero when absent.
pub fn len_at(payload: &Value, pointer: &str) -> usize {
    payload
        .pointer(pointer)
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use serde_json::json;

    #[test]
    fn test_when_rule() {
        let rule = ActionRule::when(
            "slow",
            |p| number_at(p, "/load_time").is_some_and(|t| t > 3.0),
            |p| {
                ActionTemplate::new("technical", "Speed up", Priority::High, 5, 4)
                    .describe(format!("{:.1}s", number_at(p, "/load_time").unwrap_or(0.0)))
            },
        );
        assert!(rule.apply(&json!({"load_time": 1.0})).is_empty());
        let out = rule.apply(&json!({"load_time": 4.31}));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description, "4.3s");
        assert_eq!(rule.name(), "slow");
    }

    #[test]
    fn test_for_each_rule_respects_limit() {
        let rule = ActionRule::for_each("issues", "/issues", 2, |issue| {
            ActionTemplate::new(
                "technical",
                str_at(issue, "/title").unwrap_or("Issue"),
                Priority::Medium,
                3,
                2,
            )
        });
        assert!(!rule.matches(&json!({"issues": []})));
        assert!(!rule.matches(&json!({})));

        let out = rule.apply(&json!({"issues": [{"title": "a"}, {"title": "b"}, {"title": "c"}]}));
        let titles: Vec<_> = out.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[test]
    fn test_helpers() {
        let payload = json!({"nested": {"n": 2, "s": "x", "list": [1, 2, 3]}});
        assert_eq!(number_at(&payload, "/nested/n"), Some(2.0));
        assert_eq!(str_at(&payload, "/nested/s"), Some("x"));
        assert_eq!(len_at(&payload, "/nested/list"), 3);
        assert_eq!(len_at(&payload, "/missing"), 0);
    }
}
