//! Aggregated run outcome and its scoring view.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::executor::CallOutcome;
use crate::{AgentError, AgentResult};

/// Absolute tolerance used when comparing two floats during scoring.
pub const FLOAT_TOLERANCE: f64 = 1e-6;

/// Structured outcome of one agent run.
///
/// Every successful call stores its value in `data` under a fresh key
/// (`{function}_{position}`, where position is the 1-based index of the call
/// in the completion). `results` maps the call's binding, or that same key
/// when unbound, to the data key. Failed calls only add a line to `errors`.
/// A binding replaces whatever its name pointed at before; an unbound call
/// never displaces an existing identifier and is then reachable only via
/// `data`.
///
/// A dry run carries the raw completion and nothing else.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResults")]
pub struct ExecutionResults {
    content: String,
    results: Map<String, Value>,
    data: Map<String, Value>,
    errors: Vec<String>,
    is_dry: bool,
    functions: Map<String, Value>,
}

impl ExecutionResults {
    /// Results of a dry run: the completion was neither parsed nor executed.
    #[must_use]
    pub fn dry(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_dry: true,
            ..Self::default()
        }
    }

    /// Folds call outcomes, in completion order, into results.
    #[must_use]
    pub fn aggregate(content: impl Into<String>, outcomes: Vec<CallOutcome>) -> Self {
        let mut aggregated = Self {
            content: content.into(),
            ..Self::default()
        };

        for (index, call) in outcomes.into_iter().enumerate() {
            let CallOutcome {
                binding,
                function_name,
                outcome,
            } = call;
            match outcome {
                Ok(value) => {
                    let key = format!("{function_name}_{}", index + 1);
                    aggregated.data.insert(key.clone(), value);
                    aggregated
                        .functions
                        .insert(key.clone(), Value::String(function_name));
                    match binding {
                        Some(binding) => {
                            aggregated.results.insert(binding, Value::String(key));
                        }
                        None => {
                            aggregated
                                .results
                                .entry(key.clone())
                                .or_insert(Value::String(key));
                        }
                    }
                }
                Err(message) if function_name.is_empty() => aggregated.errors.push(message),
                Err(message) => aggregated.errors.push(format!("{function_name}: {message}")),
            }
        }
        aggregated
    }

    /// Rebuilds results from their compact form. Each key becomes both the
    /// identifier and the data key.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not a JSON object.
    pub fn from_compact(text: &str) -> serde_json::Result<Self> {
        let compact: Map<String, Value> = serde_json::from_str(text)?;
        let mut results = Self::default();
        for (key, value) in compact {
            results.results.insert(key.clone(), Value::String(key.clone()));
            results.data.insert(key, value);
        }
        Ok(results)
    }

    /// The raw completion text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether this was a dry run.
    #[must_use]
    pub const fn is_dry(&self) -> bool {
        self.is_dry
    }

    /// Identifier to data key.
    #[must_use]
    pub fn results(&self) -> &Map<String, Value> {
        &self.results
    }

    /// Data key to value, in completion order.
    #[must_use]
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// One line per failed call, in completion order.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Data key to the name of the function that produced it.
    #[must_use]
    pub fn functions(&self) -> &Map<String, Value> {
        &self.functions
    }

    /// Returns the value stored for a binding or unbound-call key.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&Value> {
        let key = self.results.get(identifier)?.as_str()?;
        self.data.get(key)
    }

    /// The answer to show the user: the completion for a dry run, otherwise
    /// the last non-null value produced.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoFinalValue`] when no call produced a value.
    pub fn final_answer(&self) -> AgentResult<Value> {
        if self.is_dry {
            return Ok(Value::String(self.content.clone()));
        }
        self.data
            .values()
            .rev()
            .find(|value| !value.is_null())
            .cloned()
            .ok_or(AgentError::NoFinalValue)
    }

    /// Compact form: `{"content": ...}` for a dry run, otherwise each
    /// identifier mapped to its value.
    #[must_use]
    pub fn to_compact(&self) -> Value {
        if self.is_dry {
            let mut map = Map::new();
            map.insert("content".to_owned(), Value::String(self.content.clone()));
            return Value::Object(map);
        }
        Value::Object(
            self.results
                .keys()
                .filter_map(|identifier| {
                    self.get(identifier)
                        .map(|value| (identifier.clone(), value.clone()))
                })
                .collect(),
        )
    }

    /// Scores these results; see [`FunctionResults::check_score`].
    #[must_use]
    pub fn check_score<S: AsRef<str>>(&self, values: &[Value], functions: &[S]) -> f64 {
        FunctionResults::from(self).check_score(values, functions)
    }
}

impl fmt::Display for ExecutionResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_compact())
    }
}

#[derive(Deserialize)]
struct RawResults {
    #[serde(default)]
    content: String,
    #[serde(default)]
    results: Map<String, Value>,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    is_dry: bool,
    #[serde(default)]
    functions: Map<String, Value>,
}

impl TryFrom<RawResults> for ExecutionResults {
    type Error = String;

    fn try_from(raw: RawResults) -> Result<Self, Self::Error> {
        if raw.is_dry
            && !(raw.results.is_empty() && raw.data.is_empty() && raw.errors.is_empty())
        {
            return Err("dry-run results must only carry content".into());
        }
        for (identifier, key) in &raw.results {
            match key.as_str() {
                Some(key) if raw.data.contains_key(key) => {}
                _ => return Err(format!("result `{identifier}` does not name a data entry")),
            }
        }
        Ok(Self {
            content: raw.content,
            results: raw.results,
            data: raw.data,
            errors: raw.errors,
            is_dry: raw.is_dry,
            functions: raw.functions,
        })
    }
}

/// Read-only scoring view over [`ExecutionResults`].
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionResults {
    results: Map<String, Value>,
    data: Map<String, Value>,
    errors: Vec<String>,
    functions: Vec<String>,
}

impl From<&ExecutionResults> for FunctionResults {
    fn from(results: &ExecutionResults) -> Self {
        let mut functions: Vec<String> = Vec::new();
        for name in results.functions.values().filter_map(Value::as_str) {
            if !functions.iter().any(|seen| seen == name) {
                functions.push(name.to_owned());
            }
        }
        Self {
            results: results.results.clone(),
            data: results.data.clone(),
            errors: results.errors.clone(),
            functions,
        }
    }
}

impl FunctionResults {
    /// Identifier to data key.
    #[must_use]
    pub fn results(&self) -> &Map<String, Value> {
        &self.results
    }

    /// Data key to value.
    #[must_use]
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Errors of failed calls.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Distinct names of functions that ran successfully.
    #[must_use]
    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    /// Partial-credit score in `[0, 1]`.
    ///
    /// Half the score is the fraction of `values` found among the produced
    /// values, the other half the fraction of `functions` that ran
    /// successfully. An empty list earns its full half.
    ///
    /// Two floats match within [`FLOAT_TOLERANCE`]; an integer and a float
    /// match when numerically equal; anything else must be equal.
    #[must_use]
    pub fn check_score<S: AsRef<str>>(&self, values: &[Value], functions: &[S]) -> f64 {
        let matched_values = values
            .iter()
            .filter(|expected| self.data.values().any(|actual| values_match(expected, actual)))
            .count();
        let matched_functions = functions
            .iter()
            .filter(|expected| {
                let expected: &str = (*expected).as_ref();
                self.functions.iter().any(|name| name.as_str() == expected)
            })
            .count();

        0.5 * coverage(matched_values, values.len())
            + 0.5 * coverage(matched_functions, functions.len())
    }
}

#[allow(clippy::cast_precision_loss)]
fn coverage(matched: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        matched as f64 / total as f64
    }
}

#[allow(clippy::float_cmp)]
fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(left), Value::Number(right)) if left.is_f64() || right.is_f64() => {
            match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) if left.is_f64() && right.is_f64() => {
                    (a - b).abs() <= FLOAT_TOLERANCE
                }
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success(binding: Option<&str>, function: &str, value: Value) -> CallOutcome {
        CallOutcome {
            binding: binding.map(str::to_owned),
            function_name: function.to_owned(),
            outcome: Ok(value),
        }
    }

    fn failure(function: &str, message: &str) -> CallOutcome {
        CallOutcome {
            binding: None,
            function_name: function.to_owned(),
            outcome: Err(message.to_owned()),
        }
    }

    fn sample() -> ExecutionResults {
        ExecutionResults::aggregate(
            "completion",
            vec![
                success(Some("weather"), "get_weather", json!("Sunny, 21C")),
                failure("get_stock", "tool `get_stock` is not registered"),
                success(None, "convert_currency", json!(9.2)),
                failure("", "parse error: expected a function name after `CALL:`"),
            ],
        )
    }

    #[test]
    fn aggregates_values_bindings_and_errors() {
        let results = sample();
        assert!(!results.is_dry());
        assert_eq!(results.content(), "completion");
        assert_eq!(
            results.data().keys().collect::<Vec<_>>(),
            vec!["get_weather_1", "convert_currency_3"]
        );
        assert_eq!(results.results()["weather"], json!("get_weather_1"));
        assert_eq!(results.results()["convert_currency_3"], json!("convert_currency_3"));
        assert_eq!(results.get("weather"), Some(&json!("Sunny, 21C")));
        assert_eq!(
            results.errors(),
            [
                "get_stock: tool `get_stock` is not registered",
                "parse error: expected a function name after `CALL:`",
            ]
        );
        for key in results.results().values() {
            assert!(results.data().contains_key(key.as_str().unwrap()));
        }
    }

    #[test]
    fn rebinding_points_at_latest_value() {
        let results = ExecutionResults::aggregate(
            "",
            vec![
                success(Some("x"), "step", json!(1)),
                success(Some("x"), "step", json!(2)),
            ],
        );
        assert_eq!(results.get("x"), Some(&json!(2)));
        assert_eq!(results.data().len(), 2);
    }

    #[test]
    fn unbound_key_does_not_shadow_a_binding() {
        let results = ExecutionResults::aggregate(
            "",
            vec![
                success(Some("get_weather_2"), "get_joke", json!("knock knock")),
                success(None, "get_weather", json!("Sunny")),
            ],
        );
        assert_eq!(results.get("get_weather_2"), Some(&json!("knock knock")));
        assert_eq!(results.data()["get_weather_2"], json!("Sunny"));
        assert_eq!(results.to_compact(), json!({"get_weather_2": "knock knock"}));
        assert_eq!(results.final_answer().unwrap(), json!("Sunny"));
    }

    #[test]
    fn final_answer_is_last_non_null_value() {
        assert_eq!(sample().final_answer().unwrap(), json!(9.2));

        let with_trailing_null = ExecutionResults::aggregate(
            "",
            vec![
                success(None, "a", json!("answer")),
                success(None, "log", Value::Null),
            ],
        );
        assert_eq!(with_trailing_null.final_answer().unwrap(), json!("answer"));
    }

    #[test]
    fn final_answer_without_values_fails() {
        let empty = ExecutionResults::aggregate("just prose", Vec::new());
        assert!(matches!(empty.final_answer(), Err(AgentError::NoFinalValue)));

        let only_null = ExecutionResults::aggregate("", vec![success(None, "log", Value::Null)]);
        assert!(matches!(only_null.final_answer(), Err(AgentError::NoFinalValue)));

        let only_errors = ExecutionResults::aggregate("", vec![failure("f", "boom")]);
        assert!(matches!(only_errors.final_answer(), Err(AgentError::NoFinalValue)));
    }

    #[test]
    fn dry_run_carries_only_content() {
        let dry = ExecutionResults::dry("raw completion");
        assert!(dry.is_dry());
        assert!(dry.results().is_empty() && dry.data().is_empty() && dry.errors().is_empty());
        assert_eq!(dry.final_answer().unwrap(), json!("raw completion"));
        assert_eq!(dry.to_string(), r#"{"content":"raw completion"}"#);
    }

    #[test]
    fn compact_form_maps_identifiers_to_values() {
        assert_eq!(
            sample().to_compact(),
            json!({"weather": "Sunny, 21C", "convert_currency_3": 9.2})
        );
        assert_eq!(
            sample().to_string(),
            r#"{"weather":"Sunny, 21C","convert_currency_3":9.2}"#
        );
    }

    #[test]
    fn compact_round_trip_preserves_mapping() {
        let original = sample();
        let restored = ExecutionResults::from_compact(&original.to_string()).unwrap();
        assert_eq!(restored.to_compact(), original.to_compact());
        assert_eq!(restored.get("weather"), original.get("weather"));
        assert_eq!(restored.final_answer().unwrap(), json!(9.2));

        assert!(ExecutionResults::from_compact("[1, 2]").is_err());
    }

    #[test]
    fn serde_round_trip_and_validation() {
        let original = sample();
        let encoded = serde_json::to_string(&original).unwrap();
        let decoded: ExecutionResults = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, original);

        let dangling = json!({
            "content": "",
            "results": {"x": "missing_1"},
            "data": {},
            "errors": [],
            "is_dry": false
        });
        assert!(serde_json::from_value::<ExecutionResults>(dangling).is_err());

        let dirty_dry = json!({"content": "c", "errors": ["e"], "is_dry": true});
        assert!(serde_json::from_value::<ExecutionResults>(dirty_dry).is_err());
    }

    #[test]
    fn empty_expectations_score_full_marks() {
        let empty: [&str; 0] = [];
        assert!((sample().check_score(&[], &empty) - 1.0).abs() < f64::EPSILON);
        let nothing = ExecutionResults::aggregate("", Vec::new());
        assert!((nothing.check_score(&[], &empty) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn full_match_scores_one() {
        let score = sample().check_score(
            &[json!("Sunny, 21C"), json!(9.200_000_1)],
            &["get_weather", "convert_currency"],
        );
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_matches_earn_partial_credit() {
        let results = sample();
        let score = results.check_score(&[json!("Sunny, 21C"), json!("Rain")], &["get_weather"]);
        assert!((score - 0.75).abs() < f64::EPSILON);

        // failed calls do not count as executed functions
        let score = results.check_score(&[] as &[Value], &["get_stock", "get_weather"]);
        assert!((score - 0.75).abs() < f64::EPSILON);

        let score = results.check_score(&[json!(9.3)], &["nope"]);
        assert!(score.abs() < f64::EPSILON);
    }

    #[test]
    fn score_is_monotone_and_bounded() {
        let results = sample();
        let expected = [json!("Sunny, 21C"), json!(9.2), json!("absent")];
        let mut previous = -1.0;
        for matched in 0..=expected.len() {
            let mut values: Vec<Value> = expected[..matched].to_vec();
            values.resize(expected.len(), json!("absent"));
            let score = results.check_score(&values, &["get_weather"]);
            assert!((0.0..=1.0).contains(&score));
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn numeric_matching_rules() {
        assert!(values_match(&json!(1.0), &json!(1.000_000_5)));
        assert!(!values_match(&json!(1.0), &json!(1.01)));
        assert!(values_match(&json!(10), &json!(10.0)));
        assert!(!values_match(&json!(10), &json!(10.000_000_5)));
        assert!(values_match(&json!(10), &json!(10)));
        assert!(!values_match(&json!("10"), &json!(10)));
    }

    #[test]
    fn function_view_deduplicates_names() {
        let results = ExecutionResults::aggregate(
            "",
            vec![
                success(None, "step", json!(1)),
                success(None, "step", json!(2)),
                success(None, "other", json!(3)),
            ],
        );
        let view = FunctionResults::from(&results);
        assert_eq!(view.functions(), ["step", "other"]);
        assert_eq!(view.data().len(), 3);
    }
}
