//! Rule-based row validation.
//!
//! Rules are evaluated per row in configuration order. `remove` rules drop violating rows, `flag`
//! rules report violations through [`RuleFlag`]s and keep the row, `transform` rules are inert.
//! Numeric conditions only judge cells that parse as numbers; a missing or text cell never
//! violates `greater-than`, `less-than` or `range`. `pattern` conditions are never evaluated.

use serde::{Deserialize, Serialize};

use crate::config::{RuleAction, RuleCondition, ValidationRule};
use crate::error::EngineResult;
use crate::execution::ExecutionEngine;
use crate::types::{TabularDataset, Value};

use super::StageResult;

/// A `flag` rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFlag {
    /// Row index in the validation stage's input.
    pub row: usize,
    /// Index of the rule in the configured rule list.
    pub rule: usize,
    pub column: String,
}

/// Whether `value` violates `condition`.
pub fn violates(value: &Value, condition: &RuleCondition) -> bool {
    match condition {
        RuleCondition::GreaterThan(t) => value.as_number().is_some_and(|v| v <= *t),
        RuleCondition::LessThan(t) => value.as_number().is_some_and(|v| v >= *t),
        RuleCondition::Equals(target) => value != target,
        RuleCondition::NotEquals(target) => value == target,
        RuleCondition::Range { min, max } => {
            value.as_number().is_some_and(|v| v < *min || v > *max)
        }
        RuleCondition::Pattern(_) => false,
    }
}

/// Apply `rules` on the calling thread, dropping rows that violate a `remove` rule.
pub fn apply_rules(
    dataset: &TabularDataset,
    rules: &[ValidationRule],
) -> EngineResult<TabularDataset> {
    Ok(apply_rules_on(&ExecutionEngine::sequential(), dataset, rules)?.dataset)
}

pub(crate) fn apply_rules_on(
    engine: &ExecutionEngine,
    dataset: &TabularDataset,
    rules: &[ValidationRule],
) -> EngineResult<StageResult> {
    let resolved = rules
        .iter()
        .map(|rule| Ok((dataset.require_index(&rule.column)?, rule)))
        .collect::<EngineResult<Vec<_>>>()?;

    let verdicts = engine.map_indices(dataset.row_count(), |r| {
        let row = &dataset.rows[r];
        let mut keep = true;
        let mut flags = Vec::new();
        for (i, (col, rule)) in resolved.iter().enumerate() {
            if !violates(&row[*col], &rule.condition) {
                continue;
            }
            match rule.action {
                RuleAction::Remove => keep = false,
                RuleAction::Flag => flags.push(RuleFlag {
                    row: r,
                    rule: i,
                    column: rule.column.clone(),
                }),
                RuleAction::Transform => {}
            }
        }
        (keep, flags)
    });

    let mut rows = Vec::with_capacity(dataset.row_count());
    let mut all_flags = Vec::new();
    for (row, (keep, flags)) in dataset.rows.iter().zip(verdicts) {
        if keep {
            rows.push(row.clone());
        }
        all_flags.extend(flags);
    }

    let mut result = StageResult::new(dataset.with_rows(rows), 0);
    result.flags = all_flags;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::{apply_rules, apply_rules_on, violates, RuleFlag};
    use crate::config::{RuleAction, RuleCondition, ValidationRule};
    use crate::error::EngineError;
    use crate::execution::ExecutionEngine;
    use crate::types::tests::{dataset, nums};
    use crate::types::Value;

    #[test]
    fn greater_than_remove_drops_non_positive_ages_only() {
        let ds = dataset(&[("age", nums(&[Some(-1.0), Some(0.0), Some(1.0), Some(30.0), None]))]);
        let rule = ValidationRule::new("age", RuleCondition::GreaterThan(0.0), RuleAction::Remove);
        let out = apply_rules(&ds, &[rule]).unwrap();
        assert_eq!(
            out.rows,
            vec![nums(&[Some(1.0)]), nums(&[Some(30.0)]), nums(&[None])]
        );
    }

    #[test]
    fn conditions_follow_their_predicates() {
        let five = Value::Number(5.0);
        assert!(violates(&five, &RuleCondition::LessThan(5.0)));
        assert!(!violates(&five, &RuleCondition::LessThan(6.0)));
        assert!(!violates(&five, &RuleCondition::Range { min: 5.0, max: 5.0 }));
        assert!(violates(&five, &RuleCondition::Range { min: 6.0, max: 9.0 }));
        assert!(!violates(&five, &RuleCondition::Equals(Value::Number(5.0))));
        assert!(violates(&five, &RuleCondition::Equals(Value::text("5"))));
        assert!(violates(&five, &RuleCondition::NotEquals(Value::Number(5.0))));
        assert!(!violates(&five, &RuleCondition::Pattern("^x$".into())));
        assert!(!violates(&Value::text("abc"), &RuleCondition::GreaterThan(0.0)));
    }

    #[test]
    fn flag_rules_report_without_removing() {
        let ds = dataset(&[
            ("age", nums(&[Some(10.0), Some(200.0), Some(-3.0)])),
            ("region", vec![Value::text("n"), Value::text("s"), Value::text("n")]),
        ]);
        let rules = vec![
            ValidationRule::new(
                "region",
                RuleCondition::NotEquals(Value::text("s")),
                RuleAction::Remove,
            ),
            ValidationRule::new(
                "age",
                RuleCondition::Range {
                    min: 0.0,
                    max: 120.0,
                },
                RuleAction::Flag,
            ),
            ValidationRule::new("age", RuleCondition::GreaterThan(0.0), RuleAction::Transform),
        ];
        let result = apply_rules_on(&ExecutionEngine::sequential(), &ds, &rules).unwrap();

        assert_eq!(result.dataset.row_count(), 2);
        assert_eq!(
            result.flags,
            vec![
                RuleFlag { row: 1, rule: 1, column: "age".into() },
                RuleFlag { row: 2, rule: 1, column: "age".into() },
            ]
        );
    }

    #[test]
    fn unknown_rule_column_is_an_error() {
        let ds = dataset(&[("age", nums(&[Some(1.0)]))]);
        let rule = ValidationRule::new("height", RuleCondition::LessThan(2.0), RuleAction::Remove);
        assert!(matches!(
            apply_rules(&ds, &[rule]).unwrap_err(),
            EngineError::UnknownColumn { .. }
        ));
    }
}
