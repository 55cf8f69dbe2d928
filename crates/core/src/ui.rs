//! UI control commands.
//!
//! A tool envelope may carry one structured directive for the client. The
//! union is closed: exactly two variants, and unknown `type` tags fail
//! deserialization at the dispatcher rather than reaching the client.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Daily,
    Weekly,
    Monthly,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Deadline,
    Priority,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One selectable option in a `show_choices` modal. The modal is read-only;
/// the user narrates their selection in the next turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque payload echoed back when the choice is referenced.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A directive forwarded verbatim to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    /// Replace the client's view state.
    ChangeView {
        view_mode: ViewMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort_by: Option<SortBy>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort_order: Option<SortOrder>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter_status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter_priority: Option<String>,
        /// When set, the client shows exactly these tasks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_results: Option<Vec<i64>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_query: Option<String>,
    },

    /// Open a read-only choice modal.
    ShowChoices { title: String, choices: Vec<Choice> },
}

impl UiCommand {
    /// A bare view switch with no filters or sorting.
    pub fn view(view_mode: ViewMode, target_date: Option<NaiveDate>) -> Self {
        Self::ChangeView {
            view_mode,
            target_date,
            sort_by: None,
            sort_order: None,
            filter_status: None,
            filter_priority: None,
            search_results: None,
            search_query: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_view_wire_shape() {
        let cmd = UiCommand::view(
            ViewMode::Monthly,
            Some(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()),
        );
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "change_view");
        assert_eq!(json["view_mode"], "monthly");
        assert_eq!(json["target_date"], "2025-12-01");
        assert!(json.get("sort_by").is_none());
    }

    #[test]
    fn search_results_roundtrip() {
        let cmd = UiCommand::ChangeView {
            view_mode: ViewMode::List,
            target_date: None,
            sort_by: None,
            sort_order: None,
            filter_status: None,
            filter_priority: None,
            search_results: Some(vec![3, 7, 11]),
            search_query: Some("administrative".into()),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: UiCommand = serde_json::from_str(&json).unwrap();
        match back {
            UiCommand::ChangeView {
                search_results,
                search_query,
                ..
            } => {
                assert_eq!(search_results.unwrap(), vec![3, 7, 11]);
                assert_eq!(search_query.as_deref(), Some("administrative"));
            }
            _ => panic!("expected change_view"),
        }
    }

    #[test]
    fn unknown_variant_rejected() {
        let err = serde_json::from_str::<UiCommand>(r#"{"type":"open_settings"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn show_choices_serializes_choices() {
        let cmd = UiCommand::ShowChoices {
            title: "Which task?".into(),
            choices: vec![Choice {
                id: "a".into(),
                label: "A) Quarterly report".into(),
                description: None,
                value: serde_json::json!({"task_id": 9}),
            }],
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "show_choices");
        assert_eq!(json["choices"][0]["label"], "A) Quarterly report");
    }
}
