//! Typed postback actions
//!
//! Button presses arrive as an opaque `key=value` query string. It is parsed
//! here into a [`PostbackAction`] before any dispatch logic sees it.

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::state::SessionMode;
use crate::utils::errors::{ClassChatError, Result};

/// A parsed postback action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostbackAction {
    /// Start a registered flow
    StartFlow { flow_id: String },
    /// Answer the step currently awaiting input
    Answer { value: String },
    /// Cancel the active flow
    Cancel,
    /// Show the mode-appropriate menu
    Menu,
    /// Switch between public and admin mode
    SwitchMode { mode: SessionMode },
    /// Application-registered action with its parameters
    Custom { name: String, params: BTreeMap<String, String> },
}

impl PostbackAction {
    /// Parse postback data such as `action=start_flow&flow=add_student`
    pub fn parse(data: &str) -> Result<Self> {
        let mut params: BTreeMap<String, String> = form_urlencoded::parse(data.as_bytes())
            .into_owned()
            .collect();

        let action = params
            .remove("action")
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ClassChatError::Postback(format!("missing action key in {:?}", data)))?;

        let require = |params: &mut BTreeMap<String, String>, key: &str| {
            params
                .remove(key)
                .ok_or_else(|| ClassChatError::Postback(format!("action {} requires {}", action, key)))
        };

        match action.as_str() {
            "start_flow" => Ok(PostbackAction::StartFlow {
                flow_id: require(&mut params, "flow")?,
            }),
            "answer" => Ok(PostbackAction::Answer {
                value: require(&mut params, "value")?,
            }),
            "cancel" => Ok(PostbackAction::Cancel),
            "menu" => Ok(PostbackAction::Menu),
            "switch_mode" => {
                let mode = match require(&mut params, "mode")?.to_lowercase().as_str() {
                    "admin" => SessionMode::Admin,
                    "public" => SessionMode::Public,
                    other => {
                        return Err(ClassChatError::Postback(format!("unknown mode {}", other)));
                    }
                };
                Ok(PostbackAction::SwitchMode { mode })
            }
            _ => Ok(PostbackAction::Custom { name: action, params }),
        }
    }

    /// Encode back into postback data
    pub fn to_data(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        match self {
            PostbackAction::StartFlow { flow_id } => {
                serializer.append_pair("action", "start_flow").append_pair("flow", flow_id);
            }
            PostbackAction::Answer { value } => {
                serializer.append_pair("action", "answer").append_pair("value", value);
            }
            PostbackAction::Cancel => {
                serializer.append_pair("action", "cancel");
            }
            PostbackAction::Menu => {
                serializer.append_pair("action", "menu");
            }
            PostbackAction::SwitchMode { mode } => {
                let mode = match mode {
                    SessionMode::Admin => "admin",
                    SessionMode::Public => "public",
                };
                serializer.append_pair("action", "switch_mode").append_pair("mode", mode);
            }
            PostbackAction::Custom { name, params } => {
                serializer.append_pair("action", name);
                for (key, value) in params {
                    serializer.append_pair(key, value);
                }
            }
        }
        serializer.finish()
    }

    /// Short name used in logs
    pub fn name(&self) -> &str {
        match self {
            PostbackAction::StartFlow { .. } => "start_flow",
            PostbackAction::Answer { .. } => "answer",
            PostbackAction::Cancel => "cancel",
            PostbackAction::Menu => "menu",
            PostbackAction::SwitchMode { .. } => "switch_mode",
            PostbackAction::Custom { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn test_parse_builtin_actions() {
        assert_eq!(
            PostbackAction::parse("action=start_flow&flow=add_student").unwrap(),
            PostbackAction::StartFlow { flow_id: "add_student".to_string() }
        );
        assert_eq!(PostbackAction::parse("action=cancel").unwrap(), PostbackAction::Cancel);
        assert_eq!(
            PostbackAction::parse("action=switch_mode&mode=ADMIN").unwrap(),
            PostbackAction::SwitchMode { mode: SessionMode::Admin }
        );
        assert_eq!(
            PostbackAction::parse("action=answer&value=Grade+5").unwrap(),
            PostbackAction::Answer { value: "Grade 5".to_string() }
        );
    }

    #[test]
    fn test_parse_custom_action_keeps_params() {
        let action = PostbackAction::parse("action=view_payment&id=42&term=2").unwrap();
        assert_matches!(action, PostbackAction::Custom { ref name, ref params } => {
            assert_eq!(name, "view_payment");
            assert_eq!(params.get("id").map(String::as_str), Some("42"));
            assert_eq!(params.get("term").map(String::as_str), Some("2"));
            assert!(!params.contains_key("action"));
        });
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(PostbackAction::parse("flow=x"), Err(ClassChatError::Postback(_)));
        assert_matches!(PostbackAction::parse(""), Err(ClassChatError::Postback(_)));
        assert_matches!(PostbackAction::parse("action=start_flow"), Err(ClassChatError::Postback(_)));
        assert_matches!(PostbackAction::parse("action=switch_mode&mode=root"), Err(ClassChatError::Postback(_)));
    }

    proptest! {
        #[test]
        fn prop_answer_values_survive_encoding(value in "\\PC{0,40}") {
            let action = PostbackAction::Answer { value: value.clone() };
            let parsed = PostbackAction::parse(&action.to_data()).unwrap();
            prop_assert_eq!(parsed, PostbackAction::Answer { value });
        }

        #[test]
        fn prop_parse_never_panics(data in "\\PC{0,80}") {
            let _ = PostbackAction::parse(&data);
        }
    }
}
