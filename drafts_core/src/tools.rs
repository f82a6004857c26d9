// src/tools.rs
// Tool declarations for the MCP surface.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::Tool;
use serde_json::json;

fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
    Arc::new(value.as_object().expect("Schema must be an object").clone())
}

pub fn all_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: Cow::Borrowed("create_draft"),
            title: Some("Create Draft".to_string()),
            description: Some(Cow::Borrowed(
                "Create a new draft in Drafts.app with content and optional tags, folder, flag, and action. Returns the new draft's UUID.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "Draft content. The first line becomes the title. Required."
                    },
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Tags to assign to the new draft."
                    },
                    "folder": {
                        "type": "string",
                        "description": "Destination folder: 'inbox' or 'archive'. Defaults to inbox."
                    },
                    "flagged": {
                        "type": "boolean",
                        "description": "Whether to flag the new draft."
                    },
                    "action": {
                        "type": "string",
                        "description": "Name of a Drafts action to run on the new draft after creation."
                    }
                },
                "required": ["content"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Borrowed("get_draft"),
            title: Some("Get Draft".to_string()),
            description: Some(Cow::Borrowed(
                "Retrieve a draft's content by UUID via the app. Use UUIDs from list_drafts or query_drafts.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "uuid": {
                        "type": "string",
                        "description": "Draft UUID. Required."
                    }
                },
                "required": ["uuid"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Borrowed("append_to_draft"),
            title: Some("Append to Draft".to_string()),
            description: Some(Cow::Borrowed(
                "Append text to the end of an existing draft. Useful for incremental capture and logging.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "uuid": {
                        "type": "string",
                        "description": "Draft UUID to append to. Required."
                    },
                    "text": {
                        "type": "string",
                        "description": "Text to append. Use \\n for line breaks. Required."
                    }
                },
                "required": ["uuid", "text"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Borrowed("prepend_to_draft"),
            title: Some("Prepend to Draft".to_string()),
            description: Some(Cow::Borrowed(
                "Insert text at the beginning of an existing draft, above the current first line.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "uuid": {
                        "type": "string",
                        "description": "Draft UUID to prepend to. Required."
                    },
                    "text": {
                        "type": "string",
                        "description": "Text to prepend. Required."
                    }
                },
                "required": ["uuid", "text"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Borrowed("open_draft"),
            title: Some("Open Draft".to_string()),
            description: Some(Cow::Borrowed(
                "Open a draft in the app's editor. Provide a UUID or a title; at least one is required.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "uuid": {
                        "type": "string",
                        "description": "Draft UUID to open."
                    },
                    "title": {
                        "type": "string",
                        "description": "Title of the draft to open, used when no UUID is known."
                    }
                }
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Borrowed("run_action"),
            title: Some("Run Action".to_string()),
            description: Some(Cow::Borrowed(
                "Run a named Drafts action, optionally against provided text.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "description": "Name of the Drafts action to run. Required."
                    },
                    "text": {
                        "type": "string",
                        "description": "Text passed to the action as the draft content."
                    }
                },
                "required": ["action"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Borrowed("search_drafts"),
            title: Some("Search Drafts (app)".to_string()),
            description: Some(Cow::Borrowed(
                "Open the app's search UI for a query. For machine-readable results use query_drafts instead.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search term. Required."
                    }
                },
                "required": ["query"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Borrowed("list_drafts"),
            title: Some("List Drafts".to_string()),
            description: Some(Cow::Borrowed(
                "List drafts from the local store with optional folder and flagged filters. Returns summaries newest first.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "folder": {
                        "type": "string",
                        "description": "Filter by folder: 'inbox', 'archive', or 'trash'."
                    },
                    "flagged": {
                        "type": "boolean",
                        "description": "Filter by flagged state."
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum drafts to return. Default: 50, Max: 500.",
                        "default": 50
                    }
                }
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Borrowed("query_drafts"),
            title: Some("Query Drafts".to_string()),
            description: Some(Cow::Borrowed(
                "Full-text search over draft titles and content in the local store. Returns matching drafts newest first.",
            )),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Substring to find in draft content. Required."
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum results. Default: 50, Max: 500.",
                        "default": 50
                    }
                },
                "required": ["query"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_all_operations() {
        let names: Vec<String> = all_tools().iter().map(|t| t.name.to_string()).collect();
        for expected in [
            "create_draft",
            "get_draft",
            "append_to_draft",
            "prepend_to_draft",
            "open_draft",
            "run_action",
            "search_drafts",
            "list_drafts",
            "query_drafts",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn required_params_are_declared() {
        let tools = all_tools();
        let create = tools.iter().find(|t| t.name == "create_draft").unwrap();
        let required = create.input_schema.get("required").unwrap();
        assert_eq!(required, &json!(["content"]));
    }
}
