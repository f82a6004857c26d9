// src/server.rs
// MCP server surface: tool/resource handlers plus the JSON-RPC dispatcher
// that the stdio transport feeds.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::{CreateOptions, DraftsClient};
use crate::error::DraftsError;
use crate::store::{DraftsStore, Folder, DEFAULT_LIST_LIMIT};
use crate::tools::all_tools;
use crate::utils::structured_result_with_text;
use rmcp::model::*;

pub struct McpServer {
    client: Arc<DraftsClient>,
    store: Arc<DraftsStore>,
}

impl McpServer {
    pub fn new(client: Arc<DraftsClient>, store: Arc<DraftsStore>) -> Self {
        Self { client, store }
    }

    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: None }),
            resources: Some(ResourcesCapability {
                subscribe: None,
                list_changed: None,
            }),
            ..Default::default()
        }
    }

    pub async fn handle_initialize(
        &self,
        _request: InitializeRequestParam,
    ) -> Result<InitializeResult, DraftsError> {
        info!("MCP server initializing");

        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.capabilities(),
            server_info: Implementation {
                name: "drafts_bridge".to_string(),
                title: Some("Drafts".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Bridge to the Drafts app on macOS. Create, read, modify, and search drafts \
                 via the app's URL scheme and its local store. Write operations open the app \
                 and wait for its callback."
                    .to_string(),
            ),
        })
    }

    pub async fn handle_list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, DraftsError> {
        Ok(ListToolsResult {
            tools: all_tools(),
            next_cursor: None,
        })
    }

    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, DraftsError> {
        let name = request.name.as_ref();
        let args = request.arguments.unwrap_or_default();
        debug!(tool = name, "tool call");

        match name {
            "create_draft" => {
                let content = args
                    .get("content")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| DraftsError::InvalidParams("Missing 'content'".to_string()))?;
                let options = CreateOptions {
                    tags: args
                        .get("tags")
                        .and_then(|v| v.as_array())
                        .map(|a| {
                            a.iter()
                                .filter_map(|s| s.as_str().map(|x| x.to_string()))
                                .collect()
                        })
                        .unwrap_or_default(),
                    folder: args
                        .get("folder")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    flagged: args.get("flagged").and_then(|v| v.as_bool()),
                    action: args
                        .get("action")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                };
                let draft = self.client.create(content, &options).await?;
                structured_result_with_text(&draft, None)
            }

            "get_draft" => {
                let uuid = args
                    .get("uuid")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| DraftsError::InvalidParams("Missing 'uuid'".to_string()))?;
                let draft = self.client.get(uuid).await?;
                structured_result_with_text(&draft, None)
            }

            "append_to_draft" | "prepend_to_draft" => {
                let uuid = args
                    .get("uuid")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| DraftsError::InvalidParams("Missing 'uuid'".to_string()))?;
                let text = args
                    .get("text")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| DraftsError::InvalidParams("Missing 'text'".to_string()))?;
                let draft = if name == "append_to_draft" {
                    self.client.append(uuid, text).await?
                } else {
                    self.client.prepend(uuid, text).await?
                };
                structured_result_with_text(&draft, None)
            }

            "open_draft" => {
                let uuid = args.get("uuid").and_then(|v| v.as_str());
                let title = args.get("title").and_then(|v| v.as_str());
                let data = self.client.open(uuid, title).await?;
                structured_result_with_text(&json!({"success": true, "data": data}), None)
            }

            "run_action" => {
                let action = args
                    .get("action")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| DraftsError::InvalidParams("Missing 'action'".to_string()))?;
                let text = args.get("text").and_then(|v| v.as_str());
                let data = self.client.run_action(action, text).await?;
                structured_result_with_text(&json!({"success": true, "data": data}), None)
            }

            "search_drafts" => {
                let query = args
                    .get("query")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| DraftsError::InvalidParams("Missing 'query'".to_string()))?;
                let data = self.client.search(query).await?;
                structured_result_with_text(&json!({"success": true, "data": data}), None)
            }

            "list_drafts" => {
                let folder = args
                    .get("folder")
                    .and_then(|v| v.as_str())
                    .map(Folder::from_name)
                    .transpose()?;
                let flagged = args.get("flagged").and_then(|v| v.as_bool());
                let limit = args
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(DEFAULT_LIST_LIMIT as u64) as usize;
                let drafts = self.store.list(folder, flagged, limit).await?;
                structured_result_with_text(
                    &json!({"count": drafts.len(), "drafts": drafts}),
                    None,
                )
            }

            "query_drafts" => {
                let query = args
                    .get("query")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| DraftsError::InvalidParams("Missing 'query'".to_string()))?;
                let limit = args
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(DEFAULT_LIST_LIMIT as u64) as usize;
                let drafts = self.store.search(query, limit).await?;
                structured_result_with_text(
                    &json!({"count": drafts.len(), "drafts": drafts}),
                    None,
                )
            }

            _ => Err(DraftsError::ToolNotFound),
        }
    }

    pub async fn handle_list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, DraftsError> {
        let entry = |uri: &str, name: &str, description: &str| Resource {
            raw: RawResource {
                uri: uri.to_string(),
                name: name.to_string(),
                title: None,
                description: Some(description.to_string()),
                mime_type: Some("application/json".to_string()),
                size: None,
                icons: None,
            },
            annotations: None,
        };
        Ok(ListResourcesResult {
            resources: vec![
                entry("drafts://inbox", "Inbox", "Drafts currently in the inbox."),
                entry("drafts://archive", "Archive", "Archived drafts."),
                entry("drafts://flagged", "Flagged", "Flagged drafts across folders."),
            ],
            next_cursor: None,
        })
    }

    pub async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, DraftsError> {
        let uri = request.uri.as_str();
        let drafts = match uri {
            "drafts://inbox" => {
                self.store
                    .list(Some(Folder::Inbox), None, DEFAULT_LIST_LIMIT)
                    .await?
            }
            "drafts://archive" => {
                self.store
                    .list(Some(Folder::Archive), None, DEFAULT_LIST_LIMIT)
                    .await?
            }
            "drafts://flagged" => self.store.list(None, Some(true), DEFAULT_LIST_LIMIT).await?,
            _ => return Err(DraftsError::ResourceNotFound),
        };
        let text = serde_json::to_string_pretty(&drafts)?;
        Ok(vec![ResourceContents::text(text, uri)])
    }

    pub async fn handle_list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, DraftsError> {
        Ok(ListPromptsResult {
            prompts: vec![],
            next_cursor: None,
        })
    }
}

/// JSON-RPC message handler for the MCP server
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process a JSON-RPC request and return a response. Notifications
    /// return `Value::Null` and produce no reply.
    pub async fn handle_request(&self, request: Value) -> Value {
        debug!("Handling JSON-RPC request: {:?}", request);

        let id = request.get("id").cloned();
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or(json!({}));

        if method.starts_with("notifications/") {
            return Value::Null;
        }

        let result = match method {
            "initialize" => match serde_json::from_value::<InitializeRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_initialize(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(DraftsError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(DraftsError::SerdeJson(e).to_jsonrpc_error()),
            },
            "tools/list" => match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                Ok(req) => self
                    .server
                    .handle_list_tools(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(DraftsError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(DraftsError::SerdeJson(e).to_jsonrpc_error()),
            },
            "tools/call" => match serde_json::from_value::<CallToolRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_call_tool(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(DraftsError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(DraftsError::SerdeJson(e).to_jsonrpc_error()),
            },
            "resources/list" => {
                match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                    Ok(req) => self
                        .server
                        .handle_list_resources(req)
                        .await
                        .and_then(|r| serde_json::to_value(r).map_err(DraftsError::SerdeJson))
                        .map_err(|e| e.to_jsonrpc_error()),
                    Err(e) => Err(DraftsError::SerdeJson(e).to_jsonrpc_error()),
                }
            }
            "resources/read" => match serde_json::from_value::<ReadResourceRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_read_resource(req)
                    .await
                    .map(|contents| json!({"contents": contents}))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(DraftsError::SerdeJson(e).to_jsonrpc_error()),
            },
            "prompts/list" => match serde_json::from_value::<Option<PaginatedRequestParam>>(params)
            {
                Ok(req) => self
                    .server
                    .handle_list_prompts(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(DraftsError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(DraftsError::SerdeJson(e).to_jsonrpc_error()),
            },
            _ => Err(DraftsError::MethodNotFound.to_jsonrpc_error()),
        };

        match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackServer;
    use rusqlite::{params, Connection};

    fn fixture_store(dir: &tempfile::TempDir) -> DraftsStore {
        let path = dir.path().join("DraftStore.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE ZMANAGEDDRAFT (
                Z_PK INTEGER PRIMARY KEY,
                ZUUID TEXT,
                ZCONTENT TEXT,
                ZFLAGGED INTEGER,
                ZFOLDER INTEGER,
                ZCREATED_AT REAL,
                ZMODIFIED_AT REAL
            );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ZMANAGEDDRAFT (ZUUID, ZCONTENT, ZFLAGGED, ZFOLDER, ZCREATED_AT, ZMODIFIED_AT) \
             VALUES (?1, ?2, 0, 0, 700000000.0, 700000000.0)",
            params!["u-1", "Shopping list\nmilk"],
        )
        .unwrap();
        DraftsStore::new(path)
    }

    fn server_with_store(store: DraftsStore) -> McpServer {
        // Client backed by an un-started callback server: only used by tests
        // that fail validation before any launch.
        let client = Arc::new(DraftsClient::new(Arc::new(CallbackServer::new())));
        McpServer::new(client, Arc::new(store))
    }

    #[tokio::test]
    async fn lists_declared_tools() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_store(fixture_store(&dir));
        let tools = server.handle_list_tools(None).await.unwrap();
        assert!(tools.tools.iter().any(|t| t.name == "create_draft"));
        assert!(tools.tools.iter().any(|t| t.name == "query_drafts"));
    }

    #[tokio::test]
    async fn list_drafts_reads_store() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_store(fixture_store(&dir));
        let result = server
            .handle_call_tool(CallToolRequestParam {
                name: "list_drafts".into(),
                arguments: json!({"folder": "inbox"}).as_object().cloned(),
            })
            .await
            .unwrap();
        let sc = result.structured_content.unwrap();
        assert_eq!(sc["count"], 1);
        assert_eq!(sc["drafts"][0]["uuid"], "u-1");
    }

    #[tokio::test]
    async fn open_draft_without_identifier_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_store(fixture_store(&dir));
        let err = server
            .handle_call_tool(CallToolRequestParam {
                name: "open_draft".into(),
                arguments: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DraftsError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_store(fixture_store(&dir));
        let err = server
            .handle_call_tool(CallToolRequestParam {
                name: "delete_everything".into(),
                arguments: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DraftsError::ToolNotFound));
    }

    #[tokio::test]
    async fn jsonrpc_envelope_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let handler = JsonRpcHandler::new(server_with_store(fixture_store(&dir)));
        let response = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/list",
                "params": null
            }))
            .await;
        assert_eq!(response["id"], 7);
        assert!(response["result"]["tools"].is_array());

        let response = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 8,
                "method": "no/such/method"
            }))
            .await;
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let dir = tempfile::tempdir().unwrap();
        let handler = JsonRpcHandler::new(server_with_store(fixture_store(&dir)));
        let response = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "method": "notifications/initialized"
            }))
            .await;
        assert!(response.is_null());
    }

    #[tokio::test]
    async fn reads_inbox_resource() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_store(fixture_store(&dir));
        let contents = server
            .handle_read_resource(ReadResourceRequestParam {
                uri: "drafts://inbox".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(contents.len(), 1);

        let err = server
            .handle_read_resource(ReadResourceRequestParam {
                uri: "drafts://nope".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DraftsError::ResourceNotFound));
    }
}
