//! MCP service implementation using rmcp.
//!
//! This module defines the ImpalaService struct exposing the Impala tools and
//! the `database://{db_name}` resource template through the rmcp framework's
//! macros.

use crate::db::ConnectionManager;
use crate::tools::catalog::{CatalogToolHandler, GetSchemaOutput, ListDatabasesOutput};
use crate::tools::database::{DatabaseToolHandler, UseDbInput, UseDbOutput};
use crate::tools::query::{ExecuteQueryInput, ExecuteQueryOutput, QueryToolHandler};
use crate::tools::sql_validator::AdmissionPolicy;
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        AnnotateAble, Implementation, ListResourceTemplatesResult, PaginatedRequestParam,
        ProtocolVersion, RawResourceTemplate, ReadResourceRequestParam, ReadResourceResult,
        ResourceContents, ResourceTemplate, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tracing::{error, info};

/// URI scheme of the database description resource.
pub const DATABASE_URI_PREFIX: &str = "database://";

#[derive(Clone)]
pub struct ImpalaService {
    /// Shared connection manager for all backend operations
    connection_manager: Arc<ConnectionManager>,
    /// Read-only admission policy applied by execute_query
    policy: AdmissionPolicy,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl ImpalaService {
    /// Create a new ImpalaService instance.
    ///
    /// # Arguments
    ///
    /// * `connection_manager` - Shared connection manager for backend operations
    /// * `policy` - Admission policy for `execute_query`
    pub fn new(connection_manager: Arc<ConnectionManager>, policy: AdmissionPolicy) -> Self {
        Self {
            connection_manager,
            policy,
            tool_router: Self::tool_router(),
        }
    }

    /// Shared connection manager, used by transports to close on shutdown.
    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.connection_manager
    }

    /// Database name addressed by a `database://{db_name}` URI.
    pub fn parse_database_uri(uri: &str) -> Result<&str, McpError> {
        let name = uri
            .strip_prefix(DATABASE_URI_PREFIX)
            .map(|rest| rest.trim_end_matches('/'))
            .ok_or_else(|| {
                McpError::invalid_params(format!("Unknown resource URI: {}", uri), None)
            })?;
        if name.is_empty() {
            return Err(McpError::invalid_params(
                "Resource URI is missing the database name: database://{db_name}",
                None,
            ));
        }
        Ok(name)
    }

    /// The `database://{db_name}` template advertised to clients.
    pub fn resource_templates() -> Vec<ResourceTemplate> {
        vec![
            RawResourceTemplate {
                uri_template: format!("{}{{db_name}}", DATABASE_URI_PREFIX),
                name: "Describe Database".to_string(),
                title: Some("Describe Database".to_string()),
                description: Some(
                    "Resource that provides detailed information about a specific database."
                        .to_string(),
                ),
                mime_type: Some("text/plain".to_string()),
            }
            .no_annotation(),
        ]
    }

    /// Read `database://{db_name}` as a plain-text description.
    pub async fn read_database_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let name = Self::parse_database_uri(uri)?;
        info!(database = %name, "Describing database");

        let handler = CatalogToolHandler::new(self.connection_manager.clone());
        let text = handler.describe_database(name).await.map_err(|e| {
            error!(error = %e, "Error describing database");
            McpError::from(e)
        })?;

        let mut contents = ResourceContents::text(text, uri);
        if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
            *mime_type = Some("text/plain".to_string());
        }
        Ok(ReadResourceResult {
            contents: vec![contents],
        })
    }
}

#[tool_router]
impl ImpalaService {
    #[tool(
        description = "Execute a SQL query on the Impala database and return results as JSON.\nOnly read-only statements are admitted: SELECT, SHOW, DESCRIBE, WITH, USE, SET.\nOutput format: json (default), table, or markdown."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Result<Json<ExecuteQueryOutput>, McpError> {
        info!(query = %input.query, "Executing query");
        let handler = QueryToolHandler::new(self.connection_manager.clone(), self.policy);
        handler.execute_query(input).await.map(Json).map_err(|e| {
            error!(error = %e, "execute_query failed");
            McpError::from(e)
        })
    }

    #[tool(description = "Retrieve the list of table names in the current Impala database.")]
    async fn get_schema(&self) -> Result<Json<GetSchemaOutput>, McpError> {
        info!("Getting schema information");
        let handler = CatalogToolHandler::new(self.connection_manager.clone());
        handler.get_schema().await.map(Json).map_err(|e| {
            error!(error = %e, "get_schema failed");
            McpError::from(e)
        })
    }

    #[tool(description = "Use the specified database in Impala.")]
    async fn use_db(
        &self,
        Parameters(input): Parameters<UseDbInput>,
    ) -> Result<Json<UseDbOutput>, McpError> {
        info!(database = %input.db_name, "Switching database");
        let handler = DatabaseToolHandler::new(self.connection_manager.clone());
        handler.use_db(input).await.map(Json).map_err(|e| {
            error!(error = %e, "use_db failed");
            McpError::from(e)
        })
    }

    #[tool(description = "List all databases in Impala.")]
    async fn list_dbs(&self) -> Result<Json<ListDatabasesOutput>, McpError> {
        info!("Listing databases");
        let handler = CatalogToolHandler::new(self.connection_manager.clone());
        handler.list_dbs().await.map(Json).map_err(|e| {
            error!(error = %e, "list_dbs failed");
            McpError::from(e)
        })
    }
}

#[tool_handler]
impl ServerHandler for ImpalaService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "iceberg-mcp-server".to_owned(),
                title: Some("Cloudera Iceberg MCP Server via Impala".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only access to Apache Iceberg tables through Impala.\n\
                \n\
                ## Workflow\n\
                1. Call `list_dbs` to see the databases\n\
                2. Call `use_db` to pick one; it stays selected for later calls\n\
                3. Call `get_schema` to list its tables\n\
                4. Run SQL with `execute_query`\n\
                \n\
                ## Rules\n\
                - `execute_query` admits statements starting with SELECT, SHOW, DESCRIBE, WITH, USE or SET.\n\
                  Anything else is rejected with \"Only read-only queries are allowed.\"\n\
                - Submit one statement per call.\n\
                - Results are capped; `truncated: true` means more rows exist. Add a LIMIT or aggregate.\n\
                \n\
                ## Resources\n\
                - `database://{db_name}` describes a database (storage location and comment)."
                    .to_string(),
            ),
        }
    }

    fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourceTemplatesResult, McpError>> + Send + '_
    {
        std::future::ready(Ok(ListResourceTemplatesResult::with_all_items(
            Self::resource_templates(),
        )))
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move { self.read_database_resource(&request.uri).await }
    }
}
