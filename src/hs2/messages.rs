//! TCLIService request and response structs.
//!
//! Field ids follow `TCLIService.thrift` from Apache Hive. Only the calls used
//! by the driver are modelled; unknown fields in replies are skipped.

use super::codec::{CodecResult, TType, ThriftDecode, ThriftEncode, ThriftReader, ThriftWriter, required};
use super::rowset::RowSet;
use std::collections::BTreeMap;

/// HIVE_CLI_SERVICE_PROTOCOL_V6, the newest version Impala accepts for
/// columnar result sets.
pub const PROTOCOL_V6: i32 = 5;

/// `TStatusCode` values.
pub mod status_code {
    pub const SUCCESS: i32 = 0;
    pub const SUCCESS_WITH_INFO: i32 = 1;
    pub const STILL_EXECUTING: i32 = 2;
    pub const ERROR: i32 = 3;
    pub const INVALID_HANDLE: i32 = 4;
}

/// `TOperationState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Initialized,
    Running,
    Finished,
    Canceled,
    Closed,
    Error,
    Unknown,
    Pending,
    TimedOut,
}

impl OperationState {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Initialized,
            1 => Self::Running,
            2 => Self::Finished,
            3 => Self::Canceled,
            4 => Self::Closed,
            5 => Self::Error,
            7 => Self::Pending,
            8 => Self::TimedOut,
            _ => Self::Unknown,
        }
    }

    /// True once the operation can no longer make progress.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Initialized | Self::Running | Self::Pending)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub status_code: i32,
    pub info_messages: Vec<String>,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status_code,
            status_code::SUCCESS | status_code::SUCCESS_WITH_INFO | status_code::STILL_EXECUTING
        )
    }
}

impl ThriftDecode for Status {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut status_code = None;
        let mut status = Status::default();
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::I32, 1) => status_code = Some(r.read_i32()?),
                (TType::List, 2) => status.info_messages = read_string_list(r)?,
                (TType::String, 3) => status.sql_state = Some(r.read_string()?),
                (TType::I32, 4) => status.error_code = Some(r.read_i32()?),
                (TType::String, 5) => status.error_message = Some(r.read_string()?),
                (other, _) => r.skip(other)?,
            }
        }
        status.status_code = required(status_code, "TStatus", "statusCode")?;
        Ok(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleIdentifier {
    pub guid: Vec<u8>,
    pub secret: Vec<u8>,
}

impl ThriftEncode for HandleIdentifier {
    fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(TType::String, 1);
        w.write_binary(&self.guid);
        w.field_begin(TType::String, 2);
        w.write_binary(&self.secret);
        w.field_stop();
    }
}

impl ThriftDecode for HandleIdentifier {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut guid = None;
        let mut secret = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::String, 1) => guid = Some(r.read_binary()?),
                (TType::String, 2) => secret = Some(r.read_binary()?),
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            guid: required(guid, "THandleIdentifier", "guid")?,
            secret: required(secret, "THandleIdentifier", "secret")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: HandleIdentifier,
}

impl ThriftEncode for SessionHandle {
    fn encode(&self, w: &mut ThriftWriter) {
        w.write_struct_field(1, &self.session_id);
        w.field_stop();
    }
}

impl ThriftDecode for SessionHandle {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut session_id = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::Struct, 1) => session_id = Some(HandleIdentifier::decode(r)?),
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            session_id: required(session_id, "TSessionHandle", "sessionId")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationHandle {
    pub operation_id: HandleIdentifier,
    pub operation_type: i32,
    pub has_result_set: bool,
    pub modified_row_count: Option<f64>,
}

impl ThriftEncode for OperationHandle {
    fn encode(&self, w: &mut ThriftWriter) {
        w.write_struct_field(1, &self.operation_id);
        w.field_begin(TType::I32, 2);
        w.write_i32(self.operation_type);
        w.field_begin(TType::Bool, 3);
        w.write_bool(self.has_result_set);
        if let Some(count) = self.modified_row_count {
            w.field_begin(TType::Double, 4);
            w.write_double(count);
        }
        w.field_stop();
    }
}

impl ThriftDecode for OperationHandle {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut operation_id = None;
        let mut operation_type = None;
        let mut has_result_set = None;
        let mut modified_row_count = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::Struct, 1) => operation_id = Some(HandleIdentifier::decode(r)?),
                (TType::I32, 2) => operation_type = Some(r.read_i32()?),
                (TType::Bool, 3) => has_result_set = Some(r.read_bool()?),
                (TType::Double, 4) => modified_row_count = Some(r.read_double()?),
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            operation_id: required(operation_id, "TOperationHandle", "operationId")?,
            operation_type: required(operation_type, "TOperationHandle", "operationType")?,
            has_result_set: required(has_result_set, "TOperationHandle", "hasResultSet")?,
            modified_row_count,
        })
    }
}

// ---------------------------------------------------------------------------
// OpenSession / CloseSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpenSessionReq {
    pub client_protocol: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub configuration: BTreeMap<String, String>,
}

impl ThriftEncode for OpenSessionReq {
    fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(TType::I32, 1);
        w.write_i32(self.client_protocol);
        if let Some(username) = &self.username {
            w.write_string_field(2, username);
        }
        if let Some(password) = &self.password {
            w.write_string_field(3, password);
        }
        if !self.configuration.is_empty() {
            w.write_string_map_field(4, self.configuration.iter());
        }
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct OpenSessionResp {
    pub status: Status,
    pub server_protocol_version: i32,
    pub session_handle: Option<SessionHandle>,
    pub configuration: BTreeMap<String, String>,
}

impl ThriftDecode for OpenSessionResp {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut status = None;
        let mut server_protocol_version = None;
        let mut session_handle = None;
        let mut configuration = BTreeMap::new();
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::Struct, 1) => status = Some(Status::decode(r)?),
                (TType::I32, 2) => server_protocol_version = Some(r.read_i32()?),
                (TType::Struct, 3) => session_handle = Some(SessionHandle::decode(r)?),
                (TType::Map, 4) => configuration = read_string_map(r)?,
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            status: required(status, "TOpenSessionResp", "status")?,
            server_protocol_version: server_protocol_version.unwrap_or(PROTOCOL_V6),
            session_handle,
            configuration,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CloseSessionReq {
    pub session_handle: SessionHandle,
}

impl ThriftEncode for CloseSessionReq {
    fn encode(&self, w: &mut ThriftWriter) {
        w.write_struct_field(1, &self.session_handle);
        w.field_stop();
    }
}

// ---------------------------------------------------------------------------
// ExecuteStatement / GetOperationStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecuteStatementReq {
    pub session_handle: SessionHandle,
    pub statement: String,
    pub conf_overlay: BTreeMap<String, String>,
    pub run_async: bool,
}

impl ThriftEncode for ExecuteStatementReq {
    fn encode(&self, w: &mut ThriftWriter) {
        w.write_struct_field(1, &self.session_handle);
        w.write_string_field(2, &self.statement);
        if !self.conf_overlay.is_empty() {
            w.write_string_map_field(3, self.conf_overlay.iter());
        }
        w.field_begin(TType::Bool, 4);
        w.write_bool(self.run_async);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct ExecuteStatementResp {
    pub status: Status,
    pub operation_handle: Option<OperationHandle>,
}

impl ThriftDecode for ExecuteStatementResp {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut status = None;
        let mut operation_handle = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::Struct, 1) => status = Some(Status::decode(r)?),
                (TType::Struct, 2) => operation_handle = Some(OperationHandle::decode(r)?),
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            status: required(status, "TExecuteStatementResp", "status")?,
            operation_handle,
        })
    }
}

/// Request body shared by the calls that only carry an operation handle:
/// GetOperationStatus, GetResultSetMetadata and CloseOperation.
#[derive(Debug, Clone)]
pub struct OperationReq {
    pub operation_handle: OperationHandle,
}

impl ThriftEncode for OperationReq {
    fn encode(&self, w: &mut ThriftWriter) {
        w.write_struct_field(1, &self.operation_handle);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct GetOperationStatusResp {
    pub status: Status,
    pub operation_state: Option<OperationState>,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
}

impl ThriftDecode for GetOperationStatusResp {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut status = None;
        let mut operation_state = None;
        let mut sql_state = None;
        let mut error_code = None;
        let mut error_message = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::Struct, 1) => status = Some(Status::decode(r)?),
                (TType::I32, 2) => operation_state = Some(OperationState::from_i32(r.read_i32()?)),
                (TType::String, 3) => sql_state = Some(r.read_string()?),
                (TType::I32, 4) => error_code = Some(r.read_i32()?),
                (TType::String, 5) => error_message = Some(r.read_string()?),
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            status: required(status, "TGetOperationStatusResp", "status")?,
            operation_state,
            sql_state,
            error_code,
            error_message,
        })
    }
}

// ---------------------------------------------------------------------------
// GetResultSetMetadata
// ---------------------------------------------------------------------------

/// `TTypeId` names indexed by their numeric value.
const TYPE_NAMES: &[&str] = &[
    "BOOLEAN",
    "TINYINT",
    "SMALLINT",
    "INT",
    "BIGINT",
    "FLOAT",
    "DOUBLE",
    "STRING",
    "TIMESTAMP",
    "BINARY",
    "ARRAY",
    "MAP",
    "STRUCT",
    "UNION",
    "USER_DEFINED",
    "DECIMAL",
    "NULL",
    "DATE",
    "VARCHAR",
    "CHAR",
    "INTERVAL_YEAR_MONTH",
    "INTERVAL_DAY_TIME",
];

pub fn type_name(type_id: i32) -> &'static str {
    usize::try_from(type_id)
        .ok()
        .and_then(|i| TYPE_NAMES.get(i).copied())
        .unwrap_or("UNKNOWN")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub type_name: String,
    pub position: i32,
    pub comment: Option<String>,
}

impl ThriftDecode for ColumnDesc {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut name = None;
        let mut type_name = None;
        let mut position = None;
        let mut comment = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::String, 1) => name = Some(r.read_string()?),
                (TType::Struct, 2) => type_name = Some(decode_type_desc(r)?),
                (TType::I32, 3) => position = Some(r.read_i32()?),
                (TType::String, 4) => comment = Some(r.read_string()?),
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            name: required(name, "TColumnDesc", "columnName")?,
            type_name: type_name.unwrap_or_else(|| "UNKNOWN".to_string()),
            position: position.unwrap_or_default(),
            comment,
        })
    }
}

/// Reduce a `TTypeDesc` to the name of its top-level type.
fn decode_type_desc(r: &mut ThriftReader<'_>) -> CodecResult<String> {
    let mut name = None;
    loop {
        match r.read_field_begin()? {
            (TType::Stop, _) => break,
            (TType::List, 1) => {
                let (element_type, size) = r.read_list_begin()?;
                for index in 0..size {
                    if index == 0 && element_type == TType::Struct {
                        name = Some(decode_type_entry(r)?);
                    } else {
                        r.skip(element_type)?;
                    }
                }
            }
            (other, _) => r.skip(other)?,
        }
    }
    Ok(name.unwrap_or_else(|| "UNKNOWN".to_string()))
}

/// `TTypeEntry` union: only primitive entries carry a usable name.
fn decode_type_entry(r: &mut ThriftReader<'_>) -> CodecResult<String> {
    let mut name = String::from("UNKNOWN");
    loop {
        match r.read_field_begin()? {
            (TType::Stop, _) => break,
            (TType::Struct, 1) => {
                let mut type_id = None;
                loop {
                    match r.read_field_begin()? {
                        (TType::Stop, _) => break,
                        (TType::I32, 1) => type_id = Some(r.read_i32()?),
                        (other, _) => r.skip(other)?,
                    }
                }
                if let Some(id) = type_id {
                    name = type_name(id).to_string();
                }
            }
            (TType::Struct, 2) => {
                r.skip(TType::Struct)?;
                name = "ARRAY".to_string();
            }
            (TType::Struct, 3) => {
                r.skip(TType::Struct)?;
                name = "MAP".to_string();
            }
            (TType::Struct, 4) => {
                r.skip(TType::Struct)?;
                name = "STRUCT".to_string();
            }
            (other, _) => r.skip(other)?,
        }
    }
    Ok(name)
}

#[derive(Debug, Clone)]
pub struct GetResultSetMetadataResp {
    pub status: Status,
    pub columns: Vec<ColumnDesc>,
}

impl ThriftDecode for GetResultSetMetadataResp {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut status = None;
        let mut columns = Vec::new();
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::Struct, 1) => status = Some(Status::decode(r)?),
                (TType::Struct, 2) => columns = decode_table_schema(r)?,
                (other, _) => r.skip(other)?,
            }
        }
        columns.sort_by_key(|c| c.position);
        Ok(Self {
            status: required(status, "TGetResultSetMetadataResp", "status")?,
            columns,
        })
    }
}

fn decode_table_schema(r: &mut ThriftReader<'_>) -> CodecResult<Vec<ColumnDesc>> {
    let mut columns = Vec::new();
    loop {
        match r.read_field_begin()? {
            (TType::Stop, _) => break,
            (TType::List, 1) => {
                let (element_type, size) = r.read_list_begin()?;
                for _ in 0..size {
                    if element_type == TType::Struct {
                        columns.push(ColumnDesc::decode(r)?);
                    } else {
                        r.skip(element_type)?;
                    }
                }
            }
            (other, _) => r.skip(other)?,
        }
    }
    Ok(columns)
}

// ---------------------------------------------------------------------------
// FetchResults
// ---------------------------------------------------------------------------

/// `TFetchOrientation.FETCH_NEXT`
pub const FETCH_NEXT: i32 = 0;

#[derive(Debug, Clone)]
pub struct FetchResultsReq {
    pub operation_handle: OperationHandle,
    pub orientation: i32,
    pub max_rows: i64,
}

impl ThriftEncode for FetchResultsReq {
    fn encode(&self, w: &mut ThriftWriter) {
        w.write_struct_field(1, &self.operation_handle);
        w.field_begin(TType::I32, 2);
        w.write_i32(self.orientation);
        w.field_begin(TType::I64, 3);
        w.write_i64(self.max_rows);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct FetchResultsResp {
    pub status: Status,
    pub has_more_rows: bool,
    pub results: Option<RowSet>,
}

impl ThriftDecode for FetchResultsResp {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut status = None;
        let mut has_more_rows = false;
        let mut results = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::Struct, 1) => status = Some(Status::decode(r)?),
                (TType::Bool, 2) => has_more_rows = r.read_bool()?,
                (TType::Struct, 3) => results = Some(RowSet::decode(r)?),
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            status: required(status, "TFetchResultsResp", "status")?,
            has_more_rows,
            results,
        })
    }
}

/// Response carrying only a status: CloseSession, CloseOperation.
#[derive(Debug, Clone)]
pub struct StatusResp {
    pub status: Status,
}

impl ThriftDecode for StatusResp {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut status = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::Struct, 1) => status = Some(Status::decode(r)?),
                (other, _) => r.skip(other)?,
            }
        }
        Ok(Self {
            status: required(status, "TStatusResp", "status")?,
        })
    }
}

/// `TApplicationException` carried by exception replies.
#[derive(Debug, Clone, Default)]
pub struct ApplicationException {
    pub message: String,
    pub kind: i32,
}

impl ThriftDecode for ApplicationException {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut ex = Self::default();
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::String, 1) => ex.message = r.read_string()?,
                (TType::I32, 2) => ex.kind = r.read_i32()?,
                (other, _) => r.skip(other)?,
            }
        }
        Ok(ex)
    }
}

fn read_string_list(r: &mut ThriftReader<'_>) -> CodecResult<Vec<String>> {
    let (element_type, size) = r.read_list_begin()?;
    let mut values = Vec::with_capacity(size.min(1024));
    for _ in 0..size {
        if element_type == TType::String {
            values.push(r.read_string()?);
        } else {
            r.skip(element_type)?;
        }
    }
    Ok(values)
}

fn read_string_map(r: &mut ThriftReader<'_>) -> CodecResult<BTreeMap<String, String>> {
    let (key_type, value_type, size) = r.read_map_begin()?;
    let mut map = BTreeMap::new();
    for _ in 0..size {
        if key_type == TType::String && value_type == TType::String {
            let key = r.read_string()?;
            let value = r.read_string()?;
            map.insert(key, value);
        } else {
            r.skip(key_type)?;
            r.skip(value_type)?;
        }
    }
    Ok(map)
}
