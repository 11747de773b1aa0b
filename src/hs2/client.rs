//! Session-level HiveServer2 client.
//!
//! A [`Session`] owns one channel and one server-side session handle. Each
//! statement is submitted asynchronously, polled until it reaches a terminal
//! state, then drained with `FetchResults` and closed.

use super::channel::{self, Channel};
use super::codec::{MessageType, TType, ThriftDecode, ThriftEncode, ThriftReader, ThriftWriter};
use super::messages::{
    ApplicationException, CloseSessionReq, ColumnDesc, ExecuteStatementReq, ExecuteStatementResp,
    FETCH_NEXT, FetchResultsReq, FetchResultsResp, GetOperationStatusResp,
    GetResultSetMetadataResp, OpenSessionReq, OpenSessionResp, OperationHandle, OperationReq,
    OperationState, PROTOCOL_V6, SessionHandle, Status, StatusResp,
};
use super::{Hs2Error, Hs2Result};
use crate::models::ConnectionSettings;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Rows requested per `FetchResults` call.
const FETCH_BATCH: usize = 1024;

const POLL_INITIAL: Duration = Duration::from_millis(50);
const POLL_MAX: Duration = Duration::from_secs(1);

/// Encode `<method>_args { 1: request }` as a call message.
pub fn encode_call<T: ThriftEncode>(method: &str, sequence: i32, request: &T) -> Vec<u8> {
    let mut w = ThriftWriter::new();
    w.message_begin(method, MessageType::Call, sequence);
    w.write_struct_field(1, request);
    w.field_stop();
    w.into_bytes()
}

/// Decode `<method>_result { 0: success }` from a reply message.
pub fn decode_reply<T: ThriftDecode>(method: &str, sequence: i32, reply: &[u8]) -> Hs2Result<T> {
    let mut r = ThriftReader::new(reply);
    let header = r.read_message_begin()?;

    if header.message_type == MessageType::Exception {
        let ex = ApplicationException::decode(&mut r)?;
        return Err(Hs2Error::Application {
            message: ex.message,
            kind: ex.kind,
        });
    }
    if header.message_type != MessageType::Reply {
        return Err(Hs2Error::Protocol(format!(
            "expected a reply to {}, got {:?}",
            method, header.message_type
        )));
    }
    if header.name != method {
        return Err(Hs2Error::Protocol(format!(
            "reply for {} received while waiting for {}",
            header.name, method
        )));
    }
    if header.sequence != sequence {
        return Err(Hs2Error::Protocol(format!(
            "out-of-order reply: sequence {} (expected {})",
            header.sequence, sequence
        )));
    }

    let mut success = None;
    loop {
        match r.read_field_begin()? {
            (TType::Stop, _) => break,
            (TType::Struct, 0) => success = Some(T::decode(&mut r)?),
            (other, _) => r.skip(other)?,
        }
    }
    success.ok_or_else(|| Hs2Error::Protocol(format!("{} returned no result", method)))
}

fn check_status(status: &Status, method: &str) -> Hs2Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = status
        .error_message
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{} failed with status code {}", method, status.status_code));
    Err(Hs2Error::Server {
        message,
        sql_state: status.sql_state.clone(),
    })
}

/// Columns and rows produced by one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutput {
    /// Empty when the statement has no result set
    pub columns: Vec<ColumnDesc>,
    pub rows: Vec<Vec<JsonValue>>,
    /// True when rows were dropped to honour the row cap
    pub truncated: bool,
}

impl StatementOutput {
    pub fn has_result_set(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// An open HiveServer2 session.
pub struct Session {
    channel: Box<dyn Channel>,
    handle: Option<SessionHandle>,
    sequence: i32,
    query_timeout: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.handle.is_some())
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Session {
    /// Connect and open a session using `settings`.
    pub async fn open(settings: &ConnectionSettings) -> Hs2Result<Self> {
        let channel = channel::open(settings).await?;
        Self::open_with_channel(channel, settings).await
    }

    /// Open a session over an existing channel.
    pub async fn open_with_channel(
        channel: Box<dyn Channel>,
        settings: &ConnectionSettings,
    ) -> Hs2Result<Self> {
        let mut session = Self {
            channel,
            handle: None,
            sequence: 0,
            query_timeout: settings.query_timeout,
        };

        let mut configuration = BTreeMap::new();
        if let Some(database) = &settings.database {
            configuration.insert("use:database".to_string(), database.clone());
        }
        let request = OpenSessionReq {
            client_protocol: PROTOCOL_V6,
            username: settings.user.clone(),
            password: settings.password.clone(),
            configuration,
        };

        let resp: OpenSessionResp = session.call("OpenSession", &request).await?;
        check_status(&resp.status, "OpenSession")?;
        let handle = resp
            .session_handle
            .ok_or_else(|| Hs2Error::Protocol("OpenSession returned no session handle".to_string()))?;
        info!(
            protocol = resp.server_protocol_version,
            database = settings.database.as_deref().unwrap_or(""),
            "Opened HiveServer2 session"
        );
        session.handle = Some(handle);
        Ok(session)
    }

    async fn call<Req, Resp>(&mut self, method: &str, request: &Req) -> Hs2Result<Resp>
    where
        Req: ThriftEncode + Sync,
        Resp: ThriftDecode,
    {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;
        let reply = self
            .channel
            .round_trip(encode_call(method, sequence, request))
            .await?;
        decode_reply(method, sequence, &reply)
    }

    fn session_handle(&self) -> Hs2Result<SessionHandle> {
        self.handle
            .clone()
            .ok_or_else(|| Hs2Error::Protocol("session is closed".to_string()))
    }

    /// Run `statement`, returning at most `max_rows` rows.
    pub async fn execute(&mut self, statement: &str, max_rows: usize) -> Hs2Result<StatementOutput> {
        let started = Instant::now();
        let request = ExecuteStatementReq {
            session_handle: self.session_handle()?,
            statement: statement.to_string(),
            conf_overlay: BTreeMap::new(),
            run_async: true,
        };
        let resp: ExecuteStatementResp = self.call("ExecuteStatement", &request).await?;
        check_status(&resp.status, "ExecuteStatement")?;
        let operation = resp.operation_handle.ok_or_else(|| {
            Hs2Error::Protocol("ExecuteStatement returned no operation handle".to_string())
        })?;

        let result = self.complete(&operation, max_rows, started).await;

        let close: Hs2Result<StatusResp> = self
            .call(
                "CloseOperation",
                &OperationReq {
                    operation_handle: operation,
                },
            )
            .await;
        match close {
            Ok(resp) if !resp.status.is_success() => {
                warn!(status = resp.status.status_code, "CloseOperation was rejected");
            }
            Err(e) => warn!(error = %e, "CloseOperation failed"),
            Ok(_) => {}
        }

        if let Ok(output) = &result {
            debug!(
                rows = output.rows.len(),
                truncated = output.truncated,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Statement finished"
            );
        }
        result
    }

    async fn complete(
        &mut self,
        operation: &OperationHandle,
        max_rows: usize,
        started: Instant,
    ) -> Hs2Result<StatementOutput> {
        self.wait_until_finished(operation, started).await?;

        if !operation.has_result_set {
            return Ok(StatementOutput::default());
        }

        let metadata: GetResultSetMetadataResp = self
            .call(
                "GetResultSetMetadata",
                &OperationReq {
                    operation_handle: operation.clone(),
                },
            )
            .await?;
        check_status(&metadata.status, "GetResultSetMetadata")?;

        let mut output = StatementOutput {
            columns: metadata.columns,
            ..Default::default()
        };
        self.fetch_rows(operation, max_rows, started, &mut output)
            .await?;
        Ok(output)
    }

    async fn wait_until_finished(
        &mut self,
        operation: &OperationHandle,
        started: Instant,
    ) -> Hs2Result<()> {
        let mut delay = POLL_INITIAL;
        loop {
            let resp: GetOperationStatusResp = self
                .call(
                    "GetOperationStatus",
                    &OperationReq {
                        operation_handle: operation.clone(),
                    },
                )
                .await?;
            check_status(&resp.status, "GetOperationStatus")?;

            let state = resp.operation_state.unwrap_or(OperationState::Unknown);
            match state {
                OperationState::Finished => return Ok(()),
                OperationState::Error => {
                    return Err(Hs2Error::Server {
                        message: resp
                            .error_message
                            .unwrap_or_else(|| "query failed".to_string()),
                        sql_state: resp.sql_state,
                    });
                }
                s if s.is_terminal() => {
                    return Err(Hs2Error::Server {
                        message: format!("query ended in state {:?}", s),
                        sql_state: resp.sql_state,
                    });
                }
                _ => {}
            }

            self.ensure_within_deadline(started, "query execution")?;
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(POLL_MAX);
        }
    }

    async fn fetch_rows(
        &mut self,
        operation: &OperationHandle,
        max_rows: usize,
        started: Instant,
        output: &mut StatementOutput,
    ) -> Hs2Result<()> {
        loop {
            let wanted = fetch_size(max_rows, output.rows.len());
            let resp: FetchResultsResp = self
                .call(
                    "FetchResults",
                    &FetchResultsReq {
                        operation_handle: operation.clone(),
                        orientation: FETCH_NEXT,
                        max_rows: wanted as i64,
                    },
                )
                .await?;
            check_status(&resp.status, "FetchResults")?;

            let batch = resp.results.map(|set| set.rows).unwrap_or_default();
            let batch_len = batch.len();
            output.rows.extend(batch);

            if output.rows.len() > max_rows {
                output.rows.truncate(max_rows);
                output.truncated = true;
                return Ok(());
            }
            if !resp.has_more_rows || (batch_len == 0 && output.rows.len() == max_rows) {
                return Ok(());
            }
            self.ensure_within_deadline(started, "result fetch")?;
        }
    }

    fn ensure_within_deadline(&self, started: Instant, operation: &'static str) -> Hs2Result<()> {
        if started.elapsed() >= self.query_timeout {
            return Err(Hs2Error::Timeout {
                operation,
                secs: self.query_timeout.as_secs(),
            });
        }
        Ok(())
    }

    /// Close the server-side session and the channel.
    pub async fn close(&mut self) -> Hs2Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let result: Hs2Result<StatusResp> = self
            .call(
                "CloseSession",
                &CloseSessionReq {
                    session_handle: handle,
                },
            )
            .await;
        self.channel.shutdown().await;
        let resp = result?;
        check_status(&resp.status, "CloseSession")?;
        info!("Closed HiveServer2 session");
        Ok(())
    }
}

/// Rows to request next. One extra row past the cap tells a capped result
/// apart from an exact fit.
fn fetch_size(max_rows: usize, fetched: usize) -> usize {
    max_rows
        .saturating_add(1)
        .saturating_sub(fetched)
        .min(FETCH_BATCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hs2::messages::{HandleIdentifier, status_code};
    use crate::models::AuthMechanism;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_fetch_size() {
        assert_eq!(fetch_size(10, 0), 11);
        assert_eq!(fetch_size(10, 11), 0);
        assert_eq!(fetch_size(5000, 0), FETCH_BATCH);
        assert_eq!(fetch_size(usize::MAX, 0), FETCH_BATCH);
        assert_eq!(fetch_size(usize::MAX, 3 * FETCH_BATCH), FETCH_BATCH);
    }

    /// Channel replaying canned replies; the recorded method names let tests
    /// assert on the call sequence.
    struct ScriptedChannel {
        replies: VecDeque<Box<dyn Fn(i32) -> Vec<u8> + Send>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        async fn round_trip(&mut self, request: Vec<u8>) -> Hs2Result<Vec<u8>> {
            let header = ThriftReader::new(&request).read_message_begin()?;
            self.calls.lock().unwrap().push(header.name.clone());
            let reply = self
                .replies
                .pop_front()
                .ok_or_else(|| Hs2Error::Protocol(format!("unscripted call {}", header.name)))?;
            Ok(reply(header.sequence))
        }
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            host: "localhost".to_string(),
            port: 21050,
            user: None,
            password: None,
            database: Some("sales".to_string()),
            auth_mechanism: AuthMechanism::Nosasl,
            use_http_transport: false,
            http_path: "cliservice".to_string(),
            use_ssl: false,
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(5),
        }
    }

    fn id() -> HandleIdentifier {
        HandleIdentifier {
            guid: vec![7; 16],
            secret: vec![9; 16],
        }
    }

    fn reply(method: &'static str, body: impl Fn(&mut ThriftWriter) + Send + 'static) -> Box<dyn Fn(i32) -> Vec<u8> + Send> {
        Box::new(move |sequence| {
            let mut w = ThriftWriter::new();
            w.message_begin(method, MessageType::Reply, sequence);
            w.field_begin(TType::Struct, 0);
            body(&mut w);
            w.field_stop();
            w.into_bytes()
        })
    }

    fn status(w: &mut ThriftWriter, code: i32) {
        w.field_begin(TType::Struct, 1);
        w.field_begin(TType::I32, 1);
        w.write_i32(code);
        w.field_stop();
    }

    fn open_session() -> Box<dyn Fn(i32) -> Vec<u8> + Send> {
        reply("OpenSession", |w| {
            status(w, status_code::SUCCESS);
            w.field_begin(TType::I32, 2);
            w.write_i32(PROTOCOL_V6);
            w.write_struct_field(3, &SessionHandle { session_id: id() });
            w.field_stop();
        })
    }

    fn execute(has_result_set: bool) -> Box<dyn Fn(i32) -> Vec<u8> + Send> {
        reply("ExecuteStatement", move |w| {
            status(w, status_code::SUCCESS);
            w.write_struct_field(
                2,
                &OperationHandle {
                    operation_id: id(),
                    operation_type: 0,
                    has_result_set,
                    modified_row_count: None,
                },
            );
            w.field_stop();
        })
    }

    fn operation_state(state: i32, message: Option<&'static str>) -> Box<dyn Fn(i32) -> Vec<u8> + Send> {
        reply("GetOperationStatus", move |w| {
            status(w, status_code::SUCCESS);
            w.field_begin(TType::I32, 2);
            w.write_i32(state);
            if let Some(message) = message {
                w.write_string_field(5, message);
            }
            w.field_stop();
        })
    }

    fn metadata() -> Box<dyn Fn(i32) -> Vec<u8> + Send> {
        reply("GetResultSetMetadata", |w| {
            status(w, status_code::SUCCESS);
            w.field_begin(TType::Struct, 2);
            w.field_begin(TType::List, 1);
            w.list_begin(TType::Struct, 1);
            w.write_string_field(1, "name");
            w.field_begin(TType::I32, 3);
            w.write_i32(1);
            w.field_stop();
            w.field_stop();
            w.field_stop();
        })
    }

    fn fetch(values: &'static [&'static str], has_more: bool) -> Box<dyn Fn(i32) -> Vec<u8> + Send> {
        reply("FetchResults", move |w| {
            status(w, status_code::SUCCESS);
            w.field_begin(TType::Bool, 2);
            w.write_bool(has_more);
            w.field_begin(TType::Struct, 3);
            w.field_begin(TType::I64, 1);
            w.write_i64(0);
            w.field_begin(TType::List, 3);
            w.list_begin(TType::Struct, 1);
            w.field_begin(TType::Struct, 7);
            w.field_begin(TType::List, 1);
            w.list_begin(TType::String, values.len());
            for v in values {
                w.write_string(v);
            }
            w.field_begin(TType::String, 2);
            w.write_binary(&[]);
            w.field_stop();
            w.field_stop();
            w.field_stop();
            w.field_stop();
        })
    }

    fn close_operation() -> Box<dyn Fn(i32) -> Vec<u8> + Send> {
        reply("CloseOperation", |w| {
            status(w, status_code::SUCCESS);
            w.field_stop();
        })
    }

    async fn session_with(
        replies: Vec<Box<dyn Fn(i32) -> Vec<u8> + Send>>,
    ) -> (Session, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut all = VecDeque::from(vec![open_session()]);
        all.extend(replies);
        let channel = ScriptedChannel {
            replies: all,
            calls: calls.clone(),
        };
        let session = Session::open_with_channel(Box::new(channel), &settings())
            .await
            .unwrap();
        (session, calls)
    }

    #[test]
    fn test_decode_reply_maps_exception() {
        let mut w = ThriftWriter::new();
        w.message_begin("ExecuteStatement", MessageType::Exception, 1);
        w.write_string_field(1, "Invalid method name");
        w.field_begin(TType::I32, 2);
        w.write_i32(1);
        w.field_stop();
        let bytes = w.into_bytes();

        let err = decode_reply::<StatusResp>("ExecuteStatement", 1, &bytes).unwrap_err();
        match err {
            Hs2Error::Application { message, kind } => {
                assert_eq!(message, "Invalid method name");
                assert_eq!(kind, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_reply_rejects_wrong_sequence() {
        let bytes = close_operation()(4);
        let err = decode_reply::<StatusResp>("CloseOperation", 5, &bytes).unwrap_err();
        assert!(matches!(err, Hs2Error::Protocol(_)));
    }

    #[test]
    fn test_decode_reply_rejects_wrong_method() {
        let bytes = close_operation()(1);
        let err = decode_reply::<StatusResp>("CloseSession", 1, &bytes).unwrap_err();
        assert!(matches!(err, Hs2Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_query_with_result_set() {
        let (mut session, calls) = session_with(vec![
            execute(true),
            operation_state(1, None),
            operation_state(2, None),
            metadata(),
            fetch(&["a", "b"], true),
            fetch(&["c"], false),
            close_operation(),
        ])
        .await;

        let output = session.execute("SHOW DATABASES", 100).await.unwrap();
        assert!(output.has_result_set());
        assert_eq!(output.columns[0].name, "name");
        assert_eq!(output.rows, vec![vec![json!("a")], vec![json!("b")], vec![json!("c")]]);
        assert!(!output.truncated);
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            [
                "OpenSession",
                "ExecuteStatement",
                "GetOperationStatus",
                "GetOperationStatus",
                "GetResultSetMetadata",
                "FetchResults",
                "FetchResults",
                "CloseOperation",
            ]
        );
    }

    #[tokio::test]
    async fn test_row_cap_sets_truncated() {
        let (mut session, _) = session_with(vec![
            execute(true),
            operation_state(2, None),
            metadata(),
            fetch(&["a", "b", "c"], true),
            close_operation(),
        ])
        .await;

        let output = session.execute("SELECT name FROM t", 2).await.unwrap();
        assert_eq!(output.rows.len(), 2);
        assert!(output.truncated);
    }

    #[tokio::test]
    async fn test_statement_without_result_set() {
        let (mut session, calls) = session_with(vec![
            execute(false),
            operation_state(2, None),
            close_operation(),
        ])
        .await;

        let output = session.execute("USE sales", 100).await.unwrap();
        assert!(!output.has_result_set());
        assert!(calls.lock().unwrap().iter().all(|c| c != "FetchResults"));
    }

    #[tokio::test]
    async fn test_error_state_surfaces_server_message_and_closes_operation() {
        let (mut session, calls) = session_with(vec![
            execute(true),
            operation_state(5, Some("AnalysisException: Could not resolve table reference")),
            close_operation(),
        ])
        .await;

        let err = session.execute("SELECT * FROM missing", 10).await.unwrap_err();
        assert!(err.to_string().contains("Could not resolve table reference"));
        assert_eq!(calls.lock().unwrap().last().map(String::as_str), Some("CloseOperation"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut session, calls) = session_with(vec![reply("CloseSession", |w| {
            status(w, status_code::SUCCESS);
            w.field_stop();
        })])
        .await;

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert!(session.execute("SELECT 1", 1).await.is_err());
    }
}
