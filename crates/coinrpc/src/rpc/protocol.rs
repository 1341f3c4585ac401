//! JSON-RPC envelope encoding and decoding.
//!
//! Everything here is pure: bytes in, typed envelopes out.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{CoreError, RpcError};

/// Version tag written into every request.
pub const JSONRPC_VERSION: &str = "2.0";

// ==============================================================================
// Params
// ==============================================================================

/// Request parameters, kept in whichever form the caller supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    /// Serialized as an empty array.
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Params {
    /// Convert each argument to JSON, failing with `Encoding` on values that
    /// have no JSON representation.
    pub fn positional<T, I>(args: I) -> Result<Self, CoreError>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        args.into_iter()
            .map(|arg| serde_json::to_value(arg).map_err(encoding_error))
            .collect::<Result<Vec<_>, _>>()
            .map(Params::Positional)
    }

    pub fn named<K, T, I>(args: I) -> Result<Self, CoreError>
    where
        K: Into<String>,
        T: Serialize,
        I: IntoIterator<Item = (K, T)>,
    {
        let mut map = Map::new();
        for (key, arg) in args {
            map.insert(key.into(), serde_json::to_value(arg).map_err(encoding_error)?);
        }
        Ok(Params::Named(map))
    }

    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(args) => args.len(),
            Params::Named(args) => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Params::None => serializer.serialize_seq(Some(0))?.end(),
            Params::Positional(args) => {
                let mut seq = serializer.serialize_seq(Some(args.len()))?;
                for arg in args {
                    seq.serialize_element(arg)?;
                }
                seq.end()
            }
            Params::Named(args) => {
                let mut map = serializer.serialize_map(Some(args.len()))?;
                for (key, arg) in args {
                    map.serialize_entry(key, arg)?;
                }
                map.end()
            }
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(args: Vec<Value>) -> Self {
        Params::Positional(args)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(args: Map<String, Value>) -> Self {
        Params::Named(args)
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

// ==============================================================================
// Requests
// ==============================================================================

/// One method call inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub params: Params,
}

impl Call {
    pub fn new(method: impl Into<String>, params: impl Into<Params>) -> Self {
        Self {
            method: method.into(),
            params: params.into(),
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Params,
}

impl<'a> Request<'a> {
    fn new(method: &'a str, params: &'a Params, id: u64) -> Result<Self, CoreError> {
        if method.is_empty() {
            return Err(CoreError::Encoding("method name must not be empty".to_owned()));
        }
        Ok(Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        })
    }
}

pub fn encode(method: &str, params: &Params, id: u64) -> Result<Vec<u8>, CoreError> {
    let request = Request::new(method, params, id)?;
    serde_json::to_vec(&request).map_err(encoding_error)
}

/// Encode `calls` as one JSON array, assigning ids `start_id..`.
pub fn encode_batch(calls: &[Call], start_id: u64) -> Result<Vec<u8>, CoreError> {
    let requests = calls
        .iter()
        .enumerate()
        .map(|(offset, call)| Request::new(&call.method, &call.params, start_id + offset as u64))
        .collect::<Result<Vec<_>, _>>()?;
    serde_json::to_vec(&requests).map_err(encoding_error)
}

fn encoding_error(err: serde_json::Error) -> CoreError {
    CoreError::Encoding(err.to_string())
}

// ==============================================================================
// Responses
// ==============================================================================

/// A decoded response. `outcome` holds exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub id: Value,
    pub outcome: Result<Value, RpcError>,
}

impl ResponseEnvelope {
    /// Whether this response answers the request with `id`.
    pub fn matches(&self, id: u64) -> bool {
        parse_id(&self.id).is_ok_and(|found| found == id)
    }
}

pub fn decode(bytes: &[u8]) -> Result<ResponseEnvelope, CoreError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        CoreError::Decoding(format!(
            "invalid JSON: {e}; body={}",
            String::from_utf8_lossy(bytes)
        ))
    })?;
    decode_value(value)
}

/// Decode a batch reply. A daemon that rejects the whole batch answers with
/// a single error object, which is surfaced as that error.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<ResponseEnvelope>, CoreError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        CoreError::Decoding(format!(
            "invalid JSON: {e}; body={}",
            String::from_utf8_lossy(bytes)
        ))
    })?;
    match value {
        Value::Array(items) => items.into_iter().map(decode_value).collect(),
        Value::Object(_) => match decode_value(value)?.outcome {
            Err(err) => Err(CoreError::Rpc(err)),
            Ok(_) => Err(CoreError::Decoding(
                "expected an array in reply to a batch request".to_owned(),
            )),
        },
        other => Err(CoreError::Decoding(format!(
            "expected an array in reply to a batch request, got {other}"
        ))),
    }
}

fn decode_value(value: Value) -> Result<ResponseEnvelope, CoreError> {
    let Value::Object(mut fields) = value else {
        return Err(CoreError::Decoding(format!(
            "expected a JSON object, got {value}"
        )));
    };
    let id = fields
        .remove("id")
        .ok_or_else(|| CoreError::Decoding("response has no `id` field".to_owned()))?;

    // Bitcoin Core always emits both keys and sets the unused one to null.
    let result = fields.remove("result");
    let error = fields.remove("error").filter(|err| !err.is_null());

    let outcome = match (result, error) {
        (None, None) => {
            return Err(CoreError::Decoding(format!(
                "response {id} has neither `result` nor `error`"
            )))
        }
        (Some(result), Some(_)) if !result.is_null() => {
            return Err(CoreError::Protocol(format!(
                "response {id} carries both `result` and `error`"
            )))
        }
        (_, Some(error)) => Err(parse_jsonrpc_error(error)?),
        (Some(result), None) => Ok(result),
    };

    Ok(ResponseEnvelope { id, outcome })
}

/// Parse a JSON-RPC error value of the shape `{"code": <int>, "message": <string>}`.
fn parse_jsonrpc_error(err: Value) -> Result<RpcError, CoreError> {
    #[derive(serde::Deserialize)]
    struct JsonRpcError {
        code: i64,
        message: String,
    }

    serde_json::from_value::<JsonRpcError>(err.clone())
        .map(|parsed| RpcError::new(parsed.code, parsed.message))
        .map_err(|_| CoreError::Decoding(format!("non-standard JSON-RPC error: {err}")))
}

/// Read a response id. Some daemons and proxies echo numeric ids as strings.
pub fn parse_id(id: &Value) -> Result<u64, CoreError> {
    if let Some(n) = id.as_u64() {
        return Ok(n);
    }

    if let Some(s) = id.as_str() {
        return s
            .parse::<u64>()
            .map_err(|e| CoreError::Protocol(format!("invalid response id string `{s}`: {e}")));
    }

    Err(CoreError::Protocol(format!("invalid response id: {id}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Unrepresentable;

    impl Serialize for Unrepresentable {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("open file handles have no JSON form"))
        }
    }

    fn encoded(method: &str, params: &Params, id: u64) -> Value {
        let bytes = encode(method, params, id).expect("request must encode");
        serde_json::from_slice(&bytes).expect("encoded request must be JSON")
    }

    #[test]
    fn encode_writes_full_envelope() {
        let params = Params::positional([json!("00ab"), json!(true)]).expect("params");
        assert_eq!(
            encoded("getblockheader", &params, 7),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "getblockheader",
                "params": ["00ab", true],
            })
        );
    }

    #[test]
    fn encode_empty_params_as_array() {
        let request = encoded("getblockcount", &Params::None, 1);
        assert_eq!(request["params"], json!([]));
    }

    #[test]
    fn encode_preserves_named_params() {
        let params = Params::named([("height", json!(100)), ("verbose", json!(false))])
            .expect("params");
        let request = encoded("getblockhash", &params, 2);
        assert_eq!(request["params"], json!({"height": 100, "verbose": false}));
    }

    #[test]
    fn encode_rejects_empty_method() {
        let err = encode("", &Params::None, 1).expect_err("empty method must fail");
        assert!(matches!(err, CoreError::Encoding(_)));
    }

    #[test]
    fn unrepresentable_param_is_encoding_error() {
        let err = Params::positional([Unrepresentable]).expect_err("must fail");
        assert!(matches!(err, CoreError::Encoding(msg) if msg.contains("no JSON form")));
    }

    #[test]
    fn encode_batch_assigns_consecutive_ids() {
        let calls = vec![
            Call::new("getblockcount", ()),
            Call::new("getblockhash", vec![json!(5)]),
        ];
        let bytes = encode_batch(&calls, 40).expect("batch must encode");
        let value: Value = serde_json::from_slice(&bytes).expect("JSON");
        assert_eq!(value[0]["id"], json!(40));
        assert_eq!(value[1]["id"], json!(41));
        assert_eq!(value[1]["params"], json!([5]));
    }

    #[test]
    fn daemon_echo_round_trips_method_and_params() {
        let params = Params::named([("txid", json!("ff00")), ("verbose", json!(true))])
            .expect("params");
        let request = encoded("getrawtransaction", &params, 9);

        // A daemon that echoes the request back as its result.
        let echo = json!({
            "id": request["id"],
            "result": {"method": request["method"], "params": request["params"]},
            "error": null,
        });
        let envelope = decode(echo.to_string().as_bytes()).expect("echo must decode");
        assert!(envelope.matches(9));
        let result = envelope.outcome.expect("echo carries a result");
        assert_eq!(result["method"], json!("getrawtransaction"));
        assert_eq!(result["params"], json!({"txid": "ff00", "verbose": true}));
    }

    #[test]
    fn decode_bitcoin_core_error_shape() {
        let body = br#"{"result":null,"error":{"code":-32601,"message":"Method not found"},"id":3}"#;
        let envelope = decode(body).expect("must decode");
        assert_eq!(
            envelope.outcome,
            Err(RpcError::new(-32601, "Method not found"))
        );
    }

    #[test]
    fn decode_null_result_is_success() {
        let envelope = decode(br#"{"result":null,"error":null,"id":1}"#).expect("must decode");
        assert_eq!(envelope.outcome, Ok(Value::Null));
    }

    #[test]
    fn decode_rejects_missing_id() {
        let err = decode(br#"{"result":1}"#).expect_err("must fail");
        assert!(matches!(err, CoreError::Decoding(_)));
    }

    #[test]
    fn decode_rejects_missing_result_and_error() {
        let err = decode(br#"{"id":1}"#).expect_err("must fail");
        assert!(matches!(err, CoreError::Decoding(_)));
    }

    #[test]
    fn decode_rejects_result_and_error_together() {
        let body = br#"{"id":1,"result":5,"error":{"code":-1,"message":"boom"}}"#;
        let err = decode(body).expect_err("must fail");
        assert!(matches!(err, CoreError::Protocol(_)));
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = decode(b"<html>502 Bad Gateway</html>").expect_err("must fail");
        assert!(matches!(err, CoreError::Decoding(msg) if msg.contains("Bad Gateway")));
    }

    #[test]
    fn decode_rejects_non_standard_error() {
        let err = decode(br#"{"id":1,"error":"oops"}"#).expect_err("must fail");
        assert!(matches!(err, CoreError::Decoding(msg) if msg.contains("non-standard")));
    }

    #[test]
    fn decode_batch_surfaces_whole_batch_rejection() {
        let body = br#"{"id":null,"result":null,"error":{"code":-32700,"message":"Parse error"}}"#;
        let err = decode_batch(body).expect_err("must fail");
        assert_eq!(err.rpc_code(), Some(RpcError::PARSE_ERROR));
    }

    #[test]
    fn parse_id_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_id(&json!(42)).expect("should parse"), 42);
        assert_eq!(parse_id(&json!("123")).expect("should parse"), 123);
        assert!(parse_id(&json!(true)).is_err());
        assert!(parse_id(&Value::Null).is_err());
    }
}
