//! backend::xmlrpc::wire
//!
//! Minimal XML-RPC envelope writer and response parser.
//!
//! Covers exactly the subset of XML-RPC that Patchwork's API speaks:
//! scalar types (`int`/`i4`, `boolean`, `string`, `double`,
//! `dateTime.iso8601`, `base64`), `struct`, `array`, and `fault`
//! responses. Anything else is a [`WireError::Malformed`].

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Double(f64),
    Base64(Vec<u8>),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// String content, decoding `<base64>` payloads as UTF-8.
    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Base64(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    /// Integer content, accepting string-typed digits.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Boolean content, accepting 0/1 integers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    /// Struct members.
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Array elements.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// A `<fault>` returned by the server.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("fault {code}: {message}")]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

/// Errors from response parsing.
#[derive(Debug, Clone, Error)]
pub enum WireError {
    /// The server returned a well-formed fault response.
    #[error(transparent)]
    Fault(Fault),

    /// The response could not be parsed as XML-RPC.
    #[error("malformed XML-RPC response: {0}")]
    Malformed(String),
}

/// Serialize a `methodCall` envelope.
pub fn method_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\"?>\n<methodCall>\n<methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName>\n<params>\n");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>\n");
    }
    out.push_str("</params>\n</methodCall>\n");
    out
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(n) => {
            out.push_str("<int>");
            out.push_str(&n.to_string());
            out.push_str("</int>");
        }
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push(if *b { '1' } else { '0' });
            out.push_str("</boolean>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        Value::Double(d) => {
            out.push_str("<double>");
            out.push_str(&d.to_string());
            out.push_str("</double>");
        }
        Value::Base64(bytes) => {
            out.push_str("<base64>");
            out.push_str(&BASE64.encode(bytes));
            out.push_str("</base64>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

/// Parse a `methodResponse` body into its single return value.
///
/// # Errors
///
/// [`WireError::Fault`] for a fault response, [`WireError::Malformed`]
/// for anything that is not a valid response envelope.
pub fn parse_response(body: &str) -> Result<Value, WireError> {
    let mut cursor = Cursor::new(body);
    cursor.skip_prolog();
    cursor.expect_open("methodResponse")?;

    if cursor.try_open("fault") {
        let value = cursor.parse_value()?;
        cursor.expect_close("fault")?;
        cursor.expect_close("methodResponse")?;
        let members = value
            .as_struct()
            .ok_or_else(|| WireError::Malformed("fault without struct".to_string()))?;
        let code = members
            .get("faultCode")
            .and_then(Value::as_int)
            .unwrap_or_default();
        let message = members
            .get("faultString")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        return Err(WireError::Fault(Fault { code, message }));
    }

    cursor.expect_open("params")?;
    cursor.expect_open("param")?;
    let value = cursor.parse_value()?;
    cursor.expect_close("param")?;
    cursor.expect_close("params")?;
    cursor.expect_close("methodResponse")?;
    Ok(value)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        let known = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ];
        match known.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// A hand-rolled pull parser over the response text.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn skip_prolog(&mut self) {
        self.skip_ws();
        if self.rest().starts_with("<?") {
            if let Some(end) = self.rest().find("?>") {
                self.pos += end + 2;
            }
        }
        self.skip_ws();
    }

    /// Consume `<tag>` if it is next; leaves the cursor untouched otherwise.
    fn try_open(&mut self, tag: &str) -> bool {
        self.skip_ws();
        let probe = format!("<{tag}>");
        if self.rest().starts_with(&probe) {
            self.pos += probe.len();
            true
        } else {
            false
        }
    }

    fn expect_open(&mut self, tag: &str) -> Result<(), WireError> {
        if self.try_open(tag) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("<{tag}>")))
        }
    }

    fn expect_close(&mut self, tag: &str) -> Result<(), WireError> {
        self.skip_ws();
        let probe = format!("</{tag}>");
        if self.rest().starts_with(&probe) {
            self.pos += probe.len();
            Ok(())
        } else {
            Err(self.unexpected(&probe))
        }
    }

    /// Text content up to the next tag, unescaped.
    fn take_text(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest.find('<').unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn unexpected(&self, wanted: &str) -> WireError {
        let got: String = self.rest().chars().take(40).collect();
        WireError::Malformed(format!("expected {wanted}, got '{got}'"))
    }

    fn parse_value(&mut self) -> Result<Value, WireError> {
        self.expect_open("value")?;

        // An untyped <value>text</value> is a string.
        self.skip_ws();
        if !self.rest().starts_with('<') || self.rest().starts_with("</value>") {
            let text = unescape(self.take_text());
            self.expect_close("value")?;
            return Ok(Value::Str(text.trim().to_string()));
        }

        let value = if self.try_open("int") {
            self.scalar("int", |text| {
                text.trim().parse().ok().map(Value::Int)
            })?
        } else if self.try_open("i4") {
            self.scalar("i4", |text| text.trim().parse().ok().map(Value::Int))?
        } else if self.try_open("boolean") {
            self.scalar("boolean", |text| match text.trim() {
                "1" => Some(Value::Bool(true)),
                "0" => Some(Value::Bool(false)),
                _ => None,
            })?
        } else if self.try_open("double") {
            self.scalar("double", |text| {
                text.trim().parse().ok().map(Value::Double)
            })?
        } else if self.try_open("string") {
            let text = unescape(self.take_text());
            self.expect_close("string")?;
            Value::Str(text)
        } else if self.try_open("dateTime.iso8601") {
            let text = self.take_text().trim().to_string();
            self.expect_close("dateTime.iso8601")?;
            Value::Str(text)
        } else if self.try_open("base64") {
            let text: String = self
                .take_text()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            self.expect_close("base64")?;
            let bytes = BASE64
                .decode(text.as_bytes())
                .map_err(|err| WireError::Malformed(format!("bad base64: {err}")))?;
            Value::Base64(bytes)
        } else if self.try_open("array") {
            self.expect_open("data")?;
            let mut items = Vec::new();
            loop {
                self.skip_ws();
                if self.rest().starts_with("</data>") {
                    break;
                }
                items.push(self.parse_value()?);
            }
            self.expect_close("data")?;
            self.expect_close("array")?;
            Value::Array(items)
        } else if self.try_open("struct") {
            let mut members = BTreeMap::new();
            loop {
                self.skip_ws();
                if self.rest().starts_with("</struct>") {
                    break;
                }
                self.expect_open("member")?;
                self.expect_open("name")?;
                let name = unescape(self.take_text());
                self.expect_close("name")?;
                let value = self.parse_value()?;
                self.expect_close("member")?;
                members.insert(name, value);
            }
            self.expect_close("struct")?;
            Value::Struct(members)
        } else {
            return Err(self.unexpected("a value type tag"));
        };

        self.expect_close("value")?;
        Ok(value)
    }

    fn scalar(
        &mut self,
        tag: &str,
        convert: impl Fn(&str) -> Option<Value>,
    ) -> Result<Value, WireError> {
        let text = self.take_text().to_string();
        self.expect_close(tag)?;
        convert(&text).ok_or_else(|| WireError::Malformed(format!("bad <{tag}> content: '{text}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(inner: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<methodResponse><params><param>{inner}</param></params></methodResponse>"
        )
    }

    #[test]
    fn parse_int_and_string() {
        let value = parse_response(&response("<value><int>42</int></value>")).unwrap();
        assert_eq!(value, Value::Int(42));

        let value =
            parse_response(&response("<value><string>hello &amp; bye</string></value>")).unwrap();
        assert_eq!(value, Value::Str("hello & bye".to_string()));
    }

    #[test]
    fn parse_untyped_value_is_string() {
        let value = parse_response(&response("<value>plain</value>")).unwrap();
        assert_eq!(value, Value::Str("plain".to_string()));
    }

    #[test]
    fn parse_empty_struct() {
        let value = parse_response(&response("<value><struct></struct></value>")).unwrap();
        assert_eq!(value, Value::Struct(BTreeMap::new()));
    }

    #[test]
    fn parse_struct_and_array() {
        let inner = "<value><array><data>\
            <value><struct>\
            <member><name>id</name><value><int>7</int></value></member>\
            <member><name>name</name><value><string>fix</string></value></member>\
            </struct></value>\
            </data></array></value>";
        let value = parse_response(&response(inner)).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 1);
        let members = items[0].as_struct().unwrap();
        assert_eq!(members["id"], Value::Int(7));
        assert_eq!(members["name"], Value::Str("fix".to_string()));
    }

    #[test]
    fn parse_base64_decodes() {
        let value =
            parse_response(&response("<value><base64>aGVsbG8=</base64></value>")).unwrap();
        assert_eq!(value, Value::Base64(b"hello".to_vec()));
        assert_eq!(value.as_str().as_deref(), Some("hello"));
    }

    #[test]
    fn parse_boolean() {
        let value = parse_response(&response("<value><boolean>1</boolean></value>")).unwrap();
        assert_eq!(value.as_bool(), Some(true));
    }

    #[test]
    fn parse_fault() {
        let body = "<?xml version=\"1.0\"?>\n<methodResponse><fault><value><struct>\
            <member><name>faultCode</name><value><int>403</int></value></member>\
            <member><name>faultString</name><value><string>no dice</string></value></member>\
            </struct></value></fault></methodResponse>";
        match parse_response(body) {
            Err(WireError::Fault(fault)) => {
                assert_eq!(fault.code, 403);
                assert_eq!(fault.message, "no dice");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn parse_garbage_is_malformed() {
        assert!(matches!(
            parse_response("this is not xml"),
            Err(WireError::Malformed(_))
        ));
        assert!(matches!(
            parse_response(&response("<value><int>forty</int></value>")),
            Err(WireError::Malformed(_))
        ));
    }

    #[test]
    fn method_call_escapes_content() {
        let body = method_call("patch_get", &[Value::Str("a <b> & c".to_string())]);
        assert!(body.contains("<methodName>patch_get</methodName>"));
        assert!(body.contains("a &lt;b&gt; &amp; c"));
    }

    #[test]
    fn method_call_round_trips_through_parser_shapes() {
        // Serialize a struct param and check the tag nesting is coherent.
        let mut members = BTreeMap::new();
        members.insert("state_id".to_string(), Value::Int(2));
        members.insert("archived".to_string(), Value::Bool(false));
        let body = method_call("patch_list", &[Value::Struct(members)]);
        assert!(body.contains("<member><name>archived</name><value><boolean>0</boolean></value></member>"));
        assert!(body.contains("<member><name>state_id</name><value><int>2</int></value></member>"));
    }

    #[test]
    fn unescape_handles_bare_ampersand() {
        assert_eq!(unescape("a & b &lt;"), "a & b <");
    }
}
