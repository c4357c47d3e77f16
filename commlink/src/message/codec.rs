/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Wire encodings for [`Message`].
//!
//! Two formats are supported and both round-trip every message exactly:
//!
//! ```text
//! Json     {"from":"a","to":"b","id":3,"kind":"call","func":"run","arg":{...}}
//! Compact  call:a/b/3:run:{...}
//!          ack:b/a/0:ping
//!          ping:a/b/0
//! ```
//!
//! In the compact form, `%`, `:` and `/` inside names are percent-escaped so
//! the delimiters stay unambiguous. The JSON payload is always the last
//! segment and is written verbatim.
//!
//! Nothing outside this module builds or parses wire strings.

use serde_json::Value;

use super::{Body, Headers, Kind, Message};
use crate::common::{CommLinkError, Result};

/// Selects a wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// The whole message as one JSON object.
    #[default]
    Json,
    /// Colon/slash delimited text with a trailing JSON payload.
    Compact,
}

/// Serializes `message` as JSON.
pub fn pack(message: &Message) -> Result<String> {
    pack_with(message, Format::Json)
}

/// Parses a JSON wire string.
pub fn unpack(wire: &str) -> Result<Message> {
    unpack_with(wire, Format::Json)
}

/// Serializes `message` in the given format.
pub fn pack_with(message: &Message, format: Format) -> Result<String> {
    match format {
        Format::Json => serde_json::to_string(message).map_err(CommLinkError::from),
        Format::Compact => pack_compact(message),
    }
}

/// Parses a wire string in the given format.
pub fn unpack_with(wire: &str, format: Format) -> Result<Message> {
    match format {
        Format::Json => serde_json::from_str(wire).map_err(CommLinkError::from),
        Format::Compact => unpack_compact(wire),
    }
}

fn pack_compact(message: &Message) -> Result<String> {
    let Headers { from, to, id } = &message.headers;
    let mut wire = format!(
        "{}:{}/{}/{}",
        message.kind(),
        escape(from),
        escape(to),
        id
    );
    match &message.body {
        Body::Ping | Body::Quit => {}
        Body::Ack { subk } => {
            wire.push(':');
            wire.push_str(subk.as_str());
        }
        Body::Call { func, arg: payload }
        | Body::CYield {
            func,
            value: payload,
        }
        | Body::CReturn {
            func,
            value: payload,
        } => {
            wire.push(':');
            wire.push_str(&escape(func));
            wire.push(':');
            wire.push_str(&serde_json::to_string(payload)?);
        }
    }
    Ok(wire)
}

fn unpack_compact(wire: &str) -> Result<Message> {
    let mut segments = wire.splitn(3, ':');
    let kind_name = segments.next().unwrap_or_default();
    let kind = Kind::parse(kind_name)
        .ok_or_else(|| CommLinkError::Codec(format!("unknown kind {kind_name:?}")))?;
    let address = segments
        .next()
        .ok_or_else(|| CommLinkError::Codec("missing address segment".to_string()))?;
    let rest = segments.next();

    let mut parts = address.split('/');
    let (Some(from), Some(to), Some(id), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CommLinkError::Codec(format!(
            "address {address:?} is not from/to/id"
        )));
    };
    let id = id
        .parse::<u64>()
        .map_err(|e| CommLinkError::Codec(format!("bad id {id:?}: {e}")))?;
    let headers = Headers::new(unescape(from)?, unescape(to)?, id);

    let body = match kind {
        Kind::Ping | Kind::Quit => {
            if rest.is_some() {
                return Err(CommLinkError::Codec(format!(
                    "trailing data after {kind} message"
                )));
            }
            if kind == Kind::Ping {
                Body::Ping
            } else {
                Body::Quit
            }
        }
        Kind::Ack => {
            let subk = rest
                .ok_or_else(|| CommLinkError::Codec("ack without subkind".to_string()))?;
            let subk = Kind::parse(subk)
                .ok_or_else(|| CommLinkError::Codec(format!("unknown subkind {subk:?}")))?;
            Body::Ack { subk }
        }
        Kind::Call | Kind::CYield | Kind::CReturn => {
            let rest = rest.ok_or_else(|| {
                CommLinkError::Codec(format!("{kind} message without function"))
            })?;
            let (func, payload) = rest.split_once(':').ok_or_else(|| {
                CommLinkError::Codec(format!("{kind} message without payload"))
            })?;
            let func = unescape(func)?;
            let payload: Value = serde_json::from_str(payload)?;
            match kind {
                Kind::Call => Body::Call { func, arg: payload },
                Kind::CYield => Body::CYield {
                    func,
                    value: payload,
                },
                _ => Body::CReturn {
                    func,
                    value: payload,
                },
            }
        }
    };

    Ok(Message { headers, body })
}

fn escape(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '/' => escaped.push_str("%2F"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn unescape(field: &str) -> Result<String> {
    let mut unescaped = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(pos) = rest.find('%') {
        unescaped.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3).ok_or_else(|| {
            CommLinkError::Codec(format!("truncated escape in {field:?}"))
        })?;
        unescaped.push(match code {
            "25" => '%',
            "3A" => ':',
            "2F" => '/',
            _ => {
                return Err(CommLinkError::Codec(format!(
                    "unknown escape %{code} in {field:?}"
                )))
            }
        });
        rest = &rest[pos + 3..];
    }
    unescaped.push_str(rest);
    Ok(unescaped)
}
