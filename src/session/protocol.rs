//! Wire protocol: client commands in, server events out.
//!
//! Commands are parsed by hand against a loosely-typed JSON object rather
//! than a `#[serde(tag = ...)]` enum so that a missing field reports exactly
//! which field is missing instead of a generic deserialize error.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenFile { path: String, handle: String },
    CloseFile { handle: String },
    WriteFile {
        handle: String,
        last_content: String,
        new_content: String,
    },
    Commit { message: String },
}

pub fn parse_command(raw: &str) -> Result<Command> {
    let value: Value = serde_json::from_str(raw)?;
    let obj = value
        .as_object()
        .ok_or_else(|| Error::UnknownCommand("<non-object message>".to_string()))?;

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(Error::MissingField("type"))?;

    match kind {
        "open_file" => Ok(Command::OpenFile {
            path: field_str(obj, "path")?,
            handle: field_str(obj, "handle")?,
        }),
        "close_file" => Ok(Command::CloseFile {
            handle: field_str(obj, "handle")?,
        }),
        "write_file" => Ok(Command::WriteFile {
            handle: field_str(obj, "handle")?,
            last_content: field_str(obj, "last_content")?,
            new_content: field_str(obj, "new_content")?,
        }),
        "commit" => Ok(Command::Commit {
            message: field_str(obj, "message")?,
        }),
        other => Err(Error::UnknownCommand(other.to_string())),
    }
}

fn field_str(obj: &Map<String, Value>, key: &'static str) -> Result<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(Error::MissingField(key))
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "file_opened")]
    FileOpened {
        path: String,
        handle: String,
        content: String,
    },
    #[serde(rename = "file_closed")]
    FileClosed { handle: String },
    #[serde(rename = "file_written")]
    FileWritten { handle: String, content: String },
    #[serde(rename = "file_updated")]
    FileUpdated { handle: String, content: String },
    #[serde(rename = "committed")]
    Committed {},
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}
