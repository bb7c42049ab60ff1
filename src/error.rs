use thiserror::Error;

use crate::esm::{EsmError, FourCc, RecordKind};

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("Unknown record kind {tag}")]
    UnknownRecord { tag: FourCc },
    #[error("Dynamic record id '{id}' is already in use")]
    DynamicIdCollision { id: String },
    #[error("Cannot pick a default class: no class records are loaded")]
    EmptyClassList,
    #[error("{kind} record '{id}' not found")]
    NotFound { kind: RecordKind, id: String },
    #[error("Player record is missing or has no race or class")]
    InvalidPlayer,
    #[error("Row {index} is out of range for a list of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Invalid Lua script configuration on line {line}: {message}")]
    LuaConfig { line: usize, message: String },
    #[error("Content file error")]
    Esm(#[from] EsmError),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
}
