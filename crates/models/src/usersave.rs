//! The `UserSave` document and its JSON codec.
//!
//! All money is carried as integer minor units (`cents`), never floats.
//! Decoding is strict: unknown fields, missing required fields, negative
//! amounts and trailing garbage all fail.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::CodecError;

/// Budgeting period label, e.g. `"Fortnightly"`.
pub type Cycle = String;

/// An amount of money in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Currency {
    pub cents: u64,
}

impl Currency {
    pub const fn from_cents(cents: u64) -> Self {
        Self { cents }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expense {
    pub name: String,
    pub amount: Currency,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Savings {
    pub name: String,
    pub goal: Currency,
    pub amount: Currency,
    pub deadline: i64,
    #[serde(default)]
    pub order: u32,
}

/// One user's budget state. Stored whole; there is no partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UserSave {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Cycle>,
    pub income: Currency,
    pub savings_amount: Currency,
    pub savings: Vec<Savings>,
    pub expenses: Vec<Expense>,
}

/// Reads `reader` to the end and decodes a single `UserSave` from it.
pub async fn decode<R>(mut reader: R) -> Result<UserSave, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.map_err(CodecError::Read)?;
    from_slice(&buf)
}

pub fn from_slice(bytes: &[u8]) -> Result<UserSave, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

/// Canonical byte form: compact JSON followed by a newline.
pub fn to_vec(save: &UserSave) -> Result<Vec<u8>, CodecError> {
    let mut out = serde_json::to_vec(save).map_err(CodecError::Encode)?;
    out.push(b'\n');
    Ok(out)
}

/// Writes the canonical form of `save` into `writer` and flushes it.
pub async fn encode<W>(save: &UserSave, writer: &mut W) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = to_vec(save)?;
    writer.write_all(&bytes).await.map_err(CodecError::Write)?;
    writer.flush().await.map_err(CodecError::Write)
}
