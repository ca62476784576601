//! Conversion of captured values into BSON.

use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use hostlink_common::error::{HostlinkError, Result};
use hostlink_common::types::{ApiEvent, ArgValue};

/// Encodes an integer as int32 when it fits, int64 otherwise.
#[must_use]
pub fn int_bson(v: i64) -> Bson {
    i32::try_from(v).map_or(Bson::Int64(v), Bson::Int32)
}

/// Encodes an unsigned integer.
///
/// # Errors
///
/// Returns [`HostlinkError::Encoding`] for values above `i64::MAX`; BSON has
/// no unsigned 64-bit integer type.
pub fn uint_bson(v: u64) -> Result<Bson> {
    i64::try_from(v)
        .map(int_bson)
        .map_err(|_| HostlinkError::encoding(format!("unsigned value {v} exceeds int64 range")))
}

/// Encodes a single captured value.
///
/// # Errors
///
/// Returns [`HostlinkError::Encoding`] if the value has no BSON representation.
pub fn encode_value(value: &ArgValue) -> Result<Bson> {
    Ok(match value {
        ArgValue::Null => Bson::Null,
        ArgValue::Bool(b) => Bson::Boolean(*b),
        ArgValue::Int(i) => int_bson(*i),
        ArgValue::UInt(u) => uint_bson(*u)?,
        ArgValue::Str(s) => Bson::String(s.clone()),
        ArgValue::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.clone(),
        }),
    })
}

/// Builds the call argument vector `[success, retval, args...]` for an event.
///
/// # Errors
///
/// Returns [`HostlinkError::Encoding`] naming the first argument that cannot
/// be encoded.
pub fn encode_args(event: &ApiEvent) -> Result<Vec<Bson>> {
    let mut out = Vec::with_capacity(event.args.len() + 2);
    out.push(int_bson(i64::from(event.success)));
    out.push(encode_value(&event.retval).map_err(|e| at(&event.api, "retval", e))?);
    for (i, arg) in event.args.iter().enumerate() {
        out.push(encode_value(arg).map_err(|e| at(&event.api, &format!("arg{i}"), e))?);
    }
    Ok(out)
}

fn at(api: &str, position: &str, err: HostlinkError) -> HostlinkError {
    match err {
        HostlinkError::Encoding { message } => {
            HostlinkError::encoding(format!("{api}: {position}: {message}"))
        }
        other => other,
    }
}
