//! Getter answering the timestamp properties from the wall clock.

use std::sync::Arc;

use chrono::{Local, Utc};

use crate::engine::props::{CustomGetFcn, PropInfo, PropKind, PropValue};

/// `ctime`-style layout without the trailing newline, e.g.
/// `Wed Jun 30 21:49:08 1993`.
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Current time in the representation the property declares: seconds since
/// the epoch for integer properties, local `ctime` text for text properties.
///
/// # Panics
///
/// Panics when the property is declared with any other kind.
pub fn timestamp_value(info: &PropInfo) -> PropValue {
    match info.kind {
        PropKind::Int => PropValue::Int(Utc::now().timestamp()),
        PropKind::Text => PropValue::Text(Local::now().format(CTIME_FORMAT).to_string()),
        kind => panic!("timestamp property {} declared as {kind:?}", info.name),
    }
}

pub fn timestamp_getter() -> CustomGetFcn {
    Arc::new(timestamp_value)
}
