//! Opaque catch-all for wire fields this proxy doesn't model.
//!
//! Providers add fields to their request/response/chunk shapes over time; a client may
//! also send fields this proxy has no opinion about. Dropping them silently would make
//! the proxy a lossy hop. Flattened onto a struct, this captures whatever serde doesn't
//! bind to a named field and re-emits it unchanged on serialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields present on the wire but not modeled by the surrounding struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnknownFields(HashMap<String, Value>);
