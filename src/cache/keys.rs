//! Memoization Keys
//!
//! Deterministic ids for memoized calls: hex SHA-256 of a JSON encoding of
//! everything that identifies the call. Distinct inputs collide only with
//! SHA-256 collision probability, which is not a correctness guarantee.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::page::RequestContext;
use crate::error::Result;

fn digest(identity: &impl Serialize) -> Result<String> {
    let encoded = serde_json::to_vec(identity)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

/// Id of a memoized function call
pub fn call_key<A: Serialize + ?Sized>(name: &str, args: &A) -> Result<String> {
    digest(&(name, args))
}

/// Id of a memoized method call, sensitive to the object's state
pub fn method_key(method: &str, args: &[Value], state: &Value) -> Result<String> {
    digest(&(method, args, state))
}

/// Id of a captured page
pub fn page_key(request: &RequestContext) -> Result<String> {
    digest(request)
}
