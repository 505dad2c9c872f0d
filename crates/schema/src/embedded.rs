//! Fallback descriptor bundled with the crate
//!
//! Used when the remote endpoint can't serve `/json/protocol` (older Chrome,
//! non-Chrome implementations) or when the caller asks for it explicitly.

use crate::descriptor::ProtocolDescriptor;
use crate::error::Result;

const EMBEDDED_PROTOCOL: &str = include_str!("../protocol.json");

/// Parse the bundled descriptor
pub fn embedded() -> Result<ProtocolDescriptor> {
    ProtocolDescriptor::from_json(EMBEDDED_PROTOCOL)
}
