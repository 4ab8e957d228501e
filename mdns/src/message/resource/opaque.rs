use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use super::*;
use shared::error::*;

// An OpaqueResource carries the raw rdata of a record, either because the
// codec has no structured representation for its type or because the caller
// already holds canonical (uncompressed) rdata bytes.
#[derive(Default, Debug, Clone)]
pub(crate) struct OpaqueResource {
    pub(crate) typ: DnsType,
    pub(crate) data: Vec<u8>,
}

impl fmt::Display for OpaqueResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dnsmessage.OpaqueResource{{Type: {}, Data: {:?}}}",
            self.typ, self.data
        )
    }
}

impl ResourceBody for OpaqueResource {
    fn real_type(&self) -> DnsType {
        self.typ
    }

    fn pack(
        &self,
        msg: Vec<u8>,
        _compression: &mut Option<HashMap<String, usize>>,
        _compression_off: usize,
    ) -> Result<Vec<u8>> {
        Ok(pack_bytes(msg, &self.data))
    }

    fn unpack(&mut self, msg: &[u8], off: usize, length: usize) -> Result<usize> {
        let new_off = off + length;
        if new_off > msg.len() {
            return Err(Error::ErrResourceLen);
        }
        self.data = msg[off..new_off].to_vec();
        Ok(new_off)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
