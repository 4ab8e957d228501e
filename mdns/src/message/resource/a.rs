use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use super::*;
use shared::error::Result;

// An AResource is an A Resource record.
#[derive(Default, Debug, Clone)]
pub(crate) struct AResource {
    pub(crate) a: [u8; 4],
}

impl fmt::Display for AResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dnsmessage.AResource{{A: {:?}}}", self.a)
    }
}

impl ResourceBody for AResource {
    fn real_type(&self) -> DnsType {
        DnsType::A
    }

    fn pack(
        &self,
        msg: Vec<u8>,
        _compression: &mut Option<HashMap<String, usize>>,
        _compression_off: usize,
    ) -> Result<Vec<u8>> {
        Ok(pack_bytes(msg, &self.a))
    }

    fn unpack(&mut self, msg: &[u8], off: usize, _length: usize) -> Result<usize> {
        unpack_bytes(msg, off, &mut self.a)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
