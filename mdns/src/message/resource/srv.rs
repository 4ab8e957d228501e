use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use super::*;
use shared::error::Result;

// An SrvResource is an SRV Resource record.
#[derive(Default, Debug, Clone)]
pub(crate) struct SrvResource {
    pub(crate) priority: u16,
    pub(crate) weight: u16,
    pub(crate) port: u16,
    pub(crate) target: Name,
}

impl fmt::Display for SrvResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dnsmessage.SRVResource{{Priority: {}, Weight: {}, Port: {}, Target: {}}}",
            self.priority, self.weight, self.port, self.target
        )
    }
}

impl ResourceBody for SrvResource {
    fn real_type(&self) -> DnsType {
        DnsType::Srv
    }

    fn pack(
        &self,
        mut msg: Vec<u8>,
        _compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        msg = pack_uint16(msg, self.priority);
        msg = pack_uint16(msg, self.weight);
        msg = pack_uint16(msg, self.port);
        // The SRV target must not be compressed (RFC 2782).
        self.target.pack(msg, &mut None, compression_off)
    }

    fn unpack(&mut self, msg: &[u8], off: usize, _length: usize) -> Result<usize> {
        let (priority, off) = unpack_uint16(msg, off)?;
        self.priority = priority;
        let (weight, off) = unpack_uint16(msg, off)?;
        self.weight = weight;
        let (port, off) = unpack_uint16(msg, off)?;
        self.port = port;
        self.target.unpack(msg, off)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
