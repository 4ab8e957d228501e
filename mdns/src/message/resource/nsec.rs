use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use super::*;
use shared::error::*;

// An NsecResource is an NSEC Resource record as used by mDNS for negative
// answers: the next-domain name is the record's own name and the type bitmap
// lists which record types exist under that name (RFC 6762 §6.1).
//
// Only window block 0 is emitted, which covers every type number below 256.
#[derive(Default, Debug, Clone)]
pub(crate) struct NsecResource {
    pub(crate) next_domain: Name,
    pub(crate) types: Vec<u16>,
}

impl fmt::Display for NsecResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dnsmessage.NSECResource{{NextDomain: {}, Types: {:?}}}",
            self.next_domain, self.types
        )
    }
}

impl ResourceBody for NsecResource {
    fn real_type(&self) -> DnsType {
        DnsType::Nsec
    }

    fn pack(
        &self,
        mut msg: Vec<u8>,
        _compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        // The next-domain name must not be compressed (RFC 4034 §4.1.1).
        msg = self.next_domain.pack(msg, &mut None, compression_off)?;

        let mut highest = 0u16;
        for &typ in &self.types {
            if typ > 0xFF {
                return Err(Error::ErrResTooLong);
            }
            highest = highest.max(typ);
        }

        let bitmap_len = (highest / 8 + 1) as u8;
        let mut bitmap = vec![0u8; bitmap_len as usize];
        for &typ in &self.types {
            bitmap[(typ / 8) as usize] |= 0x80 >> (typ % 8);
        }

        msg.push(0); // window block 0
        msg.push(bitmap_len);
        msg.extend_from_slice(&bitmap);
        Ok(msg)
    }

    fn unpack(&mut self, msg: &[u8], off: usize, length: usize) -> Result<usize> {
        let end_off = off + length;
        if end_off > msg.len() {
            return Err(Error::ErrResourceLen);
        }

        let mut new_off = self.next_domain.unpack(msg, off)?;

        let mut types = vec![];
        while new_off < end_off {
            if new_off + 2 > end_off {
                return Err(Error::ErrCalcLen);
            }
            let window = msg[new_off] as u16;
            let bitmap_len = msg[new_off + 1] as usize;
            new_off += 2;
            if bitmap_len == 0 || bitmap_len > 32 || new_off + bitmap_len > end_off {
                return Err(Error::ErrCalcLen);
            }
            for (i, &byte) in msg[new_off..new_off + bitmap_len].iter().enumerate() {
                for bit in 0..8 {
                    if byte & (0x80 >> bit) != 0 {
                        types.push(window * 256 + (i * 8 + bit) as u16);
                    }
                }
            }
            new_off += bitmap_len;
        }
        self.types = types;
        Ok(new_off)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
