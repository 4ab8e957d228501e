pub(crate) mod a;
pub(crate) mod aaaa;
pub(crate) mod cname;
pub(crate) mod nsec;
pub(crate) mod opaque;
pub(crate) mod ptr;
pub(crate) mod srv;
pub(crate) mod txt;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use a::*;
use aaaa::*;
use cname::*;
use nsec::*;
use opaque::*;
use ptr::*;
use srv::*;
use txt::*;

use super::name::*;
use super::packer::*;
use super::*;
use shared::error::*;

// A Resource is a DNS resource record.
#[derive(Default, Debug)]
pub(crate) struct Resource {
    pub(crate) header: ResourceHeader,
    pub(crate) body: Option<Box<dyn ResourceBody>>,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dnsmessage.Resource{{Header: {}, Body: {}}}",
            self.header,
            if let Some(body) = &self.body {
                body.to_string()
            } else {
                "None".to_owned()
            }
        )
    }
}

impl Resource {
    // pack appends the wire format of the Resource to msg.
    pub(crate) fn pack(
        &mut self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        self.header.typ = self
            .body
            .as_ref()
            .ok_or(Error::ErrNilResourceBody)?
            .real_type();
        let (mut msg, len_off) = self.header.pack(msg, compression, compression_off)?;
        let pre_len = msg.len();
        if let Some(body) = &self.body {
            msg = body.pack(msg, compression, compression_off)?;
            self.header.fix_len(&mut msg, len_off, pre_len)?;
        }
        Ok(msg)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], mut off: usize) -> Result<usize> {
        off = self.header.unpack(msg, off)?;
        let (rb, off) =
            unpack_resource_body(self.header.typ, msg, off, self.header.length as usize)?;
        self.body = Some(rb);
        Ok(off)
    }

    pub(crate) fn skip(msg: &[u8], off: usize) -> Result<usize> {
        let mut new_off = Name::skip(msg, off)?;
        new_off = DnsType::skip(msg, new_off)?;
        new_off = DnsClass::skip(msg, new_off)?;
        new_off = skip_uint32(msg, new_off)?;
        let (length, mut new_off) = unpack_uint16(msg, new_off)?;
        new_off += length as usize;
        if new_off > msg.len() {
            return Err(Error::ErrResourceLen);
        }
        Ok(new_off)
    }
}

// Header for a DNS resource record: the fields every record type shares
// (name, type, class, TTL, rdata length).
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub(crate) struct ResourceHeader {
    // The domain name for which this resource record pertains.
    pub(crate) name: Name,

    // The type of DNS resource record. Set automatically during packing.
    pub(crate) typ: DnsType,

    // The class of network to which this DNS resource record pertains.
    pub(crate) class: DnsClass,

    // Time to live in seconds.
    pub(crate) ttl: u32,

    // Length of the resource data following this header. Set automatically
    // during packing.
    pub(crate) length: u16,
}

impl fmt::Display for ResourceHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dnsmessage.ResourceHeader{{Name: {}, Type: {}, Class: {}, TTL: {}, Length: {}}}",
            self.name, self.typ, self.class, self.ttl, self.length,
        )
    }
}

impl ResourceHeader {
    // pack appends the wire format of the ResourceHeader to msg.
    //
    // The returned len_off is the offset in msg where the Length field was
    // packed, so fix_len can patch it once the body size is known.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<(Vec<u8>, usize)> {
        msg = self.name.pack(msg, compression, compression_off)?;
        msg = self.typ.pack(msg);
        msg = self.class.pack(msg);
        msg = pack_uint32(msg, self.ttl);
        let len_off = msg.len();
        msg = pack_uint16(msg, self.length);
        Ok((msg, len_off))
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let mut new_off = off;
        new_off = self.name.unpack(msg, new_off)?;
        new_off = self.typ.unpack(msg, new_off)?;
        new_off = self.class.unpack(msg, new_off)?;
        let (ttl, new_off) = unpack_uint32(msg, new_off)?;
        self.ttl = ttl;
        let (l, new_off) = unpack_uint16(msg, new_off)?;
        self.length = l;

        Ok(new_off)
    }

    // fix_len updates a packed ResourceHeader to include the length of the
    // ResourceBody.
    //
    // len_off is the offset of the ResourceHeader.length field in msg.
    //
    // pre_len is the length that msg was before the ResourceBody was packed.
    pub(crate) fn fix_len(&mut self, msg: &mut [u8], len_off: usize, pre_len: usize) -> Result<()> {
        if msg.len() < pre_len || msg.len() > pre_len + u16::MAX as usize {
            return Err(Error::ErrResTooLong);
        }

        let con_len = msg.len() - pre_len;

        // Fill in the length now that we know how long the content is.
        msg[len_off] = ((con_len >> 8) & 0xFF) as u8;
        msg[len_off + 1] = (con_len & 0xFF) as u8;
        self.length = con_len as u16;

        Ok(())
    }
}

// A ResourceBody is a DNS resource record minus the header.
pub(crate) trait ResourceBody: fmt::Display + fmt::Debug {
    // real_type returns the actual type of the Resource. This is used to
    // fill in the header Type field.
    fn real_type(&self) -> DnsType;

    // pack packs a Resource except for its header.
    fn pack(
        &self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>>;

    fn unpack(&mut self, msg: &[u8], off: usize, length: usize) -> Result<usize>;

    fn as_any(&self) -> &dyn Any;
}

pub(crate) fn unpack_resource_body(
    typ: DnsType,
    msg: &[u8],
    off: usize,
    length: usize,
) -> Result<(Box<dyn ResourceBody>, usize)> {
    let mut rb: Box<dyn ResourceBody> = match typ {
        DnsType::A => Box::<AResource>::default(),
        DnsType::Cname => Box::<CnameResource>::default(),
        DnsType::Ptr => Box::<PtrResource>::default(),
        DnsType::Txt => Box::<TxtResource>::default(),
        DnsType::Aaaa => Box::<AaaaResource>::default(),
        DnsType::Srv => Box::<SrvResource>::default(),
        DnsType::Nsec => Box::<NsecResource>::default(),
        // Record types without a structured representation keep their raw
        // rdata so foreign records never abort parsing.
        _ => Box::new(OpaqueResource {
            typ,
            ..Default::default()
        }),
    };

    let new_off = rb.unpack(msg, off, length)?;
    if new_off != off + length {
        return Err(Error::ErrResourceLen);
    }

    Ok((rb, new_off))
}
