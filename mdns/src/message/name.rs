use std::collections::HashMap;
use std::fmt;

use shared::error::*;

// Maximum length of a DNS name in presentation format.
const NAME_LEN: usize = 255;

// Maximum number of compression pointers followed while unpacking a name.
const MAX_PTR: usize = 10;

/// A DNS domain name in presentation format, always fully qualified
/// (trailing dot).
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Hash)]
pub struct Name {
    pub data: String,
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl Name {
    /// Creates a name from presentation format, appending the trailing dot
    /// when it is missing.
    pub fn new(data: &str) -> Result<Self> {
        let data = if data.ends_with('.') {
            data.to_owned()
        } else {
            format!("{data}.")
        };
        if data.len() > NAME_LEN {
            Err(Error::ErrNameTooLong)
        } else {
            Ok(Name { data })
        }
    }

    /// Presentation form without the trailing dot (URL form).
    pub fn url(&self) -> String {
        self.data.trim_end_matches('.').to_owned()
    }

    /// Case-insensitive equality, as required for DNS name comparison.
    pub fn equal_fold(&self, other: &Name) -> bool {
        self.data.eq_ignore_ascii_case(&other.data)
    }

    // pack appends the wire format of the Name to msg.
    //
    // Domain names are a sequence of counted strings split at the dots. They
    // end with a zero-length string. Compression can be used to reuse domain
    // suffixes.
    //
    // The compression map will be updated with new domain suffixes. If
    // compression is None, compression will not be used.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        let data = self.data.as_bytes();

        // Add a trailing dot to canonicalize name.
        if data.is_empty() || data[data.len() - 1] != b'.' {
            return Err(Error::ErrNonCanonicalName);
        }

        // Allow root domain.
        if data == b"." {
            msg.push(0);
            return Ok(msg);
        }

        // Emit sequence of counted strings, chopping at dots.
        let mut begin = 0;
        for i in 0..data.len() {
            // Check for the end of the segment.
            if data[i] == b'.' {
                // The two most significant bits have special meaning.
                // It isn't allowed for segments to be long enough to
                // need them.
                if i - begin >= 1 << 6 {
                    return Err(Error::ErrSegTooLong);
                }

                // Segments must have a non-zero length.
                if i - begin == 0 {
                    return Err(Error::ErrZeroSegLen);
                }

                msg.push((i - begin) as u8);
                msg.extend_from_slice(&data[begin..i]);

                begin = i + 1;
                continue;
            }

            // We can only compress domain suffixes starting with a new
            // segment. A pointer is two bytes with the two most significant
            // bits set to 1 to indicate that it is a pointer.
            if (i == 0 || data[i - 1] == b'.')
                && let Some(compression) = compression
            {
                let key = self.data[i..].to_owned();
                if let Some(ptr) = compression.get(&key) {
                    // Hit. Emit a pointer instead of the rest of the domain.
                    msg.push(((ptr >> 8) | 0xC0) as u8);
                    msg.push((ptr & 0xFF) as u8);
                    return Ok(msg);
                }

                // Miss. Add the suffix to the compression table if the
                // offset can be stored in the available 14 bits.
                let new_ptr = msg.len() - compression_off;
                if new_ptr <= (u16::MAX >> 2) as usize {
                    compression.insert(key, new_ptr);
                }
            }
        }

        msg.push(0);
        Ok(msg)
    }

    // unpack parses a wire-format name starting at msg[off], following
    // compression pointers relative to the start of msg.
    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        // curr_off is the current working offset.
        let mut curr_off = off;

        // new_off is the offset where the next record will start. Pointers
        // lead to data that belongs to other names and thus doesn't count
        // towards the usage of this name.
        let mut new_off = off;

        // ptr is the number of pointers followed.
        let mut ptr = 0;

        let mut name = String::new();
        loop {
            if curr_off >= msg.len() {
                return Err(Error::ErrBaseLen);
            }
            let c = msg[curr_off] as usize;
            curr_off += 1;
            match c & 0xC0 {
                0x00 => {
                    // String segment.
                    if c == 0x00 {
                        // A zero length signals the end of the name.
                        break;
                    }
                    let end_off = curr_off + c;
                    if end_off > msg.len() {
                        return Err(Error::ErrCalcLen);
                    }
                    name.push_str(&String::from_utf8_lossy(&msg[curr_off..end_off]));
                    name.push('.');
                    curr_off = end_off;
                }
                0xC0 => {
                    // Pointer.
                    if curr_off >= msg.len() {
                        return Err(Error::ErrInvalidPtr);
                    }
                    let c1 = msg[curr_off];
                    curr_off += 1;
                    if ptr == 0 {
                        new_off = curr_off;
                    }
                    // Don't follow too many pointers, maybe there's a loop.
                    ptr += 1;
                    if ptr > MAX_PTR {
                        return Err(Error::ErrTooManyPtr);
                    }
                    curr_off = ((c ^ 0xC0) << 8) | (c1 as usize);
                }
                _ => {
                    // Prefixes 0x80 and 0x40 are reserved.
                    return Err(Error::ErrReserved);
                }
            }
        }

        if name.is_empty() {
            name.push('.');
        }
        if name.len() > NAME_LEN {
            return Err(Error::ErrCalcLen);
        }

        self.data = name;

        if ptr == 0 {
            new_off = curr_off;
        }
        Ok(new_off)
    }

    pub(crate) fn skip(msg: &[u8], off: usize) -> Result<usize> {
        // new_off is the offset where the next record will start.
        let mut new_off = off;

        loop {
            if new_off >= msg.len() {
                return Err(Error::ErrBaseLen);
            }
            let c = msg[new_off] as usize;
            new_off += 1;
            match c & 0xC0 {
                0x00 => {
                    if c == 0x00 {
                        // A zero length signals the end of the name.
                        return Ok(new_off);
                    }

                    // literal string
                    new_off += c;
                    if new_off > msg.len() {
                        return Err(Error::ErrCalcLen);
                    }
                }
                0xC0 => {
                    // Pointer to somewhere else in msg. Pointers are two
                    // bytes. Don't follow the pointer as the data here has
                    // ended.
                    return Ok(new_off + 1);
                }
                _ => {
                    // Prefixes 0x80 and 0x40 are reserved.
                    return Err(Error::ErrReserved);
                }
            }
        }
    }
}
