//! Windows security identifier (SID) parsing and formatting
//!
//! A binary SID is: revision (1 byte), sub-authority count (1 byte), a
//! 6-byte big-endian identifier authority, then `count` little-endian
//! u32 sub-authorities. The canonical text form is `S-R-A-S1-S2-...-Sn`
//! with the authority rendered as the full 48-bit value in decimal.

use crate::error::{SmbError, SmbResult};
use std::fmt;

/// A parsed Windows security identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sid {
    pub revision: u8,
    pub identifier_authority: [u8; 6],
    pub sub_authorities: Vec<u32>,
}

impl Sid {
    /// Parse a binary SID.
    ///
    /// Requires exactly `8 + 4 * sub_authority_count` bytes; trailing
    /// bytes are ignored.
    pub fn parse(data: &[u8]) -> SmbResult<Self> {
        if data.len() < 8 {
            return Err(SmbError::ShortInput {
                what: "SID",
                needed: 8,
                got: data.len(),
            });
        }

        let revision = data[0];
        let count = data[1] as usize;

        let needed = 8 + count * 4;
        if data.len() < needed {
            return Err(SmbError::ShortInput {
                what: "SID",
                needed,
                got: data.len(),
            });
        }

        let mut identifier_authority = [0u8; 6];
        identifier_authority.copy_from_slice(&data[2..8]);

        let mut sub_authorities = Vec::with_capacity(count);
        for i in 0..count {
            let off = 8 + i * 4;
            sub_authorities.push(u32::from_le_bytes([
                data[off],
                data[off + 1],
                data[off + 2],
                data[off + 3],
            ]));
        }

        Ok(Sid {
            revision,
            identifier_authority,
            sub_authorities,
        })
    }

    /// On-the-wire size of this SID in bytes
    pub fn size(&self) -> usize {
        8 + self.sub_authorities.len() * 4
    }

    /// The 48-bit identifier authority as an integer
    fn authority_value(&self) -> u64 {
        self.identifier_authority
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    /// True for the Everyone SID (S-1-1-0)
    pub fn is_everyone(&self) -> bool {
        self.to_string() == "S-1-1-0"
    }

    /// True for the BUILTIN\Administrators SID (S-1-5-32-544)
    pub fn is_builtin_administrators(&self) -> bool {
        self.to_string() == "S-1-5-32-544"
    }

    /// True for the Local System SID (S-1-5-18)
    pub fn is_local_system(&self) -> bool {
        self.to_string() == "S-1-5-18"
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-{}", self.revision, self.authority_value())?;
        for sa in &self.sub_authorities {
            write!(f, "-{}", sa)?;
        }
        Ok(())
    }
}

/// True if the textual SID is domain-relative (S-1-5-21-*).
///
/// Domain SIDs already contain the domain identifier; well-known and
/// BUILTIN SIDs need a domain prefix before a downstream resolver can
/// match them to directory objects.
pub fn is_domain_sid(sid_text: &str) -> bool {
    sid_text.starts_with("S-1-5-21-")
}

/// Display name for a well-known SID, if it has one
pub fn well_known_name(sid_text: &str) -> Option<&'static str> {
    let name = match sid_text {
        "S-1-0-0" => "Null SID",
        "S-1-1-0" => "Everyone",
        "S-1-2-0" => "Local",
        "S-1-2-1" => "Console Logon",
        "S-1-3-0" => "Creator Owner",
        "S-1-3-1" => "Creator Group",
        "S-1-5-1" => "Dialup",
        "S-1-5-2" => "Network",
        "S-1-5-3" => "Batch",
        "S-1-5-4" => "Interactive",
        "S-1-5-6" => "Service",
        "S-1-5-7" => "Anonymous",
        "S-1-5-9" => "Enterprise Domain Controllers",
        "S-1-5-10" => "Principal Self",
        "S-1-5-11" => "Authenticated Users",
        "S-1-5-12" => "Restricted Code",
        "S-1-5-13" => "Terminal Server Users",
        "S-1-5-14" => "Remote Interactive Logon",
        "S-1-5-18" => "Local System",
        "S-1-5-19" => "NT Authority\\Local Service",
        "S-1-5-20" => "NT Authority\\Network Service",
        "S-1-5-32-544" => "BUILTIN\\Administrators",
        "S-1-5-32-545" => "BUILTIN\\Users",
        "S-1-5-32-546" => "BUILTIN\\Guests",
        "S-1-5-32-547" => "BUILTIN\\Power Users",
        "S-1-5-32-548" => "BUILTIN\\Account Operators",
        "S-1-5-32-549" => "BUILTIN\\Server Operators",
        "S-1-5-32-550" => "BUILTIN\\Print Operators",
        "S-1-5-32-551" => "BUILTIN\\Backup Operators",
        "S-1-5-32-552" => "BUILTIN\\Replicators",
        _ => return None,
    };
    Some(name)
}
