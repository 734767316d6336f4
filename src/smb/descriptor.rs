//! Self-relative security descriptor, ACL, and ACE parsing
//!
//! Parsers here are deliberately lenient where the wire allows it:
//! unusual revisions are accepted, truncated trailing ACEs are discarded
//! silently, and component parsing is best-effort. Only length violations
//! on fixed-size headers fail hard.

use crate::error::{SmbError, SmbResult};
use crate::smb::sid::Sid;

/// Security descriptor control flags
pub const SE_OWNER_DEFAULTED: u16 = 0x0001;
pub const SE_GROUP_DEFAULTED: u16 = 0x0002;
pub const SE_DACL_PRESENT: u16 = 0x0004;
pub const SE_DACL_DEFAULTED: u16 = 0x0008;
pub const SE_SACL_PRESENT: u16 = 0x0010;
pub const SE_SACL_DEFAULTED: u16 = 0x0020;
pub const SE_DACL_PROTECTED: u16 = 0x1000;
pub const SE_SACL_PROTECTED: u16 = 0x2000;
pub const SE_SELF_RELATIVE: u16 = 0x8000;

/// ACE types
pub const ACCESS_ALLOWED_ACE_TYPE: u8 = 0x00;
pub const ACCESS_DENIED_ACE_TYPE: u8 = 0x01;
pub const SYSTEM_AUDIT_ACE_TYPE: u8 = 0x02;
pub const SYSTEM_ALARM_ACE_TYPE: u8 = 0x03;

/// ACE flags
pub const OBJECT_INHERIT_ACE: u8 = 0x01;
pub const CONTAINER_INHERIT_ACE: u8 = 0x02;
pub const INHERIT_ONLY_ACE: u8 = 0x08;
pub const INHERITED_ACE: u8 = 0x10;

/// Slack added to the recovered length when the terminal component of a
/// self-relative descriptor cannot be classified as a SID or an ACL.
const UNCLASSIFIED_TAIL_SLACK: usize = 64;

fn le_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

fn le_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

/// One access control entry
#[derive(Debug, Clone)]
pub struct Ace {
    pub ace_type: u8,
    pub ace_flags: u8,
    pub ace_size: u16,
    pub mask: u32,
    pub sid: Option<Sid>,
}

impl Ace {
    /// Parse a binary ACE; returns the entry and its on-the-wire size so
    /// callers can iterate an ACL body.
    pub fn parse(data: &[u8]) -> SmbResult<(Ace, usize)> {
        if data.len() < 4 {
            return Err(SmbError::ShortInput {
                what: "ACE header",
                needed: 4,
                got: data.len(),
            });
        }

        let mut ace = Ace {
            ace_type: data[0],
            ace_flags: data[1],
            ace_size: le_u16(data, 2),
            mask: 0,
            sid: None,
        };

        if data.len() < ace.ace_size as usize {
            return Err(SmbError::ShortInput {
                what: "ACE",
                needed: ace.ace_size as usize,
                got: data.len(),
            });
        }

        // Mask and trustee SID only exist for the four standard ACE
        // types; object and callback variants carry extra fields this
        // crate does not consume.
        match ace.ace_type {
            ACCESS_ALLOWED_ACE_TYPE | ACCESS_DENIED_ACE_TYPE | SYSTEM_AUDIT_ACE_TYPE
            | SYSTEM_ALARM_ACE_TYPE => {
                if data.len() < 8 {
                    return Err(SmbError::ShortInput {
                        what: "ACE",
                        needed: 8,
                        got: data.len(),
                    });
                }
                ace.mask = le_u32(data, 4);
                if data.len() > 8 {
                    ace.sid = Sid::parse(&data[8..]).ok();
                }
            }
            _ => {}
        }

        let size = ace.ace_size as usize;
        Ok((ace, size))
    }

    /// True if this entry grants access
    pub fn is_access_allowed(&self) -> bool {
        self.ace_type == ACCESS_ALLOWED_ACE_TYPE
    }

    /// True if this entry denies access
    pub fn is_access_denied(&self) -> bool {
        self.ace_type == ACCESS_DENIED_ACE_TYPE
    }

    /// Check if the access mask contains a given flag
    pub fn has_mask(&self, flag: u32) -> bool {
        self.mask & flag != 0
    }

    pub fn type_name(&self) -> String {
        match self.ace_type {
            ACCESS_ALLOWED_ACE_TYPE => "ACCESS_ALLOWED".into(),
            ACCESS_DENIED_ACE_TYPE => "ACCESS_DENIED".into(),
            SYSTEM_AUDIT_ACE_TYPE => "SYSTEM_AUDIT".into(),
            SYSTEM_ALARM_ACE_TYPE => "SYSTEM_ALARM".into(),
            other => format!("UNKNOWN({})", other),
        }
    }
}

/// An access control list: ordered sequence of ACEs
#[derive(Debug, Clone)]
pub struct Acl {
    pub revision: u8,
    pub size: u16,
    pub ace_count: u16,
    pub aces: Vec<Ace>,
}

impl Acl {
    /// Parse a binary ACL.
    ///
    /// ACEs are read until `ace_count` entries have been parsed or the
    /// first parse failure; truncated trailing entries are dropped.
    pub fn parse(data: &[u8]) -> SmbResult<Acl> {
        if data.len() < 8 {
            return Err(SmbError::ShortInput {
                what: "ACL",
                needed: 8,
                got: data.len(),
            });
        }

        let mut acl = Acl {
            revision: data[0],
            size: le_u16(data, 2),
            ace_count: le_u16(data, 4),
            aces: Vec::new(),
        };

        let mut offset = 8;
        for _ in 0..acl.ace_count {
            if offset >= data.len() {
                break;
            }
            match Ace::parse(&data[offset..]) {
                Ok((ace, size)) if size > 0 => {
                    acl.aces.push(ace);
                    offset += size;
                }
                _ => break,
            }
        }

        Ok(acl)
    }
}

/// A parsed self-relative security descriptor
#[derive(Debug, Clone)]
pub struct SecurityDescriptor {
    pub revision: u8,
    pub control: u16,
    pub owner_sid: Option<Sid>,
    pub group_sid: Option<Sid>,
    pub sacl: Option<Acl>,
    pub dacl: Option<Acl>,
}

impl SecurityDescriptor {
    /// Parse a self-relative binary security descriptor.
    ///
    /// The 20-byte header is mandatory. Each component is parsed only if
    /// its offset is non-zero and within bounds, and (for ACLs) the
    /// corresponding `*_PRESENT` control bit is set. Component parse
    /// failures leave that component as `None` rather than failing the
    /// descriptor.
    pub fn parse(data: &[u8]) -> SmbResult<SecurityDescriptor> {
        if data.len() < 20 {
            return Err(SmbError::ShortInput {
                what: "security descriptor",
                needed: 20,
                got: data.len(),
            });
        }

        let mut sd = SecurityDescriptor {
            revision: data[0],
            control: le_u16(data, 2),
            owner_sid: None,
            group_sid: None,
            sacl: None,
            dacl: None,
        };

        let offset_owner = le_u32(data, 4) as usize;
        let offset_group = le_u32(data, 8) as usize;
        let offset_sacl = le_u32(data, 12) as usize;
        let offset_dacl = le_u32(data, 16) as usize;

        if offset_owner > 0 && offset_owner < data.len() {
            sd.owner_sid = Sid::parse(&data[offset_owner..]).ok();
        }

        if offset_group > 0 && offset_group < data.len() {
            sd.group_sid = Sid::parse(&data[offset_group..]).ok();
        }

        if offset_sacl > 0 && sd.control & SE_SACL_PRESENT != 0 && offset_sacl < data.len() {
            sd.sacl = Acl::parse(&data[offset_sacl..]).ok();
        }

        if offset_dacl > 0 && sd.control & SE_DACL_PRESENT != 0 && offset_dacl < data.len() {
            sd.dacl = Acl::parse(&data[offset_dacl..]).ok();
        }

        Ok(sd)
    }
}

/// Recover the total length of a self-relative security descriptor that
/// is embedded in a larger buffer.
///
/// The length is the maximum present component offset plus the size of
/// the component found there (SID: `8 + 4 * sub_authority_count`, ACL:
/// its u16 size field). When the terminal component cannot be classified
/// a default slack of [`UNCLASSIFIED_TAIL_SLACK`] bytes is added.
pub fn self_relative_len(data: &[u8]) -> usize {
    if data.len() < 20 {
        return 0;
    }

    let offsets = [
        le_u32(data, 4) as usize,
        le_u32(data, 8) as usize,
        le_u32(data, 12) as usize,
        le_u32(data, 16) as usize,
    ];

    let max_offset = offsets.iter().copied().filter(|&o| o > 0).max().unwrap_or(0);
    let max_offset = max_offset.max(20);

    if max_offset > 20 && max_offset < data.len() {
        let tail = &data[max_offset..];
        if tail.len() >= 8 {
            if tail[0] == 1 {
                // SID revision
                let sub_auth_count = tail[1] as usize;
                return max_offset + 8 + sub_auth_count * 4;
            } else if tail[0] == 2 {
                // ACL revision
                let acl_size = le_u16(tail, 2) as usize;
                return max_offset + acl_size;
            }
        }
    }

    max_offset + UNCLASSIFIED_TAIL_SLACK
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an ACCESS_ALLOWED ACE for the given SID bytes and mask
    pub(crate) fn build_ace(ace_type: u8, mask: u32, sid: &[u8]) -> Vec<u8> {
        let size = (8 + sid.len()) as u16;
        let mut out = vec![ace_type, 0x00];
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&mask.to_le_bytes());
        out.extend_from_slice(sid);
        out
    }

    /// Build an ACL wrapping the given encoded ACEs
    pub(crate) fn build_acl(aces: &[Vec<u8>]) -> Vec<u8> {
        let body_len: usize = aces.iter().map(|a| a.len()).sum();
        let total = (8 + body_len) as u16;
        let mut out = vec![0x02, 0x00];
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(&(aces.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0x00, 0x00]);
        for ace in aces {
            out.extend_from_slice(ace);
        }
        out
    }

    /// Build a self-relative descriptor with a DACL only
    pub(crate) fn build_descriptor(dacl: &[u8]) -> Vec<u8> {
        let mut out = vec![0x01, 0x00];
        out.extend_from_slice(&(SE_DACL_PRESENT | SE_SELF_RELATIVE).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // owner
        out.extend_from_slice(&0u32.to_le_bytes()); // group
        out.extend_from_slice(&0u32.to_le_bytes()); // sacl
        out.extend_from_slice(&20u32.to_le_bytes()); // dacl
        out.extend_from_slice(dacl);
        out
    }

    fn everyone_sid() -> Vec<u8> {
        vec![0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
    }

    #[test]
    fn test_parse_descriptor_with_dacl() {
        let ace = build_ace(ACCESS_ALLOWED_ACE_TYPE, 0x001F01FF, &everyone_sid());
        let acl = build_acl(&[ace]);
        let sd_bytes = build_descriptor(&acl);

        let sd = SecurityDescriptor::parse(&sd_bytes).unwrap();
        assert_eq!(sd.revision, 1);
        assert!(sd.control & SE_DACL_PRESENT != 0);
        assert!(sd.owner_sid.is_none());

        let dacl = sd.dacl.expect("DACL should parse");
        assert_eq!(dacl.aces.len(), 1);
        let ace = &dacl.aces[0];
        assert!(ace.is_access_allowed());
        assert_eq!(ace.mask, 0x001F01FF);
        assert_eq!(ace.sid.as_ref().unwrap().to_string(), "S-1-1-0");
    }

    #[test]
    fn test_short_descriptor_fails() {
        assert!(SecurityDescriptor::parse(&[0u8; 19]).is_err());
        // 20-byte all-zero header is a valid (empty) descriptor
        assert!(SecurityDescriptor::parse(&[0u8; 20]).is_ok());
    }

    #[test]
    fn test_unusual_revision_accepted() {
        let acl = build_acl(&[]);
        let mut sd_bytes = build_descriptor(&acl);
        sd_bytes[0] = 0x7f;
        let sd = SecurityDescriptor::parse(&sd_bytes).unwrap();
        assert_eq!(sd.revision, 0x7f);
    }

    #[test]
    fn test_dacl_ignored_without_present_bit() {
        let ace = build_ace(ACCESS_ALLOWED_ACE_TYPE, 0x1, &everyone_sid());
        let acl = build_acl(&[ace]);
        let mut sd_bytes = build_descriptor(&acl);
        // Clear SE_DACL_PRESENT
        let control = SE_SELF_RELATIVE;
        sd_bytes[2..4].copy_from_slice(&control.to_le_bytes());

        let sd = SecurityDescriptor::parse(&sd_bytes).unwrap();
        assert!(sd.dacl.is_none());
    }

    #[test]
    fn test_truncated_trailing_ace_discarded() {
        let good = build_ace(ACCESS_ALLOWED_ACE_TYPE, 0x1, &everyone_sid());
        let acl = build_acl(&[good.clone(), good]);
        // Chop off the last 6 bytes of the second ACE
        let truncated = &acl[..acl.len() - 6];
        let parsed = Acl::parse(truncated).unwrap();
        assert_eq!(parsed.ace_count, 2);
        assert_eq!(parsed.aces.len(), 1);
    }

    #[test]
    fn test_non_standard_ace_type_keeps_empty_mask() {
        // Object ACE type: mask and SID are left unset
        let mut raw = vec![0x05, 0x00];
        raw.extend_from_slice(&8u16.to_le_bytes());
        raw.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        let (ace, size) = Ace::parse(&raw).unwrap();
        assert_eq!(size, 8);
        assert_eq!(ace.mask, 0);
        assert!(ace.sid.is_none());
    }

    #[test]
    fn test_self_relative_len_sid_tail() {
        // Descriptor with owner SID at the end
        let sid = everyone_sid();
        let mut out = vec![0x01, 0x00];
        out.extend_from_slice(&SE_SELF_RELATIVE.to_le_bytes());
        out.extend_from_slice(&20u32.to_le_bytes()); // owner at 20
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&sid);
        out.extend_from_slice(&[0xaa; 32]); // unrelated trailing bytes

        assert_eq!(self_relative_len(&out), 20 + 12);
    }

    #[test]
    fn test_self_relative_len_acl_tail() {
        let ace = build_ace(ACCESS_ALLOWED_ACE_TYPE, 0x1, &everyone_sid());
        let acl = build_acl(&[ace]);
        let sd = build_descriptor(&acl);
        assert_eq!(self_relative_len(&sd), 20 + acl.len());
    }

    #[test]
    fn test_self_relative_len_unclassified_tail() {
        let mut out = vec![0x01, 0x00];
        out.extend_from_slice(&SE_SELF_RELATIVE.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&24u32.to_le_bytes()); // dacl offset, but junk there
        out.extend_from_slice(&[0x00; 4]);
        out.extend_from_slice(&[0x09; 16]); // neither SID nor ACL revision

        assert_eq!(self_relative_len(&out), 24 + 64);
    }

    #[test]
    fn test_descriptor_roundtrip_preserves_aces() {
        let aces = vec![
            build_ace(ACCESS_ALLOWED_ACE_TYPE, 0x001200A9, &everyone_sid()),
            build_ace(ACCESS_DENIED_ACE_TYPE, 0x00010000, &everyone_sid()),
        ];
        let acl = build_acl(&aces);
        let sd = SecurityDescriptor::parse(&build_descriptor(&acl)).unwrap();
        let dacl = sd.dacl.unwrap();
        assert_eq!(dacl.aces.len(), 2);
        assert_eq!(dacl.aces[0].mask, 0x001200A9);
        assert!(dacl.aces[1].is_access_denied());
        assert_eq!(dacl.aces[1].sid.as_ref().unwrap().to_string(), "S-1-1-0");
    }
}
