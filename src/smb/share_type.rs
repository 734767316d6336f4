//! Share type (STYPE_*) flag decoding
//!
//! The share service reports each share's type as a u32: the low two
//! bits select the base device type, the top bits flag special and
//! temporary shares.

/// Base types (low two bits)
pub const STYPE_DISKTREE: u32 = 0x0;
pub const STYPE_PRINTQ: u32 = 0x1;
pub const STYPE_DEVICE: u32 = 0x2;
pub const STYPE_IPC: u32 = 0x3;

/// Modifier flags
pub const STYPE_SPECIAL: u32 = 0x8000_0000;
pub const STYPE_TEMPORARY: u32 = 0x4000_0000;

/// Decode a share type mask into the set of flag names.
pub fn stype_flags(value: u32) -> Vec<&'static str> {
    let mut flags = Vec::new();

    match value & 0b11 {
        STYPE_DISKTREE => flags.push("STYPE_DISKTREE"),
        STYPE_PRINTQ => flags.push("STYPE_PRINTQ"),
        STYPE_DEVICE => flags.push("STYPE_DEVICE"),
        STYPE_IPC => flags.push("STYPE_IPC"),
        _ => unreachable!(),
    }

    if value & STYPE_SPECIAL == STYPE_SPECIAL {
        flags.push("STYPE_SPECIAL");
    }
    if value & STYPE_TEMPORARY == STYPE_TEMPORARY {
        flags.push("STYPE_TEMPORARY");
    }

    flags
}

/// True if the share is a plain disk share
pub fn is_disk_share(value: u32) -> bool {
    value & 0b11 == STYPE_DISKTREE
}

/// True if the share is administrative (IPC$, ADMIN$, C$, ...)
pub fn is_special_share(value: u32) -> bool {
    value & STYPE_SPECIAL == STYPE_SPECIAL
}

/// True if the share is an interprocess-communication share
pub fn is_ipc_share(value: u32) -> bool {
    value & 0b11 == STYPE_IPC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_share() {
        assert_eq!(stype_flags(0), vec!["STYPE_DISKTREE"]);
        assert!(is_disk_share(0));
        assert!(!is_special_share(0));
    }

    #[test]
    fn test_admin_share() {
        // C$ reports as STYPE_DISKTREE | STYPE_SPECIAL
        let flags = stype_flags(0x8000_0000);
        assert_eq!(flags, vec!["STYPE_DISKTREE", "STYPE_SPECIAL"]);
        assert!(is_special_share(0x8000_0000));
        assert!(is_disk_share(0x8000_0000));
    }

    #[test]
    fn test_ipc_share() {
        let flags = stype_flags(0x8000_0003);
        assert_eq!(flags, vec!["STYPE_IPC", "STYPE_SPECIAL"]);
        assert!(is_ipc_share(0x8000_0003));
    }
}
