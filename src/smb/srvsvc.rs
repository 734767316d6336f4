//! Share-service RPC over the `srvsvc` named pipe
//!
//! This is not an RPC runtime. It hand-rolls exactly what share
//! enumeration needs: a single bind to the share-service interface
//! (`4b324fc8-1670-01d3-1278-5a47bf6ee188` v3.0) with the NDR transfer
//! syntax, `NetrShareEnum` (opnum 15, level 1) to list shares with
//! their type masks and comments, and `NetrShareGetInfo` (opnum 16,
//! level 502) to fetch a share's security descriptor.
//!
//! The GetInfo response is not NDR-decoded. The embedded self-relative
//! descriptor is located by scanning for its revision/control
//! signature and sized with the offset rule; environments where the
//! caller lacks the needed access simply yield "not available".

use crate::error::{SmbError, SmbResult};
use crate::smb::descriptor::{self, SecurityDescriptor};
use crate::smb::wire::{from_utf16le, le_u16, le_u32};

/// Named pipe for the share service
pub const SRVSVC_PIPE: &str = "srvsvc";

/// Share-service interface UUID 4b324fc8-1670-01d3-1278-5a47bf6ee188,
/// already in its on-the-wire byte order
const SRVSVC_UUID: [u8; 16] = [
    0xc8, 0x4f, 0x32, 0x4b, 0x70, 0x16, 0xd3, 0x01, 0x12, 0x78, 0x5a, 0x47, 0xbf, 0x6e, 0xe1,
    0x88,
];

/// NDR transfer syntax 8a885d04-1ceb-11c9-9fe8-08002b104860 v2
const NDR_UUID: [u8; 16] = [
    0x04, 0x5d, 0x88, 0x8a, 0xeb, 0x1c, 0xc9, 0x11, 0x9f, 0xe8, 0x08, 0x00, 0x2b, 0x10, 0x48,
    0x60,
];

const RPC_VERSION_MAJOR: u8 = 5;
const RPC_VERSION_MINOR: u8 = 0;

const PTYPE_REQUEST: u8 = 0;
const PTYPE_RESPONSE: u8 = 2;
const PTYPE_BIND: u8 = 11;
const PTYPE_BIND_ACK: u8 = 12;

/// First + last fragment
const PFC_FLAGS: u8 = 0x03;

pub const OP_SHARE_ENUM: u16 = 15;
pub const OP_SHARE_GET_INFO: u16 = 16;

/// Info level carrying the security descriptor
const SHARE_INFO_LEVEL_502: u32 = 502;

/// A share entry from `NetrShareEnum` level 1
#[derive(Debug, Clone)]
pub struct RawShare {
    pub name: String,
    pub share_type: u32,
    pub remark: String,
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Little-endian data representation label
fn put_drep(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&[0x10, 0x00, 0x00, 0x00]);
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Conformant varying wide string with trailing null, 4-byte aligned
fn put_ndr_wstring(buf: &mut Vec<u8>, s: &str) {
    let units: Vec<u16> = s.encode_utf16().chain(std::iter::once(0)).collect();
    put_u32(buf, units.len() as u32); // max count
    put_u32(buf, 0); // offset
    put_u32(buf, units.len() as u32); // actual count
    for unit in units {
        put_u16(buf, unit);
    }
    pad4(buf);
}

/// Build the bind request for the share-service interface.
pub fn build_bind(call_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(72);

    buf.push(RPC_VERSION_MAJOR);
    buf.push(RPC_VERSION_MINOR);
    buf.push(PTYPE_BIND);
    buf.push(PFC_FLAGS);
    put_drep(&mut buf);
    put_u16(&mut buf, 72); // frag length
    put_u16(&mut buf, 0); // auth length
    put_u32(&mut buf, call_id);

    put_u16(&mut buf, 4280); // max xmit frag
    put_u16(&mut buf, 4280); // max recv frag
    put_u32(&mut buf, 0); // assoc group
    put_u32(&mut buf, 1); // context items

    put_u16(&mut buf, 0); // context id
    put_u16(&mut buf, 1); // transfer items

    buf.extend_from_slice(&SRVSVC_UUID);
    put_u16(&mut buf, 3); // interface version major
    put_u16(&mut buf, 0); // interface version minor

    buf.extend_from_slice(&NDR_UUID);
    put_u32(&mut buf, 2); // transfer syntax version

    debug_assert_eq!(buf.len(), 72);
    buf
}

/// Verify a bind response is a bind-ack.
pub fn check_bind_ack(response: &[u8]) -> SmbResult<()> {
    if response.len() < 24 {
        return Err(SmbError::Rpc("bind response too short".into()));
    }
    if response[2] != PTYPE_BIND_ACK {
        return Err(SmbError::Rpc(format!(
            "unexpected bind response type: {}",
            response[2]
        )));
    }
    Ok(())
}

/// Wrap a stub in a request packet.
pub fn build_request(call_id: u32, opnum: u16, stub: &[u8]) -> Vec<u8> {
    let frag_len = (24 + stub.len()) as u16;
    let mut buf = Vec::with_capacity(frag_len as usize);

    buf.push(RPC_VERSION_MAJOR);
    buf.push(RPC_VERSION_MINOR);
    buf.push(PTYPE_REQUEST);
    buf.push(PFC_FLAGS);
    put_drep(&mut buf);
    put_u16(&mut buf, frag_len);
    put_u16(&mut buf, 0); // auth length
    put_u32(&mut buf, call_id);

    put_u32(&mut buf, stub.len() as u32); // alloc hint
    put_u16(&mut buf, 0); // context id
    put_u16(&mut buf, opnum);

    buf.extend_from_slice(stub);
    buf
}

/// Strip the response header and return the stub payload.
pub fn response_payload(response: &[u8]) -> SmbResult<&[u8]> {
    if response.len() < 24 {
        return Err(SmbError::Rpc("response too short".into()));
    }
    if response[2] != PTYPE_RESPONSE {
        return Err(SmbError::Rpc(format!(
            "unexpected response type: {}",
            response[2]
        )));
    }
    Ok(&response[24..])
}

/// The Win32 status in the stub's last four bytes.
fn return_code(payload: &[u8]) -> SmbResult<u32> {
    if payload.len() < 4 {
        return Err(SmbError::Rpc("payload too short".into()));
    }
    Ok(le_u32(payload, payload.len() - 4))
}

// ---------------------------------------------------------------------
// NetrShareEnum (opnum 15, level 1)
// ---------------------------------------------------------------------

/// Build the `NetrShareEnum` stub requesting SHARE_INFO_1 entries.
pub fn build_share_enum_stub(server_name: &str) -> Vec<u8> {
    let mut stub = Vec::new();

    // ServerName: unique pointer to wide string
    put_u32(&mut stub, 0x0002_0000); // referent id
    put_ndr_wstring(&mut stub, server_name);

    // InfoStruct: level 1 with an empty container
    put_u32(&mut stub, 1); // level
    put_u32(&mut stub, 1); // union discriminant
    put_u32(&mut stub, 0x0002_0004); // referent id for container
    put_u32(&mut stub, 0); // entries read
    put_u32(&mut stub, 0); // null array pointer

    put_u32(&mut stub, 0xffff_ffff); // preferred maximum length

    // ResumeHandle: unique pointer to zero
    put_u32(&mut stub, 0x0002_0008);
    put_u32(&mut stub, 0);

    stub
}

/// Parse a `NetrShareEnum` level-1 response.
///
/// The container holds a conformant array of `SHARE_INFO_1` headers
/// (name pointer, type, remark pointer) followed by the deferred
/// strings in order.
pub fn parse_share_enum(payload: &[u8]) -> SmbResult<Vec<RawShare>> {
    let code = return_code(payload)?;
    if code != 0 {
        return Err(SmbError::Rpc(format!(
            "NetrShareEnum failed with code: 0x{:08x}",
            code
        )));
    }

    // level(4) discriminant(4) container-ptr(4) count(4) array-ptr(4) maxcount(4)
    if payload.len() < 24 {
        return Err(SmbError::Rpc("share enum payload too short".into()));
    }
    let count = le_u32(payload, 12) as usize;
    if count == 0 {
        return Ok(Vec::new());
    }
    if count > 10_000 {
        return Err(SmbError::Rpc(format!("implausible share count: {}", count)));
    }

    let mut pos = 24usize;

    // Entry headers: namePtr(4) type(4) remarkPtr(4)
    let mut types = Vec::with_capacity(count);
    for _ in 0..count {
        if pos + 12 > payload.len() {
            return Err(SmbError::Rpc("truncated share entry headers".into()));
        }
        types.push(le_u32(payload, pos + 4));
        pos += 12;
    }

    // Deferred strings: name then remark per entry
    let mut shares = Vec::with_capacity(count);
    for share_type in types {
        let name = read_ndr_wstring(payload, &mut pos)?;
        let remark = read_ndr_wstring(payload, &mut pos)?;
        shares.push(RawShare {
            name,
            share_type,
            remark,
        });
    }

    Ok(shares)
}

fn read_ndr_wstring(payload: &[u8], pos: &mut usize) -> SmbResult<String> {
    if *pos + 12 > payload.len() {
        return Err(SmbError::Rpc("truncated string header".into()));
    }
    let actual = le_u32(payload, *pos + 8) as usize;
    *pos += 12;

    let byte_len = actual * 2;
    if *pos + byte_len > payload.len() {
        return Err(SmbError::Rpc("truncated string data".into()));
    }
    let text = from_utf16le(&payload[*pos..*pos + byte_len]);
    *pos += byte_len;
    while *pos % 4 != 0 {
        *pos += 1;
    }

    Ok(text.trim_end_matches('\0').to_string())
}

// ---------------------------------------------------------------------
// NetrShareGetInfo (opnum 16, level 502)
// ---------------------------------------------------------------------

/// Build the `NetrShareGetInfo` stub: server name, share name, level 502.
pub fn build_share_get_info_stub(server_name: &str, share_name: &str) -> Vec<u8> {
    let mut stub = Vec::new();
    put_ndr_wstring(&mut stub, server_name);
    put_ndr_wstring(&mut stub, share_name);
    put_u32(&mut stub, SHARE_INFO_LEVEL_502);
    stub
}

/// Locate the self-relative security descriptor inside a
/// `NetrShareGetInfo` level-502 response.
///
/// Scans for `{revision = 0x01, reserved = 0x00, control with
/// SE_DACL_PRESENT or SE_SELF_RELATIVE}`, validates the candidate by
/// parsing it and checking for a DACL, then recovers its length via the
/// offset rule.
pub fn extract_security_descriptor(payload: &[u8]) -> SmbResult<Vec<u8>> {
    let code = return_code(payload)?;
    if code != 0 {
        return Err(SmbError::Rpc(format!(
            "NetrShareGetInfo failed with code: 0x{:08x}",
            code
        )));
    }

    if payload.len() < 20 {
        return Err(SmbError::Rpc("payload too short".into()));
    }

    for i in 0..payload.len() - 20 {
        if payload[i] != 0x01 || payload[i + 1] != 0x00 {
            continue;
        }
        let control = le_u16(payload, i + 2);
        if control & (descriptor::SE_DACL_PRESENT | descriptor::SE_SELF_RELATIVE) == 0 {
            continue;
        }

        let candidate = &payload[i..];
        match SecurityDescriptor::parse(candidate) {
            Ok(sd) if sd.dacl.is_some() => {
                let sd_len = descriptor::self_relative_len(candidate);
                if sd_len > 0 && i + sd_len <= payload.len() {
                    return Ok(payload[i..i + sd_len].to_vec());
                }
            }
            _ => {}
        }
    }

    Err(SmbError::Rpc(
        "security descriptor not found in response".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb::descriptor::{SE_DACL_PRESENT, SE_SELF_RELATIVE};

    #[test]
    fn test_bind_packet_shape() {
        let bind = build_bind(1);
        assert_eq!(bind.len(), 72);
        assert_eq!(bind[0], 5);
        assert_eq!(bind[2], PTYPE_BIND);
        assert_eq!(le_u16(&bind, 8), 72);
        // Interface UUID sits after the context item header
        assert_eq!(&bind[28 + 4..28 + 4 + 16], &SRVSVC_UUID);
    }

    #[test]
    fn test_request_wrapping() {
        let stub = vec![0xaa; 10];
        let req = build_request(2, OP_SHARE_GET_INFO, &stub);
        assert_eq!(req[2], PTYPE_REQUEST);
        assert_eq!(le_u16(&req, 8) as usize, 24 + stub.len());
        assert_eq!(le_u16(&req, 22), OP_SHARE_GET_INFO);
        assert_eq!(&req[24..], &stub[..]);
    }

    #[test]
    fn test_bind_ack_check() {
        let mut resp = vec![0u8; 24];
        resp[2] = PTYPE_BIND_ACK;
        assert!(check_bind_ack(&resp).is_ok());
        resp[2] = 3; // fault
        assert!(check_bind_ack(&resp).is_err());
    }

    fn sample_descriptor() -> Vec<u8> {
        // revision 1, control DACL_PRESENT|SELF_RELATIVE, DACL at 20
        // with one allowed ACE for S-1-1-0
        let sid = vec![
            0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut ace = vec![0x00, 0x00];
        ace.extend_from_slice(&(8 + sid.len() as u16).to_le_bytes());
        ace.extend_from_slice(&0x001F01FFu32.to_le_bytes());
        ace.extend_from_slice(&sid);

        let mut acl = vec![0x02, 0x00];
        acl.extend_from_slice(&((8 + ace.len()) as u16).to_le_bytes());
        acl.extend_from_slice(&1u16.to_le_bytes());
        acl.extend_from_slice(&[0x00, 0x00]);
        acl.extend_from_slice(&ace);

        let mut sd = vec![0x01, 0x00];
        sd.extend_from_slice(&(SE_DACL_PRESENT | SE_SELF_RELATIVE).to_le_bytes());
        sd.extend_from_slice(&[0u8; 12]); // owner, group, sacl offsets
        sd.extend_from_slice(&20u32.to_le_bytes());
        sd.extend_from_slice(&acl);
        sd
    }

    #[test]
    fn test_descriptor_extraction_by_signature_scan() {
        let sd = sample_descriptor();

        // Simulated response stub: NDR noise, descriptor, noise, rc=0
        let mut payload = vec![0x00, 0x00, 0x02, 0x00, 0x55, 0x66, 0x77, 0x88];
        let sd_start = payload.len();
        payload.extend_from_slice(&sd);
        payload.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        payload.extend_from_slice(&0u32.to_le_bytes()); // return code

        let extracted = extract_security_descriptor(&payload).unwrap();
        assert_eq!(extracted, &payload[sd_start..sd_start + sd.len()]);

        let parsed = SecurityDescriptor::parse(&extracted).unwrap();
        assert_eq!(parsed.dacl.unwrap().aces.len(), 1);
    }

    #[test]
    fn test_descriptor_extraction_error_code() {
        let mut payload = vec![0u8; 20];
        payload.extend_from_slice(&0x0000_0005u32.to_le_bytes()); // ERROR_ACCESS_DENIED
        assert!(matches!(
            extract_security_descriptor(&payload),
            Err(SmbError::Rpc(_))
        ));
    }

    #[test]
    fn test_descriptor_not_found() {
        let mut payload = vec![0x42u8; 64];
        let len = payload.len();
        payload[len - 4..].copy_from_slice(&0u32.to_le_bytes());
        assert!(extract_security_descriptor(&payload).is_err());
    }

    #[test]
    fn test_share_enum_roundtrip() {
        // Hand-build a level-1 response with two shares
        let mut payload = Vec::new();
        put_u32(&mut payload, 1); // level
        put_u32(&mut payload, 1); // discriminant
        put_u32(&mut payload, 0x0002_0000); // container ptr
        put_u32(&mut payload, 2); // count
        put_u32(&mut payload, 0x0002_0004); // array ptr
        put_u32(&mut payload, 2); // max count

        for (i, stype) in [(0u32, 0u32), (1, 0x8000_0000)] {
            put_u32(&mut payload, 0x0002_0008 + i * 8); // name ptr
            put_u32(&mut payload, stype);
            put_u32(&mut payload, 0x0002_000c + i * 8); // remark ptr
        }
        put_ndr_wstring(&mut payload, "data");
        put_ndr_wstring(&mut payload, "team share");
        put_ndr_wstring(&mut payload, "ADMIN$");
        put_ndr_wstring(&mut payload, "Remote Admin");

        put_u32(&mut payload, 2); // total entries
        put_u32(&mut payload, 0x0002_0010); // resume ptr
        put_u32(&mut payload, 0); // resume value
        put_u32(&mut payload, 0); // return code

        let shares = parse_share_enum(&payload).unwrap();
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].name, "data");
        assert_eq!(shares[0].remark, "team share");
        assert_eq!(shares[1].name, "ADMIN$");
        assert_eq!(shares[1].share_type, 0x8000_0000);
    }

    #[test]
    fn test_share_enum_error_code() {
        let mut payload = vec![0u8; 24];
        payload.extend_from_slice(&5u32.to_le_bytes());
        assert!(parse_share_enum(&payload).is_err());
    }
}
