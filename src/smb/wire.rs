//! SMB2 wire codecs
//!
//! Request builders and response parsers for the handful of SMB 2.0.2
//! commands the crawler needs: NEGOTIATE, SESSION_SETUP, TREE_CONNECT,
//! TREE_DISCONNECT, CREATE, CLOSE, READ, WRITE, ECHO, QUERY_DIRECTORY,
//! and QUERY_INFO. Offsets inside request bodies are relative to the
//! start of the 64-byte packet header, per the protocol.

use crate::error::{SmbError, SmbResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// SMB2 commands
pub const SMB2_NEGOTIATE: u16 = 0x0000;
pub const SMB2_SESSION_SETUP: u16 = 0x0001;
pub const SMB2_LOGOFF: u16 = 0x0002;
pub const SMB2_TREE_CONNECT: u16 = 0x0003;
pub const SMB2_TREE_DISCONNECT: u16 = 0x0004;
pub const SMB2_CREATE: u16 = 0x0005;
pub const SMB2_CLOSE: u16 = 0x0006;
pub const SMB2_READ: u16 = 0x0008;
pub const SMB2_WRITE: u16 = 0x0009;
pub const SMB2_ECHO: u16 = 0x000d;
pub const SMB2_QUERY_DIRECTORY: u16 = 0x000e;
pub const SMB2_QUERY_INFO: u16 = 0x0010;

/// NT status codes
pub const STATUS_SUCCESS: u32 = 0x0000_0000;
pub const STATUS_PENDING: u32 = 0x0000_0103;
pub const STATUS_BUFFER_OVERFLOW: u32 = 0x8000_0005;
pub const STATUS_NO_MORE_FILES: u32 = 0x8000_0006;
pub const STATUS_MORE_PROCESSING_REQUIRED: u32 = 0xc000_0016;

/// Header flags
pub const SMB2_FLAGS_SERVER_TO_REDIR: u32 = 0x0000_0001;
pub const SMB2_FLAGS_SIGNED: u32 = 0x0000_0008;

/// Negotiate security modes
pub const SMB2_NEGOTIATE_SIGNING_ENABLED: u16 = 0x0001;
pub const SMB2_NEGOTIATE_SIGNING_REQUIRED: u16 = 0x0002;

/// The one dialect this client speaks
pub const DIALECT_0202: u16 = 0x0202;

/// File attribute flags used from directory listings
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;

/// CREATE desired-access bits
pub const FILE_READ_DATA: u32 = 0x0000_0001;
pub const FILE_READ_ATTRIBUTES: u32 = 0x0000_0080;
pub const READ_CONTROL: u32 = 0x0002_0000;
pub const FILE_LIST_DIRECTORY: u32 = 0x0000_0001;
pub const PIPE_ACCESS: u32 = 0x0012_019f;

/// CREATE options
pub const FILE_DIRECTORY_FILE: u32 = 0x0000_0001;
pub const FILE_NON_DIRECTORY_FILE: u32 = 0x0000_0040;

/// QUERY_INFO security-information bits
pub const OWNER_SECURITY_INFORMATION: u32 = 0x0000_0001;
pub const GROUP_SECURITY_INFORMATION: u32 = 0x0000_0002;
pub const DACL_SECURITY_INFORMATION: u32 = 0x0000_0004;

/// Seconds between the FILETIME epoch (1601) and the Unix epoch (1970)
const FILETIME_UNIX_DELTA: i64 = 11_644_473_600;

pub(crate) fn le_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

pub(crate) fn le_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

pub(crate) fn le_u64(data: &[u8], off: usize) -> u64 {
    u64::from_le_bytes([
        data[off],
        data[off + 1],
        data[off + 2],
        data[off + 3],
        data[off + 4],
        data[off + 5],
        data[off + 6],
        data[off + 7],
    ])
}

/// Encode a string as UTF-16LE without a terminator
pub fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Decode UTF-16LE bytes, dropping any trailing partial unit
pub fn from_utf16le(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Convert a Windows FILETIME to Unix seconds; zero means "not set"
pub fn filetime_to_unix(ft: u64) -> Option<i64> {
    if ft == 0 {
        return None;
    }
    Some((ft / 10_000_000) as i64 - FILETIME_UNIX_DELTA)
}

/// The 64-byte SMB2 packet header
#[derive(Debug, Clone, Default)]
pub struct Smb2Header {
    pub credit_charge: u16,
    pub status: u32,
    pub command: u16,
    pub credits: u16,
    pub flags: u32,
    pub message_id: u64,
    pub tree_id: u32,
    pub session_id: u64,
    pub signature: [u8; 16],
}

impl Smb2Header {
    pub const SIZE: usize = 64;

    /// Build a request header
    pub fn request(command: u16, message_id: u64, tree_id: u32, session_id: u64) -> Self {
        Smb2Header {
            credit_charge: 1,
            status: 0,
            command,
            credits: 64,
            flags: 0,
            message_id,
            tree_id,
            session_id,
            signature: [0u8; 16],
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(b"\xfeSMB");
        out[4..6].copy_from_slice(&64u16.to_le_bytes());
        out[6..8].copy_from_slice(&self.credit_charge.to_le_bytes());
        out[8..12].copy_from_slice(&self.status.to_le_bytes());
        out[12..14].copy_from_slice(&self.command.to_le_bytes());
        out[14..16].copy_from_slice(&self.credits.to_le_bytes());
        out[16..20].copy_from_slice(&self.flags.to_le_bytes());
        // next_command = 0 (no compounding)
        out[24..32].copy_from_slice(&self.message_id.to_le_bytes());
        // reserved (process id) = 0
        out[36..40].copy_from_slice(&self.tree_id.to_le_bytes());
        out[40..48].copy_from_slice(&self.session_id.to_le_bytes());
        out[48..64].copy_from_slice(&self.signature);
        out
    }

    pub fn decode(data: &[u8]) -> SmbResult<Self> {
        if data.len() < Self::SIZE {
            return Err(SmbError::ShortInput {
                what: "SMB2 header",
                needed: Self::SIZE,
                got: data.len(),
            });
        }
        if &data[0..4] != b"\xfeSMB" {
            return Err(SmbError::Protocol("bad SMB2 magic".into()));
        }

        let mut signature = [0u8; 16];
        signature.copy_from_slice(&data[48..64]);

        Ok(Smb2Header {
            credit_charge: le_u16(data, 6),
            status: le_u32(data, 8),
            command: le_u16(data, 12),
            credits: le_u16(data, 14),
            flags: le_u32(data, 16),
            message_id: le_u64(data, 24),
            tree_id: le_u32(data, 36),
            session_id: le_u64(data, 40),
            signature,
        })
    }
}

/// Sign a complete message in place with HMAC-SHA256 (dialect 2.x).
///
/// The signature field must be zeroed before calling; the first 16
/// bytes of the MAC land in header bytes 48..64.
pub fn sign_message(signing_key: &[u8; 16], message: &mut [u8]) {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(signing_key).expect("HMAC accepts any key length");
    mac.update(message);
    let digest = mac.finalize().into_bytes();
    message[48..64].copy_from_slice(&digest[..16]);
}

// ---------------------------------------------------------------------
// Request builders (body only; the header is prepended by the session)
// ---------------------------------------------------------------------

/// NEGOTIATE offering exactly the 2.0.2 dialect
pub fn build_negotiate(client_guid: &[u8; 16]) -> Vec<u8> {
    let mut body = Vec::with_capacity(38);
    body.extend_from_slice(&36u16.to_le_bytes()); // StructureSize
    body.extend_from_slice(&1u16.to_le_bytes()); // DialectCount
    body.extend_from_slice(&SMB2_NEGOTIATE_SIGNING_ENABLED.to_le_bytes());
    body.extend_from_slice(&[0u8; 2]); // Reserved
    body.extend_from_slice(&0u32.to_le_bytes()); // Capabilities
    body.extend_from_slice(client_guid);
    body.extend_from_slice(&[0u8; 8]); // ClientStartTime
    body.extend_from_slice(&DIALECT_0202.to_le_bytes());
    body
}

/// Parsed NEGOTIATE response fields the session cares about
#[derive(Debug, Clone)]
pub struct NegotiateInfo {
    pub security_mode: u16,
    pub dialect: u16,
    pub max_transact_size: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
}

impl NegotiateInfo {
    pub fn signing_required(&self) -> bool {
        self.security_mode & SMB2_NEGOTIATE_SIGNING_REQUIRED != 0
    }
}

pub fn parse_negotiate(body: &[u8]) -> SmbResult<NegotiateInfo> {
    if body.len() < 64 {
        return Err(SmbError::ShortInput {
            what: "NEGOTIATE response",
            needed: 64,
            got: body.len(),
        });
    }
    Ok(NegotiateInfo {
        security_mode: le_u16(body, 2),
        dialect: le_u16(body, 4),
        max_transact_size: le_u32(body, 28),
        max_read_size: le_u32(body, 32),
        max_write_size: le_u32(body, 36),
    })
}

/// SESSION_SETUP carrying a security token
pub fn build_session_setup(token: &[u8]) -> Vec<u8> {
    let offset = (Smb2Header::SIZE + 24) as u16; // fixed body is 24 bytes
    let mut body = Vec::with_capacity(24 + token.len());
    body.extend_from_slice(&25u16.to_le_bytes()); // StructureSize
    body.push(0); // Flags
    body.push(SMB2_NEGOTIATE_SIGNING_ENABLED as u8); // SecurityMode
    body.extend_from_slice(&0u32.to_le_bytes()); // Capabilities
    body.extend_from_slice(&0u32.to_le_bytes()); // Channel
    body.extend_from_slice(&offset.to_le_bytes());
    body.extend_from_slice(&(token.len() as u16).to_le_bytes());
    body.extend_from_slice(&0u64.to_le_bytes()); // PreviousSessionId
    body.extend_from_slice(token);
    body
}

/// Extract the server's security token from a SESSION_SETUP response
pub fn parse_session_setup(body: &[u8]) -> SmbResult<Vec<u8>> {
    if body.len() < 8 {
        return Err(SmbError::ShortInput {
            what: "SESSION_SETUP response",
            needed: 8,
            got: body.len(),
        });
    }
    let offset = le_u16(body, 4) as usize;
    let length = le_u16(body, 6) as usize;
    if offset < Smb2Header::SIZE {
        return Ok(Vec::new());
    }
    let start = offset - Smb2Header::SIZE;
    if start + length > body.len() {
        return Err(SmbError::Protocol("security buffer out of bounds".into()));
    }
    Ok(body[start..start + length].to_vec())
}

/// TREE_CONNECT to a `\\host\share` path
pub fn build_tree_connect(unc_path: &str) -> Vec<u8> {
    let path = utf16le(unc_path);
    let offset = (Smb2Header::SIZE + 8) as u16;
    let mut body = Vec::with_capacity(8 + path.len());
    body.extend_from_slice(&9u16.to_le_bytes()); // StructureSize
    body.extend_from_slice(&[0u8; 2]); // Reserved
    body.extend_from_slice(&offset.to_le_bytes());
    body.extend_from_slice(&(path.len() as u16).to_le_bytes());
    body.extend_from_slice(&path);
    body
}

pub fn build_tree_disconnect() -> Vec<u8> {
    let mut body = Vec::with_capacity(4);
    body.extend_from_slice(&4u16.to_le_bytes());
    body.extend_from_slice(&[0u8; 2]);
    body
}

pub fn build_logoff() -> Vec<u8> {
    let mut body = Vec::with_capacity(4);
    body.extend_from_slice(&4u16.to_le_bytes());
    body.extend_from_slice(&[0u8; 2]);
    body
}

pub fn build_echo() -> Vec<u8> {
    let mut body = Vec::with_capacity(4);
    body.extend_from_slice(&4u16.to_le_bytes());
    body.extend_from_slice(&[0u8; 2]);
    body
}

/// CREATE (open) a file, directory, or pipe by share-relative name.
/// An empty name opens the share root.
pub fn build_create(name: &str, desired_access: u32, create_options: u32) -> Vec<u8> {
    let name_utf16 = utf16le(name);
    let name_offset = (Smb2Header::SIZE + 56) as u16;

    let mut body = Vec::with_capacity(56 + name_utf16.len().max(1));
    body.extend_from_slice(&57u16.to_le_bytes()); // StructureSize
    body.push(0); // SecurityFlags
    body.push(0); // RequestedOplockLevel
    body.extend_from_slice(&2u32.to_le_bytes()); // ImpersonationLevel
    body.extend_from_slice(&0u64.to_le_bytes()); // SmbCreateFlags
    body.extend_from_slice(&0u64.to_le_bytes()); // Reserved
    body.extend_from_slice(&desired_access.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes()); // FileAttributes
    body.extend_from_slice(&7u32.to_le_bytes()); // ShareAccess: read|write|delete
    body.extend_from_slice(&1u32.to_le_bytes()); // CreateDisposition: FILE_OPEN
    body.extend_from_slice(&create_options.to_le_bytes());
    body.extend_from_slice(&name_offset.to_le_bytes());
    body.extend_from_slice(&(name_utf16.len() as u16).to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes()); // CreateContextsOffset
    body.extend_from_slice(&0u32.to_le_bytes()); // CreateContextsLength

    if name_utf16.is_empty() {
        // The buffer must contain at least one byte
        body.push(0);
    } else {
        body.extend_from_slice(&name_utf16);
    }
    body
}

/// Extract the 16-byte file id from a CREATE response
pub fn parse_create(body: &[u8]) -> SmbResult<[u8; 16]> {
    // FileId sits at fixed offset 64 in the response body
    if body.len() < 80 {
        return Err(SmbError::ShortInput {
            what: "CREATE response",
            needed: 80,
            got: body.len(),
        });
    }
    let mut file_id = [0u8; 16];
    file_id.copy_from_slice(&body[64..80]);
    Ok(file_id)
}

pub fn build_close(file_id: &[u8; 16]) -> Vec<u8> {
    let mut body = Vec::with_capacity(24);
    body.extend_from_slice(&24u16.to_le_bytes()); // StructureSize
    body.extend_from_slice(&[0u8; 2]); // Flags
    body.extend_from_slice(&[0u8; 4]); // Reserved
    body.extend_from_slice(file_id);
    body
}

/// QUERY_DIRECTORY with the FileDirectoryInformation class
pub fn build_query_directory(
    file_id: &[u8; 16],
    pattern: &str,
    restart: bool,
    output_len: u32,
) -> Vec<u8> {
    let pattern_utf16 = utf16le(pattern);
    let name_offset = (Smb2Header::SIZE + 32) as u16;

    let mut body = Vec::with_capacity(32 + pattern_utf16.len());
    body.extend_from_slice(&33u16.to_le_bytes()); // StructureSize
    body.push(0x01); // FileInformationClass: FileDirectoryInformation
    body.push(if restart { 0x01 } else { 0x00 }); // Flags: SMB2_RESTART_SCANS
    body.extend_from_slice(&0u32.to_le_bytes()); // FileIndex
    body.extend_from_slice(file_id);
    body.extend_from_slice(&name_offset.to_le_bytes());
    body.extend_from_slice(&(pattern_utf16.len() as u16).to_le_bytes());
    body.extend_from_slice(&output_len.to_le_bytes());
    body.extend_from_slice(&pattern_utf16);
    body
}

/// One entry from a directory listing
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub created_unix: Option<i64>,
    pub modified_unix: Option<i64>,
}

impl DirEntry {
    /// True for the `.` and `..` pseudo-entries
    pub fn is_special(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Parse a QUERY_DIRECTORY response into entries.
pub fn parse_query_directory(body: &[u8]) -> SmbResult<Vec<DirEntry>> {
    if body.len() < 8 {
        return Err(SmbError::ShortInput {
            what: "QUERY_DIRECTORY response",
            needed: 8,
            got: body.len(),
        });
    }
    let offset = le_u16(body, 2) as usize;
    let length = le_u32(body, 4) as usize;
    if offset < Smb2Header::SIZE {
        return Ok(Vec::new());
    }
    let start = offset - Smb2Header::SIZE;
    if start + length > body.len() {
        return Err(SmbError::Protocol("directory buffer out of bounds".into()));
    }

    let buf = &body[start..start + length];
    let mut entries = Vec::new();
    let mut pos = 0usize;

    // FILE_DIRECTORY_INFORMATION: next(4) index(4) times(4x8) eof(8)
    // alloc(8) attrs(4) name_len(4) name
    loop {
        if pos + 64 > buf.len() {
            break;
        }
        let next = le_u32(buf, pos) as usize;
        let created = le_u64(buf, pos + 8);
        let modified = le_u64(buf, pos + 24);
        let eof = le_u64(buf, pos + 40);
        let attrs = le_u32(buf, pos + 56);
        let name_len = le_u32(buf, pos + 60) as usize;

        if pos + 64 + name_len > buf.len() {
            break;
        }
        let name = from_utf16le(&buf[pos + 64..pos + 64 + name_len]);

        entries.push(DirEntry {
            name,
            is_directory: attrs & FILE_ATTRIBUTE_DIRECTORY != 0,
            size: eof,
            created_unix: filetime_to_unix(created),
            modified_unix: filetime_to_unix(modified),
        });

        if next == 0 {
            break;
        }
        pos += next;
    }

    Ok(entries)
}

/// QUERY_INFO for a security descriptor (owner + group + DACL)
pub fn build_query_info_security(file_id: &[u8; 16], output_len: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(41);
    body.extend_from_slice(&41u16.to_le_bytes()); // StructureSize
    body.push(0x03); // InfoType: SECURITY
    body.push(0); // FileInfoClass
    body.extend_from_slice(&output_len.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes()); // InputBufferOffset
    body.extend_from_slice(&[0u8; 2]); // Reserved
    body.extend_from_slice(&0u32.to_le_bytes()); // InputBufferLength
    let additional =
        OWNER_SECURITY_INFORMATION | GROUP_SECURITY_INFORMATION | DACL_SECURITY_INFORMATION;
    body.extend_from_slice(&additional.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes()); // Flags
    body.extend_from_slice(file_id);
    body.push(0); // Buffer placeholder
    body
}

/// Extract the raw output buffer from a QUERY_INFO response
pub fn parse_query_info(body: &[u8]) -> SmbResult<Vec<u8>> {
    if body.len() < 8 {
        return Err(SmbError::ShortInput {
            what: "QUERY_INFO response",
            needed: 8,
            got: body.len(),
        });
    }
    let offset = le_u16(body, 2) as usize;
    let length = le_u32(body, 4) as usize;
    if offset < Smb2Header::SIZE {
        return Ok(Vec::new());
    }
    let start = offset - Smb2Header::SIZE;
    if start + length > body.len() {
        return Err(SmbError::Protocol("info buffer out of bounds".into()));
    }
    Ok(body[start..start + length].to_vec())
}

/// READ from an open file or pipe at offset 0
pub fn build_read(file_id: &[u8; 16], length: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(49);
    body.extend_from_slice(&49u16.to_le_bytes()); // StructureSize
    body.push(0); // Padding
    body.push(0); // Flags
    body.extend_from_slice(&length.to_le_bytes());
    body.extend_from_slice(&0u64.to_le_bytes()); // Offset
    body.extend_from_slice(file_id);
    body.extend_from_slice(&0u32.to_le_bytes()); // MinimumCount
    body.extend_from_slice(&0u32.to_le_bytes()); // Channel
    body.extend_from_slice(&0u32.to_le_bytes()); // RemainingBytes
    body.extend_from_slice(&0u16.to_le_bytes()); // ReadChannelInfoOffset
    body.extend_from_slice(&0u16.to_le_bytes()); // ReadChannelInfoLength
    body.push(0); // Buffer placeholder
    body
}

/// Extract data from a READ response
pub fn parse_read(body: &[u8]) -> SmbResult<Vec<u8>> {
    if body.len() < 16 {
        return Err(SmbError::ShortInput {
            what: "READ response",
            needed: 16,
            got: body.len(),
        });
    }
    let offset = body[2] as usize;
    let length = le_u32(body, 4) as usize;
    if length == 0 {
        return Ok(Vec::new());
    }
    if offset < Smb2Header::SIZE {
        return Err(SmbError::Protocol("read data offset inside header".into()));
    }
    let start = offset - Smb2Header::SIZE;
    if start + length > body.len() {
        return Err(SmbError::Protocol("read data out of bounds".into()));
    }
    Ok(body[start..start + length].to_vec())
}

/// WRITE to an open file or pipe at offset 0
pub fn build_write(file_id: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let data_offset = (Smb2Header::SIZE + 48) as u16;
    let mut body = Vec::with_capacity(48 + data.len());
    body.extend_from_slice(&49u16.to_le_bytes()); // StructureSize
    body.extend_from_slice(&data_offset.to_le_bytes());
    body.extend_from_slice(&(data.len() as u32).to_le_bytes());
    body.extend_from_slice(&0u64.to_le_bytes()); // Offset
    body.extend_from_slice(file_id);
    body.extend_from_slice(&0u32.to_le_bytes()); // Channel
    body.extend_from_slice(&0u32.to_le_bytes()); // RemainingBytes
    body.extend_from_slice(&0u16.to_le_bytes()); // WriteChannelInfoOffset
    body.extend_from_slice(&0u16.to_le_bytes()); // WriteChannelInfoLength
    body.extend_from_slice(&0u32.to_le_bytes()); // Flags
    body.extend_from_slice(data);
    body
}
