//! NTLMSSP authentication
//!
//! Builds the NEGOTIATE (type 1) and AUTHENTICATE (type 3) messages and
//! computes the NTLMv2 response from either a password or a raw NT
//! hash. Tokens are exchanged inside a minimal SPNEGO wrapper; the
//! server's CHALLENGE (type 2) is located inside its token by signature
//! rather than by a full DER decode.
//!
//! The session base key (HMAC-MD5 of the NTLMv2 hash over the proof) is
//! returned so the SMB2 layer can sign packets when the peer requires
//! signing. No key exchange is negotiated.

use crate::creds::Credentials;
use crate::error::{SmbError, SmbResult};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacMd5 = Hmac<Md5>;

const NTLM_SIGNATURE: &[u8] = b"NTLMSSP\x00";
const NTLM_TYPE_NEGOTIATE: u32 = 1;
const NTLM_TYPE_CHALLENGE: u32 = 2;
const NTLM_TYPE_AUTHENTICATE: u32 = 3;

/// Negotiate flags this client offers
const NEGOTIATE_FLAGS: u32 = 0x0000_0001 // UNICODE
    | 0x0000_0004 // REQUEST_TARGET
    | 0x0000_0010 // SIGN
    | 0x0000_0200 // NTLM
    | 0x0000_8000 // ALWAYS_SIGN
    | 0x0008_0000 // EXTENDED_SESSIONSECURITY
    | 0x0080_0000 // TARGET_INFO
    | 0x2000_0000 // 128-bit
    | 0x8000_0000; // 56-bit

/// Seconds between 1601 and 1970, in 100ns FILETIME units
const FILETIME_UNIX_DELTA: u64 = 11_644_473_600;

fn le_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let mut mac = HmacMd5::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let out = mac.finalize().into_bytes();
    let mut result = [0u8; 16];
    result.copy_from_slice(&out);
    result
}

/// NT one-way function: MD4 of the UTF-16LE password
pub fn nt_hash(password: &str) -> [u8; 16] {
    let mut hasher = Md4::new();
    hasher.update(utf16le(password));
    let out = hasher.finalize();
    let mut result = [0u8; 16];
    result.copy_from_slice(&out);
    result
}

/// The parsed fields of a CHALLENGE message this client consumes
#[derive(Debug, Clone)]
pub struct Challenge {
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

/// Result of completing authentication
pub struct NtlmAuth {
    /// AUTHENTICATE message bytes
    pub token: Vec<u8>,
    /// Session base key for SMB2 signing
    pub session_key: [u8; 16],
}

/// Build the NEGOTIATE (type 1) message.
pub fn build_negotiate_token() -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(NTLM_SIGNATURE);
    out.extend_from_slice(&NTLM_TYPE_NEGOTIATE.to_le_bytes());
    out.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
    // Empty domain and workstation fields
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&[0u8; 8]);
    out
}

/// Locate and parse the CHALLENGE (type 2) message inside a server
/// token. The token may be SPNEGO-wrapped; the NTLMSSP payload is found
/// by signature scan.
pub fn parse_challenge_token(token: &[u8]) -> SmbResult<Challenge> {
    let start = find_ntlm_message(token, NTLM_TYPE_CHALLENGE)
        .ok_or_else(|| SmbError::Protocol("no NTLM challenge in security token".into()))?;
    let msg = &token[start..];

    if msg.len() < 48 {
        return Err(SmbError::ShortInput {
            what: "NTLM challenge",
            needed: 48,
            got: msg.len(),
        });
    }

    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(&msg[24..32]);

    // TargetInfo field descriptor: len(2) maxlen(2) offset(4) at 40
    let ti_len = u16::from_le_bytes([msg[40], msg[41]]) as usize;
    let ti_off = le_u32(msg, 44) as usize;
    let target_info = if ti_len > 0 && ti_off + ti_len <= msg.len() {
        msg[ti_off..ti_off + ti_len].to_vec()
    } else {
        Vec::new()
    };

    Ok(Challenge {
        server_challenge,
        target_info,
    })
}

fn find_ntlm_message(token: &[u8], msg_type: u32) -> Option<usize> {
    if token.len() < 12 {
        return None;
    }
    for i in 0..=token.len() - 12 {
        if token[i..].starts_with(NTLM_SIGNATURE) && le_u32(token, i + 8) == msg_type {
            return Some(i);
        }
    }
    None
}

/// Compute the NTLMv2 response and build the AUTHENTICATE message.
///
/// Anonymous credentials (empty user) produce an empty NT response,
/// which servers treat as an anonymous or guest logon.
pub fn build_authenticate_token(
    creds: &Credentials,
    challenge: &Challenge,
) -> SmbResult<NtlmAuth> {
    let domain16 = utf16le(&creds.domain);
    let user16 = utf16le(&creds.username);
    let workstation16 = utf16le("");

    let (nt_response, session_key) = if creds.is_anonymous() {
        (Vec::new(), [0u8; 16])
    } else {
        let ntowf = match creds.nt_hash_raw() {
            Some(hash) => hash,
            None => nt_hash(&creds.password),
        };
        let ntlmv2_hash = hmac_md5(
            &ntowf,
            &utf16le(&format!(
                "{}{}",
                creds.username.to_uppercase(),
                creds.domain
            )),
        );

        let mut client_challenge = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut client_challenge);

        let timestamp = filetime_now();

        // NTLMv2 blob
        let mut blob = Vec::with_capacity(32 + challenge.target_info.len());
        blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]); // version
        blob.extend_from_slice(&[0u8; 4]); // reserved
        blob.extend_from_slice(&timestamp.to_le_bytes());
        blob.extend_from_slice(&client_challenge);
        blob.extend_from_slice(&[0u8; 4]); // unknown
        blob.extend_from_slice(&challenge.target_info);
        blob.extend_from_slice(&[0u8; 4]); // terminator pad

        let mut proof_input = Vec::with_capacity(8 + blob.len());
        proof_input.extend_from_slice(&challenge.server_challenge);
        proof_input.extend_from_slice(&blob);
        let nt_proof = hmac_md5(&ntlmv2_hash, &proof_input);

        let mut nt_response = Vec::with_capacity(16 + blob.len());
        nt_response.extend_from_slice(&nt_proof);
        nt_response.extend_from_slice(&blob);

        let session_key = hmac_md5(&ntlmv2_hash, &nt_proof);
        (nt_response, session_key)
    };

    // LMv2 is obsolete against modern peers: send an empty LM response
    let lm_response: Vec<u8> = Vec::new();

    // AUTHENTICATE layout: 8 field descriptors after the fixed header,
    // payload ordered domain, user, workstation, LM, NT, session key
    let header_len = 64usize;
    let mut offset = header_len;
    let mut field = |data: &[u8]| {
        let desc = (data.len() as u16, data.len() as u16, offset as u32);
        offset += data.len();
        desc
    };

    let domain_f = field(&domain16);
    let user_f = field(&user16);
    let workstation_f = field(&workstation16);
    let lm_f = field(&lm_response);
    let nt_f = field(&nt_response);
    let key_f = field(&[]);

    let mut out = Vec::with_capacity(offset);
    out.extend_from_slice(NTLM_SIGNATURE);
    out.extend_from_slice(&NTLM_TYPE_AUTHENTICATE.to_le_bytes());
    for (len, maxlen, off) in [lm_f, nt_f, domain_f, user_f, workstation_f, key_f] {
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&maxlen.to_le_bytes());
        out.extend_from_slice(&off.to_le_bytes());
    }
    out.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());

    // Version and MIC omitted; payload starts right after the flags
    debug_assert_eq!(out.len(), header_len);

    out.extend_from_slice(&domain16);
    out.extend_from_slice(&user16);
    out.extend_from_slice(&workstation16);
    out.extend_from_slice(&lm_response);
    out.extend_from_slice(&nt_response);

    Ok(NtlmAuth {
        token: out,
        session_key,
    })
}

fn filetime_now() -> u64 {
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    (unix + FILETIME_UNIX_DELTA) * 10_000_000
}

// ---------------------------------------------------------------------
// Minimal SPNEGO framing
// ---------------------------------------------------------------------

/// NTLMSSP mechanism OID: 1.3.6.1.4.1.311.2.2.10
const NTLMSSP_OID: &[u8] = &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x02, 0x0a];
/// SPNEGO OID: 1.3.6.1.5.5.2
const SPNEGO_OID: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x02];

fn der_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x100 {
        vec![0x81, len as u8]
    } else if len < 0x10000 {
        vec![0x82, (len >> 8) as u8, len as u8]
    } else {
        vec![
            0x83,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ]
    }
}

fn der_wrap(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + content.len());
    out.push(tag);
    out.extend_from_slice(&der_len(content.len()));
    out.extend_from_slice(content);
    out
}

/// Wrap an NTLM NEGOTIATE token in a SPNEGO NegTokenInit.
pub fn spnego_wrap_init(ntlm_token: &[u8]) -> Vec<u8> {
    // mechTypes: SEQUENCE OF OID
    let mech_oid = der_wrap(0x06, NTLMSSP_OID);
    let mech_list = der_wrap(0x30, &mech_oid);
    let mech_types = der_wrap(0xa0, &mech_list);

    // mechToken: OCTET STRING
    let token_octets = der_wrap(0x04, ntlm_token);
    let mech_token = der_wrap(0xa2, &token_octets);

    let mut inner = Vec::new();
    inner.extend_from_slice(&mech_types);
    inner.extend_from_slice(&mech_token);
    let neg_token_init = der_wrap(0x30, &inner);
    let neg_init = der_wrap(0xa0, &neg_token_init);

    // GSS-API framing: [APPLICATION 0] { OID(spnego), token }
    let spnego_oid = der_wrap(0x06, SPNEGO_OID);
    let mut app = Vec::new();
    app.extend_from_slice(&spnego_oid);
    app.extend_from_slice(&neg_init);
    der_wrap(0x60, &app)
}

/// Wrap an NTLM AUTHENTICATE token in a SPNEGO NegTokenResp.
pub fn spnego_wrap_response(ntlm_token: &[u8]) -> Vec<u8> {
    let token_octets = der_wrap(0x04, ntlm_token);
    let response_token = der_wrap(0xa2, &token_octets);
    let neg_token_resp = der_wrap(0x30, &response_token);
    der_wrap(0xa1, &neg_token_resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creds::Credentials;

    #[test]
    fn test_nt_hash_known_vector() {
        // MD4(UTF16LE("password"))
        let hash = nt_hash("password");
        assert_eq!(
            hash,
            [
                0x88, 0x46, 0xf7, 0xea, 0xee, 0x8f, 0xb1, 0x17, 0xad, 0x06, 0xbd, 0xd8, 0x30,
                0xb7, 0x58, 0x6c
            ]
        );
    }

    #[test]
    fn test_negotiate_token_shape() {
        let token = build_negotiate_token();
        assert!(token.starts_with(b"NTLMSSP\x00"));
        assert_eq!(le_u32(&token, 8), 1);
    }

    fn fake_challenge() -> Vec<u8> {
        // Minimal type-2: signature, type, target name fields, flags,
        // challenge, context, target info fields, then target info
        let target_info = {
            // One AV pair: MsvAvNbDomainName("D") + terminator
            let mut ti = Vec::new();
            ti.extend_from_slice(&2u16.to_le_bytes());
            ti.extend_from_slice(&2u16.to_le_bytes());
            ti.extend_from_slice(&utf16le("D"));
            ti.extend_from_slice(&0u16.to_le_bytes());
            ti.extend_from_slice(&0u16.to_le_bytes());
            ti
        };

        let mut msg = Vec::new();
        msg.extend_from_slice(b"NTLMSSP\x00");
        msg.extend_from_slice(&2u32.to_le_bytes());
        msg.extend_from_slice(&[0u8; 8]); // target name fields
        msg.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
        msg.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        msg.extend_from_slice(&[0u8; 8]); // reserved
        let ti_off = 56u32;
        msg.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
        msg.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
        msg.extend_from_slice(&ti_off.to_le_bytes());
        msg.extend_from_slice(&[0u8; 8]); // version
        assert_eq!(msg.len(), 56);
        msg.extend_from_slice(&target_info);
        msg
    }

    #[test]
    fn test_parse_challenge() {
        let raw = fake_challenge();
        let challenge = parse_challenge_token(&raw).unwrap();
        assert_eq!(
            challenge.server_challenge,
            [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
        assert!(!challenge.target_info.is_empty());
    }

    #[test]
    fn test_parse_challenge_inside_spnego_noise() {
        // Challenge embedded mid-buffer still parses via signature scan
        let mut wrapped = vec![0xa1, 0x81, 0x99, 0x30, 0x81, 0x96];
        wrapped.extend_from_slice(&fake_challenge());
        let challenge = parse_challenge_token(&wrapped).unwrap();
        assert_eq!(challenge.server_challenge[0], 0x11);
    }

    #[test]
    fn test_authenticate_token() {
        let creds = Credentials::new("CORP", "alice", "hunter2", None, false, "", "");
        let challenge = parse_challenge_token(&fake_challenge()).unwrap();
        let auth = build_authenticate_token(&creds, &challenge).unwrap();

        assert!(auth.token.starts_with(b"NTLMSSP\x00"));
        assert_eq!(le_u32(&auth.token, 8), 3);
        assert_ne!(auth.session_key, [0u8; 16]);
        // NT response descriptor: len at offset 20
        let nt_len = u16::from_le_bytes([auth.token[20], auth.token[21]]);
        assert!(nt_len > 16, "NTLMv2 response carries proof + blob");
    }

    #[test]
    fn test_anonymous_authenticate() {
        let creds = Credentials::new("", "", "", None, false, "", "");
        let challenge = parse_challenge_token(&fake_challenge()).unwrap();
        let auth = build_authenticate_token(&creds, &challenge).unwrap();
        let nt_len = u16::from_le_bytes([auth.token[20], auth.token[21]]);
        assert_eq!(nt_len, 0);
        assert_eq!(auth.session_key, [0u8; 16]);
    }

    #[test]
    fn test_spnego_wrappers() {
        let init = spnego_wrap_init(&build_negotiate_token());
        assert_eq!(init[0], 0x60, "GSS-API application tag");
        assert!(init
            .windows(NTLMSSP_OID.len())
            .any(|w| w == NTLMSSP_OID));

        let resp = spnego_wrap_response(b"NTLMSSP\x00fake");
        assert_eq!(resp[0], 0xa1, "NegTokenResp context tag");
    }
}
