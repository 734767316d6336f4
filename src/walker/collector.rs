//! Rights collection and directory traversal
//!
//! The collectors turn descriptors into rights sets and walk a share's
//! directory tree breadth-first, feeding the graph-building context.
//! The per-host timeout flag is polled at every natural boundary:
//! before each network operation, between entries in a listing, and
//! before each child descent.

use crate::graph::{kinds, GraphContext, Node, RightsSet};
use crate::rules::{DirFact, FileFact, RuleContext, RuleProgram, ShareFact};
use crate::smb::access_mask::{NTFS_RIGHTS, SHARE_RIGHTS};
use crate::smb::descriptor::SecurityDescriptor;
use crate::smb::session::SmbSession;
use crate::smb::access_mask::rights_for_mask;
use crate::progress::TraversalCounts;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Derive a rights set from a descriptor's DACL.
///
/// Only ACCESS_ALLOWED entries with a trustee SID and at least one
/// recognized mask bit contribute; denies are recorded in the
/// descriptor but never emit rights.
pub fn rights_from_descriptor(
    sd: &SecurityDescriptor,
    table: &[(&'static str, u32)],
) -> RightsSet {
    let mut rights = RightsSet::new();

    let Some(dacl) = &sd.dacl else {
        return rights;
    };

    for ace in &dacl.aces {
        if !ace.is_access_allowed() {
            continue;
        }
        let Some(sid) = &ace.sid else { continue };
        let sid_text = sid.to_string();
        if sid_text.is_empty() {
            continue;
        }

        let kinds = rights_for_mask(ace.mask, table);
        if !kinds.is_empty() {
            rights.entry(sid_text).or_default().extend(kinds);
        }
    }

    rights
}

/// Collect share-level rights.
///
/// The RPC path is tried first and interpreted with the share-level
/// table. When it fails or yields nothing, the share root's NTFS
/// descriptor is the fallback, interpreted with the NTFS-level table.
/// Both failing is not an error: the share walks with empty rights.
pub fn collect_share_rights(session: &SmbSession, share_name: &str) -> RightsSet {
    trace!(share = %share_name, "Retrieving share security descriptor");

    match session.get_share_security_descriptor(share_name) {
        Ok(Some(bytes)) if !bytes.is_empty() => {
            if let Ok(sd) = SecurityDescriptor::parse(&bytes) {
                let rights = rights_from_descriptor(&sd, SHARE_RIGHTS);
                if !rights.is_empty() {
                    return rights;
                }
            }
        }
        Ok(_) => {}
        Err(e) => {
            debug!(share = %share_name, error = %e, "Share descriptor unavailable, trying root fallback");
        }
    }

    match session.get_share_root_descriptor(share_name) {
        Ok(Some(bytes)) if !bytes.is_empty() => match SecurityDescriptor::parse(&bytes) {
            Ok(sd) => rights_from_descriptor(&sd, NTFS_RIGHTS),
            Err(_) => RightsSet::new(),
        },
        Ok(_) => RightsSet::new(),
        Err(e) => {
            debug!(share = %share_name, error = %e, "No security descriptor for share");
            RightsSet::new()
        }
    }
}

/// Collect NTFS rights for one path on the current share.
pub fn collect_ntfs_rights(session: &SmbSession, path: &str) -> RightsSet {
    match session.get_file_descriptor(path) {
        Ok(Some(sd)) => rights_from_descriptor(&sd, NTFS_RIGHTS),
        Ok(None) => RightsSet::new(),
        Err(e) => {
            trace!(path = %path, error = %e, "NTFS rights unavailable");
            RightsSet::new()
        }
    }
}

/// Walk a share's contents breadth-first from the root.
#[allow(clippy::too_many_arguments)]
pub fn collect_share_contents(
    session: &SmbSession,
    ctx: &mut GraphContext<'_>,
    rules: &RuleProgram,
    share_fact: &ShareFact,
    host_name: &str,
    max_depth: u32,
    timeout_flag: &AtomicBool,
) -> TraversalCounts {
    debug!(share = %share_fact.name, "Collecting share contents");
    collect_at_depth(
        session,
        ctx,
        rules,
        share_fact,
        host_name,
        0,
        max_depth,
        timeout_flag,
    )
}

#[allow(clippy::too_many_arguments)]
fn collect_at_depth(
    session: &SmbSession,
    ctx: &mut GraphContext<'_>,
    rules: &RuleProgram,
    share_fact: &ShareFact,
    host_name: &str,
    depth: u32,
    max_depth: u32,
    timeout_flag: &AtomicBool,
) -> TraversalCounts {
    let mut counts = TraversalCounts::default();

    if timeout_flag.load(Ordering::Relaxed) {
        debug!("Timeout reached, stopping directory traversal");
        return counts;
    }

    // Depth limit; zero means unlimited
    if max_depth > 0 && depth >= max_depth {
        return counts;
    }

    let share_name = &share_fact.name;

    // The tree selection is shared session state; re-select in case a
    // concurrent sub-task moved it to another share.
    if let Err(e) = session.select_share(share_name) {
        debug!(share = %share_name, error = %e, "Failed to select share");
        return counts;
    }

    let current_path = ctx.path_from_root();

    let contents = match session.list_contents(&current_path) {
        Ok(c) => c,
        Err(e) => {
            debug!(path = %current_path, error = %e, "Failed to list contents");
            return counts;
        }
    };

    let mut dirs_to_explore: Vec<(Node, RightsSet)> = Vec::new();

    for (name, info) in &contents {
        // Poll inside the loop too: a directory with thousands of
        // entries must not run past the host deadline.
        if timeout_flag.load(Ordering::Relaxed) {
            debug!("Timeout reached, stopping content enumeration");
            break;
        }

        if name == "." || name == ".." {
            continue;
        }

        let full_path = if current_path.is_empty() {
            name.clone()
        } else {
            format!("{}\\{}", current_path, name)
        };
        let unc_path = format!("\\\\{}\\{}\\{}", host_name, share_name, full_path);

        let element_rights = collect_ntfs_rights(session, &full_path);

        if info.is_directory {
            let rule_ctx = RuleContext {
                share: Some(share_fact.clone()),
                directory: Some(DirFact {
                    name: name.clone(),
                    path: full_path.clone(),
                }),
                file: None,
                depth,
            };

            if !rules.can_explore(&rule_ctx) {
                counts.dirs_skipped += 1;
                continue;
            }
            counts.dirs_total += 1;

            let mut dir_node = Node::new(format!("DIR:{}", unc_path), &[kinds::NODE_DIRECTORY])
                .with_property("name", name.as_str())
                .with_property("Path", full_path.as_str())
                .with_property("UNCPath", unc_path.as_str());
            if let Some(t) = info.created_unix {
                dir_node.set_property("createdAt", t);
            }
            if let Some(t) = info.modified_unix {
                dir_node.set_property("modifiedAt", t);
            }

            ctx.set_element(dir_node.clone(), element_rights.clone());
            if rules.can_process(&rule_ctx) {
                ctx.flush_path();
                counts.dirs_processed += 1;
            }
            ctx.clear_element();

            dirs_to_explore.push((dir_node, element_rights));
        } else {
            let fact = FileFact::new(name.clone(), full_path.clone(), info.size);
            let rule_ctx = RuleContext {
                share: Some(share_fact.clone()),
                file: Some(fact),
                directory: None,
                depth,
            };

            if !rules.can_process(&rule_ctx) {
                counts.files_skipped += 1;
                continue;
            }
            counts.files_total += 1;

            trace!(file = %name, "Processing file");

            let extension = crate::rules::extension_of(name);
            let mut file_node = Node::new(format!("FILE:{}", unc_path), &[kinds::NODE_FILE])
                .with_property("name", name.as_str())
                .with_property("Path", full_path.as_str())
                .with_property("UNCPath", unc_path.as_str())
                .with_property("fileSize", info.size)
                .with_property("extension", extension);
            if let Some(t) = info.created_unix {
                file_node.set_property("createdAt", t);
            }
            if let Some(t) = info.modified_unix {
                file_node.set_property("modifiedAt", t);
            }

            ctx.set_element(file_node, element_rights);
            ctx.flush_path();
            counts.files_processed += 1;
            ctx.clear_element();
        }
    }

    // Descend into the collected directories (next BFS level)
    for (dir_node, rights) in dirs_to_explore {
        if timeout_flag.load(Ordering::Relaxed) {
            debug!("Timeout reached, skipping remaining directories");
            break;
        }

        trace!(dir = %dir_node.string_property("name"), "Descending");

        ctx.push_path(dir_node, rights);
        let sub = collect_at_depth(
            session,
            ctx,
            rules,
            share_fact,
            host_name,
            depth + 1,
            max_depth,
            timeout_flag,
        );
        counts.add(sub);
        ctx.pop_path();
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb::descriptor::{
        SecurityDescriptor, ACCESS_ALLOWED_ACE_TYPE, ACCESS_DENIED_ACE_TYPE, SE_DACL_PRESENT,
        SE_SELF_RELATIVE,
    };

    fn everyone_sid() -> Vec<u8> {
        vec![0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
    }

    fn descriptor_with_aces(aces: &[(u8, u32)]) -> SecurityDescriptor {
        let encoded: Vec<Vec<u8>> = aces
            .iter()
            .map(|(ace_type, mask)| {
                let sid = everyone_sid();
                let size = (8 + sid.len()) as u16;
                let mut out = vec![*ace_type, 0x00];
                out.extend_from_slice(&size.to_le_bytes());
                out.extend_from_slice(&mask.to_le_bytes());
                out.extend_from_slice(&sid);
                out
            })
            .collect();

        let body_len: usize = encoded.iter().map(|a| a.len()).sum();
        let mut acl = vec![0x02, 0x00];
        acl.extend_from_slice(&((8 + body_len) as u16).to_le_bytes());
        acl.extend_from_slice(&(encoded.len() as u16).to_le_bytes());
        acl.extend_from_slice(&[0x00, 0x00]);
        for ace in &encoded {
            acl.extend_from_slice(ace);
        }

        let mut sd = vec![0x01, 0x00];
        sd.extend_from_slice(&(SE_DACL_PRESENT | SE_SELF_RELATIVE).to_le_bytes());
        sd.extend_from_slice(&[0u8; 12]);
        sd.extend_from_slice(&20u32.to_le_bytes());
        sd.extend_from_slice(&acl);

        SecurityDescriptor::parse(&sd).unwrap()
    }

    #[test]
    fn test_rights_from_full_control_ace() {
        let sd = descriptor_with_aces(&[(ACCESS_ALLOWED_ACE_TYPE, 0x001F01FF)]);
        let rights = rights_from_descriptor(&sd, SHARE_RIGHTS);

        let kinds = rights.get("S-1-1-0").expect("Everyone should hold rights");
        assert_eq!(kinds.len(), 13);
        assert!(kinds.contains(&kinds::EDGE_CAN_DELETE));
        assert!(kinds.contains(&kinds::EDGE_CAN_READ_CONTROL));
        assert!(kinds.contains(&kinds::EDGE_CAN_WRITE_DACL));
        assert!(kinds.contains(&kinds::EDGE_CAN_WRITE_OWNER));
        assert!(kinds.contains(&kinds::EDGE_CAN_DS_CREATE_CHILD));
        assert!(kinds.contains(&kinds::EDGE_CAN_DS_CONTROL_ACCESS));
    }

    #[test]
    fn test_denied_aces_emit_nothing() {
        let sd = descriptor_with_aces(&[(ACCESS_DENIED_ACE_TYPE, 0xFFFFFFFF)]);
        assert!(rights_from_descriptor(&sd, SHARE_RIGHTS).is_empty());
        assert!(rights_from_descriptor(&sd, NTFS_RIGHTS).is_empty());
    }

    #[test]
    fn test_zero_mask_emits_nothing() {
        let sd = descriptor_with_aces(&[(ACCESS_ALLOWED_ACE_TYPE, 0)]);
        assert!(rights_from_descriptor(&sd, SHARE_RIGHTS).is_empty());
    }

    #[test]
    fn test_multiple_aces_accumulate() {
        let sd = descriptor_with_aces(&[
            (ACCESS_ALLOWED_ACE_TYPE, 0x8000_0000),
            (ACCESS_ALLOWED_ACE_TYPE, 0x8000_0000),
        ]);
        let rights = rights_from_descriptor(&sd, SHARE_RIGHTS);
        // The same SID may hold the same right via multiple ACEs; both
        // survive so the builder can emit one edge per ACE grant.
        assert_eq!(rights.get("S-1-1-0").unwrap().len(), 2);
    }

    #[test]
    fn test_missing_dacl_is_empty() {
        let sd = SecurityDescriptor::parse(&[0u8; 20]).unwrap();
        assert!(rights_from_descriptor(&sd, SHARE_RIGHTS).is_empty());
    }
}
