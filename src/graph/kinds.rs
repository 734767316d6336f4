//! Node and edge kind vocabularies for the output graph
//!
//! These strings are a closed vocabulary shared with the downstream
//! analysis tool and must not drift.

/// Base node kind stamped into the artifact metadata
pub const NODE_NETWORK_SHARE_BASE: &str = "NetworkShareBase";

/// Host and share node kinds
pub const NODE_NETWORK_SHARE_HOST: &str = "NetworkShareHost";
pub const NODE_NETWORK_SHARE_DFS: &str = "NetworkShareDFS";
pub const NODE_NETWORK_SHARE_SMB: &str = "NetworkShareSMB";

/// Content node kinds
pub const NODE_FILE: &str = "File";
pub const NODE_DIRECTORY: &str = "Directory";

/// Principal node kinds (resolved externally)
pub const NODE_PRINCIPAL: &str = "Principal";
pub const NODE_USER: &str = "User";
pub const NODE_GROUP: &str = "Group";

/// Containment edge kinds
pub const EDGE_HAS_NETWORK_SHARE: &str = "HasNetworkShare";
pub const EDGE_HOSTS_NETWORK_SHARE: &str = "HostsNetworkShare";
pub const EDGE_CONTAINS: &str = "Contains";

/// Share-level permission edge kinds - generic rights
pub const EDGE_CAN_GENERIC_EXECUTE: &str = "CanGenericExecute";
pub const EDGE_CAN_GENERIC_WRITE: &str = "CanGenericWrite";
pub const EDGE_CAN_GENERIC_READ: &str = "CanGenericRead";
pub const EDGE_CAN_GENERIC_ALL: &str = "CanGenericAll";

/// Share-level permission edge kinds - directory service rights
pub const EDGE_CAN_DS_CREATE_CHILD: &str = "CanDsCreateChild";
pub const EDGE_CAN_DS_DELETE_CHILD: &str = "CanDsDeleteChild";
pub const EDGE_CAN_DS_LIST_CONTENTS: &str = "CanDsListContents";
pub const EDGE_CAN_DS_WRITE_EXTENDED_PROPERTIES: &str = "CanDsWriteExtendedProperties";
pub const EDGE_CAN_DS_READ_PROPERTY: &str = "CanDsReadProperty";
pub const EDGE_CAN_DS_WRITE_PROPERTY: &str = "CanDsWriteProperty";
pub const EDGE_CAN_DS_DELETE_TREE: &str = "CanDsDeleteTree";
pub const EDGE_CAN_DS_LIST_OBJECT: &str = "CanDsListObject";
pub const EDGE_CAN_DS_CONTROL_ACCESS: &str = "CanDsControlAccess";

/// Share-level permission edge kinds - standard rights
pub const EDGE_CAN_DELETE: &str = "CanDelete";
pub const EDGE_CAN_READ_CONTROL: &str = "CanReadControl";
pub const EDGE_CAN_WRITE_DACL: &str = "CanWriteDacl";
pub const EDGE_CAN_WRITE_OWNER: &str = "CanWriteOwner";

/// NTFS-level permission edge kinds
pub const EDGE_CAN_NTFS_GENERIC_READ: &str = "CanNTFSGenericRead";
pub const EDGE_CAN_NTFS_GENERIC_WRITE: &str = "CanNTFSGenericWrite";
pub const EDGE_CAN_NTFS_GENERIC_EXECUTE: &str = "CanNTFSGenericExecute";
pub const EDGE_CAN_NTFS_GENERIC_ALL: &str = "CanNTFSGenericAll";
pub const EDGE_CAN_NTFS_MAXIMUM_ALLOWED: &str = "CanNTFSMaximumAllowed";
pub const EDGE_CAN_NTFS_ACCESS_SYSTEM_SECURITY: &str = "CanNTFSAccessSystemSecurity";
pub const EDGE_CAN_NTFS_SYNCHRONIZE: &str = "CanNTFSSynchronize";
pub const EDGE_CAN_NTFS_WRITE_OWNER: &str = "CanNTFSWriteOwner";
pub const EDGE_CAN_NTFS_WRITE_DACL: &str = "CanNTFSWriteDacl";
pub const EDGE_CAN_NTFS_READ_CONTROL: &str = "CanNTFSReadControl";
pub const EDGE_CAN_NTFS_DELETE: &str = "CanNTFSDelete";

/// All node kinds
pub fn all_node_kinds() -> &'static [&'static str] {
    &[
        NODE_NETWORK_SHARE_BASE,
        NODE_NETWORK_SHARE_HOST,
        NODE_NETWORK_SHARE_DFS,
        NODE_NETWORK_SHARE_SMB,
        NODE_FILE,
        NODE_DIRECTORY,
        NODE_PRINCIPAL,
        NODE_USER,
        NODE_GROUP,
    ]
}

/// All edge kinds
pub fn all_edge_kinds() -> &'static [&'static str] {
    &[
        EDGE_HAS_NETWORK_SHARE,
        EDGE_HOSTS_NETWORK_SHARE,
        EDGE_CONTAINS,
        EDGE_CAN_GENERIC_EXECUTE,
        EDGE_CAN_GENERIC_WRITE,
        EDGE_CAN_GENERIC_READ,
        EDGE_CAN_GENERIC_ALL,
        EDGE_CAN_DS_CREATE_CHILD,
        EDGE_CAN_DS_DELETE_CHILD,
        EDGE_CAN_DS_LIST_CONTENTS,
        EDGE_CAN_DS_WRITE_EXTENDED_PROPERTIES,
        EDGE_CAN_DS_READ_PROPERTY,
        EDGE_CAN_DS_WRITE_PROPERTY,
        EDGE_CAN_DS_DELETE_TREE,
        EDGE_CAN_DS_LIST_OBJECT,
        EDGE_CAN_DS_CONTROL_ACCESS,
        EDGE_CAN_DELETE,
        EDGE_CAN_READ_CONTROL,
        EDGE_CAN_WRITE_DACL,
        EDGE_CAN_WRITE_OWNER,
        EDGE_CAN_NTFS_GENERIC_READ,
        EDGE_CAN_NTFS_GENERIC_WRITE,
        EDGE_CAN_NTFS_GENERIC_EXECUTE,
        EDGE_CAN_NTFS_GENERIC_ALL,
        EDGE_CAN_NTFS_MAXIMUM_ALLOWED,
        EDGE_CAN_NTFS_ACCESS_SYSTEM_SECURITY,
        EDGE_CAN_NTFS_SYNCHRONIZE,
        EDGE_CAN_NTFS_WRITE_OWNER,
        EDGE_CAN_NTFS_WRITE_DACL,
        EDGE_CAN_NTFS_READ_CONTROL,
        EDGE_CAN_NTFS_DELETE,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_sizes() {
        assert_eq!(all_node_kinds().len(), 9);
        // 3 containment + 17 share-level + 11 NTFS-level
        assert_eq!(all_edge_kinds().len(), 31);
    }
}
