use crate::model::{ConfigSyncStatus, RemoteConfigApplyStatus, RemoteConfigStatus};

/// Rule table from §4.11. First match wins.
pub fn compute(
    assigned_hash: Option<&[u8]>,
    remote_status: Option<&RemoteConfigStatus>,
) -> (ConfigSyncStatus, String) {
    let Some(assigned_hash) = assigned_hash else {
        return (ConfigSyncStatus::Unknown, "no assigned config".to_owned());
    };
    let Some(remote_status) = remote_status else {
        return (ConfigSyncStatus::OutOfSync, "no status reported".to_owned());
    };
    if remote_status.last_remote_config_hash != assigned_hash {
        return (ConfigSyncStatus::OutOfSync, "hash mismatch".to_owned());
    }
    match remote_status.status {
        RemoteConfigApplyStatus::Applied => (ConfigSyncStatus::InSync, String::new()),
        RemoteConfigApplyStatus::Applying => (ConfigSyncStatus::Applying, String::new()),
        RemoteConfigApplyStatus::Failed => {
            (ConfigSyncStatus::Error, remote_status.error_message.clone())
        }
        RemoteConfigApplyStatus::Unset => {
            (ConfigSyncStatus::OutOfSync, "unknown status".to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_assignment_is_unknown() {
        let (status, reason) = compute(None, None);
        assert!(matches!(status, ConfigSyncStatus::Unknown));
        assert_eq!(reason, "no assigned config");
    }

    #[test]
    fn no_report_is_out_of_sync() {
        let (status, _) = compute(Some(&[1, 2, 3]), None);
        assert!(matches!(status, ConfigSyncStatus::OutOfSync));
    }

    #[test]
    fn matching_hash_and_applied_is_in_sync() {
        let remote = RemoteConfigStatus {
            last_remote_config_hash: vec![1, 2, 3],
            status: RemoteConfigApplyStatus::Applied,
            error_message: String::new(),
        };
        let (status, _) = compute(Some(&[1, 2, 3]), Some(&remote));
        assert!(matches!(status, ConfigSyncStatus::InSync));
    }

    #[test]
    fn mismatched_hash_is_out_of_sync_even_if_applied() {
        let remote = RemoteConfigStatus {
            last_remote_config_hash: vec![9, 9, 9],
            status: RemoteConfigApplyStatus::Applied,
            error_message: String::new(),
        };
        let (status, reason) = compute(Some(&[1, 2, 3]), Some(&remote));
        assert!(matches!(status, ConfigSyncStatus::OutOfSync));
        assert_eq!(reason, "hash mismatch");
    }

    #[test]
    fn failed_status_surfaces_agent_error() {
        let remote = RemoteConfigStatus {
            last_remote_config_hash: vec![1, 2, 3],
            status: RemoteConfigApplyStatus::Failed,
            error_message: "disk full".to_owned(),
        };
        let (status, reason) = compute(Some(&[1, 2, 3]), Some(&remote));
        assert!(matches!(status, ConfigSyncStatus::Error));
        assert_eq!(reason, "disk full");
    }
}
