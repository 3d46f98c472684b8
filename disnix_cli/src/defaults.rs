use std::env;
use std::path::PathBuf;

/// Client interface executable, `DISNIX_CLIENT_INTERFACE` backed
pub fn client_interface(arg: Option<&str>) -> String {
    arg.map(String::from)
        .or_else(|| env::var("DISNIX_CLIENT_INTERFACE").ok())
        .unwrap_or_else(|| "disnix-ssh-client".to_string())
}

/// Connection property name, `DISNIX_TARGET_PROPERTY` backed
pub fn target_property(arg: Option<&str>) -> String {
    arg.map(String::from)
        .or_else(|| env::var("DISNIX_TARGET_PROPERTY").ok())
        .unwrap_or_else(|| "hostname".to_string())
}

/// Profile name, `DISNIX_PROFILE` backed
pub fn profile(arg: Option<&str>) -> String {
    arg.map(String::from)
        .or_else(|| env::var("DISNIX_PROFILE").ok())
        .unwrap_or_else(|| "default".to_string())
}

/// Whether obsolete state should be removed after a migration.
///
/// Any value of `DISNIX_DELETE_STATE` enables it globally.
pub fn delete_state(flag: bool) -> bool {
    flag || env::var("DISNIX_DELETE_STATE").is_ok()
}

/// Snapshot store of the coordinator machine, `DYSNOMIA_STATEDIR` backed
pub fn statedir() -> PathBuf {
    env::var("DYSNOMIA_STATEDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/state/dysnomia"))
}

/// Scratch space, `TMPDIR` backed
pub fn tmpdir() -> PathBuf {
    env::var("TMPDIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Where the coordinator profile generations live
pub fn coordinator_profile_dir(arg: Option<&str>) -> PathBuf {
    match arg {
        Some(p) => PathBuf::from(p),
        None => {
            let user = env::var("USER").unwrap_or_else(|_| "unknown".to_string());
            PathBuf::from(format!("/nix/var/nix/profiles/per-user/{}/disnix-coordinator", user))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_arguments_win() {
        assert_eq!(client_interface(Some("/bin/client")), "/bin/client");
        assert_eq!(target_property(Some("ip")), "ip");
        assert_eq!(profile(Some("staging")), "staging");
        assert_eq!(coordinator_profile_dir(Some("/tmp/coord")), PathBuf::from("/tmp/coord"));
    }

    #[test]
    fn delete_state_flag_passes_through() {
        assert!(delete_state(true));
    }
}
