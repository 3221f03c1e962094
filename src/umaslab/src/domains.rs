//! Memory domain count of the running system
//!
//! Keg records are sized by the number of memory domains, which the kernel
//! image does not describe in a form the walker can read before it has a keg.
//! The count comes from the live system instead: the `vm.ndomains` sysctl on
//! FreeBSD, the online NUMA node list on Linux.

use crate::error::{Error, Result};

/// Online NUMA nodes, as a range list like `0-3,6`
pub const NODE_ONLINE_PATH: &str = "/sys/devices/system/node/online";

/// Ask the running system how many memory domains it has
#[cfg(target_os = "freebsd")]
pub fn query_domain_count() -> Result<usize> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>();
    // SAFETY: the name is nul-terminated and `value`/`len` describe a c_int buffer.
    let rc = unsafe {
        libc::sysctlbyname(
            c"vm.ndomains".as_ptr(),
            (&mut value as *mut libc::c_int).cast(),
            &mut len,
            std::ptr::null(),
            0,
        )
    };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        return Err(Error::DomainCount(format!("sysctl vm.ndomains: {e}")));
    }

    let count = usize::try_from(value)
        .map_err(|_| Error::DomainCount(format!("sysctl vm.ndomains returned {value}")))?;
    tracing::debug!("{} memory domains (vm.ndomains)", count);
    Ok(count)
}

/// Ask the running system how many memory domains it has
///
/// A system without NUMA support exposes no node list and has one domain.
#[cfg(target_os = "linux")]
pub fn query_domain_count() -> Result<usize> {
    use std::{fs, io};

    match fs::read_to_string(NODE_ONLINE_PATH) {
        Ok(contents) => {
            let count = parse_node_list(&contents)?;
            tracing::debug!("{} memory domains online", count);
            Ok(count)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("{} missing, assuming a single domain", NODE_ONLINE_PATH);
            Ok(1)
        }
        Err(e) => Err(Error::DomainCount(format!("{NODE_ONLINE_PATH}: {e}"))),
    }
}

#[cfg(not(any(target_os = "freebsd", target_os = "linux")))]
pub fn query_domain_count() -> Result<usize> {
    Err(Error::DomainCount(
        "no domain query on this platform; pass the count explicitly".to_string(),
    ))
}

/// Count the nodes in a kernel range list (`0`, `0-3`, `0-1,4,6-7`)
pub fn parse_node_list(list: &str) -> Result<usize> {
    let invalid = || Error::DomainCount(format!("invalid node list {:?}", list.trim()));
    let mut count = 0;

    for part in list.trim().split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid());
        }
        count += match part.split_once('-') {
            Some((first, last)) => {
                let first: usize = first.parse().map_err(|_| invalid())?;
                let last: usize = last.parse().map_err(|_| invalid())?;
                if last < first {
                    return Err(invalid());
                }
                last - first + 1
            }
            None => {
                part.parse::<usize>().map_err(|_| invalid())?;
                1
            }
        };
    }

    Ok(count)
}
