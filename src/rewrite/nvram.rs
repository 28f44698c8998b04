//! NVRAM pre-seeding: a fixed table of binary-content-triggered key/value
//! writes into the Firmadyne NVRAM override directory.
//!
//! Grounded on `original_source/src/prepareImage.py`'s `addNvramEntries`.

use crate::binary_inspector::contains_string;
use crate::path_algebra::{guest_to_host, is_file_in_guest, read_guest_link};
use anyhow::Result;
use std::path::Path;

/// `(guestBinary, triggerString, key, value)`. Each rule fires
/// independently; order only affects iteration, not the outcome.
const RULES: [(&str, &str, &str, &str); 6] = [
    ("/sbin/rc", "ipv6_6to4_lan_ip", "ipv6_6to4_lan_ip", "2002:7f00:0001::"),
    ("/lib/libacos_shared.so", "time_zone_x", "time_zone_x", "0"),
    ("/usr/sbin/httpd", "rip_multicast", "rip_multicast", "0"),
    ("/usr/sbin/httpd", "bs_trustedip_enable", "bs_trustedip_enable", "0"),
    ("/usr/sbin/httpd", "filter_rule_tbl", "filter_rule_tbl", ""),
    ("/sbin/acos_service", "rip_enable", "rip_enable", "0"),
];

pub fn add_nvram_entries(root: &Path) -> Result<()> {
    let override_dir = guest_to_host(root, Path::new("/firmadyne/libnvram.override"))
        .map_err(anyhow::Error::msg)?;
    std::fs::create_dir_all(&override_dir)?;

    for (binary, trigger, key, value) in RULES {
        if !is_file_in_guest(root, Path::new(binary)) {
            continue;
        }
        let host = guest_to_host(root, Path::new(binary)).map_err(anyhow::Error::msg)?;
        let resolved = read_guest_link(&host, root, true);
        if contains_string(&resolved, trigger).unwrap_or(false) {
            std::fs::write(override_dir.join(key), value)?;
        }
    }

    Ok(())
}
