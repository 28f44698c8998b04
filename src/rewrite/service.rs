//! Service discovery: a fixed, ordered table of known httpd-style daemons,
//! first match wins as the image's single startable service.
//!
//! Grounded on `original_source/src/prepareImage.py`'s `findServices`.

use crate::path_algebra::exists_in_guest;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

/// `(guestPath, startCommand)` in priority order. The first entry present
/// in the image becomes the recorded default service; every present entry
/// is still returned in the result map.
const SERVICE_TABLE: [(&str, &str); 7] = [
    ("/etc/init.d/uhttpd", "/etc/init.d/uhttpd start"),
    ("/usr/bin/httpd", "/usr/bin/httpd"),
    ("/usr/sbin/httpd", "/usr/sbin/httpd"),
    ("/bin/goahead", "/bin/goahead"),
    ("/bin/alphapd", "/bin/alphapd"),
    ("/bin/boa", "/bin/boa"),
    (
        "/usr/sbin/lighttpd",
        "/usr/sbin/lighttpd -f /etc/lighttpd/lighttpd.conf",
    ),
];

/// Scans [`SERVICE_TABLE`] in order, recording every present entry in the
/// returned map. The first present entry additionally gets written to
/// `/firmadyne/service` and `/firmadyne/service_name` as the default
/// service to launch (§4.3 Non-goal: only one service is ever launched).
pub fn find_services(root: &Path) -> Result<HashMap<String, String>> {
    let service_file = root.join("firmadyne").join("service");
    let name_file = root.join("firmadyne").join("service_name");

    let mut services = HashMap::new();
    let mut default: Option<(&str, &str)> = None;

    for (path, start_command) in SERVICE_TABLE {
        if exists_in_guest(root, Path::new(path)) {
            services.insert(path.to_string(), start_command.to_string());
            if default.is_none() {
                default = Some((path, start_command));
            }
        }
    }

    if let Some((path, start_command)) = default {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        std::fs::write(&service_file, format!("{start_command}\n"))?;
        std::fs::write(&name_file, format!("{name}\n"))?;
    }

    Ok(services)
}
