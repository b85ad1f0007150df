//! Streaming the disk image into the host's datastore.

use std::path::Path;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE};

use eoslab_vim::{Hypervisor, DISK_FILE_NAME};

use crate::error::{ProvisionError, Result};

/// Upload the local disk image for one machine.
///
/// Resolves the named datastore first (fatal if absent), then streams the
/// file as a binary PUT to the host's `/folder` endpoint, authenticated with
/// the connection's session cookie. Every machine gets its own copy under a
/// folder named after it; nothing is deduplicated or resumed, and a
/// transport failure aborts the run for this machine.
pub async fn upload_disk(
    host: &dyn Hypervisor,
    host_addr: &str,
    datastore: &str,
    local_path: &Path,
    machine: &str,
    verify_tls: bool,
) -> Result<()> {
    let locator = host
        .find_datastore(datastore)
        .await?
        .ok_or_else(|| ProvisionError::DatastoreNotFound(datastore.to_string()))?;

    let url = upload_url(host_addr, machine);
    tracing::info!(machine = %machine, url = %url, "uploading disk image");

    let file = tokio::fs::File::open(local_path).await?;
    let length = file.metadata().await?.len();

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .map_err(|e| transfer_error(machine, e.to_string()))?;

    let mut request = client
        .put(&url)
        .query(&[
            ("dsName", locator.datastore.as_str()),
            ("dcPath", locator.datacenter.as_str()),
        ])
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, length)
        .body(reqwest::Body::from(file));
    if let Some(cookie) = host.session_cookie() {
        request = request.header(COOKIE, cookie);
    }

    let response = request
        .send()
        .await
        .map_err(|e| transfer_error(machine, e.to_string()))?;
    if !response.status().is_success() {
        return Err(transfer_error(
            machine,
            format!("host answered {}", response.status()),
        ));
    }
    tracing::info!(machine = %machine, bytes = length, "disk image uploaded");
    Ok(())
}

/// Target URL for a machine's disk image: a per-machine folder and the fixed
/// file name. `host_addr` may carry an explicit port; 443 is assumed
/// otherwise.
fn upload_url(host_addr: &str, machine: &str) -> String {
    if host_addr.contains(':') {
        format!("https://{host_addr}/folder/{machine}/{DISK_FILE_NAME}")
    } else {
        format!("https://{host_addr}:443/folder/{machine}/{DISK_FILE_NAME}")
    }
}

fn transfer_error(machine: &str, message: String) -> ProvisionError {
    ProvisionError::Transfer {
        machine: machine.to_string(),
        message,
    }
}
