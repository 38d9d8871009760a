//! Wifi watchdog.
//!
//! The board hangs on a wall; nobody is around to notice that the Pi's
//! wifi dropped.  This optional background thread asks NetworkManager
//! (`nmcli`) about the wifi connection every so often and tries to bring
//! it back up when it is down.  It shares the process-wide shutdown signal
//! with the refresh workers.
//!
//! Everything here degrades to log messages: a machine without `nmcli`
//! (or without wifi at all) just gets a warning and the thread exits.

use std::process::Command;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{error, info, warn};

use crate::shutdown::Shutdown;

/// Let the system settle (DHCP, clock sync) before the first check.
const STARTUP_GRACE: Duration = Duration::from_secs(60);

pub fn spawn(check_interval: Duration, shutdown: Shutdown) -> JoinHandle<()> {
    thread::spawn(move || run(check_interval, shutdown))
}

fn run(check_interval: Duration, shutdown: Shutdown) {
    if shutdown.sleep(STARTUP_GRACE) {
        return;
    }

    let connection = match connection_name() {
        Ok(name) => name,
        Err(err) => {
            warn!("wifi watchdog disabled: {err}");
            return;
        }
    };
    info!("wifi watchdog started, watching connection {connection:?}");

    loop {
        match connected(&connection) {
            Ok(true) => {}
            Ok(false) => {
                warn!("wifi connection {connection:?} is down, trying to bring it up");
                if let Err(err) = reconnect(&connection) {
                    error!("wifi reconnect failed: {err}");
                }
            }
            Err(err) => warn!("wifi check failed: {err}"),
        }

        if shutdown.sleep(check_interval) {
            return;
        }
    }
}

fn nmcli(args: &[&str]) -> Result<String> {
    let output = Command::new("nmcli").args(args).output()?;
    if !output.status.success() {
        return Err(anyhow!("nmcli {} exited with {}", args.join(" "), output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The NetworkManager name of the machine's wifi connection.
fn connection_name() -> Result<String> {
    let listing = nmcli(&["--get-values", "name,device,type", "con", "show", "--active"])?;
    parse_connection_name(&listing).ok_or_else(|| anyhow!("no active wifi connection found"))
}

fn parse_connection_name(listing: &str) -> Option<String> {
    for line in listing.lines() {
        let mut fields = line.splitn(3, ':');
        let (Some(name), Some(device), Some(kind)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if device.starts_with("wlan") && kind.contains("wireless") {
            return Some(name.to_string());
        }
    }
    None
}

fn connected(connection: &str) -> Result<bool> {
    let listing = nmcli(&["--get-values", "connection,state", "device"])?;
    Ok(parse_device_state(&listing, connection))
}

fn parse_device_state(listing: &str, connection: &str) -> bool {
    listing.lines().any(|line| {
        let mut fields = line.splitn(2, ':');
        fields.next() == Some(connection) && fields.next() == Some("connected")
    })
}

/// Needs a sudoers entry on the target device — `nmcli connection up` is
/// privileged there.
fn reconnect(connection: &str) -> Result<()> {
    let status = Command::new("sudo")
        .args(["nmcli", "connection", "up", connection])
        .status()?;
    if !status.success() {
        return Err(anyhow!("nmcli connection up exited with {status}"));
    }
    info!("restarted wifi connection {connection:?}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_wifi_connection_among_active_connections() {
        let listing = "\
Wired connection 1:eth0:802-3-ethernet
HomeWifi:wlan0:802-11-wireless
";
        assert_eq!(parse_connection_name(listing).as_deref(), Some("HomeWifi"));
    }

    #[test]
    fn no_wifi_connection_yields_none() {
        let listing = "Wired connection 1:eth0:802-3-ethernet\n";
        assert_eq!(parse_connection_name(listing), None);
    }

    #[test]
    fn connection_names_may_contain_colons() {
        // Only the last field may contain separators after two splits; a
        // colon in the name would break the listing format itself, but a
        // colon in the type must not.
        let listing = "Cafe:wlan0:802-11-wireless:extra\n";
        assert_eq!(parse_connection_name(listing).as_deref(), Some("Cafe"));
    }

    #[test]
    fn device_state_connected() {
        let listing = "HomeWifi:connected\nlo:unmanaged\n";
        assert!(parse_device_state(listing, "HomeWifi"));
    }

    #[test]
    fn device_state_disconnected() {
        let listing = "HomeWifi:disconnected\n";
        assert!(!parse_device_state(listing, "HomeWifi"));
    }

    #[test]
    fn device_state_for_unknown_connection() {
        let listing = "OtherWifi:connected\n";
        assert!(!parse_device_state(listing, "HomeWifi"));
    }
}
