//! WiFi Settings
//!
//! Network configuration persisted under the `wifi` namespace.
//!
//! # Keys
//!
//! - `ssid` - WiFi network name (max 32 chars)
//! - `password` - WiFi password (max 63 chars)
//! - `dhcp` - Use DHCP (true) or static IP (false)
//! - `static_ip` - Static IP address, 4-byte blob (used if `dhcp` = false)
//! - `netmask` - Network mask, 4-byte blob (used if `dhcp` = false)
//! - `gateway` - Gateway address, 4-byte blob (used if `dhcp` = false)
//! - `channel` - Preferred channel, 0 = scan all
//! - `connects` - Successful connections since the settings were created
//!
//! # Security Note
//!
//! The password is stored in flash as plain text.

use crate::core::settings::{PersistenceStream, SettingsGroup};
use crate::platform::Result;
use heapless::String;

/// Maximum SSID length (IEEE 802.11 standard)
pub const MAX_SSID_LEN: usize = 32;

/// Maximum WiFi password length (WPA2 standard)
pub const MAX_PASSWORD_LEN: usize = 63;

/// WiFi settings group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiSettings {
    /// WiFi network SSID
    pub ssid: String<MAX_SSID_LEN>,
    /// WiFi password (WPA2)
    pub password: String<MAX_PASSWORD_LEN>,
    /// Use DHCP for IP configuration
    pub use_dhcp: bool,
    /// Static IP address (used if use_dhcp = false)
    pub static_ip: [u8; 4],
    /// Network mask (used if use_dhcp = false)
    pub netmask: [u8; 4],
    /// Gateway address (used if use_dhcp = false)
    pub gateway: [u8; 4],
    /// Preferred channel (0 = scan all)
    pub channel: u8,
    /// Successful connections
    pub connect_count: u64,
}

impl WifiSettings {
    /// Check if WiFi is configured
    ///
    /// Empty SSID indicates WiFi should be skipped.
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// Switch to a static address from dotted strings
    ///
    /// Returns false and leaves the settings unchanged if any address does
    /// not parse.
    pub fn set_static(&mut self, ip: &str, netmask: &str, gateway: &str) -> bool {
        match (parse_ipv4(ip), parse_ipv4(netmask), parse_ipv4(gateway)) {
            (Some(ip), Some(netmask), Some(gateway)) => {
                self.use_dhcp = false;
                self.static_ip = ip;
                self.netmask = netmask;
                self.gateway = gateway;
                true
            }
            _ => false,
        }
    }

    /// Count one successful connection
    pub fn record_connect(&mut self) {
        self.connect_count = self.connect_count.saturating_add(1);
    }
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            use_dhcp: true,
            static_ip: [0, 0, 0, 0],
            netmask: [255, 255, 255, 0],
            gateway: [0, 0, 0, 0],
            channel: 0,
            connect_count: 0,
        }
    }
}

impl SettingsGroup for WifiSettings {
    fn namespace(&self) -> &'static str {
        "wifi"
    }

    fn on_read(&mut self, stream: &PersistenceStream<'_>) {
        let defaults = Self::default();

        self.ssid = bounded(&stream.get_string("ssid", ""));
        self.password = bounded(&stream.get_string("password", ""));
        self.use_dhcp = stream.get("dhcp", defaults.use_dhcp);

        self.static_ip = defaults.static_ip;
        stream.get_blob("static_ip", &mut self.static_ip);
        self.netmask = defaults.netmask;
        stream.get_blob("netmask", &mut self.netmask);
        self.gateway = defaults.gateway;
        stream.get_blob("gateway", &mut self.gateway);

        self.channel = stream.get("channel", defaults.channel);
        self.connect_count = stream.get("connects", defaults.connect_count);
    }

    fn on_write(&self, stream: &PersistenceStream<'_>) -> Result<()> {
        stream.set_string("ssid", &self.ssid)?;
        stream.set_string("password", &self.password)?;
        stream.set("dhcp", self.use_dhcp)?;
        stream.set_blob("static_ip", &self.static_ip)?;
        stream.set_blob("netmask", &self.netmask)?;
        stream.set_blob("gateway", &self.gateway)?;
        stream.set("channel", self.channel)?;
        stream.set("connects", self.connect_count)
    }
}

/// Copy a stored string into a bounded one, empty if it does not fit
fn bounded<const N: usize>(value: &str) -> String<N> {
    String::try_from(value).unwrap_or_else(|_| {
        crate::log_warn!("Stored WiFi string longer than {} bytes ignored", N);
        String::new()
    })
}

/// Parse IPv4 address from string (e.g., "192.168.1.1")
fn parse_ipv4(s: &str) -> Option<[u8; 4]> {
    let mut parts = s.split('.');
    let mut result = [0u8; 4];
    for octet in &mut result {
        *octet = parts.next()?.parse::<u8>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(result)
}
