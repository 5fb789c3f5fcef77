//! Wireless network join
//!
//! Joining is a plain polling loop: ask the link to associate, then check its
//! status every `poll_interval_ms` until it reports connected. There is no
//! retry limit and no timeout; if the network never shows up the device stays
//! here.

use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use crate::config::InternetConfig;

/// A wireless link that can be asked to associate with a network.
pub trait NetworkLink {
    type Error: core::fmt::Debug;

    /// Issue an association request for the given credentials.
    fn begin(
        &mut self,
        ssid: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Whether the link is associated and has an address.
    fn is_connected(&mut self) -> bool;

    /// Whether the association itself holds, address or not. A link that
    /// loses it after a successful request is asked to associate again.
    fn is_associated(&mut self) -> bool {
        self.is_connected()
    }
}

/// Block until `link` reports connected.
///
/// A failed association request is logged and issued again on the next poll,
/// as is one whose association is lost before the link comes up.
/// Returns the number of polls that found the link still down.
pub async fn join_network<L, D>(link: &mut L, config: &InternetConfig<'_>, delay: &mut D) -> u32
where
    L: NetworkLink,
    D: DelayNs,
{
    info!("Connecting to WiFi \"{}\"", config.ssid);

    let mut requested = false;
    let mut polls: u32 = 0;

    loop {
        if !requested {
            match link.begin(config.ssid, config.password).await {
                Ok(()) => requested = true,
                Err(e) => warn!("WiFi association request failed: {:?}", e),
            }
        }

        if link.is_connected() {
            break;
        }
        if requested && !link.is_associated() {
            warn!("WiFi association lost, requesting again");
            requested = false;
        }

        polls = polls.saturating_add(1);
        info!("Waiting for WiFi link ({} polls)", polls);
        delay.delay_ms(config.poll_interval_ms).await;
    }

    info!("WiFi connected after {} polls", polls);
    polls
}
