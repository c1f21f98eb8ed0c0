use urlencoding::encode;

const GENERIC_TRACKER: &str = "https://t.17track.net/en#nums=";

// USPS is checked before UPS.
const CARRIER_TRACKERS: [(&str, &str); 4] = [
    ("usps", "https://tools.usps.com/go/TrackConfirmAction?tLabels="),
    ("fedex", "https://www.fedex.com/fedextrack/?trknbr="),
    ("ups", "https://www.ups.com/track?tracknum="),
    ("dhl", "https://www.dhl.com/en/express/tracking.html?AWB="),
];

/// Public tracking page for a shipment when CJ does not supply one.
pub fn tracking_url(carrier: Option<&str>, tracking_number: &str) -> String {
    let carrier = carrier.unwrap_or_default().to_lowercase();
    let base = CARRIER_TRACKERS
        .iter()
        .find(|(needle, _)| carrier.contains(needle))
        .map(|(_, url)| *url)
        .unwrap_or(GENERIC_TRACKER);
    format!("{base}{}", encode(tracking_number.trim()))
}
