use crate::cj::normalize::{field, first_record};
use crate::cj::{CjClient, CjError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub carrier: Option<String>,
    pub status: Option<String>,
}

impl CjClient {
    /// `None` when CJ has nothing on file for the order yet.
    pub async fn track_info(
        &self,
        access_token: &str,
        external_order_id: &str,
    ) -> Result<Option<TrackInfo>, CjError> {
        let data = self
            .get_json(
                "logistic/getTrackInfo",
                access_token,
                &[("orderId", external_order_id)],
            )
            .await?;
        Ok(first_record(&data).map(|record| TrackInfo {
            tracking_number: field(record, &["trackNumber", "trackingNumber"]),
            tracking_url: field(record, &["trackingUrl", "trackUrl"]),
            carrier: field(record, &["logisticName", "carrier"]),
            status: field(record, &["status", "trackingStatus"]),
        }))
    }
}
