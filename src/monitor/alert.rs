//! Alert message composition.

use std::fmt::Write as _;

use crate::model::{BlockNumber, NetworkId, UnworkedJob};

/// Build the alert body for `unworked`, grouped under a heading per network
/// in the order given.
pub fn compose_alert(block: BlockNumber, threshold: u64, unworked: &[UnworkedJob]) -> String {
    let mut message = format!(
        "Warning: unworked jobs detected at block {block}.\n\
         The following jobs have been workable for at least {threshold} consecutive blocks:"
    );

    let mut current: Option<NetworkId> = None;
    for job in unworked {
        if current != Some(job.network) {
            let _ = write!(message, "\nNetwork {}:", network_name(&job.network));
            current = Some(job.network);
        }
        let _ = write!(message, "\n- {} ({} blocks)", job.job, job.streak);
    }
    message
}

fn network_name(network: &NetworkId) -> String {
    match network.label() {
        Some(label) => format!("{label} ({network})"),
        None => network.to_string(),
    }
}
