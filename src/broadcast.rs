use std::fmt;

use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct BroadcastReport {
    pub(super) sent: usize,
    pub(super) total: usize,
}

impl fmt::Display for BroadcastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sent, self.total)
    }
}

pub(super) async fn broadcast(
    transport: &dyn Transport,
    recipients: &[i64],
    text: &str,
    delay: Duration,
) -> BroadcastReport {
    let mut sent = 0;
    for (index, chat_id) in recipients.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match transport.send_text(*chat_id, text, None).await {
            Ok(_) => sent += 1,
            Err(err) => warn!("broadcast to {} failed: {:#}", chat_id, err),
        }
    }
    let report = BroadcastReport {
        sent,
        total: recipients.len(),
    };
    info!("broadcast delivered to {} users", report);
    report
}
