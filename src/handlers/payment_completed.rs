//! 支付完成事件处理器

use async_trait::async_trait;

use crate::dispatch::{Record, RecordHandler};

/// payment_completed：记录支付 id（开票、升级账户等在此接入）
pub struct PaymentCompletedHandler;

#[async_trait]
impl RecordHandler for PaymentCompletedHandler {
    fn name(&self) -> &str {
        "payment_completed"
    }

    async fn handle(&self, record: &Record) -> Result<(), String> {
        let payment_id = record
            .get_str("payment_id")
            .ok_or_else(|| "payment_completed record has no payment_id".to_string())?;
        tracing::info!(%payment_id, record_id = ?record.id(), "Processing payment");
        Ok(())
    }
}
