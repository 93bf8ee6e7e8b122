//! 用户注册事件处理器

use async_trait::async_trait;

use crate::dispatch::{Record, RecordHandler};

/// user_signup：记录新用户 id（欢迎邮件、初始化档案等在此接入）
pub struct UserSignupHandler;

#[async_trait]
impl RecordHandler for UserSignupHandler {
    fn name(&self) -> &str {
        "user_signup"
    }

    async fn handle(&self, record: &Record) -> Result<(), String> {
        let user_id = record
            .get_str("user_id")
            .ok_or_else(|| "user_signup record has no user_id".to_string())?;
        tracing::info!(%user_id, record_id = ?record.id(), "Processing user signup");
        Ok(())
    }
}
