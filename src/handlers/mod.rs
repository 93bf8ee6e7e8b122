//! 内置记录处理器

pub mod payment_completed;
pub mod user_signup;

pub use payment_completed::PaymentCompletedHandler;
pub use user_signup::UserSignupHandler;

use crate::dispatch::RecordDispatcher;

/// 注册全部内置处理器的分发表
pub fn default_dispatcher() -> RecordDispatcher {
    let mut dispatcher = RecordDispatcher::new();
    dispatcher.register("user_signup", UserSignupHandler);
    dispatcher.register("payment_completed", PaymentCompletedHandler);
    dispatcher
}
