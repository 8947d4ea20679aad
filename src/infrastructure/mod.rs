//! 基础设施层
//!
//! 持有稀缺资源（浏览器、页面），只向上暴露能力接口

pub mod clock;
pub mod js_executor;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use js_executor::JsExecutor;
pub use session::{ExecutionContext, RemoteSession, SessionProvider, WidgetBounds};
