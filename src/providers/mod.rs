//! Built-in provider adapters and custom targets.
//!
//! Each cloud module talks plain HTTPS through `reqwest` and signs requests
//! itself. The adapters implement the three provider traits; the webhook
//! and local targets implement `Deployer` directly.

pub mod aliyun;
pub(crate) mod http;
pub mod local;
pub mod qiniu;
pub mod tencentcloud;
pub mod webhook;
