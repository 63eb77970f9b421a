//! 工具注册表与存活引擎：存储、清单发现、心跳超时扫描、主动健康探测、PM2 状态。

pub mod discovery;
pub mod health_probe;
pub mod heartbeat;
pub mod pm2;
pub mod store;
