mod client;

pub use client::{ApiClient, ApiRequest, ApiResponse};
pub use vmlite_shared::api::{PingResponse, VmInfo, VmmState};
