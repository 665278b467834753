//! HTTP gateway: `POST /api/research`, `POST /api/chat`, `GET /health`.

pub mod request;
pub mod server;

pub use request::{ApiError, ChatRequestBody, ErrorBody, FormatQuery, ResearchRequestBody};
pub use server::{GatewayState, SharedGateway, router, run};
