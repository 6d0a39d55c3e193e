pub mod checkpoint;
pub mod config;
pub mod fetch_head;
pub mod http_endpoint;
pub mod logging;
pub mod manager;
pub mod proxy;
pub mod retry;
pub mod safe_resume;
pub mod segmenter;
pub mod storage;
pub mod task;
pub mod transport;
pub mod url_model;
