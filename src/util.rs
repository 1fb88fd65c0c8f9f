pub mod validating_http_body;
pub mod validating_http_downloader;
