pub mod http_transport;
pub mod prepared_upstream;

pub use http_transport::HttpTransport;
pub use prepared_upstream::PreparedUpstream;
