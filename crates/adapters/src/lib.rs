pub mod export;
pub mod graphviz;
pub mod http;
