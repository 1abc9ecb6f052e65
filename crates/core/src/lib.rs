pub mod completion;
pub mod config;
pub mod persistence;
pub mod plan_render;
pub mod query_runner;
pub mod resize;
pub mod samples;
pub mod schema_cache;
pub mod share;
pub mod statements;
